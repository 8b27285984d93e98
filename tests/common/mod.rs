//! Shared fixtures for controller integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use turn_engine::{
    Agent, AgentHandle, BoardEvent, Controller, EngineConfig, GameSnapshot, InvalidMoveError,
    MoveIndex, PlayerId, StopAck,
};

/// Move `A` of the counting game.
pub const A: MoveIndex = MoveIndex(0);
/// Move `B` of the counting game.
pub const B: MoveIndex = MoveIndex(1);

/// Board event of the counting game. Fields are ply numbers, pieces are players.
pub type CountEvent = BoardEvent<usize, u8>;

/// Two players alternate choosing `A` or `B` until `length` moves are made.
///
/// `A` moves a marker one ply forward. `B` places a piece and destroys the
/// previous field, so it yields two board events.
#[derive(Debug, Clone)]
pub struct Count {
    pub moves: Vec<MoveIndex>,
    pub length: usize,
    previous: Option<Arc<Count>>,
}

impl PartialEq for Count {
    fn eq(&self, other: &Self) -> bool {
        self.moves == other.moves && self.length == other.length
    }
}

impl Count {
    pub fn new(length: usize) -> Self {
        Self {
            moves: Vec::new(),
            length,
            previous: None,
        }
    }

    /// Number of `B` moves played.
    pub fn score(&self) -> usize {
        self.moves.iter().filter(|m| **m == B).count()
    }
}

impl GameSnapshot for Count {
    type Event = CountEvent;

    fn active_player(&self) -> PlayerId {
        PlayerId(1 + (self.moves.len() % 2) as u8)
    }

    fn is_running(&self) -> bool {
        self.moves.len() < self.length
    }

    fn legal_moves(&self) -> Vec<MoveIndex> {
        if self.is_running() { vec![A, B] } else { Vec::new() }
    }

    fn previous(&self) -> Option<&Arc<Self>> {
        self.previous.as_ref()
    }

    fn apply(self: Arc<Self>, index: MoveIndex) -> Result<Arc<Self>, InvalidMoveError> {
        if !self.is_legal(index) {
            return Err(InvalidMoveError::new(index, self.legal_moves()));
        }
        let mut moves = self.moves.clone();
        moves.push(index);
        Ok(Arc::new(Self {
            moves,
            length: self.length,
            previous: Some(self),
        }))
    }

    fn board_events(&self) -> Vec<Self::Event> {
        let ply = self.moves.len();
        match self.moves.last() {
            None => Vec::new(),
            Some(&m) if m == A => vec![BoardEvent::Moved {
                start: ply - 1,
                dest: ply,
            }],
            Some(_) => vec![
                BoardEvent::Placed {
                    field: ply,
                    piece: self.previous.as_ref().map_or(0, |p| p.active_player().0),
                },
                BoardEvent::Destroyed { field: ply - 1 },
            ],
        }
    }
}

pub type CountController = Controller<Count, usize>;

/// Erases a concrete test agent for the registry.
pub fn seat<T: Agent<Count> + 'static>(agent: &Arc<T>) -> Arc<dyn Agent<Count>> {
    agent.clone()
}

/// Controller over a fresh counting game with default configuration.
pub fn controller(length: usize, agents: Vec<Arc<dyn Agent<Count>>>) -> CountController {
    controller_with(length, agents, EngineConfig::default())
}

pub fn controller_with(
    length: usize,
    agents: Vec<Arc<dyn Agent<Count>>>,
    config: EngineConfig,
) -> CountController {
    Controller::new(Count::new(length), agents, |c: &Count| c.score(), config)
        .expect("inside a tokio runtime")
}

/// A notification as seen by an observer.
#[derive(Debug, Clone, PartialEq)]
pub enum Note {
    MoveMade(MoveIndex),
    Board(CountEvent),
    NextPlayer(PlayerId),
    GameOver(usize),
    Undone,
    PauseMoveDelivered,
    UpdateAis(bool),
}

/// Records every notification of a controller in delivery order.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    notes: Arc<Mutex<Vec<Note>>>,
}

impl Recorder {
    pub fn attach(controller: &CountController) -> Self {
        let recorder = Self::default();
        let observers = controller.observers();

        let r = recorder.clone();
        observers.move_made().subscribe(move |i| r.push(Note::MoveMade(*i)));
        let r = recorder.clone();
        observers.board_event().subscribe(move |e| r.push(Note::Board(e.clone())));
        let r = recorder.clone();
        observers.next_player().subscribe(move |p| r.push(Note::NextPlayer(*p)));
        let r = recorder.clone();
        observers.game_over().subscribe(move |s| r.push(Note::GameOver(*s)));
        let r = recorder.clone();
        observers.undone().subscribe(move |_| r.push(Note::Undone));
        let r = recorder.clone();
        observers
            .pause_move_delivered()
            .subscribe(move |_| r.push(Note::PauseMoveDelivered));
        let r = recorder.clone();
        observers.update_ais().subscribe(move |f| r.push(Note::UpdateAis(*f)));

        recorder
    }

    fn push(&self, note: Note) {
        self.notes.lock().unwrap().push(note);
    }

    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().unwrap().clone()
    }

    pub fn count(&self, wanted: &Note) -> usize {
        self.notes().iter().filter(|n| *n == wanted).count()
    }

    pub fn clear(&self) {
        self.notes.lock().unwrap().clear();
    }
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Gives spawned agent tasks a chance to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Agent that immediately submits a fixed move.
#[derive(Debug)]
pub struct Scripted {
    pub player: PlayerId,
    pub choice: MoveIndex,
    pub calls: AtomicUsize,
}

impl Scripted {
    pub fn new(player: u8, choice: MoveIndex) -> Arc<Self> {
        Arc::new(Self {
            player: PlayerId(player),
            choice,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent<Count> for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn player(&self) -> PlayerId {
        self.player
    }

    async fn propose_move(&self, handle: AgentHandle, _snapshot: Arc<Count>) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        handle.make_move(self.choice)?;
        Ok(())
    }
}

/// Agent that keeps the handles it is given so a test can answer late.
#[derive(Debug)]
pub struct Capturing {
    pub player: PlayerId,
    handles: Mutex<Vec<AgentHandle>>,
}

impl Capturing {
    pub fn new(player: u8) -> Arc<Self> {
        Arc::new(Self {
            player: PlayerId(player),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn handles(&self) -> Vec<AgentHandle> {
        self.handles.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent<Count> for Capturing {
    fn name(&self) -> &str {
        "capturing"
    }

    fn player(&self) -> PlayerId {
        self.player
    }

    async fn propose_move(&self, handle: AgentHandle, _snapshot: Arc<Count>) -> anyhow::Result<()> {
        self.handles.lock().unwrap().push(handle);
        Ok(())
    }
}

/// Agent that acknowledges a stop request from a parked computation.
#[derive(Debug)]
pub struct Stoppable {
    pub player: PlayerId,
    pub stops: AtomicUsize,
    cancel: Mutex<Option<oneshot::Sender<oneshot::Sender<()>>>>,
}

impl Stoppable {
    pub fn new(player: u8) -> Arc<Self> {
        Arc::new(Self {
            player: PlayerId(player),
            stops: AtomicUsize::new(0),
            cancel: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Agent<Count> for Stoppable {
    fn name(&self) -> &str {
        "stoppable"
    }

    fn player(&self) -> PlayerId {
        self.player
    }

    async fn propose_move(&self, handle: AgentHandle, _snapshot: Arc<Count>) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        *self.cancel.lock().unwrap() = Some(tx);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(30)) => {
                handle.make_move(A)?;
            }
            ack = rx => {
                if let Ok(ack) = ack {
                    let _ = ack.send(());
                }
            }
        }
        Ok(())
    }

    fn stop(&self) -> Option<StopAck> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let (ack_tx, ack_rx) = oneshot::channel();
        match self.cancel.lock().unwrap().take() {
            Some(cancel) => {
                if let Err(ack_tx) = cancel.send(ack_tx) {
                    let _ = ack_tx.send(());
                }
            }
            None => {
                let _ = ack_tx.send(());
            }
        }
        Some(ack_rx)
    }
}

/// Agent that answers after a delay and never acknowledges a stop request.
#[derive(Debug)]
pub struct Stubborn {
    pub player: PlayerId,
    pub choice: MoveIndex,
    pub delay: Duration,
    pub calls: AtomicUsize,
    unanswered: Mutex<Vec<oneshot::Sender<()>>>,
}

impl Stubborn {
    pub fn new(player: u8, choice: MoveIndex, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            player: PlayerId(player),
            choice,
            delay,
            calls: AtomicUsize::new(0),
            unanswered: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Agent<Count> for Stubborn {
    fn name(&self) -> &str {
        "stubborn"
    }

    fn player(&self) -> PlayerId {
        self.player
    }

    async fn propose_move(&self, handle: AgentHandle, _snapshot: Arc<Count>) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        handle.make_move(self.choice)?;
        Ok(())
    }

    fn stop(&self) -> Option<StopAck> {
        let (ack_tx, ack_rx) = oneshot::channel();
        // Held so the acknowledgement only ever times out.
        self.unanswered.lock().unwrap().push(ack_tx);
        Some(ack_rx)
    }
}

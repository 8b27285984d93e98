//! Game-run controller.
//!
//! The controller owns the current snapshot, the run state, the pending move
//! and the agent registry behind a single mutex. Every operation mutates that
//! tuple inside one critical section and records the notifications it
//! produced as effects. Effects join the outbox before that critical section
//! ends, so the outbox order is the order of the transitions. They are
//! delivered after the lock is released, in FIFO order, by whichever caller
//! is currently draining the queue. Observers may call back into the
//! controller, and notifications for one transition always finish before the
//! next player is scheduled.
//!
//! Lock order is core, then outbox.

use crate::agent::{Agent, AgentHandle, AgentRegistry, MoveSink, await_stop_acks};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineErrorKind, InvalidMoveError};
use crate::observers::Observers;
use crate::run_state::{Admission, RunState};
use crate::snapshot::{self, GameSnapshot, MoveIndex, PlayerId};
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

/// Maps a finished snapshot to the game's result type.
pub type ResultMapper<S, R> = Box<dyn Fn(&S) -> R + Send + Sync>;

enum Effect<S: GameSnapshot, R> {
    MoveMade(MoveIndex),
    BoardEvents(Vec<S::Event>),
    NextPlayer(PlayerId),
    GameOver(R),
    Undone,
    PauseMoveDelivered,
    UpdateAis(bool),
    InvokeAgent {
        agent: Arc<dyn Agent<S>>,
        snapshot: Arc<S>,
        ticket: u64,
    },
}

struct Core<S: GameSnapshot> {
    current: Arc<S>,
    run_state: RunState,
    pending: Option<MoveIndex>,
    agents: AgentRegistry<S>,
    // Bumped on every change of position or configuration.
    generation: u64,
    // Generation for which the active player was last scheduled.
    scheduled_for: Option<u64>,
    // Agent updates still waiting for the previous agents to stop.
    reconfiguring: u32,
}

struct Outbox<S: GameSnapshot, R> {
    queue: VecDeque<Effect<S, R>>,
    draining: bool,
}

struct Inner<S: GameSnapshot, R> {
    me: Weak<Inner<S, R>>,
    core: Mutex<Core<S>>,
    outbox: Mutex<Outbox<S, R>>,
    observers: Observers<S::Event, R>,
    result_mapper: ResultMapper<S, R>,
    runtime: Handle,
    config: EngineConfig,
}

/// Drives one game run from its start snapshot to completion.
///
/// Cloning a controller yields another handle to the same run.
pub struct Controller<S: GameSnapshot, R> {
    inner: Arc<Inner<S, R>>,
}

/// Defers runs while an agent update waits for the old agents to stop.
///
/// Dropping a held guard releases the deferral, so a cancelled update does
/// not block the controller.
struct ReconfigureHold<'a, S: GameSnapshot, R> {
    inner: &'a Inner<S, R>,
    held: bool,
}

impl<S: GameSnapshot, R> Drop for ReconfigureHold<'_, S, R> {
    fn drop(&mut self) {
        if self.held {
            let mut core = self.inner.core.lock().unwrap_or_else(PoisonError::into_inner);
            core.reconfiguring = core.reconfiguring.saturating_sub(1);
            debug!("Agent update abandoned, runs no longer deferred");
        }
    }
}

impl<S: GameSnapshot, R> Clone for Controller<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: GameSnapshot, R: Debug + Send + Sync + 'static> Debug for Controller<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.lock_core();
        f.debug_struct("Controller")
            .field("run_state", &core.run_state)
            .field("active_player", &core.current.active_player())
            .field("pending", &core.pending)
            .field("generation", &core.generation)
            .field("agents", &core.agents)
            .finish()
    }
}

impl<S: GameSnapshot, R: Debug + Send + Sync + 'static> Controller<S, R> {
    /// Creates a controller on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineErrorKind::NoRuntime`] when called outside a runtime.
    #[instrument(skip_all)]
    pub fn new(
        start: impl Into<Arc<S>>,
        agents: impl IntoIterator<Item = Arc<dyn Agent<S>>>,
        result_mapper: impl Fn(&S) -> R + Send + Sync + 'static,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let runtime =
            Handle::try_current().map_err(|_| EngineError::new(EngineErrorKind::NoRuntime))?;
        Ok(Self::with_runtime(
            start,
            agents,
            result_mapper,
            config,
            runtime,
        ))
    }

    /// Creates a controller whose agents run on `runtime`.
    #[instrument(skip_all)]
    pub fn with_runtime(
        start: impl Into<Arc<S>>,
        agents: impl IntoIterator<Item = Arc<dyn Agent<S>>>,
        result_mapper: impl Fn(&S) -> R + Send + Sync + 'static,
        config: EngineConfig,
        runtime: Handle,
    ) -> Self {
        let start = start.into();
        let agents = AgentRegistry::new(agents);
        info!(
            initial_state = %config.initial_state(),
            active_player = %start.active_player(),
            agents = ?agents,
            "Creating controller"
        );

        let inner = Arc::new_cyclic(|me| Inner {
            me: me.clone(),
            core: Mutex::new(Core {
                current: start,
                run_state: *config.initial_state(),
                pending: None,
                agents,
                generation: 0,
                scheduled_for: None,
                reconfiguring: 0,
            }),
            outbox: Mutex::new(Outbox {
                queue: VecDeque::new(),
                draining: false,
            }),
            observers: Observers::new(),
            result_mapper: Box::new(result_mapper),
            runtime,
            config,
        });

        Self { inner }
    }

    /// Notification channels of this run.
    pub fn observers(&self) -> &Observers<S::Event, R> {
        &self.inner.observers
    }

    /// Submits a move from outside the engine.
    ///
    /// While running the move is applied at once. While paused with preserve
    /// semantics it is buffered, replacing any earlier buffered move. While
    /// ignoring or after [`Controller::stop`] it is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineErrorKind::InvalidMove`] if the current snapshot does
    /// not allow `index`.
    pub fn make_move(&self, index: MoveIndex) -> Result<(), EngineError> {
        self.inner.submit(None, index)
    }

    /// Starts or resumes the run.
    ///
    /// A buffered move is applied first; otherwise the active player is
    /// scheduled. Does nothing once terminated, or when already running with
    /// the active player scheduled.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffered move is rejected by the rules engine.
    #[instrument(skip(self))]
    pub fn run(&self) -> Result<(), EngineError> {
        let mut effects = Vec::new();
        let mut core = self.inner.lock_core();
        self.inner.run_locked(&mut core, &mut effects)?;
        self.inner.commit(core, effects);
        Ok(())
    }

    /// Pauses a running controller, buffering the next submitted move.
    ///
    /// Agents receive a pause hint but keep computing.
    #[instrument(skip(self))]
    pub fn pause(&self) {
        let agents = {
            let mut core = self.inner.lock_core();
            if core.run_state != RunState::Running {
                debug!(run_state = %core.run_state, "Pause ignored, not running");
                return;
            }
            core.run_state = RunState::PausingPreserveNextMove;
            core.agents.clone()
        };
        agents.pause_all();
        info!("Controller paused");
    }

    /// Resumes after a pause without disturbing an agent that is still computing.
    ///
    /// When paused with no buffered move, flips back to running and only
    /// schedules if the position changed while paused. Otherwise behaves as
    /// [`Controller::run`].
    ///
    /// # Errors
    ///
    /// Returns an error if the buffered move is rejected by the rules engine.
    #[instrument(skip(self))]
    pub fn resume(&self) -> Result<(), EngineError> {
        let mut effects = Vec::new();
        let mut core = self.inner.lock_core();
        match core.run_state {
            RunState::Running | RunState::Terminated => {
                debug!(run_state = %core.run_state, "Continue has nothing to do");
            }
            _ if core.reconfiguring > 0 => {
                debug!("Agents are being replaced, continue deferred");
            }
            RunState::PausingPreserveNextMove if core.pending.is_none() => {
                core.run_state = RunState::Running;
                if core.scheduled_for != Some(core.generation) {
                    self.inner.schedule_locked(&mut core, &mut effects);
                }
                info!("Controller continued");
            }
            _ => {
                effects.push(Effect::UpdateAis(false));
                self.inner.run_locked(&mut core, &mut effects)?;
            }
        }
        self.inner.commit(core, effects);
        Ok(())
    }

    /// Applies the buffered move and stays paused.
    ///
    /// # Errors
    ///
    /// Returns [`EngineErrorKind::NothingToStep`] unless paused with preserve
    /// semantics and holding a buffered move.
    #[instrument(skip(self))]
    pub fn single_step(&self) -> Result<(), EngineError> {
        let mut effects = Vec::new();
        let mut core = self.inner.lock_core();
        let index = match (core.run_state, core.pending) {
            (RunState::PausingPreserveNextMove, Some(index)) => index,
            (state, _) => {
                return Err(EngineError::new(EngineErrorKind::NothingToStep(
                    state.to_string(),
                )));
            }
        };
        core.pending = None;
        self.inner.apply_locked(&mut core, index, &mut effects)?;
        info!(%index, "Single step applied");
        self.inner.commit(core, effects);
        Ok(())
    }

    /// Steps the timeline back one snapshot.
    ///
    /// Any buffered move is discarded and agents still computing for the
    /// abandoned position can no longer land their move. The run state is
    /// unchanged; call [`Controller::run`] to schedule the restored position.
    ///
    /// # Errors
    ///
    /// Returns [`EngineErrorKind::NoPreviousState`] on the start snapshot.
    #[instrument(skip(self))]
    pub fn undo(&self) -> Result<(), EngineError> {
        let mut core = self.inner.lock_core();
        let previous = core
            .current
            .previous()
            .cloned()
            .ok_or_else(|| EngineError::new(EngineErrorKind::NoPreviousState))?;
        core.current = previous;
        core.pending = None;
        core.generation += 1;
        info!(active_player = %core.current.active_player(), "Undone");
        self.inner
            .commit(core, vec![Effect::Undone, Effect::UpdateAis(true)]);
        Ok(())
    }

    /// Stops the run for good.
    ///
    /// Every stoppable agent is signalled and awaited up to the configured
    /// timeout. Moves arriving afterwards are dropped.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let agents = {
            let mut core = self.inner.lock_core();
            if core.run_state.is_terminated() {
                debug!("Already terminated");
                return;
            }
            core.run_state = RunState::Terminated;
            core.pending = None;
            core.generation += 1;
            core.agents.clone()
        };
        info!("Controller terminated");
        await_stop_acks(agents.stop_all(), self.inner.config.stop_timeout()).await;
    }

    /// Replaces the agent registry.
    ///
    /// Current agents are stopped and awaited first. Runs requested in the
    /// meantime are deferred. The controller is left ignoring moves until
    /// [`Controller::run`] or [`Controller::resume`] is called afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`EngineErrorKind::Terminated`] after [`Controller::stop`].
    #[instrument(skip_all)]
    pub async fn update_agents(
        &self,
        agents: impl IntoIterator<Item = Arc<dyn Agent<S>>>,
    ) -> Result<(), EngineError> {
        let previous = {
            let mut core = self.inner.lock_core();
            if core.run_state.is_terminated() {
                return Err(EngineError::new(EngineErrorKind::Terminated));
            }
            core.run_state = RunState::PausingIgnoreNextMove;
            core.pending = None;
            core.generation += 1;
            core.reconfiguring += 1;
            core.agents.clone()
        };
        let mut hold = ReconfigureHold {
            inner: &self.inner,
            held: true,
        };

        await_stop_acks(previous.stop_all(), self.inner.config.stop_timeout()).await;

        let registry = AgentRegistry::new(agents);
        let mut core = self.inner.lock_core();
        core.reconfiguring = core.reconfiguring.saturating_sub(1);
        hold.held = false;
        if core.run_state.is_terminated() {
            return Err(EngineError::new(EngineErrorKind::Terminated));
        }
        info!(agents = ?registry, "Agents updated");
        core.agents = registry;
        core.run_state = RunState::PausingIgnoreNextMove;
        core.pending = None;
        // Tickets handed out before the swap must not land.
        core.generation += 1;
        core.scheduled_for = None;
        Ok(())
    }

    /// Whether moves are being applied and the game is still going.
    pub fn is_running(&self) -> bool {
        let core = self.inner.lock_core();
        core.run_state == RunState::Running && core.current.is_running()
    }

    /// Whether the controller is in either pausing state.
    pub fn is_paused(&self) -> bool {
        self.inner.lock_core().run_state.is_paused()
    }

    /// Whether [`Controller::stop`] has been called.
    pub fn is_terminated(&self) -> bool {
        self.inner.lock_core().run_state.is_terminated()
    }

    /// Current run state.
    pub fn run_state(&self) -> RunState {
        self.inner.lock_core().run_state
    }

    /// Player to move in the current snapshot.
    pub fn active_player(&self) -> PlayerId {
        self.inner.lock_core().current.active_player()
    }

    /// Whether [`Controller::undo`] would succeed.
    pub fn is_undoable(&self) -> bool {
        self.inner.lock_core().current.previous().is_some()
    }

    /// The buffered move, if any.
    pub fn pending_move(&self) -> Option<MoveIndex> {
        self.inner.lock_core().pending
    }

    /// The current snapshot.
    pub fn current(&self) -> Arc<S> {
        Arc::clone(&self.inner.lock_core().current)
    }

    /// Snapshots from the start position up to the current one.
    pub fn history(&self) -> Vec<Arc<S>> {
        snapshot::history(&self.current())
    }

    /// Players driven by agents.
    pub fn agent_players(&self) -> Vec<PlayerId> {
        self.inner.lock_core().agents.players()
    }
}

impl<S: GameSnapshot, R: Debug + Send + Sync + 'static> Inner<S, R> {
    fn lock_core(&self) -> MutexGuard<'_, Core<S>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_outbox(&self) -> MutexGuard<'_, Outbox<S, R>> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_locked(
        &self,
        core: &mut Core<S>,
        effects: &mut Vec<Effect<S, R>>,
    ) -> Result<(), EngineError> {
        match core.run_state {
            RunState::Terminated => {
                warn!("Run ignored, controller terminated");
            }
            _ if core.reconfiguring > 0 => {
                debug!("Agents are being replaced, run deferred");
            }
            RunState::Running => {
                if core.scheduled_for == Some(core.generation) {
                    debug!("Already running");
                } else {
                    self.schedule_locked(core, effects);
                }
            }
            RunState::PausingPreserveNextMove => {
                core.run_state = RunState::Running;
                info!("Controller running");
                match core.pending.take() {
                    Some(index) => self.apply_locked(core, index, effects)?,
                    None => self.schedule_locked(core, effects),
                }
            }
            RunState::PausingIgnoreNextMove => {
                core.run_state = RunState::Running;
                core.pending = None;
                info!("Controller running");
                self.schedule_locked(core, effects);
            }
        }
        Ok(())
    }

    /// Applies `index` to the current snapshot. The only path that advances
    /// the timeline.
    fn apply_locked(
        &self,
        core: &mut Core<S>,
        index: MoveIndex,
        effects: &mut Vec<Effect<S, R>>,
    ) -> Result<(), EngineError> {
        if !core.current.is_legal(index) {
            let legal = core.current.legal_moves();
            warn!(%index, ?legal, "Rejected illegal move");
            return Err(InvalidMoveError::new(index, legal).into());
        }

        let mover = core.current.active_player();
        let next = Arc::clone(&core.current).apply(index)?;
        core.current = next;
        core.pending = None;
        core.generation += 1;

        debug!(%index, player = %mover, generation = core.generation, "Move applied");
        if *self.config.debug_mode() {
            debug!(snapshot = ?core.current, "Current snapshot");
        }

        effects.push(Effect::MoveMade(index));
        let events = core.current.board_events();
        if !events.is_empty() {
            effects.push(Effect::BoardEvents(events));
        }

        if core.current.is_running() {
            self.schedule_locked(core, effects);
        } else {
            let result = (self.result_mapper)(&core.current);
            info!(?result, "Game over");
            effects.push(Effect::GameOver(result));
        }
        Ok(())
    }

    /// Announces the active player and, for agent players, queues the agent.
    fn schedule_locked(&self, core: &mut Core<S>, effects: &mut Vec<Effect<S, R>>) {
        if !core.current.is_running() {
            debug!("Game finished, nothing to schedule");
            return;
        }

        let player = core.current.active_player();
        core.scheduled_for = Some(core.generation);
        effects.push(Effect::NextPlayer(player));

        match core.agents.get(player) {
            Some(agent) => {
                debug!(%player, agent = agent.name(), "Scheduling agent");
                effects.push(Effect::InvokeAgent {
                    agent,
                    snapshot: Arc::clone(&core.current),
                    ticket: core.generation,
                });
            }
            None => debug!(%player, "Waiting for external move"),
        }
    }

    /// Queues `effects` while `core` is still held, then releases it and
    /// delivers.
    fn commit(&self, core: MutexGuard<'_, Core<S>>, effects: Vec<Effect<S, R>>) {
        if !effects.is_empty() {
            self.lock_outbox().queue.extend(effects);
        }
        drop(core);
        self.drain();
    }

    fn drain(&self) {
        {
            let mut outbox = self.lock_outbox();
            if outbox.draining || outbox.queue.is_empty() {
                return;
            }
            outbox.draining = true;
        }

        loop {
            let effect = {
                let mut outbox = self.lock_outbox();
                match outbox.queue.pop_front() {
                    Some(effect) => effect,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };
            self.deliver(effect);
        }
    }

    fn deliver(&self, effect: Effect<S, R>) {
        let observers = &self.observers;
        match effect {
            Effect::MoveMade(index) => {
                observers.move_made().emit(&index);
            }
            Effect::BoardEvents(events) => {
                for event in &events {
                    observers.board_event().emit(event);
                }
            }
            Effect::NextPlayer(player) => {
                observers.next_player().emit(&player);
            }
            Effect::GameOver(result) => {
                observers.game_over().emit(&result);
            }
            Effect::Undone => {
                observers.undone().emit(&());
            }
            Effect::PauseMoveDelivered => {
                observers.pause_move_delivered().emit(&());
            }
            Effect::UpdateAis(force) => {
                observers.update_ais().emit(&force);
            }
            Effect::InvokeAgent {
                agent,
                snapshot,
                ticket,
            } => self.invoke_agent(agent, snapshot, ticket),
        }
    }

    fn invoke_agent(&self, agent: Arc<dyn Agent<S>>, snapshot: Arc<S>, ticket: u64) {
        {
            let core = self.lock_core();
            if core.generation != ticket || core.run_state.is_terminated() {
                debug!(
                    agent = agent.name(),
                    ticket,
                    generation = core.generation,
                    "Skipping stale agent invocation"
                );
                return;
            }
        }

        let sink: Weak<dyn MoveSink> = self.me.clone();
        let handle = AgentHandle::new(sink, ticket, snapshot.active_player());
        self.runtime.spawn(async move {
            debug!(agent = agent.name(), ticket, "Agent computing");
            if let Err(e) = agent.propose_move(handle, snapshot).await {
                warn!(agent = agent.name(), error = %e, "Agent failed to propose a move");
            }
        });
    }
}

impl<S: GameSnapshot, R: Debug + Send + Sync + 'static> MoveSink for Inner<S, R> {
    #[instrument(skip(self))]
    fn submit(&self, ticket: Option<u64>, index: MoveIndex) -> Result<(), EngineError> {
        let mut effects = Vec::new();
        let mut core = self.lock_core();

        if let Some(ticket) = ticket
            && ticket != core.generation
        {
            debug!(generation = core.generation, "Discarding move for a stale position");
            return Ok(());
        }

        match core.run_state.admission() {
            Admission::Discard => {
                debug!(run_state = %core.run_state, "Discarding move");
                return Ok(());
            }
            Admission::Buffer => {
                if !core.current.is_legal(index) {
                    let legal = core.current.legal_moves();
                    warn!(?legal, "Rejected illegal move while paused");
                    return Err(InvalidMoveError::new(index, legal).into());
                }
                if let Some(replaced) = core.pending.replace(index) {
                    debug!(%replaced, "Buffered move replaced");
                }
                info!("Move buffered while paused");
                effects.push(Effect::PauseMoveDelivered);
            }
            Admission::Apply => self.apply_locked(&mut core, index, &mut effects)?,
        }
        self.commit(core, effects);
        Ok(())
    }
}

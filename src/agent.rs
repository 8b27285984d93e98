//! Agent abstraction and registry.

use crate::error::EngineError;
use crate::snapshot::{GameSnapshot, MoveIndex, PlayerId};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

/// Acknowledgement an agent sends once it has stopped computing.
pub type StopAck = oneshot::Receiver<()>;

/// An autonomous participant that proposes moves for one player.
///
/// The controller calls [`Agent::propose_move`] on its own task whenever the
/// agent's player is to move. The agent submits its choice through the
/// [`AgentHandle`] it is given, the same way any external caller would.
#[async_trait::async_trait]
pub trait Agent<S: GameSnapshot>: Send + Sync {
    /// Display name for logs.
    fn name(&self) -> &str;

    /// The player this agent moves for.
    fn player(&self) -> PlayerId;

    /// Computes a move for `snapshot` and submits it through `handle`.
    async fn propose_move(&self, handle: AgentHandle, snapshot: Arc<S>) -> anyhow::Result<()>;

    /// Hint that the controller paused. Agents may slow down or keep going.
    fn pause(&self) {}

    /// Asks the agent to abandon its current computation.
    ///
    /// Agents that cannot be stopped return `None`. Stoppable agents return a
    /// receiver that resolves once the computation has wound down.
    fn stop(&self) -> Option<StopAck> {
        None
    }
}

/// Entry point that accepts moves on behalf of the controller.
pub(crate) trait MoveSink: Send + Sync {
    /// Submits a move. `ticket` is the timeline generation an agent was
    /// invoked for; `None` marks an external caller.
    fn submit(&self, ticket: Option<u64>, index: MoveIndex) -> Result<(), EngineError>;
}

/// Handle through which an agent submits its move.
///
/// The handle remembers which position the agent was asked about. Moves
/// submitted after the timeline has moved on are dropped.
#[derive(Clone)]
pub struct AgentHandle {
    sink: Weak<dyn MoveSink>,
    ticket: u64,
    player: PlayerId,
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("ticket", &self.ticket)
            .field("player", &self.player)
            .finish()
    }
}

impl AgentHandle {
    pub(crate) fn new(sink: Weak<dyn MoveSink>, ticket: u64, player: PlayerId) -> Self {
        Self {
            sink,
            ticket,
            player,
        }
    }

    /// Submits `index` as this agent's move.
    ///
    /// Moves for a stale position, or after the controller is gone, are
    /// silently dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the move is illegal in the position the agent was
    /// asked about.
    #[instrument(skip(self), fields(ticket = self.ticket, player = %self.player))]
    pub fn make_move(&self, index: MoveIndex) -> Result<(), EngineError> {
        match self.sink.upgrade() {
            Some(sink) => sink.submit(Some(self.ticket), index),
            None => {
                debug!("Controller dropped, discarding agent move");
                Ok(())
            }
        }
    }

    /// Timeline generation this handle was issued for.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Player the handle moves for.
    pub fn player(&self) -> PlayerId {
        self.player
    }
}

/// Mapping from player to the agent that moves for it.
///
/// Players without an agent are controlled from outside the engine.
pub struct AgentRegistry<S: GameSnapshot> {
    agents: HashMap<PlayerId, Arc<dyn Agent<S>>>,
}

impl<S: GameSnapshot> Clone for AgentRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            agents: self.agents.clone(),
        }
    }
}

impl<S: GameSnapshot> Default for AgentRegistry<S> {
    fn default() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }
}

impl<S: GameSnapshot> std::fmt::Debug for AgentRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (player, agent) in &self.agents {
            map.entry(player, &agent.name());
        }
        map.finish()
    }
}

impl<S: GameSnapshot> FromIterator<Arc<dyn Agent<S>>> for AgentRegistry<S> {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Agent<S>>>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<S: GameSnapshot> AgentRegistry<S> {
    /// Builds a registry keyed by each agent's player.
    ///
    /// A later agent for the same player replaces an earlier one.
    #[instrument(skip(agents))]
    pub fn new(agents: impl IntoIterator<Item = Arc<dyn Agent<S>>>) -> Self {
        let mut map: HashMap<PlayerId, Arc<dyn Agent<S>>> = HashMap::new();
        for agent in agents {
            let player = agent.player();
            if let Some(replaced) = map.insert(player, agent) {
                warn!(%player, replaced = replaced.name(), "Two agents for one player, keeping the later");
            }
        }
        debug!(count = map.len(), "Agent registry built");
        Self { agents: map }
    }

    /// Agent moving for `player`, if any.
    pub fn get(&self, player: PlayerId) -> Option<Arc<dyn Agent<S>>> {
        self.agents.get(&player).cloned()
    }

    /// Players driven by agents, sorted.
    pub fn players(&self) -> Vec<PlayerId> {
        let mut players: Vec<_> = self.agents.keys().copied().collect();
        players.sort();
        players
    }

    /// Sends the pause hint to every agent.
    pub(crate) fn pause_all(&self) {
        for agent in self.agents.values() {
            agent.pause();
        }
    }

    /// Signals every stoppable agent and collects their acknowledgements.
    pub(crate) fn stop_all(&self) -> Vec<(String, StopAck)> {
        self.agents
            .values()
            .filter_map(|agent| agent.stop().map(|ack| (agent.name().to_string(), ack)))
            .collect()
    }
}

/// Waits up to `timeout` for each acknowledgement and returns how many arrived.
#[instrument(skip(acks), fields(pending = acks.len()))]
pub(crate) async fn await_stop_acks(acks: Vec<(String, StopAck)>, timeout: Duration) -> usize {
    if acks.is_empty() {
        return 0;
    }

    let waits = acks.into_iter().map(|(name, ack)| async move {
        match tokio::time::timeout(timeout, ack).await {
            Ok(Ok(())) => {
                debug!(agent = %name, "Agent acknowledged stop");
                true
            }
            // Sender dropped: the agent has nothing left running.
            Ok(Err(_)) => {
                debug!(agent = %name, "Agent released stop channel");
                true
            }
            Err(_) => {
                warn!(agent = %name, timeout_ms = timeout.as_millis() as u64, "Agent did not acknowledge stop");
                false
            }
        }
    });

    let acknowledged = join_all(waits).await.into_iter().filter(|ok| *ok).count();
    info!(acknowledged, "Stop acknowledgements collected");
    acknowledged
}

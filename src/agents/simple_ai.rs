//! Simple AI player that needs no search.

use crate::agent::{Agent, AgentHandle, StopAck};
use crate::snapshot::{GameSnapshot, PlayerId};
use derive_new::new;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument};

struct Inflight {
    ticket: u64,
    cancel: oneshot::Sender<oneshot::Sender<()>>,
}

/// Simple AI that picks the first legal move after thinking for a while.
///
/// The thinking delay can be cut short with [`Agent::stop`], which the
/// agent acknowledges once it has abandoned the move.
#[derive(new)]
pub struct SimpleAi {
    #[new(into)]
    name: String,
    player: PlayerId,
    think_time: Duration,
    #[new(default)]
    inflight: Mutex<Option<Inflight>>,
}

impl std::fmt::Debug for SimpleAi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleAi")
            .field("name", &self.name)
            .field("player", &self.player)
            .field("think_time", &self.think_time)
            .finish()
    }
}

impl SimpleAi {
    /// Creates a simple AI with a half-second delay to simulate thinking.
    pub fn first_legal(name: impl Into<String>, player: PlayerId) -> Self {
        Self::new(name, player, Duration::from_millis(500))
    }

    fn inflight(&self) -> MutexGuard<'_, Option<Inflight>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, ticket: u64) {
        let mut inflight = self.inflight();
        if inflight.as_ref().is_some_and(|i| i.ticket == ticket) {
            *inflight = None;
        }
    }
}

#[async_trait::async_trait]
impl<S: GameSnapshot> Agent<S> for SimpleAi {
    fn name(&self) -> &str {
        &self.name
    }

    fn player(&self) -> PlayerId {
        self.player
    }

    #[instrument(skip(self, handle, snapshot), fields(ai = %self.name, ticket = handle.ticket()))]
    async fn propose_move(&self, handle: AgentHandle, snapshot: Arc<S>) -> anyhow::Result<()> {
        let ticket = handle.ticket();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let superseded = self.inflight().replace(Inflight {
            ticket,
            cancel: cancel_tx,
        });
        if let Some(old) = superseded {
            debug!(old_ticket = old.ticket, "Superseding earlier computation");
            let (ack, _) = oneshot::channel();
            let _ = old.cancel.send(ack);
        }

        tokio::select! {
            _ = tokio::time::sleep(self.think_time) => {
                self.finish(ticket);
                let Some(index) = snapshot.legal_moves().first().copied() else {
                    anyhow::bail!("No valid moves available");
                };
                debug!(%index, "AI chose move");
                handle.make_move(index)?;
                Ok(())
            }
            ack = cancel_rx => {
                debug!("AI stopped before moving");
                if let Ok(ack) = ack {
                    let _ = ack.send(());
                }
                Ok(())
            }
        }
    }

    fn pause(&self) {
        debug!(ai = %self.name, "Pause hint received, finishing current move");
    }

    fn stop(&self) -> Option<StopAck> {
        let (ack_tx, ack_rx) = oneshot::channel();
        match self.inflight().take() {
            Some(inflight) => {
                info!(ai = %self.name, ticket = inflight.ticket, "Stopping AI");
                // Receiver gone means the computation already finished.
                if let Err(ack_tx) = inflight.cancel.send(ack_tx) {
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

//! Observer registry that fans controller notifications out to subscribers.
//!
//! Every notification kind has its own [`Channel`]. Handlers run in
//! subscription order, outside any lock, and a handler that panics is logged
//! and skipped so the remaining handlers still see the notification.

use crate::snapshot::{MoveIndex, PlayerId};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, instrument, trace};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Token returned by [`Channel::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    channel: &'static str,
    id: u64,
}

impl Subscription {
    /// Name of the channel this token belongs to.
    pub fn channel(&self) -> &'static str {
        self.channel
    }
}

/// One independently subscribable notification channel.
pub struct Channel<T> {
    name: &'static str,
    next_id: AtomicU64,
    handlers: Mutex<BTreeMap<u64, Handler<T>>>,
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl<T> Channel<T> {
    /// Creates an empty channel.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(0),
            handlers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Channel name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn handlers(&self) -> MutexGuard<'_, BTreeMap<u64, Handler<T>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handler` and returns the token that removes it.
    #[instrument(skip(self, handler), fields(channel = self.name))]
    pub fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers().insert(id, Arc::new(handler));
        debug!(id, "Observer subscribed");
        Subscription {
            channel: self.name,
            id,
        }
    }

    /// Removes the handler behind `subscription`.
    ///
    /// Returns `false` if the token belongs to another channel or was
    /// already removed.
    #[instrument(skip(self), fields(channel = self.name))]
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        if subscription.channel != self.name {
            return false;
        }
        let removed = self.handlers().remove(&subscription.id).is_some();
        debug!(id = subscription.id, removed, "Observer unsubscribed");
        removed
    }

    /// Number of live subscriptions.
    pub fn observer_count(&self) -> usize {
        self.handlers().len()
    }

    /// Delivers `value` to every handler and returns how many completed.
    ///
    /// The handler list is copied before delivery, so handlers may subscribe,
    /// unsubscribe, or call back into the controller.
    pub fn emit(&self, value: &T) -> usize {
        let handlers: Vec<(u64, Handler<T>)> = self
            .handlers()
            .iter()
            .map(|(id, handler)| (*id, Arc::clone(handler)))
            .collect();

        trace!(channel = self.name, observers = handlers.len(), "Emitting");

        let mut delivered = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(value))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(
                        channel = self.name,
                        subscription = id,
                        panic = %panic_message(payload.as_ref()),
                        "Observer panicked"
                    );
                }
            }
        }
        delivered
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// All notification channels of a controller.
///
/// `E` is the board event payload, `R` the game result.
#[derive(Debug)]
pub struct Observers<E, R> {
    move_made: Channel<MoveIndex>,
    board_event: Channel<E>,
    next_player: Channel<PlayerId>,
    game_over: Channel<R>,
    undone: Channel<()>,
    pause_move_delivered: Channel<()>,
    update_ais: Channel<bool>,
}

impl<E, R> Default for Observers<E, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, R> Observers<E, R> {
    /// Creates a registry with no subscribers.
    pub fn new() -> Self {
        Self {
            move_made: Channel::new("move_made"),
            board_event: Channel::new("board_event"),
            next_player: Channel::new("next_player"),
            game_over: Channel::new("game_over"),
            undone: Channel::new("undone"),
            pause_move_delivered: Channel::new("pause_move_delivered"),
            update_ais: Channel::new("update_ais"),
        }
    }

    /// Fired with the move index after a move has been applied.
    pub fn move_made(&self) -> &Channel<MoveIndex> {
        &self.move_made
    }

    /// Fired once per board event of an applied move.
    pub fn board_event(&self) -> &Channel<E> {
        &self.board_event
    }

    /// Fired with the player whose turn begins.
    pub fn next_player(&self) -> &Channel<PlayerId> {
        &self.next_player
    }

    /// Fired with the mapped result when a move ends the game.
    pub fn game_over(&self) -> &Channel<R> {
        &self.game_over
    }

    /// Fired after each undo.
    pub fn undone(&self) -> &Channel<()> {
        &self.undone
    }

    /// Fired when a move was buffered while paused.
    pub fn pause_move_delivered(&self) -> &Channel<()> {
        &self.pause_move_delivered
    }

    /// Fired when agents should resynchronize; the flag forces a refresh.
    pub fn update_ais(&self) -> &Channel<bool> {
        &self.update_ais
    }
}

//! Snapshot contract that rules engines implement.
//!
//! A snapshot is one immutable game position. Each snapshot links to the
//! position it was produced from, so the chain of predecessors doubles as the
//! undo history. The controller never looks inside a snapshot beyond this
//! trait.

use crate::error::InvalidMoveError;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::instrument;

/// Identifies a seat at the table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize,
)]
pub struct PlayerId(pub u8);

/// Identifies one legal move of a position.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize,
)]
pub struct MoveIndex(pub usize);

/// An immutable game position supplied by a rules engine.
///
/// Implementations must be pure: [`GameSnapshot::apply`] never mutates
/// `self`, and the `previous` chain of every snapshot it returns ends at the
/// start position.
pub trait GameSnapshot: Debug + Send + Sync + Sized + 'static {
    /// Board event payload describing the sub-effects of the transition
    /// that produced this snapshot.
    type Event: Clone + Debug + Send + Sync + 'static;

    /// The player whose turn it is.
    fn active_player(&self) -> PlayerId;

    /// Whether the game is still in progress.
    fn is_running(&self) -> bool;

    /// The legal moves of this position, in a stable order.
    fn legal_moves(&self) -> Vec<MoveIndex>;

    /// The snapshot this one was produced from, if any.
    fn previous(&self) -> Option<&Arc<Self>>;

    /// Produces the successor position.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidMoveError`] if `index` is not among
    /// [`GameSnapshot::legal_moves`].
    fn apply(self: Arc<Self>, index: MoveIndex) -> Result<Arc<Self>, InvalidMoveError>;

    /// Board events for the transition that produced this snapshot.
    ///
    /// The start snapshot has no events.
    fn board_events(&self) -> Vec<Self::Event>;

    /// Whether `index` is a legal move here.
    fn is_legal(&self, index: MoveIndex) -> bool {
        self.legal_moves().contains(&index)
    }
}

/// Collects the timeline from the start snapshot up to and including `current`.
#[instrument(skip(current))]
pub fn history<S: GameSnapshot>(current: &Arc<S>) -> Vec<Arc<S>> {
    let mut chain = vec![Arc::clone(current)];
    let mut cursor = current.previous();
    while let Some(prev) = cursor {
        chain.push(Arc::clone(prev));
        cursor = prev.previous();
    }
    chain.reverse();
    chain
}

/// Applies `moves` in order starting from `start`.
///
/// # Errors
///
/// Returns the first [`InvalidMoveError`] raised by the rules engine.
#[instrument(skip(start))]
pub fn replay<S: GameSnapshot>(
    start: Arc<S>,
    moves: &[MoveIndex],
) -> Result<Arc<S>, InvalidMoveError> {
    moves.iter().try_fold(start, |state, index| state.apply(*index))
}

//! Tic-tac-toe positions as immutable snapshots.

use super::types::{Board, Mark, Outcome, Square};
use crate::board_event::BoardEvent;
use crate::error::InvalidMoveError;
use crate::snapshot::{GameSnapshot, MoveIndex, PlayerId};
use std::sync::Arc;
use tracing::instrument;

/// Board event emitted by tic-tac-toe: a mark placed on a square index.
pub type TicTacToeEvent = BoardEvent<usize, Mark>;

/// One tic-tac-toe position.
///
/// Move indices are square numbers 0-8 in row-major order.
#[derive(Clone)]
pub struct TicTacToe {
    board: Board,
    to_move: Mark,
    outcome: Outcome,
    last_move: Option<(usize, Mark)>,
    previous: Option<Arc<TicTacToe>>,
}

impl std::fmt::Debug for TicTacToe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicTacToe")
            .field("board", &self.board.display())
            .field("to_move", &self.to_move)
            .field("outcome", &self.outcome)
            .field("last_move", &self.last_move)
            .finish()
    }
}

impl PartialEq for TicTacToe {
    fn eq(&self, other: &Self) -> bool {
        self.board == other.board && self.to_move == other.to_move && self.outcome == other.outcome
    }
}

impl Eq for TicTacToe {}

impl Default for TicTacToe {
    fn default() -> Self {
        Self::new()
    }
}

impl TicTacToe {
    /// Creates the empty start position with X to move.
    #[instrument]
    pub fn new() -> Self {
        Self::starting_with(Mark::X)
    }

    /// Creates the empty start position with `first` to move.
    #[instrument]
    pub fn starting_with(first: Mark) -> Self {
        Self {
            board: Board::new(),
            to_move: first,
            outcome: Outcome::InProgress,
            last_move: None,
            previous: None,
        }
    }

    /// Returns the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Mark to move next.
    pub fn to_move(&self) -> Mark {
        self.to_move
    }

    /// Game result so far.
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Square and mark of the move that produced this position.
    pub fn last_move(&self) -> Option<(usize, Mark)> {
        self.last_move
    }
}

impl GameSnapshot for TicTacToe {
    type Event = TicTacToeEvent;

    fn active_player(&self) -> PlayerId {
        self.to_move.player_id()
    }

    fn is_running(&self) -> bool {
        self.outcome == Outcome::InProgress
    }

    fn legal_moves(&self) -> Vec<MoveIndex> {
        if !self.is_running() {
            return Vec::new();
        }
        self.board.empty_squares().into_iter().map(MoveIndex).collect()
    }

    fn previous(&self) -> Option<&Arc<Self>> {
        self.previous.as_ref()
    }

    #[instrument(skip(self), fields(player = %self.to_move))]
    fn apply(self: Arc<Self>, index: MoveIndex) -> Result<Arc<Self>, InvalidMoveError> {
        let MoveIndex(pos) = index;
        if !self.is_running() || !self.board.is_empty(pos) {
            return Err(InvalidMoveError::new(index, self.legal_moves()));
        }

        let mark = self.to_move;
        let board = self.board.with(pos, Square::Occupied(mark));
        let outcome = match board.winner() {
            Some(winner) => Outcome::Won(winner),
            None if board.is_full() => Outcome::Draw,
            None => Outcome::InProgress,
        };

        Ok(Arc::new(Self {
            board,
            to_move: mark.opponent(),
            outcome,
            last_move: Some((pos, mark)),
            previous: Some(self),
        }))
    }

    fn board_events(&self) -> Vec<Self::Event> {
        self.last_move
            .map(|(field, piece)| BoardEvent::Placed { field, piece })
            .into_iter()
            .collect()
    }
}

//! Engine error types.

use crate::snapshot::MoveIndex;
use derive_more::{Display, Error};
use tracing::instrument;

/// Rejection raised by a rules engine when asked to apply a move it does not sanction.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Move {} is not legal (legal moves: {:?})", index, legal)]
pub struct InvalidMoveError {
    /// The rejected move.
    pub index: MoveIndex,
    /// The moves the position actually allows.
    pub legal: Vec<MoveIndex>,
}

impl InvalidMoveError {
    /// Creates a new invalid move error.
    pub fn new(index: MoveIndex, legal: Vec<MoveIndex>) -> Self {
        Self { index, legal }
    }
}

/// Kinds of contract violations surfaced by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum EngineErrorKind {
    /// A move was submitted that the current snapshot does not allow.
    #[display("{}", _0)]
    InvalidMove(InvalidMoveError),

    /// Undo was requested on the start snapshot.
    #[display("Undo impossible: no previous state")]
    NoPreviousState,

    /// Single step was requested without a buffered move to apply.
    #[display("Nothing to step: controller is {} with no buffered move", _0)]
    NothingToStep(String),

    /// The controller has been stopped and cannot be reconfigured or restarted.
    #[display("Controller has been terminated")]
    Terminated,

    /// No tokio runtime was available to host agent tasks.
    #[display("No tokio runtime available for agent tasks")]
    NoRuntime,
}

/// Engine error with caller location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Engine error: {} at {}:{}", kind, file, line)]
pub struct EngineError {
    /// What went wrong.
    pub kind: EngineErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl EngineError {
    /// Creates a new engine error with caller location tracking.
    #[track_caller]
    #[instrument]
    pub fn new(kind: EngineErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> &EngineErrorKind {
        &self.kind
    }
}

impl From<InvalidMoveError> for EngineError {
    #[track_caller]
    fn from(err: InvalidMoveError) -> Self {
        Self::new(EngineErrorKind::InvalidMove(err))
    }
}

//! Run-state machine for the controller.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Whether the controller is advancing, paused, or finished.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    /// Submitted moves are applied immediately.
    Running,
    /// Submitted moves are buffered until the controller steps or resumes.
    PausingPreserveNextMove,
    /// Submitted moves are dropped until the controller is resumed.
    PausingIgnoreNextMove,
    /// The controller has stopped for good.
    Terminated,
}

/// What the pipeline does with a move submitted in a given run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Apply the move now.
    Apply,
    /// Keep the move as the pending move.
    Buffer,
    /// Drop the move silently.
    Discard,
}

impl RunState {
    /// Decides how a submitted move is treated in this state.
    pub(crate) fn admission(self) -> Admission {
        match self {
            Self::Running => Admission::Apply,
            Self::PausingPreserveNextMove => Admission::Buffer,
            Self::PausingIgnoreNextMove | Self::Terminated => Admission::Discard,
        }
    }

    /// Returns `true` for both pausing states.
    pub fn is_paused(self) -> bool {
        matches!(
            self,
            Self::PausingPreserveNextMove | Self::PausingIgnoreNextMove
        )
    }

    /// Returns `true` once the controller has been stopped.
    pub fn is_terminated(self) -> bool {
        self == Self::Terminated
    }

    /// Returns `true` if the state is a valid starting state.
    pub fn is_valid_start(self) -> bool {
        self.is_paused()
    }
}

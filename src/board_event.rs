//! Rendering-independent board events.

use serde::{Deserialize, Serialize};

/// A sub-effect of a move, described in board coordinates `C` with pieces `P`.
///
/// Rules engines may use this as their [`GameSnapshot::Event`] payload.
/// Movable-piece games report moves, captures and promotions; set-piece games
/// report placements.
///
/// [`GameSnapshot::Event`]: crate::GameSnapshot::Event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoardEvent<C, P> {
    /// A piece travelled from `start` to `dest`.
    Moved {
        /// Origin field.
        start: C,
        /// Destination field.
        dest: C,
    },
    /// The piece on `field` was removed.
    Destroyed {
        /// Emptied field.
        field: C,
    },
    /// The piece on `field` became `to`.
    Transformed {
        /// Affected field.
        field: C,
        /// The replacement piece.
        to: P,
    },
    /// `piece` was put onto the empty `field`.
    Placed {
        /// Filled field.
        field: C,
        /// The new piece.
        piece: P,
    },
}

impl<C, P> BoardEvent<C, P> {
    /// Fields whose rendering changes because of this event.
    pub fn touched_fields(&self) -> Vec<&C> {
        match self {
            Self::Moved { start, dest } => vec![start, dest],
            Self::Destroyed { field } | Self::Transformed { field, .. } | Self::Placed { field, .. } => {
                vec![field]
            }
        }
    }
}

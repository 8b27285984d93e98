//! Turn Engine library - rules-agnostic game-run controller
//!
//! This library drives turn-based board games from a start position to the
//! end, independent of the rules and of any rendering layer.
//!
//! # Architecture
//!
//! - **Snapshot**: immutable positions supplied by a rules engine
//! - **Controller**: run-state machine, move pipeline, agent scheduling, undo
//! - **Agents**: autonomous players that submit moves asynchronously
//! - **Observers**: independently subscribable notification channels
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use turn_engine::{Agent, Controller, EngineConfig, PlayerId, SimpleAi, TicTacToe};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let ai: Arc<dyn Agent<TicTacToe>> = Arc::new(SimpleAi::first_legal("Bot", PlayerId(2)));
//! let controller = Controller::new(
//!     TicTacToe::new(),
//!     [ai],
//!     |game: &TicTacToe| game.outcome(),
//!     EngineConfig::default(),
//! )?;
//!
//! controller.observers().game_over().subscribe(|outcome| println!("{outcome}"));
//! controller.run()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod agent;
mod agents;
mod board_event;
mod config;
mod controller;
mod error;
mod games;
mod observers;
mod run_state;
mod snapshot;

// Crate-level exports - Snapshot contract
pub use snapshot::{GameSnapshot, MoveIndex, PlayerId, history, replay};

// Crate-level exports - Board events
pub use board_event::BoardEvent;

// Crate-level exports - Controller
pub use controller::{Controller, ResultMapper};
pub use run_state::RunState;

// Crate-level exports - Agents
pub use agent::{Agent, AgentHandle, AgentRegistry, StopAck};
pub use agents::SimpleAi;

// Crate-level exports - Observers
pub use observers::{Channel, Observers, Subscription};

// Crate-level exports - Configuration and errors
pub use config::{ConfigError, EngineConfig};
pub use error::{EngineError, EngineErrorKind, InvalidMoveError};

// Crate-level exports - Reference rules engine (tic-tac-toe)
pub use games::tictactoe::{
    Board, Mark, Outcome, Square, TicTacToe, TicTacToeEvent,
};

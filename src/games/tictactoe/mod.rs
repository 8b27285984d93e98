//! Tic-tac-toe rules engine.

mod rules;
mod types;

pub use rules::{TicTacToe, TicTacToeEvent};
pub use types::{Board, Mark, Outcome, Square};

//! Reference rules engines.

pub mod tictactoe;

//! Command-line interface for turn_engine.

use clap::{Parser, Subcommand, ValueEnum};

/// Turn Engine - drive turn-based board games with pausable AI players
#[derive(Parser, Debug)]
#[command(name = "turn_engine")]
#[command(about = "Play or watch tic-tac-toe on the turn engine", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the engine configuration file
    #[arg(short, long, default_value = "turn_engine.toml", global = true)]
    pub config: std::path::PathBuf,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Who occupies a seat.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    /// Moves typed on the console.
    Human,
    /// The built-in simple AI.
    Ai,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play on the console
    Play {
        /// Who plays X
        #[arg(long, value_enum, default_value = "human")]
        x: Seat,

        /// Who plays O
        #[arg(long, value_enum, default_value = "ai")]
        o: Seat,

        /// AI thinking delay in milliseconds
        #[arg(long, default_value = "500")]
        think_ms: u64,

        /// Let O make the first move
        #[arg(long)]
        o_first: bool,
    },

    /// Watch two AIs play each other
    Watch {
        /// AI thinking delay in milliseconds
        #[arg(long, default_value = "200")]
        think_ms: u64,

        /// Print every notification as a JSON line
        #[arg(long)]
        json: bool,
    },
}

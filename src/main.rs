//! Turn Engine - console frontend
//!
//! Plays or watches tic-tac-toe driven by the game-run controller.

#![warn(missing_docs)]

mod cli;
mod console;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, Seat};
use console::Game;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;
use turn_engine::{Agent, EngineConfig, GameSnapshot, Mark, PlayerId, SimpleAi, TicTacToe};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Log to stderr so the board and JSON lines own stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,turn_engine=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::load_or_default(&cli.config)?;
    info!(?config, "Configuration loaded");

    match cli.command {
        Command::Play {
            x,
            o,
            think_ms,
            o_first,
        } => run_play(config, x, o, think_ms, o_first).await,
        Command::Watch { think_ms, json } => run_watch(config, think_ms, json).await,
    }
}

/// Builds the agent for a seat, or `None` for a human seat.
fn seat_agent(seat: Seat, mark: Mark, think: Duration) -> Option<Arc<dyn Agent<TicTacToe>>> {
    match seat {
        Seat::Human => None,
        Seat::Ai => {
            let ai: Arc<dyn Agent<TicTacToe>> = Arc::new(SimpleAi::new(
                format!("SimpleAI-{}", mark),
                mark.player_id(),
                think,
            ));
            Some(ai)
        }
    }
}

fn build_game(config: EngineConfig, start: TicTacToe, agents: Vec<Arc<dyn Agent<TicTacToe>>>) -> Result<Game> {
    let game = Game::new(start, agents, |g: &TicTacToe| g.outcome(), config)?;
    Ok(game)
}

/// Run an interactive game on the console
#[instrument]
async fn run_play(config: EngineConfig, x: Seat, o: Seat, think_ms: u64, o_first: bool) -> Result<()> {
    let think = Duration::from_millis(think_ms);
    let start = if o_first {
        TicTacToe::starting_with(Mark::O)
    } else {
        TicTacToe::new()
    };

    let humans: Vec<PlayerId> = [(x, Mark::X), (o, Mark::O)]
        .into_iter()
        .filter(|(seat, _)| *seat == Seat::Human)
        .map(|(_, mark)| mark.player_id())
        .collect();
    let agents: Vec<_> = [(x, Mark::X), (o, Mark::O)]
        .into_iter()
        .filter_map(|(seat, mark)| seat_agent(seat, mark, think))
        .collect();

    info!(first = %start.active_player(), ?humans, "Starting console game");
    let game = build_game(config, start, agents)?;
    console::play(game, humans).await
}

/// Run an AI-only game
#[instrument]
async fn run_watch(config: EngineConfig, think_ms: u64, json: bool) -> Result<()> {
    let think = Duration::from_millis(think_ms);
    let agents: Vec<_> = [Mark::X, Mark::O]
        .into_iter()
        .filter_map(|mark| seat_agent(Seat::Ai, mark, think))
        .collect();

    let game = build_game(config, TicTacToe::new(), agents)?;
    console::watch(game, json).await
}

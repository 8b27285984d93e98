//! Console frontend.
//!
//! Renders controller notifications as text and turns typed commands into
//! controller calls. Undoing back to the previous human turn and enabling
//! single steps once a paused move arrives both live here, on the observer
//! side of the controller.

use anyhow::Result;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use turn_engine::{
    BoardEvent, Controller, GameSnapshot, Mark, MoveIndex, Outcome, PlayerId, RunState, TicTacToe,
    TicTacToeEvent,
};

/// Controller type driven by the console.
pub type Game = Controller<TicTacToe, Outcome>;

/// A parsed console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Square(usize),
    Pause,
    Continue,
    Step,
    Undo,
    Quit,
    Unknown,
}

fn parse_input(line: &str) -> Input {
    match line.trim() {
        "p" | "pause" => Input::Pause,
        "c" | "continue" => Input::Continue,
        "s" | "step" => Input::Step,
        "u" | "undo" => Input::Undo,
        "q" | "quit" => Input::Quit,
        other => match other.parse::<usize>() {
            Ok(n) if (1..=9).contains(&n) => Input::Square(n - 1),
            _ => Input::Unknown,
        },
    }
}

fn seat_label(player: PlayerId) -> String {
    match Mark::from_player_id(player) {
        Some(mark) => format!("Player {} ({})", player, mark),
        None => format!("Player {}", player),
    }
}

/// Subscribes the text renderer and returns a receiver for the game result.
#[instrument(skip(game))]
pub fn attach_console(game: &Game, humans: Vec<PlayerId>) -> mpsc::UnboundedReceiver<Outcome> {
    let observers = game.observers();

    observers.board_event().subscribe(|event| {
        if let BoardEvent::Placed { field, piece } = event {
            println!("{} takes square {}", piece, field + 1);
        }
    });

    let view = game.clone();
    observers.next_player().subscribe(move |player| {
        if humans.contains(player) {
            println!("\n{}\n", view.current().board().display());
            println!("{}: it's your turn. Enter a square (1-9).", seat_label(*player));
        } else {
            println!("{} is planning the next move.", seat_label(*player));
        }
    });

    observers.pause_move_delivered().subscribe(|_| {
        println!("Move ready. Press 's' to step or 'c' to continue.");
    });

    let view = game.clone();
    observers.undone().subscribe(move |_| {
        debug!(active_player = %view.active_player(), "Undo rendered");
    });

    let (tx, rx) = mpsc::unbounded_channel();
    let view = game.clone();
    observers.game_over().subscribe(move |outcome| {
        println!("\n{}\n", view.current().board().display());
        println!("Game over: {}", outcome);
        if tx.send(*outcome).is_err() {
            warn!("Game over receiver dropped");
        }
    });

    rx
}

/// Prints every notification as a JSON line.
#[instrument(skip(game))]
pub fn attach_json_log(game: &Game) {
    let observers = game.observers();
    observers
        .move_made()
        .subscribe(|index| println!("{}", json!({ "event": "move_made", "index": index })));
    observers
        .board_event()
        .subscribe(|event| println!("{}", board_event_line(event)));
    observers
        .next_player()
        .subscribe(|player| println!("{}", json!({ "event": "next_player", "player": player })));
    observers
        .game_over()
        .subscribe(|outcome| println!("{}", json!({ "event": "game_over", "result": outcome })));
    observers
        .undone()
        .subscribe(|_| println!("{}", json!({ "event": "undone" })));
    observers
        .pause_move_delivered()
        .subscribe(|_| println!("{}", json!({ "event": "pause_move_delivered" })));
    observers
        .update_ais()
        .subscribe(|force| println!("{}", json!({ "event": "update_ais", "force": force })));
}

/// JSON line for one board event, listing the squares it redraws.
fn board_event_line(event: &TicTacToeEvent) -> serde_json::Value {
    json!({
        "event": "board_event",
        "payload": event,
        "fields": event.touched_fields(),
    })
}

/// Undoes until a human player is to move again.
///
/// Returns how many snapshots were rolled back.
#[instrument(skip(game))]
fn undo_to_human_turn(game: &Game, humans: &[PlayerId]) -> Result<usize> {
    let mut undone = 0;
    game.undo()?;
    undone += 1;
    while !humans.contains(&game.active_player()) && game.is_undoable() {
        game.undo()?;
        undone += 1;
    }

    if game.run_state() == RunState::Running {
        game.run()?;
    }
    Ok(undone)
}

/// Plays an interactive game on stdin/stdout.
#[instrument(skip(game))]
pub async fn play(game: Game, humans: Vec<PlayerId>) -> Result<()> {
    let mut game_over = attach_console(&game, humans.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Commands: 1-9 move, p pause, c continue, s step, u undo, q quit");
    game.run()?;

    loop {
        tokio::select! {
            outcome = game_over.recv() => {
                info!(?outcome, "Game finished");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                match parse_input(&line) {
                    Input::Square(square) => {
                        if !humans.contains(&game.active_player()) {
                            println!("Not your turn.");
                        } else if let Err(e) = game.make_move(MoveIndex(square)) {
                            println!("Illegal move: {}", e.kind());
                        }
                    }
                    Input::Pause => {
                        game.pause();
                        println!("Paused.");
                    }
                    Input::Continue => game.resume()?,
                    Input::Step => {
                        if let Err(e) = game.single_step() {
                            println!("{}", e.kind());
                        }
                    }
                    Input::Undo => match undo_to_human_turn(&game, &humans) {
                        Ok(count) => {
                            println!("Took back {} move(s).", count);
                            println!("\n{}\n", game.current().board().display());
                        }
                        Err(e) => println!("{}", e),
                    },
                    Input::Quit => break,
                    Input::Unknown => println!("Unknown command: {}", line.trim()),
                }
            }
        }
    }

    game.stop().await;
    Ok(())
}

/// Runs an AI-only game to completion.
#[instrument(skip(game))]
pub async fn watch(game: Game, json: bool) -> Result<()> {
    let mut game_over = if json {
        attach_json_log(&game);
        let (tx, rx) = mpsc::unbounded_channel();
        game.observers().game_over().subscribe(move |outcome| {
            let _ = tx.send(*outcome);
        });
        rx
    } else {
        attach_console(&game, Vec::new())
    };

    game.run()?;
    let outcome = game_over.recv().await;
    info!(?outcome, moves = game.history().len() - 1, "Match finished");
    debug!(finished = !game.current().is_running(), "Final snapshot");

    game.stop().await;
    Ok(())
}

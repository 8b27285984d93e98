//! Agent scheduling, stale moves, stop and agent replacement tests.

mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use turn_engine::{EngineConfig, EngineErrorKind, GameSnapshot, PlayerId, RunState};

#[tokio::test]
async fn agents_play_each_other_to_game_over() {
    let first = Scripted::new(1, B);
    let second = Scripted::new(2, A);
    let agents = vec![seat(&first), seat(&second)];
    let game = controller(6, agents);
    let notes = Recorder::attach(&game);

    game.run().unwrap();
    wait_until(|| notes.count(&Note::GameOver(3)) == 1).await;

    assert_eq!(game.current().moves, vec![B, A, B, A, B, A]);
    assert_eq!(game.history().len(), 7);
    assert_eq!(first.calls(), 3);
    assert_eq!(second.calls(), 3);
}

#[tokio::test]
async fn agent_answers_after_external_move() {
    let agent = Scripted::new(2, A);
    let game = controller(4, vec![seat(&agent)]);
    game.run().unwrap();
    assert_eq!(game.agent_players(), vec![PlayerId(2)]);

    game.make_move(B).unwrap();
    wait_until(|| game.current().moves.len() == 2).await;
    assert_eq!(game.current().moves, vec![B, A]);
    assert_eq!(game.active_player(), PlayerId(1));

    settle().await;
    assert_eq!(agent.calls(), 1, "human turns never invoke the agent");
}

#[tokio::test]
async fn move_for_an_undone_position_is_discarded() {
    let agent = Capturing::new(2);
    let game = controller(4, vec![seat(&agent)]);
    game.run().unwrap();
    game.make_move(A).unwrap();
    wait_until(|| agent.handles().len() == 1).await;

    game.undo().unwrap();
    let late = &agent.handles()[0];
    late.make_move(B).unwrap();

    assert!(game.current().moves.is_empty());
    assert_eq!(game.active_player(), PlayerId(1));
}

#[tokio::test]
async fn move_after_stop_is_discarded() {
    let agent = Capturing::new(2);
    let game = controller(4, vec![seat(&agent)]);
    game.run().unwrap();
    game.make_move(A).unwrap();
    wait_until(|| agent.handles().len() == 1).await;

    game.stop().await;
    agent.handles()[0].make_move(B).unwrap();
    assert_eq!(game.current().moves, vec![A]);
    assert_eq!(game.run_state(), RunState::Terminated);
}

#[tokio::test]
async fn agent_move_during_pause_is_buffered_until_resume() {
    let agent = Capturing::new(2);
    let game = controller(4, vec![seat(&agent)]);
    game.run().unwrap();
    game.make_move(A).unwrap();
    wait_until(|| agent.handles().len() == 1).await;

    game.pause();
    let notes = Recorder::attach(&game);
    agent.handles()[0].make_move(B).unwrap();
    assert_eq!(game.pending_move(), Some(B));
    assert_eq!(game.active_player(), PlayerId(2));
    assert_eq!(notes.notes(), vec![Note::PauseMoveDelivered]);

    game.resume().unwrap();
    assert_eq!(game.current().moves, vec![A, B]);
    assert_eq!(game.run_state(), RunState::Running);
}

#[tokio::test]
async fn stop_waits_for_acknowledgement_not_timeout() {
    let agent = Stoppable::new(2);
    let config = EngineConfig::default().with_stop_timeout_ms(10_000);
    let game = controller_with(4, vec![seat(&agent)], config);
    game.run().unwrap();
    game.make_move(A).unwrap();
    settle().await;

    let started = Instant::now();
    game.stop().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(agent.stops.load(Ordering::SeqCst), 1);
    assert_eq!(game.current().moves, vec![A]);
}

#[tokio::test]
async fn update_agents_blocks_moves_until_run() {
    let old = Capturing::new(2);
    let game = controller(4, vec![seat(&old)]);
    game.run().unwrap();
    game.make_move(A).unwrap();
    wait_until(|| old.handles().len() == 1).await;

    let replacement = Scripted::new(2, B);
    game.update_agents(vec![seat(&replacement)])
        .await
        .unwrap();
    assert_eq!(game.run_state(), RunState::PausingIgnoreNextMove);

    old.handles()[0].make_move(A).unwrap();
    game.make_move(B).unwrap();
    settle().await;
    assert_eq!(game.current().moves, vec![A]);
    assert_eq!(game.pending_move(), None);
    assert_eq!(replacement.calls(), 0);

    game.run().unwrap();
    wait_until(|| game.current().moves.len() == 2).await;
    assert_eq!(game.current().moves, vec![A, B]);
    assert_eq!(replacement.calls(), 1);
}

#[tokio::test]
async fn update_agents_stops_previous_agents() {
    let old = Stoppable::new(2);
    let game = controller(4, vec![seat(&old)]);
    game.run().unwrap();
    game.make_move(A).unwrap();
    settle().await;

    game.update_agents(Vec::new()).await.unwrap();
    assert_eq!(old.stops.load(Ordering::SeqCst), 1);
    assert!(game.agent_players().is_empty());

    game.resume().unwrap();
    game.make_move(B).unwrap();
    assert_eq!(game.current().moves, vec![A, B]);
    assert!(game.current().is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_during_agent_update_never_wakes_dismissed_agent() {
    let old = Stubborn::new(1, B, Duration::from_millis(150));
    let config = EngineConfig::default().with_stop_timeout_ms(100);
    let game = controller_with(4, vec![seat(&old)], config);

    let updating = game.clone();
    let update = tokio::spawn(async move { updating.update_agents(Vec::new()).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    game.run().unwrap();
    game.resume().unwrap();
    assert_eq!(game.run_state(), RunState::PausingIgnoreNextMove);

    update.await.unwrap().unwrap();
    assert!(game.agent_players().is_empty());
    assert_eq!(game.run_state(), RunState::PausingIgnoreNextMove);

    game.run().unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(game.current().moves.is_empty());
    assert_eq!(game.active_player(), PlayerId(1));
    assert_eq!(old.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dismissed_agent_scheduled_before_update_cannot_land() {
    let old = Stubborn::new(1, B, Duration::from_millis(80));
    let config = EngineConfig::default().with_stop_timeout_ms(20);
    let game = controller_with(4, vec![seat(&old)], config);
    game.run().unwrap();
    wait_until(|| old.calls.load(Ordering::SeqCst) == 1).await;

    let replacement = Capturing::new(2);
    game.update_agents(vec![seat(&replacement)]).await.unwrap();
    game.run().unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(game.current().moves.is_empty());
    game.make_move(A).unwrap();
    wait_until(|| replacement.handles().len() == 1).await;
    assert_eq!(game.current().moves, vec![A]);
}

#[tokio::test]
async fn cancelled_agent_update_releases_deferred_runs() {
    let old = Stubborn::new(2, A, Duration::from_secs(30));
    let config = EngineConfig::default().with_stop_timeout_ms(10_000);
    let game = controller_with(4, vec![seat(&old)], config);

    let cancelled =
        tokio::time::timeout(Duration::from_millis(20), game.update_agents(Vec::new())).await;
    assert!(cancelled.is_err());

    game.run().unwrap();
    assert_eq!(game.run_state(), RunState::Running);
    game.make_move(B).unwrap();
    assert_eq!(game.current().moves, vec![B]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_during_agent_update_wins() {
    let old = Stubborn::new(1, B, Duration::from_secs(30));
    let config = EngineConfig::default().with_stop_timeout_ms(200);
    let game = controller_with(4, vec![seat(&old)], config);

    let updating = game.clone();
    let update = tokio::spawn(async move { updating.update_agents(Vec::new()).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    game.stop().await;

    let err = update.await.unwrap().unwrap_err();
    assert_eq!(*err.kind(), EngineErrorKind::Terminated);
    assert_eq!(game.run_state(), RunState::Terminated);
}

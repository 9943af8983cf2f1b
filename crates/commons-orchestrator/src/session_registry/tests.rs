//! Registry tests driving real game actors on a paused tokio clock.
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use commons_dashboard::RunEvent;
use commons_game::{GamePhase, ROUND_COUNT};
use tokio::sync::broadcast::error::RecvError;

const UPDATE_WAIT: Duration = Duration::from_secs(120);

fn test_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.game.round_deadline = Duration::from_secs(2);
    config
}

fn registry_with(config: OrchestratorConfig) -> SessionRegistry {
    SessionRegistry::new(config).expect("valid config")
}

fn player(name: &str) -> PlayerId {
    PlayerId::from_raw(name)
}

fn group(prefix: &str) -> Vec<PlayerId> {
    (1..=4)
        .map(|index| player(&format!("{prefix}-{index}")))
        .collect()
}

fn join_group(registry: &SessionRegistry, run_id: &RunId, players: &[PlayerId]) -> GameId {
    let mut game_id = None;
    for (index, player_id) in players.iter().enumerate() {
        match registry
            .join_queue(run_id, player_id.clone())
            .expect("join queue")
        {
            JoinOutcome::Queued { position } => assert_eq!(position, index + 1),
            JoinOutcome::InGame { game_id: joined } => game_id = Some(joined),
        }
    }
    game_id.expect("last join forms a game")
}

async fn wait_for_update<F>(
    updates: &mut broadcast::Receiver<GameUpdate>,
    mut predicate: F,
) -> GameUpdate
where
    F: FnMut(&GameUpdate) -> bool,
{
    tokio::time::timeout(UPDATE_WAIT, async {
        loop {
            match updates.recv().await {
                Ok(update) if predicate(&update) => return update,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("game update channel closed"),
            }
        }
    })
    .await
    .expect("expected game update in time")
}

#[test]
fn unit_create_session_normalizes_code_and_issues_distinct_runs() {
    let registry = registry_with(test_config());
    let first = registry.create_session("test101").expect("create");
    let second = registry.create_session(" Test101 ").expect("create");
    assert_eq!(first.class_code, "TEST101");
    assert_eq!(second.class_code, "TEST101");
    assert_ne!(first.run_id, second.run_id);
    assert_ne!(first.dashboard_token, second.dashboard_token);

    let resolved = registry.resolve_class_code("test101").expect("resolve");
    assert_eq!(resolved.run_id, second.run_id);
    assert_eq!(registry.list_sessions().expect("list").len(), 2);
    assert_eq!(
        registry.session(&first.run_id).expect("first").class_code,
        "TEST101"
    );
}

#[test]
fn regression_invalid_class_codes_are_rejected() {
    let registry = registry_with(test_config());
    for raw in ["", "   ", "bad code", "x".repeat(40).as_str()] {
        assert!(matches!(
            registry.create_session(raw),
            Err(OrchestratorError::InvalidClassCode(_))
        ));
    }
    assert!(matches!(
        registry.resolve_class_code("NOPE"),
        Err(OrchestratorError::NotFound { .. })
    ));
}

#[test]
fn unit_resolve_dashboard_requires_matching_token() {
    let registry = registry_with(test_config());
    let session = registry.create_session("test101").expect("create");
    assert!(matches!(
        registry.resolve_dashboard(&session.run_id, "not-the-token"),
        Err(OrchestratorError::Unauthorized(_))
    ));
    assert!(matches!(
        registry.resolve_dashboard(&RunId::from_raw("missing"), session.dashboard_token.as_str()),
        Err(OrchestratorError::NotFound { .. })
    ));
    let dashboard = registry
        .resolve_dashboard(&session.run_id, session.dashboard_token.as_str())
        .expect("dashboard");
    let snapshot = dashboard.snapshot();
    assert_eq!(snapshot.class_code.as_deref(), Some("TEST101"));
    assert_eq!(snapshot.benchmark, 76);
    assert_eq!(snapshot.rounds.len(), 8);
}

#[tokio::test(start_paused = true)]
async fn functional_all_contribute_game_reaches_benchmark_without_auto_moves() {
    let registry = registry_with(test_config());
    let session = registry.create_session("test101").expect("create");
    let players = group("student");
    let game_id = join_group(&registry, &session.run_id, &players);

    for player_id in &players {
        assert_eq!(
            registry
                .player_status(&session.run_id, player_id)
                .expect("status"),
            PlayerStatus::InGame
        );
    }
    let dashboard = registry
        .resolve_dashboard(&session.run_id, session.dashboard_token.as_str())
        .expect("dashboard");
    assert_eq!(dashboard.snapshot().in_queue, 0);
    assert_eq!(dashboard.snapshot().active_games, 1);

    for round in 1..=ROUND_COUNT {
        for player_id in &players {
            registry
                .submit_move(&game_id, player_id, round, Decision::Contribute)
                .await
                .expect("move accepted");
        }
    }

    let view = registry.game_view(&game_id).expect("view");
    assert_eq!(view.phase, GamePhase::Completed);
    assert_eq!(view.score, Some(76));
    assert_eq!(view.benchmark, 76);

    let snapshot = dashboard.snapshot();
    assert_eq!(snapshot.completed, 1);
    assert_eq!(snapshot.active_games, 0);
    assert_eq!(snapshot.auto_moves, 0);
    assert_eq!(snapshot.average_score, Some(76));
    assert!(snapshot.rounds.iter().all(|tally| tally.contribute == 4));
    for player_id in &players {
        assert_eq!(
            registry
                .player_status(&session.run_id, player_id)
                .expect("status"),
            PlayerStatus::Completed
        );
    }
}

fn fold_through_terminal_event(dashboard: &DashboardHandle) -> RunAggregate {
    let entries = dashboard.events_since(0).expect("journal");
    let terminal = entries
        .iter()
        .position(|entry| {
            matches!(
                entry.event,
                RunEvent::GameCompleted { .. } | RunEvent::GameAbandoned { .. }
            )
        })
        .expect("terminal game event");
    RunAggregate::fold(entries[..=terminal].iter().map(|entry| &entry.event))
}

#[tokio::test(start_paused = true)]
async fn regression_finished_game_settles_players_in_the_same_append() {
    let registry = registry_with(test_config());
    let session = registry.create_session("test101").expect("create");
    let players = group("student");
    let game_id = join_group(&registry, &session.run_id, &players);
    let dashboard = registry
        .resolve_dashboard(&session.run_id, session.dashboard_token.as_str())
        .expect("dashboard");
    let mut snapshots = dashboard.subscribe();

    for round in 1..=ROUND_COUNT {
        for player_id in &players {
            registry
                .submit_move(&game_id, player_id, round, Decision::Contribute)
                .await
                .expect("move accepted");
        }
    }

    let through_completion = fold_through_terminal_event(&dashboard);
    assert_eq!(through_completion.completed, 1);
    assert_eq!(through_completion.active_games, 0);
    assert_eq!(through_completion.players_completed, 4);
    assert_eq!(through_completion.connected, 0);
    assert_eq!(through_completion.outcome_patterns(), vec![0, 0, 0, 0, 8]);
    assert_eq!(through_completion.players_completed, dashboard.snapshot().players_completed);

    let latest = snapshots.borrow_and_update().clone();
    assert_eq!(latest.players_completed, 4);
    assert_eq!(latest.connected, 0);
}

#[tokio::test(start_paused = true)]
async fn regression_abandoned_game_settles_players_in_the_same_append() {
    let registry = registry_with(test_config());
    let session = registry.create_session("test101").expect("create");
    let players = group("student");
    let game_id = join_group(&registry, &session.run_id, &players);
    let dashboard = registry
        .resolve_dashboard(&session.run_id, session.dashboard_token.as_str())
        .expect("dashboard");

    registry
        .submit_move(&game_id, &players[0], 1, Decision::Contribute)
        .await
        .expect("move accepted");
    registry
        .disconnect(&session.run_id, &players[1])
        .await
        .expect("disconnect");

    let through_abandonment = fold_through_terminal_event(&dashboard);
    assert_eq!(through_abandonment.abandoned, 1);
    assert_eq!(through_abandonment.players_abandoned, 4);
    assert_eq!(through_abandonment.connected, 0);
    assert_eq!(through_abandonment.active_games, 0);
}

#[tokio::test(start_paused = true)]
async fn functional_silent_player_receives_protect_auto_move() {
    let registry = registry_with(test_config());
    let session = registry.create_session("test101").expect("create");
    let players = group("student");
    let game_id = join_group(&registry, &session.run_id, &players);
    let (_, mut updates) = registry
        .subscribe_game(&game_id, &players[0])
        .expect("subscribe");

    for player_id in &players[..3] {
        registry
            .submit_move(&game_id, player_id, 1, Decision::Contribute)
            .await
            .expect("move accepted");
    }
    let resolved = wait_for_update(&mut updates, |update| {
        matches!(update, GameUpdate::RoundResolved { round: 1, .. })
    })
    .await;
    let GameUpdate::RoundResolved { moves, .. } = resolved else {
        panic!("expected round resolution");
    };
    assert_eq!(moves.len(), 4);
    let silent = moves
        .iter()
        .find(|recorded| recorded.player_id == players[3])
        .expect("silent player's move");
    assert!(silent.auto);
    assert_eq!(silent.decision, Decision::Protect);
    assert_eq!(moves.iter().filter(|recorded| recorded.auto).count(), 1);

    let snapshot = registry
        .resolve_dashboard(&session.run_id, session.dashboard_token.as_str())
        .expect("dashboard")
        .snapshot();
    assert_eq!(snapshot.auto_moves, 1);
    assert_eq!(snapshot.rounds[0].auto, 1);

    let error = registry
        .submit_move(&game_id, &players[3], 1, Decision::Contribute)
        .await
        .expect_err("late move");
    assert!(matches!(
        error,
        OrchestratorError::DuplicateMove { round: 1 } | OrchestratorError::StaleRound { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn regression_move_errors_are_reported_to_submitter() {
    let registry = registry_with(test_config());
    let session = registry.create_session("test101").expect("create");
    let players = group("student");
    let game_id = join_group(&registry, &session.run_id, &players);

    registry
        .submit_move(&game_id, &players[0], 1, Decision::Protect)
        .await
        .expect("first move");
    assert_eq!(
        registry
            .submit_move(&game_id, &players[0], 1, Decision::Contribute)
            .await,
        Err(OrchestratorError::DuplicateMove { round: 1 })
    );
    assert_eq!(
        registry
            .submit_move(&game_id, &players[1], 3, Decision::Contribute)
            .await,
        Err(OrchestratorError::StaleRound {
            submitted: 3,
            current: 1
        })
    );
    assert!(matches!(
        registry
            .submit_move(&game_id, &player("outsider"), 1, Decision::Contribute)
            .await,
        Err(OrchestratorError::Unauthorized(_))
    ));
    assert!(matches!(
        registry
            .submit_move(&GameId::from_raw("missing"), &players[0], 1, Decision::Contribute)
            .await,
        Err(OrchestratorError::NotFound { .. })
    ));
    let view = registry.game_view(&game_id).expect("view");
    assert_eq!(view.submitted, vec![players[0].clone()]);
}

#[tokio::test(start_paused = true)]
async fn functional_leaving_mid_game_abandons_every_seat() {
    let registry = registry_with(test_config());
    let session = registry.create_session("test101").expect("create");
    let players = group("student");
    let game_id = join_group(&registry, &session.run_id, &players);

    let status = registry
        .leave_queue(&session.run_id, &players[1])
        .await
        .expect("leave");
    assert_eq!(status, PlayerStatus::Abandoned);
    for player_id in &players {
        assert_eq!(
            registry
                .player_status(&session.run_id, player_id)
                .expect("status"),
            PlayerStatus::Abandoned
        );
    }
    assert_eq!(
        registry
            .submit_move(&game_id, &players[0], 1, Decision::Contribute)
            .await,
        Err(OrchestratorError::GameAbandoned)
    );
    let view = registry.game_view(&game_id).expect("view");
    assert_eq!(view.phase, GamePhase::Abandoned);
    assert!(view.abandon_reason.is_some());

    let snapshot = registry
        .resolve_dashboard(&session.run_id, session.dashboard_token.as_str())
        .expect("dashboard")
        .snapshot();
    assert_eq!(snapshot.abandoned, 1);
    assert_eq!(snapshot.active_games, 0);
    assert_eq!(snapshot.connected, 0);
    assert_eq!(snapshot.players_abandoned, 4);
}

#[tokio::test(start_paused = true)]
async fn functional_queue_leave_and_disconnect_statuses() {
    let registry = registry_with(test_config());
    let session = registry.create_session("test101").expect("create");
    let ada = player("ada");
    let bo = player("bo");
    registry.join_queue(&session.run_id, ada.clone()).expect("join");
    registry.join_queue(&session.run_id, bo.clone()).expect("join");

    assert_eq!(
        registry.leave_queue(&session.run_id, &ada).await,
        Ok(PlayerStatus::Connected)
    );
    assert_eq!(
        registry.join_queue(&session.run_id, ada.clone()),
        Ok(JoinOutcome::Queued { position: 2 })
    );
    assert_eq!(
        registry.disconnect(&session.run_id, &bo).await,
        Ok(PlayerStatus::Abandoned)
    );
    assert!(matches!(
        registry.join_queue(&session.run_id, bo.clone()),
        Err(OrchestratorError::PlayerFinished { .. })
    ));
    assert!(matches!(
        registry.leave_queue(&session.run_id, &player("ghost")).await,
        Err(OrchestratorError::NotFound { .. })
    ));

    let snapshot = registry
        .resolve_dashboard(&session.run_id, session.dashboard_token.as_str())
        .expect("dashboard")
        .snapshot();
    assert_eq!(snapshot.in_queue, 1);
    assert_eq!(snapshot.connected, 1);
}

#[tokio::test(start_paused = true)]
async fn functional_ready_handshake_starts_after_acknowledgements_or_timeout() {
    let mut config = test_config();
    config.game.require_ready_handshake = true;
    config.game.ready_timeout = Duration::from_secs(5);
    let registry = registry_with(config);
    let session = registry.create_session("test101").expect("create");

    let players = group("ready");
    let game_id = join_group(&registry, &session.run_id, &players);
    assert_eq!(
        registry.game_view(&game_id).expect("view").phase,
        GamePhase::Forming
    );
    for player_id in &players {
        registry.ready(&game_id, player_id).await.expect("ready");
    }
    let view = registry.game_view(&game_id).expect("view");
    assert_eq!(view.phase, GamePhase::RoundActive);
    assert_eq!(view.round, 1);
    assert_eq!(view.ready.len(), 4);

    let stragglers = group("slow");
    let slow_game = join_group(&registry, &session.run_id, &stragglers);
    let (_, mut updates) = registry
        .subscribe_game(&slow_game, &stragglers[0])
        .expect("subscribe");
    registry
        .ready(&slow_game, &stragglers[0])
        .await
        .expect("ready");
    wait_for_update(&mut updates, |update| {
        matches!(update, GameUpdate::RoundStarted { round: 1, .. })
    })
    .await;
    assert_eq!(
        registry.game_view(&slow_game).expect("view").phase,
        GamePhase::RoundActive
    );
}

#[tokio::test(start_paused = true)]
async fn functional_results_pause_holds_resolved_round() {
    let mut config = test_config();
    config.game.results_pause = Duration::from_secs(3);
    let registry = registry_with(config);
    let session = registry.create_session("test101").expect("create");
    let players = group("student");
    let game_id = join_group(&registry, &session.run_id, &players);
    let (_, mut updates) = registry
        .subscribe_game(&game_id, &players[0])
        .expect("subscribe");

    for player_id in &players {
        registry
            .submit_move(&game_id, player_id, 1, Decision::Protect)
            .await
            .expect("move");
    }
    let view = registry.game_view(&game_id).expect("view");
    assert_eq!(view.phase, GamePhase::RoundResolved);
    assert_eq!(view.totals[0].total, 2);
    assert!(matches!(
        registry
            .submit_move(&game_id, &players[0], 2, Decision::Protect)
            .await,
        Err(OrchestratorError::StaleRound { .. })
    ));

    wait_for_update(&mut updates, |update| {
        matches!(update, GameUpdate::RoundStarted { round: 2, .. })
    })
    .await;
    assert_eq!(registry.game_view(&game_id).expect("view").round, 2);
}

#[tokio::test(start_paused = true)]
async fn functional_shutdown_abandons_running_games() {
    let registry = registry_with(test_config());
    let session = registry.create_session("test101").expect("create");
    let players = group("student");
    let game_id = join_group(&registry, &session.run_id, &players);
    let (_, mut updates) = registry
        .subscribe_game(&game_id, &players[0])
        .expect("subscribe");

    registry.shutdown().expect("shutdown");
    let update = wait_for_update(&mut updates, |update| {
        matches!(update, GameUpdate::GameAbandoned { .. })
    })
    .await;
    assert_eq!(
        update,
        GameUpdate::GameAbandoned {
            reason: commons_game::AbandonReason::Shutdown
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn integration_concurrent_joins_never_double_assign() {
    let registry = Arc::new(registry_with(OrchestratorConfig::default()));
    let session = registry.create_session("rush").expect("create");

    let mut joins = Vec::new();
    for index in 0..40 {
        let registry = Arc::clone(&registry);
        let run_id = session.run_id.clone();
        joins.push(tokio::spawn(async move {
            registry.join_queue(&run_id, player(&format!("student-{index}")))
        }));
    }
    let mut game_ids = HashSet::new();
    for join in joins {
        if let JoinOutcome::InGame { game_id } = join.await.expect("task").expect("join") {
            game_ids.insert(game_id);
        }
    }
    assert_eq!(game_ids.len(), 10);

    let mut seated = HashSet::new();
    for game_id in &game_ids {
        let handle = registry.game(game_id).expect("game");
        assert_eq!(handle.players().len(), 4);
        for player_id in handle.players() {
            assert!(seated.insert(player_id.clone()), "player seated twice");
        }
    }
    assert_eq!(seated.len(), 40);

    let snapshot = registry
        .resolve_dashboard(&session.run_id, session.dashboard_token.as_str())
        .expect("dashboard")
        .snapshot();
    assert_eq!(snapshot.active_games, 10);
    assert_eq!(snapshot.in_queue, 0);
    assert_eq!(snapshot.connected, 40);
    registry.shutdown().expect("shutdown");
}

use std::time::Duration;

use commons_core::{GameId, PlayerId, RunId};
use commons_dashboard::{GameRowStatus, RunEvent};
use commons_game::{Decision, GamePhase, GameView, PlayerStatus, ROUND_COUNT};
use commons_orchestrator::{
    GameUpdate, JoinOutcome, OrchestratorConfig, SessionRegistry,
};
use tokio::sync::broadcast::error::RecvError;

const WAIT: Duration = Duration::from_secs(120);

fn registry() -> SessionRegistry {
    let mut config = OrchestratorConfig::default();
    config.game.round_deadline = Duration::from_secs(2);
    SessionRegistry::new(config).expect("valid config")
}

fn students(prefix: &str) -> Vec<PlayerId> {
    (1..=4)
        .map(|index| PlayerId::from_raw(format!("{prefix}-{index}")))
        .collect()
}

fn seat_everyone(registry: &SessionRegistry, run_id: &RunId, players: &[PlayerId]) -> GameId {
    let mut formed = None;
    for player_id in players {
        if let JoinOutcome::InGame { game_id } = registry
            .join_queue(run_id, player_id.clone())
            .expect("join queue")
        {
            formed = Some(game_id);
        }
    }
    formed.expect("a full group forms a game")
}

async fn wait_for_view<F>(registry: &SessionRegistry, game_id: &GameId, predicate: F) -> GameView
where
    F: Fn(&GameView) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let view = registry.game_view(game_id).expect("game view");
            if predicate(&view) {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("game should reach expected view")
}

#[tokio::test(start_paused = true)]
async fn integration_classroom_run_all_contribute_matches_benchmark() {
    let registry = registry();
    let session = registry.create_session("test101").expect("create session");
    assert_eq!(session.class_code, "TEST101");

    let players = students("alice");
    let game_id = seat_everyone(&registry, &session.run_id, &players);
    for player_id in &players {
        assert_eq!(
            registry
                .player_status(&session.run_id, player_id)
                .expect("status"),
            PlayerStatus::InGame
        );
    }

    for round in 1..=ROUND_COUNT {
        wait_for_view(&registry, &game_id, |view| {
            view.round == round && view.phase == GamePhase::RoundActive
        })
        .await;
        for player_id in &players {
            registry
                .submit_move(&game_id, player_id, round, Decision::Contribute)
                .await
                .expect("move accepted");
        }
    }

    let view = wait_for_view(&registry, &game_id, |view| view.phase == GamePhase::Completed).await;
    assert_eq!(view.score, Some(76));
    assert!(view.totals.iter().all(|total| total.total == 76));

    let dashboard = registry
        .resolve_dashboard(&session.run_id, session.dashboard_token.as_str())
        .expect("dashboard access");
    let snapshot = dashboard.snapshot();
    assert_eq!(snapshot.benchmark, 76);
    assert_eq!(snapshot.auto_moves, 0);
    assert_eq!(snapshot.total_moves, 32);
    assert_eq!(snapshot.completed, 1);
    assert_eq!(snapshot.average_score, Some(76));
    assert_eq!(snapshot.players_completed, 4);
    assert_eq!(snapshot.connected, 0);
    assert_eq!(snapshot.outcome_patterns(), vec![0, 0, 0, 0, 8]);
    assert_eq!(snapshot.games.len(), 1);
    assert_eq!(snapshot.games[0].status, GameRowStatus::Completed);

    let events = dashboard.events_since(0).expect("journal events");
    assert!(matches!(
        events.first().map(|entry| &entry.event),
        Some(RunEvent::RunOpened { .. })
    ));
    let moves = events
        .iter()
        .filter(|entry| matches!(entry.event, RunEvent::MoveRecorded { .. }))
        .count();
    assert_eq!(moves, 32);

    for player_id in &players {
        assert_eq!(
            registry
                .player_status(&session.run_id, player_id)
                .expect("status"),
            PlayerStatus::Completed
        );
    }
}

#[tokio::test(start_paused = true)]
async fn integration_classroom_run_silent_player_is_auto_protected() {
    let registry = registry();
    let session = registry.create_session("test101").expect("create session");
    let players = students("bob");
    let game_id = seat_everyone(&registry, &session.run_id, &players);
    let (_, mut updates) = registry
        .subscribe_game(&game_id, &players[0])
        .expect("subscribe");

    wait_for_view(&registry, &game_id, |view| {
        view.round == 1 && view.phase == GamePhase::RoundActive
    })
    .await;
    for player_id in &players[..3] {
        registry
            .submit_move(&game_id, player_id, 1, Decision::Contribute)
            .await
            .expect("move accepted");
    }

    let resolved = tokio::time::timeout(WAIT, async {
        loop {
            match updates.recv().await {
                Ok(update @ GameUpdate::RoundResolved { round: 1, .. }) => return update,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("game update channel closed"),
            }
        }
    })
    .await
    .expect("round 1 resolves at its deadline");

    let GameUpdate::RoundResolved { moves, payoffs, .. } = resolved else {
        unreachable!("filtered above");
    };
    assert_eq!(moves.len(), 4);
    let silent = moves
        .iter()
        .find(|recorded| recorded.player_id == players[3])
        .expect("silent player has a move");
    assert!(silent.auto);
    assert_eq!(silent.decision, Decision::Protect);
    assert_eq!(moves.iter().filter(|recorded| recorded.auto).count(), 1);
    assert_eq!(payoffs.payoffs, vec![3, 3, 3, 5]);

    let dashboard = registry
        .resolve_dashboard(&session.run_id, session.dashboard_token.as_str())
        .expect("dashboard access");
    let snapshot = dashboard.snapshot();
    assert_eq!(snapshot.auto_moves, 1);
    assert_eq!(snapshot.rounds[0].auto, 1);
    assert_eq!(snapshot.rounds[0].protect, 1);
    assert_eq!(snapshot.rounds[0].contribute, 3);
    assert_eq!(snapshot.rounds[0].outcome_patterns, vec![0, 0, 0, 1, 0]);
    assert_eq!(snapshot.active_games, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn integration_classroom_runs_stay_isolated() {
    let registry = registry();
    let first = registry.create_session("period1").expect("first run");
    let second = registry.create_session("period2").expect("second run");

    for player_id in students("shared").into_iter().take(3) {
        registry
            .join_queue(&first.run_id, player_id)
            .expect("join first run");
    }
    let game_id = seat_everyone(&registry, &second.run_id, &students("shared"));

    let first_snapshot = registry
        .resolve_dashboard(&first.run_id, first.dashboard_token.as_str())
        .expect("first dashboard")
        .snapshot();
    assert_eq!(first_snapshot.in_queue, 3);
    assert_eq!(first_snapshot.active_games, 0);

    let second_snapshot = registry
        .resolve_dashboard(&second.run_id, second.dashboard_token.as_str())
        .expect("second dashboard")
        .snapshot();
    assert_eq!(second_snapshot.in_queue, 0);
    assert_eq!(second_snapshot.active_games, 1);
    assert_eq!(
        serde_json::to_value(&*second_snapshot).expect("serialize")["activeGames"],
        1
    );

    assert!(registry
        .resolve_dashboard(&first.run_id, second.dashboard_token.as_str())
        .is_err());
    assert_eq!(
        registry.game(&game_id).expect("game").run_id(),
        &second.run_id
    );
    registry.shutdown().expect("shutdown");
}

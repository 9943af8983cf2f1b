//! Single-owner async driver for one game.
//!
//! The actor task owns the [`GameState`]; commands arrive over an mpsc
//! channel and the only timed wakeup is the pending deadline armed in the
//! `select!` loop. Because commands and timer fires are serialized here, the
//! round gate decides which of a late move and a deadline wins.

use std::collections::VecDeque;
use std::sync::Arc;

use commons_core::{current_unix_timestamp_ms, deadline_unix_ms, GameId, PlayerId, RunId};
use commons_dashboard::RunEvent;
use commons_game::{
    AbandonReason, Decision, GamePhase, GameState, GameTransition, GameView, Move, MoveRejection,
    PlayerStatus, PlayerTotal, RoundPayoffs,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::error::OrchestratorError;
use crate::run_context::RunContext;

const GAME_COMMAND_BUFFER: usize = 64;
const GAME_UPDATE_BUFFER: usize = 128;

/// Push notification for the players of one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameUpdate {
    Snapshot {
        view: GameView,
    },
    #[serde(rename_all = "camelCase")]
    RoundStarted {
        round: u8,
        multiplier: u32,
        deadline_unix_ms: u64,
    },
    /// Decisions stay hidden until the round resolves.
    #[serde(rename_all = "camelCase")]
    PlayerSubmitted {
        round: u8,
        player_id: PlayerId,
        auto: bool,
    },
    RoundResolved {
        round: u8,
        moves: Vec<Move>,
        payoffs: RoundPayoffs,
        totals: Vec<PlayerTotal>,
    },
    GameCompleted {
        totals: Vec<PlayerTotal>,
        score: i64,
        benchmark: i64,
    },
    GameAbandoned {
        reason: AbandonReason,
    },
}

#[derive(Debug)]
pub(crate) enum GameCommand {
    SubmitMove {
        player_id: PlayerId,
        round: u8,
        decision: Decision,
        reply: oneshot::Sender<Result<(), MoveRejection>>,
    },
    Ready {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<(), MoveRejection>>,
    },
    Depart {
        player_id: PlayerId,
        disconnected: bool,
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Cloneable reference to a running (or archived) game.
#[derive(Debug, Clone)]
pub struct GameHandle {
    game_id: GameId,
    run_id: RunId,
    players: Vec<PlayerId>,
    commands: mpsc::Sender<GameCommand>,
    updates: broadcast::Sender<GameUpdate>,
    view: watch::Receiver<GameView>,
}

impl GameHandle {
    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    pub fn is_seated(&self, player_id: &PlayerId) -> bool {
        self.players.contains(player_id)
    }

    /// Latest view published by the actor. Stays readable after the game ends.
    pub fn view(&self) -> GameView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameUpdate> {
        self.updates.subscribe()
    }

    pub(crate) async fn submit_move(
        &self,
        player_id: PlayerId,
        round: u8,
        decision: Decision,
    ) -> Result<(), OrchestratorError> {
        let (reply, response) = oneshot::channel();
        let command = GameCommand::SubmitMove {
            player_id,
            round,
            decision,
            reply,
        };
        if self.commands.send(command).await.is_err() {
            return Err(self.closed_error(round));
        }
        match response.await {
            Ok(result) => result.map_err(OrchestratorError::from),
            Err(_) => Err(self.closed_error(round)),
        }
    }

    pub(crate) async fn ready(&self, player_id: PlayerId) -> Result<(), OrchestratorError> {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(GameCommand::Ready { player_id, reply })
            .await
            .is_err()
        {
            return Err(self.closed_error(0));
        }
        match response.await {
            Ok(result) => result.map_err(OrchestratorError::from),
            Err(_) => Err(self.closed_error(0)),
        }
    }

    /// Abandons the game on behalf of a leaving or disconnected player.
    /// Returns once the actor has settled every seat, or immediately if the game already ended.
    pub(crate) async fn depart(&self, player_id: PlayerId, disconnected: bool) {
        let (reply, response) = oneshot::channel();
        let command = GameCommand::Depart {
            player_id,
            disconnected,
            reply,
        };
        if self.commands.send(command).await.is_ok() {
            let _ = response.await;
        }
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.commands.try_send(GameCommand::Shutdown);
    }

    fn closed_error(&self, round: u8) -> OrchestratorError {
        let view = self.view();
        match view.phase {
            GamePhase::Abandoned => OrchestratorError::GameAbandoned,
            GamePhase::Completed => OrchestratorError::StaleRound {
                submitted: round,
                current: view.round,
            },
            _ => OrchestratorError::ActorUnavailable {
                game_id: self.game_id.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ActorTimer {
    ReadyTimeout { at: Instant },
    RoundDeadline { round: u8, at: Instant },
    ResultsPause { at: Instant },
}

impl ActorTimer {
    fn at(self) -> Instant {
        match self {
            Self::ReadyTimeout { at } | Self::RoundDeadline { at, .. } | Self::ResultsPause { at } => {
                at
            }
        }
    }
}

struct GameActor {
    state: GameState,
    run: Arc<RunContext>,
    updates: broadcast::Sender<GameUpdate>,
    view: watch::Sender<GameView>,
    timer: Option<ActorTimer>,
}

/// Spawns the actor for a freshly formed game.
///
/// `initial` holds the transitions produced by [`GameState::form`].
pub(crate) fn spawn_game_actor(
    state: GameState,
    initial: Vec<GameTransition>,
    run: Arc<RunContext>,
) -> GameHandle {
    let (commands, command_rx) = mpsc::channel(GAME_COMMAND_BUFFER);
    let (updates, _) = broadcast::channel(GAME_UPDATE_BUFFER);
    let (view_tx, view_rx) = watch::channel(state.view());
    let handle = GameHandle {
        game_id: state.game_id().clone(),
        run_id: state.run_id().clone(),
        players: state.players().to_vec(),
        commands,
        updates: updates.clone(),
        view: view_rx,
    };
    let actor = GameActor {
        state,
        run,
        updates,
        view: view_tx,
        timer: None,
    };
    tokio::spawn(actor.run(command_rx, initial));
    handle
}

async fn wait_until(wake: Option<Instant>) {
    match wake {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

impl GameActor {
    async fn run(mut self, mut commands: mpsc::Receiver<GameCommand>, initial: Vec<GameTransition>) {
        if self.state.phase() == GamePhase::Forming {
            self.timer = Some(ActorTimer::ReadyTimeout {
                at: Instant::now() + self.run.game_config.ready_timeout,
            });
        }
        self.publish(initial);

        while !self.state.is_terminal() {
            let wake = self.timer.map(ActorTimer::at);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        let transitions = self.state.abandon(AbandonReason::Shutdown);
                        self.publish(transitions);
                    }
                },
                () = wait_until(wake) => self.fire_timer(),
            }
        }

        tracing::debug!(
            game_id = %self.state.game_id(),
            phase = ?self.state.phase(),
            "game actor stopped"
        );
    }

    fn handle_command(&mut self, command: GameCommand) {
        match command {
            GameCommand::SubmitMove {
                player_id,
                round,
                decision,
                reply,
            } => {
                let result = match self.state.submit_move(&player_id, round, decision) {
                    Ok(transitions) => {
                        self.publish(transitions);
                        Ok(())
                    }
                    Err(rejection) => {
                        tracing::debug!(
                            game_id = %self.state.game_id(),
                            player_id = %player_id,
                            round,
                            code = rejection.code(),
                            "move rejected"
                        );
                        Err(rejection)
                    }
                };
                let _ = reply.send(result);
            }
            GameCommand::Ready { player_id, reply } => {
                let result = self
                    .state
                    .acknowledge_ready(&player_id)
                    .map(|transitions| self.publish(transitions));
                let _ = reply.send(result);
            }
            GameCommand::Depart {
                player_id,
                disconnected,
                reply,
            } => {
                if self.state.players().contains(&player_id) {
                    let reason = if disconnected {
                        AbandonReason::PlayerDisconnected { player_id }
                    } else {
                        AbandonReason::PlayerLeft { player_id }
                    };
                    let transitions = self.state.abandon(reason);
                    self.publish(transitions);
                }
                let _ = reply.send(());
            }
            GameCommand::Shutdown => {
                let transitions = self.state.abandon(AbandonReason::Shutdown);
                self.publish(transitions);
            }
        }
    }

    fn fire_timer(&mut self) {
        let Some(timer) = self.timer.take() else {
            return;
        };
        let transitions = match timer {
            ActorTimer::ReadyTimeout { .. } => {
                tracing::info!(
                    game_id = %self.state.game_id(),
                    "ready timeout elapsed; starting game without every acknowledgement"
                );
                self.state.force_start()
            }
            ActorTimer::RoundDeadline { round, .. } => self.state.expire_round(round),
            ActorTimer::ResultsPause { .. } => self.state.advance(),
        };
        self.publish(transitions);
    }

    /// Applies side effects of `transitions`: timers, journal events, the
    /// published view, and player updates, in that order.
    fn publish(&mut self, transitions: Vec<GameTransition>) {
        let mut pending = VecDeque::from(transitions);
        let mut events = Vec::new();
        let mut updates = Vec::new();
        let mut settle = None;

        while let Some(transition) = pending.pop_front() {
            match transition {
                GameTransition::RoundStarted { round, multiplier } => {
                    let round_deadline = self.run.game_config.round_deadline;
                    let deadline_unix_ms =
                        deadline_unix_ms(current_unix_timestamp_ms(), round_deadline);
                    self.state.set_round_deadline(Some(deadline_unix_ms));
                    self.timer = Some(ActorTimer::RoundDeadline {
                        round,
                        at: Instant::now() + round_deadline,
                    });
                    tracing::debug!(
                        game_id = %self.state.game_id(),
                        round,
                        multiplier,
                        "round started"
                    );
                    updates.push(GameUpdate::RoundStarted {
                        round,
                        multiplier,
                        deadline_unix_ms,
                    });
                }
                GameTransition::MoveRecorded(recorded) => {
                    tracing::debug!(
                        game_id = %recorded.game_id,
                        round = recorded.round,
                        player_id = %recorded.player_id,
                        auto = recorded.auto,
                        "move recorded"
                    );
                    updates.push(GameUpdate::PlayerSubmitted {
                        round: recorded.round,
                        player_id: recorded.player_id.clone(),
                        auto: recorded.auto,
                    });
                    events.push(RunEvent::MoveRecorded {
                        game_id: recorded.game_id,
                        round: recorded.round,
                        player_id: recorded.player_id,
                        decision: recorded.decision,
                        auto: recorded.auto,
                    });
                }
                GameTransition::RoundResolved { round, payoffs } => {
                    events.push(RunEvent::RoundResolved {
                        game_id: self.state.game_id().clone(),
                        round,
                        contributors: payoffs.contributors,
                    });
                    updates.push(GameUpdate::RoundResolved {
                        round,
                        moves: self
                            .state
                            .moves_for_round(round)
                            .into_iter()
                            .cloned()
                            .collect(),
                        payoffs,
                        totals: self.state.player_totals(),
                    });
                    let pause = self.run.game_config.results_pause;
                    if pause.is_zero() {
                        pending.extend(self.state.advance());
                    } else {
                        self.timer = Some(ActorTimer::ResultsPause {
                            at: Instant::now() + pause,
                        });
                    }
                }
                GameTransition::Completed {
                    player_totals,
                    score,
                } => {
                    self.timer = None;
                    tracing::info!(
                        run_id = %self.state.run_id(),
                        game_id = %self.state.game_id(),
                        score,
                        benchmark = self.run.engine.benchmark(),
                        "game completed"
                    );
                    events.push(RunEvent::GameCompleted {
                        game_id: self.state.game_id().clone(),
                        player_totals,
                        score,
                    });
                    updates.push(GameUpdate::GameCompleted {
                        totals: self.state.player_totals(),
                        score,
                        benchmark: self.run.engine.benchmark(),
                    });
                    settle = Some(PlayerStatus::Completed);
                }
                GameTransition::Abandoned { reason } => {
                    self.timer = None;
                    tracing::warn!(
                        run_id = %self.state.run_id(),
                        game_id = %self.state.game_id(),
                        round = self.state.current_round(),
                        reason = ?reason,
                        "game abandoned"
                    );
                    events.push(RunEvent::GameAbandoned {
                        game_id: self.state.game_id().clone(),
                        reason: reason.clone(),
                    });
                    updates.push(GameUpdate::GameAbandoned { reason });
                    settle = Some(PlayerStatus::Abandoned);
                }
            }
        }

        let seated = settle.map(|status| (self.state.players(), status));
        if let Err(error) = self.run.commit_game_events(events, seated) {
            tracing::error!(
                game_id = %self.state.game_id(),
                error = %error,
                "failed to journal game events"
            );
        }
        self.view.send_replace(self.state.view());
        for update in updates {
            let _ = self.updates.send(update);
        }
    }
}

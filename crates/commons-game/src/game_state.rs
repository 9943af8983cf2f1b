//! Round-by-round state machine for one game.
//!
//! The state machine is synchronous and owned by exactly one driver; every
//! mutating call returns the transitions it produced so the driver can publish
//! them. Each round has an acceptance gate that closes exactly once, either
//! when the last seat submits or when the deadline is expired.

use std::sync::Arc;
use std::time::Duration;

use commons_core::{GameId, PlayerId, RunId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::moves::{Decision, Move};
use crate::round_schedule::{self, ROUND_COUNT};
use crate::scoring::{game_score, RoundPayoffs, ScoringEngine};

/// Reasons a submitted move is refused. Reported to the submitter only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveRejection {
    #[error("a move for round {round} was already recorded")]
    DuplicateMove { round: u8 },
    #[error("round {submitted} is not accepting moves (current round {current})")]
    StaleRound { submitted: u8, current: u8 },
    #[error("the game was abandoned")]
    GameAbandoned,
    #[error("player is not seated in this game")]
    Unauthorized,
}

impl MoveRejection {
    /// Stable wire code for the rejection.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateMove { .. } => "DuplicateMove",
            Self::StaleRound { .. } => "StaleRound",
            Self::GameAbandoned => "GameAbandoned",
            Self::Unauthorized => "Unauthorized",
        }
    }
}

/// Coarse lifecycle phase of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    Forming,
    RoundActive,
    RoundResolved,
    Completed,
    Abandoned,
}

impl GamePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

/// Whether a round still accepts moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundGate {
    Open,
    Closed,
}

/// Why a game ended without completing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AbandonReason {
    PlayerLeft { player_id: PlayerId },
    PlayerDisconnected { player_id: PlayerId },
    InvariantViolation { detail: String },
    Shutdown,
}

/// Timing and handshake settings for games.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    pub round_deadline: Duration,
    pub results_pause: Duration,
    pub require_ready_handshake: bool,
    pub ready_timeout: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            round_deadline: Duration::from_secs(30),
            results_pause: Duration::ZERO,
            require_ready_handshake: false,
            ready_timeout: Duration::from_secs(15),
        }
    }
}

/// A state change produced by the state machine, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameTransition {
    RoundStarted { round: u8, multiplier: u32 },
    MoveRecorded(Move),
    RoundResolved { round: u8, payoffs: RoundPayoffs },
    Completed { player_totals: Vec<i64>, score: i64 },
    Abandoned { reason: AbandonReason },
}

#[derive(Debug, Clone)]
struct RoundLedger {
    round: u8,
    gate: RoundGate,
    moves: Vec<Option<Move>>,
    payoffs: Option<RoundPayoffs>,
}

impl RoundLedger {
    fn open(round: u8, seats: usize) -> Self {
        Self {
            round,
            gate: RoundGate::Open,
            moves: vec![None; seats],
            payoffs: None,
        }
    }

    fn recorded(&self) -> usize {
        self.moves.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Player-facing snapshot of one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub game_id: GameId,
    pub run_id: RunId,
    pub phase: GamePhase,
    pub round: u8,
    pub multiplier: u32,
    pub players: Vec<PlayerId>,
    pub ready: Vec<PlayerId>,
    pub submitted: Vec<PlayerId>,
    pub round_deadline_unix_ms: Option<u64>,
    pub totals: Vec<PlayerTotal>,
    pub last_round: Option<RoundSummary>,
    pub score: Option<i64>,
    pub benchmark: i64,
    pub abandon_reason: Option<AbandonReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTotal {
    pub player_id: PlayerId,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSummary {
    pub round: u8,
    pub moves: Vec<Move>,
    pub payoffs: RoundPayoffs,
}

/// Authoritative state of one game.
#[derive(Debug, Clone)]
pub struct GameState {
    game_id: GameId,
    run_id: RunId,
    players: Vec<PlayerId>,
    engine: Arc<ScoringEngine>,
    phase: GamePhase,
    current_round: u8,
    ready: Vec<bool>,
    rounds: Vec<RoundLedger>,
    totals: Vec<i64>,
    round_deadline_unix_ms: Option<u64>,
    abandon_reason: Option<AbandonReason>,
}

impl GameState {
    /// Forms a game from matched players.
    ///
    /// A seat count other than the engine's group size abandons the game
    /// immediately. Without a readiness handshake round 1 starts at once.
    pub fn form(
        game_id: GameId,
        run_id: RunId,
        players: Vec<PlayerId>,
        engine: Arc<ScoringEngine>,
        require_ready_handshake: bool,
    ) -> (Self, Vec<GameTransition>) {
        let seats = players.len();
        let mut state = Self {
            game_id,
            run_id,
            players,
            phase: GamePhase::Forming,
            current_round: 0,
            ready: vec![false; seats],
            rounds: Vec::with_capacity(usize::from(ROUND_COUNT)),
            totals: vec![0; seats],
            round_deadline_unix_ms: None,
            abandon_reason: None,
            engine,
        };

        let mut transitions = Vec::new();
        if seats != state.engine.group_size() {
            let detail = format!(
                "game formed with {seats} players, expected {}",
                state.engine.group_size()
            );
            state.abandon_invariant(detail, &mut transitions);
        } else if has_duplicate_players(&state.players) {
            state.abandon_invariant(
                "game formed with a duplicated player".to_string(),
                &mut transitions,
            );
        } else if !require_ready_handshake {
            state.start_round(1, &mut transitions);
        }
        (state, transitions)
    }

    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn current_round(&self) -> u8 {
        self.current_round
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn totals(&self) -> &[i64] {
        &self.totals
    }

    /// Running totals paired with their players, in seat order.
    pub fn player_totals(&self) -> Vec<PlayerTotal> {
        self.players
            .iter()
            .zip(&self.totals)
            .map(|(player_id, total)| PlayerTotal {
                player_id: player_id.clone(),
                total: *total,
            })
            .collect()
    }

    pub fn abandon_reason(&self) -> Option<&AbandonReason> {
        self.abandon_reason.as_ref()
    }

    /// Final game score, available once the game completed.
    pub fn score(&self) -> Option<i64> {
        (self.phase == GamePhase::Completed).then(|| game_score(&self.totals))
    }

    /// Gate of `round`, or `None` when that round never started.
    pub fn gate(&self, round: u8) -> Option<RoundGate> {
        self.ledger(round).map(|ledger| ledger.gate)
    }

    /// Moves recorded for `round`, in seat order.
    pub fn moves_for_round(&self, round: u8) -> Vec<&Move> {
        self.ledger(round)
            .map(|ledger| ledger.moves.iter().flatten().collect())
            .unwrap_or_default()
    }

    pub fn set_round_deadline(&mut self, deadline_unix_ms: Option<u64>) {
        self.round_deadline_unix_ms = deadline_unix_ms;
    }

    fn seat_of(&self, player_id: &PlayerId) -> Option<usize> {
        self.players.iter().position(|seated| seated == player_id)
    }

    fn ledger(&self, round: u8) -> Option<&RoundLedger> {
        self.rounds.iter().find(|ledger| ledger.round == round)
    }

    fn current_ledger_mut(&mut self) -> Option<&mut RoundLedger> {
        let round = self.current_round;
        self.rounds.iter_mut().find(|ledger| ledger.round == round)
    }

    /// Records a readiness acknowledgement; starts round 1 once every seat is ready.
    pub fn acknowledge_ready(
        &mut self,
        player_id: &PlayerId,
    ) -> Result<Vec<GameTransition>, MoveRejection> {
        if self.phase == GamePhase::Abandoned {
            return Err(MoveRejection::GameAbandoned);
        }
        let seat = self.seat_of(player_id).ok_or(MoveRejection::Unauthorized)?;
        let mut transitions = Vec::new();
        if self.phase != GamePhase::Forming {
            return Ok(transitions);
        }
        self.ready[seat] = true;
        if self.ready.iter().all(|ready| *ready) {
            self.start_round(1, &mut transitions);
        }
        Ok(transitions)
    }

    /// Starts round 1 regardless of outstanding readiness acknowledgements.
    pub fn force_start(&mut self) -> Vec<GameTransition> {
        let mut transitions = Vec::new();
        if self.phase == GamePhase::Forming {
            self.start_round(1, &mut transitions);
        }
        transitions
    }

    /// Accepts one player's decision for the current round.
    pub fn submit_move(
        &mut self,
        player_id: &PlayerId,
        round: u8,
        decision: Decision,
    ) -> Result<Vec<GameTransition>, MoveRejection> {
        if self.phase == GamePhase::Abandoned {
            return Err(MoveRejection::GameAbandoned);
        }
        let seat = self.seat_of(player_id).ok_or(MoveRejection::Unauthorized)?;
        let stale = MoveRejection::StaleRound {
            submitted: round,
            current: self.current_round,
        };
        if round != self.current_round {
            return Err(stale);
        }
        let ledger = self.ledger(round).ok_or(stale.clone())?;
        if ledger.moves[seat].is_some() {
            return Err(MoveRejection::DuplicateMove { round });
        }
        if self.phase != GamePhase::RoundActive || ledger.gate == RoundGate::Closed {
            return Err(stale);
        }

        let recorded = Move::submitted(self.game_id.clone(), round, player_id.clone(), decision);
        let mut transitions = vec![GameTransition::MoveRecorded(recorded.clone())];
        let seats = self.players.len();
        let Some(ledger) = self.current_ledger_mut() else {
            return Err(stale);
        };
        ledger.moves[seat] = Some(recorded);
        if ledger.recorded() == seats {
            ledger.gate = RoundGate::Closed;
            self.resolve_current_round(&mut transitions);
        }
        Ok(transitions)
    }

    /// Closes `round` on deadline, synthesizing auto moves for silent seats.
    ///
    /// A fire for a round that is no longer open produces no transitions.
    pub fn expire_round(&mut self, round: u8) -> Vec<GameTransition> {
        let mut transitions = Vec::new();
        if self.phase != GamePhase::RoundActive || self.current_round != round {
            return transitions;
        }
        let game_id = self.game_id.clone();
        let players = self.players.clone();
        let Some(ledger) = self.current_ledger_mut() else {
            return transitions;
        };
        if ledger.gate == RoundGate::Closed {
            return transitions;
        }
        ledger.gate = RoundGate::Closed;
        for (slot, player_id) in ledger.moves.iter_mut().zip(players) {
            if slot.is_none() {
                let auto = Move::auto(game_id.clone(), round, player_id);
                tracing::debug!(
                    game_id = %auto.game_id,
                    round,
                    player_id = %auto.player_id,
                    "round deadline elapsed; recording auto move"
                );
                transitions.push(GameTransition::MoveRecorded(auto.clone()));
                *slot = Some(auto);
            }
        }
        self.resolve_current_round(&mut transitions);
        transitions
    }

    /// Moves a resolved round on to the next round, or completes the game after round 8.
    pub fn advance(&mut self) -> Vec<GameTransition> {
        let mut transitions = Vec::new();
        if self.phase != GamePhase::RoundResolved {
            return transitions;
        }
        if round_schedule::is_final_round(self.current_round) {
            self.phase = GamePhase::Completed;
            self.round_deadline_unix_ms = None;
            transitions.push(GameTransition::Completed {
                player_totals: self.totals.clone(),
                score: game_score(&self.totals),
            });
        } else {
            let next = self.current_round.saturating_add(1);
            self.start_round(next, &mut transitions);
        }
        transitions
    }

    /// Abandons the whole game. No-op once the game is terminal.
    pub fn abandon(&mut self, reason: AbandonReason) -> Vec<GameTransition> {
        let mut transitions = Vec::new();
        if self.is_terminal() {
            return transitions;
        }
        self.phase = GamePhase::Abandoned;
        self.round_deadline_unix_ms = None;
        if let Some(ledger) = self.current_ledger_mut() {
            ledger.gate = RoundGate::Closed;
        }
        self.abandon_reason = Some(reason.clone());
        transitions.push(GameTransition::Abandoned { reason });
        transitions
    }

    fn abandon_invariant(&mut self, detail: String, transitions: &mut Vec<GameTransition>) {
        tracing::error!(
            game_id = %self.game_id,
            run_id = %self.run_id,
            detail = %detail,
            "game contract violated; abandoning game"
        );
        transitions.extend(self.abandon(AbandonReason::InvariantViolation { detail }));
    }

    fn start_round(&mut self, round: u8, transitions: &mut Vec<GameTransition>) {
        let Some(multiplier) = round_schedule::multiplier_for(round) else {
            self.abandon_invariant(
                format!("round {round} is outside 1..={ROUND_COUNT}"),
                transitions,
            );
            return;
        };
        self.current_round = round;
        self.phase = GamePhase::RoundActive;
        self.round_deadline_unix_ms = None;
        self.rounds.push(RoundLedger::open(round, self.players.len()));
        transitions.push(GameTransition::RoundStarted { round, multiplier });
    }

    fn resolve_current_round(&mut self, transitions: &mut Vec<GameTransition>) {
        let round = self.current_round;
        let decisions = self
            .ledger(round)
            .and_then(|ledger| {
                ledger
                    .moves
                    .iter()
                    .map(|slot| slot.as_ref().map(|recorded| recorded.decision))
                    .collect::<Option<Vec<_>>>()
            });
        let Some(decisions) = decisions else {
            self.abandon_invariant(
                format!("round {round} resolved with missing moves"),
                transitions,
            );
            return;
        };

        let payoffs = match self.engine.score_scheduled_round(round, &decisions) {
            Ok(payoffs) => payoffs,
            Err(error) => {
                self.abandon_invariant(
                    format!("round {round} scoring failed: {error}"),
                    transitions,
                );
                return;
            }
        };
        for (total, payoff) in self.totals.iter_mut().zip(&payoffs.payoffs) {
            *total = total.saturating_add(*payoff);
        }
        if let Some(ledger) = self.current_ledger_mut() {
            ledger.payoffs = Some(payoffs.clone());
        }
        self.phase = GamePhase::RoundResolved;
        self.round_deadline_unix_ms = None;
        transitions.push(GameTransition::RoundResolved { round, payoffs });
    }

    /// Builds the player-facing snapshot.
    pub fn view(&self) -> GameView {
        let current = self.ledger(self.current_round);
        let submitted = current
            .map(|ledger| {
                ledger
                    .moves
                    .iter()
                    .flatten()
                    .map(|recorded| recorded.player_id.clone())
                    .collect()
            })
            .unwrap_or_default();
        let last_round = self
            .rounds
            .iter()
            .rev()
            .find_map(|ledger| {
                ledger.payoffs.clone().map(|payoffs| RoundSummary {
                    round: ledger.round,
                    moves: ledger.moves.iter().flatten().cloned().collect(),
                    payoffs,
                })
            });

        GameView {
            game_id: self.game_id.clone(),
            run_id: self.run_id.clone(),
            phase: self.phase,
            round: self.current_round,
            multiplier: round_schedule::multiplier_for(self.current_round).unwrap_or(0),
            players: self.players.clone(),
            ready: self
                .players
                .iter()
                .zip(&self.ready)
                .filter(|(_, ready)| **ready)
                .map(|(player_id, _)| player_id.clone())
                .collect(),
            submitted,
            round_deadline_unix_ms: self.round_deadline_unix_ms,
            totals: self.player_totals(),
            last_round,
            score: self.score(),
            benchmark: self.engine.benchmark(),
            abandon_reason: self.abandon_reason.clone(),
        }
    }
}

fn has_duplicate_players(players: &[PlayerId]) -> bool {
    players
        .iter()
        .enumerate()
        .any(|(index, player)| players[index + 1..].contains(player))
}

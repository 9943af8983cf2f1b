//! Pure fold of journal events into dashboard statistics.

use commons_core::{GameId, PlayerId, RunId};
use commons_game::{game_score, Decision, PlayerStatus, ROUND_SCHEDULE};
use serde::{Deserialize, Serialize};

use crate::run_event::RunEvent;

/// Decision tallies for one scheduled round across every game in the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundTally {
    pub round: u8,
    pub multiplier: u32,
    pub contribute: u64,
    pub protect: u64,
    pub auto: u64,
    /// Resolved games for this round, indexed by how many players contributed.
    pub outcome_patterns: Vec<u64>,
}

impl RoundTally {
    pub fn total(&self) -> u64 {
        self.contribute + self.protect
    }

    fn record_outcome(&mut self, contributors: usize) {
        if self.outcome_patterns.len() <= contributors {
            self.outcome_patterns.resize(contributors + 1, 0);
        }
        self.outcome_patterns[contributors] += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameRowStatus {
    Active,
    Completed,
    Abandoned,
}

/// One game as shown in the dashboard table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRow {
    pub game_id: GameId,
    pub players: Vec<PlayerId>,
    pub status: GameRowStatus,
    pub rounds_resolved: u8,
    pub auto_moves: u64,
    pub score: Option<i64>,
}

/// Aggregate state of a run, derived only from its journal.
///
/// `connected` counts every player that is still live (connected, queued or
/// seated in a game).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAggregate {
    pub run_id: Option<RunId>,
    pub class_code: Option<String>,
    pub group_size: usize,
    pub connected: u64,
    pub in_queue: u64,
    pub active_games: u64,
    pub completed: u64,
    pub abandoned: u64,
    pub players_completed: u64,
    pub players_abandoned: u64,
    pub total_moves: u64,
    pub auto_moves: u64,
    pub rounds: Vec<RoundTally>,
    pub benchmark: i64,
    pub average_score: Option<i64>,
    pub games: Vec<GameRow>,
    pub sequence: u64,
}

impl Default for RunAggregate {
    fn default() -> Self {
        Self {
            run_id: None,
            class_code: None,
            group_size: 0,
            connected: 0,
            in_queue: 0,
            active_games: 0,
            completed: 0,
            abandoned: 0,
            players_completed: 0,
            players_abandoned: 0,
            total_moves: 0,
            auto_moves: 0,
            rounds: ROUND_SCHEDULE
                .iter()
                .map(|round| RoundTally {
                    round: round.index,
                    multiplier: round.multiplier,
                    contribute: 0,
                    protect: 0,
                    auto: 0,
                    outcome_patterns: Vec::new(),
                })
                .collect(),
            benchmark: 0,
            average_score: None,
            games: Vec::new(),
            sequence: 0,
        }
    }
}

impl RunAggregate {
    /// Rebuilds the aggregate from a complete event sequence.
    pub fn fold<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a RunEvent>,
    {
        events
            .into_iter()
            .fold(Self::default(), |aggregate, event| aggregate.apply(event))
    }

    /// Applies one event, advancing `sequence` by one.
    pub fn apply(mut self, event: &RunEvent) -> Self {
        self.sequence += 1;
        match event {
            RunEvent::RunOpened {
                run_id,
                class_code,
                benchmark,
                group_size,
            } => {
                self.run_id = Some(run_id.clone());
                self.class_code = Some(class_code.clone());
                self.benchmark = *benchmark;
                self.group_size = *group_size;
                for tally in &mut self.rounds {
                    if tally.outcome_patterns.len() <= *group_size {
                        tally.outcome_patterns.resize(*group_size + 1, 0);
                    }
                }
            }
            RunEvent::PlayerStatusChanged { from, to, .. } => {
                if let Some(from) = from {
                    self.leave_status(*from);
                }
                self.enter_status(*to);
            }
            RunEvent::GameStarted { game_id, players } => {
                self.active_games += 1;
                self.games.push(GameRow {
                    game_id: game_id.clone(),
                    players: players.clone(),
                    status: GameRowStatus::Active,
                    rounds_resolved: 0,
                    auto_moves: 0,
                    score: None,
                });
            }
            RunEvent::MoveRecorded {
                game_id,
                round,
                decision,
                auto,
                ..
            } => {
                self.total_moves += 1;
                if *auto {
                    self.auto_moves += 1;
                }
                if let Some(tally) = self.rounds.iter_mut().find(|tally| tally.round == *round) {
                    match decision {
                        Decision::Contribute => tally.contribute += 1,
                        Decision::Protect => tally.protect += 1,
                    }
                    if *auto {
                        tally.auto += 1;
                    }
                }
                if *auto {
                    if let Some(row) = self.game_row_mut(game_id) {
                        row.auto_moves += 1;
                    }
                }
            }
            RunEvent::RoundResolved {
                game_id,
                round,
                contributors,
            } => {
                if let Some(row) = self.game_row_mut(game_id) {
                    row.rounds_resolved = row.rounds_resolved.max(*round);
                }
                if let Some(tally) = self.rounds.iter_mut().find(|tally| tally.round == *round) {
                    tally.record_outcome(*contributors);
                }
            }
            RunEvent::GameCompleted { game_id, score, .. } => {
                if self.finish_game(game_id, GameRowStatus::Completed, Some(*score)) {
                    self.completed += 1;
                    self.refresh_average_score();
                }
            }
            RunEvent::GameAbandoned { game_id, .. } => {
                if self.finish_game(game_id, GameRowStatus::Abandoned, None) {
                    self.abandoned += 1;
                }
            }
        }
        self
    }

    /// Share of all recorded moves that were contributions, in percent.
    pub fn contribution_rate_percent(&self) -> Option<u64> {
        let contributed: u64 = self.rounds.iter().map(|tally| tally.contribute).sum();
        let total: u64 = self.rounds.iter().map(RoundTally::total).sum();
        (total > 0).then(|| contributed * 100 / total)
    }

    /// Run-wide outcome patterns: entry `k` counts resolved rounds where
    /// exactly `k` players contributed.
    pub fn outcome_patterns(&self) -> Vec<u64> {
        let width = self
            .rounds
            .iter()
            .map(|tally| tally.outcome_patterns.len())
            .max()
            .unwrap_or(0);
        let mut patterns = vec![0; width];
        for tally in &self.rounds {
            for (contributors, count) in tally.outcome_patterns.iter().enumerate() {
                patterns[contributors] += count;
            }
        }
        patterns
    }

    fn enter_status(&mut self, status: PlayerStatus) {
        if status.is_live() {
            self.connected += 1;
        }
        match status {
            PlayerStatus::Queued => self.in_queue += 1,
            PlayerStatus::Completed => self.players_completed += 1,
            PlayerStatus::Abandoned => self.players_abandoned += 1,
            PlayerStatus::Connected | PlayerStatus::InGame => {}
        }
    }

    fn leave_status(&mut self, status: PlayerStatus) {
        if status.is_live() {
            self.connected = self.connected.saturating_sub(1);
        }
        if status == PlayerStatus::Queued {
            self.in_queue = self.in_queue.saturating_sub(1);
        }
    }

    fn game_row_mut(&mut self, game_id: &GameId) -> Option<&mut GameRow> {
        self.games.iter_mut().find(|row| &row.game_id == game_id)
    }

    fn finish_game(&mut self, game_id: &GameId, status: GameRowStatus, score: Option<i64>) -> bool {
        let Some(row) = self.game_row_mut(game_id) else {
            return false;
        };
        if row.status != GameRowStatus::Active {
            return false;
        }
        row.status = status;
        row.score = score;
        self.active_games = self.active_games.saturating_sub(1);
        true
    }

    fn refresh_average_score(&mut self) {
        let scores = self
            .games
            .iter()
            .filter_map(|row| row.score)
            .collect::<Vec<_>>();
        self.average_score = (!scores.is_empty()).then(|| game_score(&scores));
    }
}

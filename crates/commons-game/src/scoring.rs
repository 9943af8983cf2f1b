//! Integer payoff engine and the cached all-contribute benchmark.
//!
//! Contributors each add `contribution_units` to a shared pool. The pool is
//! multiplied by `pool_growth` and the round multiplier, then split evenly
//! across the whole group with floor division; the undivided remainder is
//! discarded. Protectors keep `protect_payoff` on top of their pool share.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::moves::Decision;
use crate::round_schedule::{self, ROUND_SCHEDULE};

/// Smallest group the payoff rules make sense for.
pub const MIN_GROUP_SIZE: usize = 2;

/// Errors raised by the scoring engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    #[error("group size must be at least {MIN_GROUP_SIZE}, got {0}")]
    GroupTooSmall(usize),
    #[error("{field} must be greater than 0")]
    NonPositive { field: &'static str },
    #[error("protect_payoff must not be negative")]
    NegativeProtectPayoff,
    #[error("expected {expected} decisions, got {actual}")]
    GroupSizeMismatch { expected: usize, actual: usize },
    #[error("round {0} is outside the schedule")]
    UnknownRound(u8),
    #[error("expected {expected} rounds of history, got {actual}")]
    HistoryLength { expected: usize, actual: usize },
}

/// Game-design inputs for the payoff function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringParams {
    pub group_size: usize,
    pub contribution_units: i64,
    pub pool_growth: i64,
    pub protect_payoff: i64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            group_size: 4,
            contribution_units: 2,
            pool_growth: 2,
            protect_payoff: 2,
        }
    }
}

impl ScoringParams {
    pub fn validate(&self) -> Result<(), ScoringError> {
        if self.group_size < MIN_GROUP_SIZE {
            return Err(ScoringError::GroupTooSmall(self.group_size));
        }
        if self.contribution_units <= 0 {
            return Err(ScoringError::NonPositive {
                field: "contribution_units",
            });
        }
        if self.pool_growth <= 0 {
            return Err(ScoringError::NonPositive {
                field: "pool_growth",
            });
        }
        if self.protect_payoff < 0 {
            return Err(ScoringError::NegativeProtectPayoff);
        }
        Ok(())
    }
}

/// Outcome of scoring one round for a whole group, in seat order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundPayoffs {
    pub multiplier: u32,
    pub contributors: usize,
    pub pool: i64,
    pub share: i64,
    pub remainder: i64,
    pub payoffs: Vec<i64>,
}

/// Scoring engine bound to one parameter set, with its benchmark computed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringEngine {
    params: ScoringParams,
    benchmark: i64,
}

impl ScoringEngine {
    pub fn new(params: ScoringParams) -> Result<Self, ScoringError> {
        params.validate()?;
        let benchmark = compute_benchmark(&params)?;
        Ok(Self { params, benchmark })
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    pub fn group_size(&self) -> usize {
        self.params.group_size
    }

    /// Per-player total when every player contributes in every scheduled round.
    pub fn benchmark(&self) -> i64 {
        self.benchmark
    }

    pub fn score_round(
        &self,
        decisions: &[Decision],
        multiplier: u32,
    ) -> Result<RoundPayoffs, ScoringError> {
        score_round(&self.params, decisions, multiplier)
    }

    /// Scores `decisions` using the multiplier scheduled for `round`.
    pub fn score_scheduled_round(
        &self,
        round: u8,
        decisions: &[Decision],
    ) -> Result<RoundPayoffs, ScoringError> {
        let multiplier =
            round_schedule::multiplier_for(round).ok_or(ScoringError::UnknownRound(round))?;
        self.score_round(decisions, multiplier)
    }

    /// Sums per-player payoffs over a full schedule of decisions (`history[0]` is round 1).
    pub fn total_scores(&self, history: &[Vec<Decision>]) -> Result<Vec<i64>, ScoringError> {
        total_scores(&self.params, history)
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        let params = ScoringParams::default();
        let benchmark = compute_benchmark(&params).unwrap_or_default();
        Self { params, benchmark }
    }
}

/// Pure payoff function for one round.
pub fn score_round(
    params: &ScoringParams,
    decisions: &[Decision],
    multiplier: u32,
) -> Result<RoundPayoffs, ScoringError> {
    if decisions.len() != params.group_size {
        return Err(ScoringError::GroupSizeMismatch {
            expected: params.group_size,
            actual: decisions.len(),
        });
    }

    let contributors = decisions
        .iter()
        .filter(|decision| **decision == Decision::Contribute)
        .count();
    let group_size = i64::try_from(params.group_size).unwrap_or(i64::MAX);
    let pool = i64::try_from(contributors)
        .unwrap_or(i64::MAX)
        .saturating_mul(params.contribution_units)
        .saturating_mul(params.pool_growth)
        .saturating_mul(i64::from(multiplier));
    let share = pool.div_euclid(group_size);
    let remainder = pool.rem_euclid(group_size);

    let payoffs = decisions
        .iter()
        .map(|decision| match decision {
            Decision::Contribute => share,
            Decision::Protect => share.saturating_add(params.protect_payoff),
        })
        .collect();

    Ok(RoundPayoffs {
        multiplier,
        contributors,
        pool,
        share,
        remainder,
        payoffs,
    })
}

/// Sums per-player payoffs for a complete history of scheduled rounds.
pub fn total_scores(
    params: &ScoringParams,
    history: &[Vec<Decision>],
) -> Result<Vec<i64>, ScoringError> {
    if history.len() != ROUND_SCHEDULE.len() {
        return Err(ScoringError::HistoryLength {
            expected: ROUND_SCHEDULE.len(),
            actual: history.len(),
        });
    }
    let mut totals = vec![0_i64; params.group_size];
    for (round, decisions) in ROUND_SCHEDULE.iter().zip(history) {
        let payoffs = score_round(params, decisions, round.multiplier)?;
        for (total, payoff) in totals.iter_mut().zip(payoffs.payoffs) {
            *total = total.saturating_add(payoff);
        }
    }
    Ok(totals)
}

/// Per-player total of the all-contribute vector applied to every scheduled round.
pub fn compute_benchmark(params: &ScoringParams) -> Result<i64, ScoringError> {
    let all_contribute = vec![vec![Decision::Contribute; params.group_size]; ROUND_SCHEDULE.len()];
    let totals = total_scores(params, &all_contribute)?;
    Ok(totals.first().copied().unwrap_or_default())
}

/// Floor of the mean player total, used as the single game score.
pub fn game_score(player_totals: &[i64]) -> i64 {
    if player_totals.is_empty() {
        return 0;
    }
    let count = i64::try_from(player_totals.len()).unwrap_or(i64::MAX);
    player_totals
        .iter()
        .fold(0_i64, |acc, total| acc.saturating_add(*total))
        .div_euclid(count)
}

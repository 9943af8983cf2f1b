//! Game rules for the classroom public-goods game.
//!
//! Holds the fixed eight-round schedule, the pure scoring engine, player
//! lifecycle statuses, and the per-game state machine that turns submitted
//! decisions into resolved rounds.

pub mod game_state;
pub mod moves;
pub mod player_status;
pub mod round_schedule;
pub mod scoring;

pub use game_state::{
    AbandonReason, GameConfig, GamePhase, GameState, GameTransition, GameView, MoveRejection,
    PlayerTotal, RoundGate, RoundSummary,
};
pub use moves::{Decision, Move};
pub use player_status::{PlayerStatus, StatusTransitionError};
pub use round_schedule::{Round, ROUND_COUNT, ROUND_SCHEDULE};
pub use scoring::{
    compute_benchmark, game_score, score_round, total_scores, RoundPayoffs, ScoringEngine,
    ScoringError, ScoringParams, MIN_GROUP_SIZE,
};

//! Session, matchmaking, and game orchestration for classroom runs.
//!
//! A [`SessionRegistry`] owns every run. Each run keeps a FIFO roster that
//! drains matched groups into games, and each game is driven by a single
//! tokio task that owns its [`commons_game::GameState`].

pub mod config;
pub mod error;
pub mod game_actor;
pub mod matchmaking;
mod run_context;
pub mod session_registry;

pub use config::OrchestratorConfig;
pub use error::OrchestratorError;
pub use game_actor::{GameHandle, GameUpdate};
pub use matchmaking::{Admission, Departure, FormedGroup, JoinOutcome, PlayerRecord, Roster};
pub use session_registry::{ClassSession, DashboardHandle, SessionRegistry};

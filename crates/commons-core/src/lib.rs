//! Foundational utilities shared across the classroom commons crates.
//!
//! Provides typed identifiers, dashboard secrets, class-code normalisation,
//! and wall-clock helpers used for round deadlines.

pub mod class_code;
pub mod identifiers;
pub mod time_utils;

pub use class_code::{normalize_class_code, ClassCodeError, CLASS_CODE_MAX_CHARS};
pub use identifiers::{DashboardToken, GameId, IdentifierError, PlayerId, RunId};
pub use time_utils::{current_unix_timestamp_ms, deadline_unix_ms};

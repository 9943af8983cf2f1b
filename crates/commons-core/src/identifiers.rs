//! Strongly typed identifiers and secret generation for runs, games, and players.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const PLAYER_ID_MAX_CHARS: usize = 64;

/// Error returned when a client-supplied identifier is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },
    #[error("{kind} exceeds {max} characters")]
    TooLong { kind: &'static str, max: usize },
    #[error("{kind} contains control characters")]
    ControlCharacters { kind: &'static str },
}

macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an already validated identifier.
            pub fn from_raw(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_identifier!(
    /// Opaque identifier of one instructor-created run.
    RunId
);
string_identifier!(
    /// Opaque identifier of one game inside a run.
    GameId
);
string_identifier!(
    /// Client-chosen identifier of a student.
    PlayerId
);

impl RunId {
    /// Generates a collision-free run identifier (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl GameId {
    /// Generates a game identifier prefixed for readability in logs.
    pub fn generate() -> Self {
        Self(format!("game_{}", Uuid::new_v4().simple()))
    }
}

impl PlayerId {
    /// Validates a client-supplied player identifier.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::Empty { kind: "player id" });
        }
        if trimmed.chars().count() > PLAYER_ID_MAX_CHARS {
            return Err(IdentifierError::TooLong {
                kind: "player id",
                max: PLAYER_ID_MAX_CHARS,
            });
        }
        if trimmed.chars().any(char::is_control) {
            return Err(IdentifierError::ControlCharacters { kind: "player id" });
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Unguessable bearer secret granting dashboard access for one run.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DashboardToken(String);

impl DashboardToken {
    /// Generates 244 random bits (two UUID v4 payloads, 122 random bits each) rendered as lowercase hex.
    pub fn generate() -> Self {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        Self(format!("{}{}", first.simple(), second.simple()))
    }

    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares against a presented token without short-circuiting on the first mismatch.
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.0.as_bytes();
        let presented = presented.trim().as_bytes();
        if expected.len() != presented.len() {
            return false;
        }
        expected
            .iter()
            .zip(presented)
            .fold(0_u8, |acc, (left, right)| acc | (left ^ right))
            == 0
    }
}

impl fmt::Debug for DashboardToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DashboardToken(<redacted>)")
    }
}

//! Player lifecycle inside a run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a player status transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid player_status transition: {from:?} -> {to:?}")]
pub struct StatusTransitionError {
    pub from: PlayerStatus,
    pub to: PlayerStatus,
}

/// Lifecycle state for a student inside one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PlayerStatus {
    #[default]
    Connected,
    Queued,
    InGame,
    Completed,
    Abandoned,
}

impl PlayerStatus {
    /// Returns true when this status can transition to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (Self::Connected, Self::Queued)
                | (Self::Connected, Self::Abandoned)
                | (Self::Queued, Self::Connected)
                | (Self::Queued, Self::InGame)
                | (Self::Queued, Self::Abandoned)
                | (Self::InGame, Self::Completed)
                | (Self::InGame, Self::Abandoned)
        )
    }

    /// Returns an error if transitioning to `next` is not allowed.
    pub fn ensure_transition(self, next: Self) -> Result<(), StatusTransitionError> {
        if self.can_transition_to(next) {
            return Ok(());
        }
        Err(StatusTransitionError {
            from: self,
            to: next,
        })
    }

    /// Returns true when the player will never play again in this run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }

    /// Returns true while the student still holds a live seat in the run.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connected | Self::Queued | Self::InGame)
    }
}

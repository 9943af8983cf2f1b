use commons_core::ClassCodeError;
use commons_dashboard::JournalError;
use commons_game::{MoveRejection, PlayerStatus, StatusTransitionError};
use thiserror::Error;

/// Recoverable failures reported to the caller of an orchestrator operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("invalid class code: {0}")]
    InvalidClassCode(#[from] ClassCodeError),
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("{kind} '{id}' was not found")]
    NotFound { kind: &'static str, id: String },
    #[error("a move for round {round} was already recorded")]
    DuplicateMove { round: u8 },
    #[error("round {submitted} is not accepting moves (current round {current})")]
    StaleRound { submitted: u8, current: u8 },
    #[error("the game was abandoned")]
    GameAbandoned,
    #[error("player '{player_id}' already finished with status {status:?}")]
    PlayerFinished {
        player_id: String,
        status: PlayerStatus,
    },
    #[error("game '{game_id}' is no longer accepting commands")]
    ActorUnavailable { game_id: String },
    #[error("{0}")]
    InvalidTransition(#[from] StatusTransitionError),
    #[error("{0}")]
    Journal(#[from] JournalError),
    #[error("{0} lock is poisoned")]
    Poisoned(&'static str),
}

impl OrchestratorError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidClassCode(_) => "InvalidClassCode",
            Self::Unauthorized(_) => "Unauthorized",
            Self::NotFound { .. } => "NotFound",
            Self::DuplicateMove { .. } => "DuplicateMove",
            Self::StaleRound { .. } => "StaleRound",
            Self::GameAbandoned => "GameAbandoned",
            Self::PlayerFinished { .. } => "PlayerFinished",
            Self::ActorUnavailable { .. } => "ActorUnavailable",
            Self::InvalidTransition(_) => "InvalidTransition",
            Self::Journal(_) | Self::Poisoned(_) => "Internal",
        }
    }
}

impl From<MoveRejection> for OrchestratorError {
    fn from(rejection: MoveRejection) -> Self {
        match rejection {
            MoveRejection::DuplicateMove { round } => Self::DuplicateMove { round },
            MoveRejection::StaleRound { submitted, current } => {
                Self::StaleRound { submitted, current }
            }
            MoveRejection::GameAbandoned => Self::GameAbandoned,
            MoveRejection::Unauthorized => Self::Unauthorized("player is not seated in this game"),
        }
    }
}

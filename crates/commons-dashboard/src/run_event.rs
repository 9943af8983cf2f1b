use commons_core::{GameId, PlayerId, RunId};
use commons_game::{AbandonReason, Decision, PlayerStatus};
use serde::{Deserialize, Serialize};

/// Fact recorded in a run's journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEvent {
    #[serde(rename_all = "camelCase")]
    RunOpened {
        run_id: RunId,
        class_code: String,
        benchmark: i64,
        group_size: usize,
    },
    /// `from` is `None` the first time a player is seen.
    #[serde(rename_all = "camelCase")]
    PlayerStatusChanged {
        player_id: PlayerId,
        from: Option<PlayerStatus>,
        to: PlayerStatus,
    },
    #[serde(rename_all = "camelCase")]
    GameStarted {
        game_id: GameId,
        players: Vec<PlayerId>,
    },
    #[serde(rename_all = "camelCase")]
    MoveRecorded {
        game_id: GameId,
        round: u8,
        player_id: PlayerId,
        decision: Decision,
        auto: bool,
    },
    #[serde(rename_all = "camelCase")]
    RoundResolved {
        game_id: GameId,
        round: u8,
        contributors: usize,
    },
    #[serde(rename_all = "camelCase")]
    GameCompleted {
        game_id: GameId,
        player_totals: Vec<i64>,
        score: i64,
    },
    #[serde(rename_all = "camelCase")]
    GameAbandoned {
        game_id: GameId,
        reason: AbandonReason,
    },
}

impl RunEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunOpened { .. } => "run_opened",
            Self::PlayerStatusChanged { .. } => "player_status_changed",
            Self::GameStarted { .. } => "game_started",
            Self::MoveRecorded { .. } => "move_recorded",
            Self::RoundResolved { .. } => "round_resolved",
            Self::GameCompleted { .. } => "game_completed",
            Self::GameAbandoned { .. } => "game_abandoned",
        }
    }
}

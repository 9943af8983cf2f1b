//! Player decisions and recorded moves.

use commons_core::{GameId, PlayerId};
use serde::{Deserialize, Serialize};

/// The two mutually exclusive per-round decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    #[serde(alias = "contribute", alias = "CONTRIBUTE")]
    Contribute,
    #[serde(alias = "protect", alias = "PROTECT")]
    Protect,
}

impl Decision {
    /// Decision synthesized for players who miss a round deadline.
    pub const AUTO_DEFAULT: Decision = Decision::Protect;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contribute => "Contribute",
            Self::Protect => "Protect",
        }
    }
}

/// One recorded decision for a (game, round, player) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Move {
    pub game_id: GameId,
    pub round: u8,
    pub player_id: PlayerId,
    pub decision: Decision,
    pub auto: bool,
}

impl Move {
    pub fn submitted(game_id: GameId, round: u8, player_id: PlayerId, decision: Decision) -> Self {
        Self {
            game_id,
            round,
            player_id,
            decision,
            auto: false,
        }
    }

    pub fn auto(game_id: GameId, round: u8, player_id: PlayerId) -> Self {
        Self {
            game_id,
            round,
            player_id,
            decision: Decision::AUTO_DEFAULT,
            auto: true,
        }
    }
}

//! Static eight-round schedule with bonus multipliers.

use serde::{Deserialize, Serialize};

/// Number of rounds every game plays.
pub const ROUND_COUNT: u8 = 8;

/// One entry of the fixed schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub index: u8,
    pub multiplier: u32,
}

impl Round {
    pub fn is_bonus(self) -> bool {
        self.multiplier > 1
    }
}

/// The schedule shared read-only by every game: 3x at round 4, 10x at round 8.
pub const ROUND_SCHEDULE: [Round; ROUND_COUNT as usize] = [
    Round { index: 1, multiplier: 1 },
    Round { index: 2, multiplier: 1 },
    Round { index: 3, multiplier: 1 },
    Round { index: 4, multiplier: 3 },
    Round { index: 5, multiplier: 1 },
    Round { index: 6, multiplier: 1 },
    Round { index: 7, multiplier: 1 },
    Round { index: 8, multiplier: 10 },
];

/// Returns the schedule entry for a 1-based round index.
pub fn round(index: u8) -> Option<Round> {
    if index == 0 {
        return None;
    }
    ROUND_SCHEDULE.get(usize::from(index - 1)).copied()
}

/// Returns the multiplier for a 1-based round index.
pub fn multiplier_for(index: u8) -> Option<u32> {
    round(index).map(|round| round.multiplier)
}

/// Returns true for the final round of the schedule.
pub fn is_final_round(index: u8) -> bool {
    index == ROUND_COUNT
}

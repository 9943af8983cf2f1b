use anyhow::{bail, Context, Result};
use commons_game::{GameConfig, ScoringParams};

/// Runtime configuration shared by every run in a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub game: GameConfig,
    pub scoring: ScoringParams,
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.game.round_deadline.is_zero() {
            bail!("round deadline must be greater than 0");
        }
        if self.game.require_ready_handshake && self.game.ready_timeout.is_zero() {
            bail!("ready timeout must be greater than 0 when the ready handshake is required");
        }
        self.scoring
            .validate()
            .context("invalid scoring parameters")?;
        Ok(())
    }
}

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use commons_game::{GameConfig, ScoringParams};
use commons_gateway::GatewayServerConfig;
use commons_orchestrator::OrchestratorConfig;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_i64(value: &str) -> Result<i64, String> {
    let parsed = value
        .parse::<i64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed <= 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_non_negative_i64(value: &str) -> Result<i64, String> {
    let parsed = value
        .parse::<i64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed < 0 {
        return Err("value must not be negative".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "commons-server",
    about = "Classroom public-goods game server with live instructor dashboards",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "COMMONS_BIND",
        default_value = "127.0.0.1:3000",
        help = "Socket address the HTTP/WebSocket gateway binds to"
    )]
    pub bind: String,

    #[arg(
        long = "client-base-url",
        env = "COMMONS_CLIENT_BASE_URL",
        default_value = "http://localhost:3001",
        help = "Base URL of the browser client, used for dashboard and student links"
    )]
    pub client_base_url: String,

    #[arg(
        long = "group-size",
        env = "COMMONS_GROUP_SIZE",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Players seated per game"
    )]
    pub group_size: usize,

    #[arg(
        long = "round-deadline-ms",
        env = "COMMONS_ROUND_DEADLINE_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Time a round stays open before silent players are auto-moved to Protect"
    )]
    pub round_deadline_ms: u64,

    #[arg(
        long = "results-pause-ms",
        env = "COMMONS_RESULTS_PAUSE_MS",
        default_value_t = 0,
        help = "Pause between a round's results and the next round (0 advances immediately)"
    )]
    pub results_pause_ms: u64,

    #[arg(
        long = "require-ready-handshake",
        env = "COMMONS_REQUIRE_READY_HANDSHAKE",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Wait for every seated player to send ready before round 1"
    )]
    pub require_ready_handshake: bool,

    #[arg(
        long = "ready-timeout-ms",
        env = "COMMONS_READY_TIMEOUT_MS",
        default_value_t = 15_000,
        value_parser = parse_positive_u64,
        help = "Time to wait for ready acknowledgements before starting anyway"
    )]
    pub ready_timeout_ms: u64,

    #[arg(
        long = "contribution-units",
        env = "COMMONS_CONTRIBUTION_UNITS",
        default_value_t = 2,
        value_parser = parse_positive_i64,
        help = "Units each contributor adds to the shared pool"
    )]
    pub contribution_units: i64,

    #[arg(
        long = "pool-growth",
        env = "COMMONS_POOL_GROWTH",
        default_value_t = 2,
        value_parser = parse_positive_i64,
        help = "Base growth factor applied to the pool before the round multiplier"
    )]
    pub pool_growth: i64,

    #[arg(
        long = "protect-payoff",
        env = "COMMONS_PROTECT_PAYOFF",
        default_value_t = 2,
        value_parser = parse_non_negative_i64,
        help = "Private payoff kept by each protecting player"
    )]
    pub protect_payoff: i64,
}

impl Cli {
    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig> {
        let config = OrchestratorConfig {
            game: GameConfig {
                round_deadline: Duration::from_millis(self.round_deadline_ms),
                results_pause: Duration::from_millis(self.results_pause_ms),
                require_ready_handshake: self.require_ready_handshake,
                ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            },
            scoring: ScoringParams {
                group_size: self.group_size,
                contribution_units: self.contribution_units,
                pool_growth: self.pool_growth,
                protect_payoff: self.protect_payoff,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn gateway_config(&self) -> Result<GatewayServerConfig> {
        let config = GatewayServerConfig {
            bind: self.bind.trim().to_string(),
            client_base_url: self.client_base_url.trim().to_string(),
            orchestrator: self.orchestrator_config()?,
        };
        config
            .validate()
            .context("invalid gateway configuration")?;
        Ok(config)
    }
}

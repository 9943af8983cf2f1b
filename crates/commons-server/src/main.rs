mod bootstrap_helpers;

use anyhow::Result;
use clap::Parser;
use commons_cli::Cli;
use commons_gateway::run_gateway_server;

use crate::bootstrap_helpers::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.gateway_config()?;
    tracing::info!(
        bind = %config.bind,
        group_size = config.orchestrator.scoring.group_size,
        round_deadline_ms = cli.round_deadline_ms,
        "starting commons server"
    );
    run_gateway_server(config).await
}

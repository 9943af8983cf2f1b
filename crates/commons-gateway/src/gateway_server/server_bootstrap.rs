//! Commons gateway server bootstrap and router wiring.

use super::*;

/// Binds `config.bind` and serves the gateway until ctrl-c.
///
/// Running games are abandoned on shutdown.
pub async fn run_gateway_server(config: GatewayServerConfig) -> Result<()> {
    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{}'", config.bind))?;
    let state = Arc::new(GatewayServerState::new(config)?);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind commons gateway on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway address")?;
    tracing::info!(
        addr = %local_addr,
        client_base_url = %state.config.client_base_url,
        group_size = state.registry.engine().group_size(),
        benchmark = state.registry.benchmark(),
        "commons gateway listening"
    );

    let app = build_gateway_router(Arc::clone(&state));
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    if let Err(error) = state.registry.shutdown() {
        tracing::warn!(error = %error, "failed to abandon running games on shutdown");
    }
    serve_result.context("commons gateway server exited unexpectedly")?;
    tracing::info!("commons gateway stopped");
    Ok(())
}

pub(super) fn build_gateway_router(state: Arc<GatewayServerState>) -> Router {
    Router::new()
        .route(CREATE_RUN_ENDPOINT, post(handle_create_run))
        .route(CLASS_CODE_ENDPOINT, get(handle_resolve_class_code))
        .route(QUEUE_JOIN_ENDPOINT, post(handle_queue_join))
        .route(QUEUE_LEAVE_ENDPOINT, post(handle_queue_leave))
        .route(GAME_MOVE_ENDPOINT, post(handle_game_move))
        .route(GAME_READY_ENDPOINT, post(handle_game_ready))
        .route(GAME_VIEW_ENDPOINT, get(handle_game_view))
        .route(GAME_WS_ENDPOINT, get(handle_player_ws_upgrade))
        .route(DASHBOARD_SNAPSHOT_ENDPOINT, get(handle_dashboard_snapshot))
        .route(DASHBOARD_WS_ENDPOINT, get(handle_dashboard_ws_upgrade))
        .route(HEALTH_ENDPOINT, get(handle_health))
        .with_state(state)
}

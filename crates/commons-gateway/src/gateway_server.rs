use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use commons_core::{GameId, PlayerId, RunId};
use commons_game::{Decision, PlayerStatus};
use commons_orchestrator::{
    ClassSession, JoinOutcome, OrchestratorConfig, OrchestratorError, SessionRegistry,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;

mod server_bootstrap;
mod types;
mod websocket;

pub use server_bootstrap::run_gateway_server;
use server_bootstrap::build_gateway_router;
use types::{
    ApiError, ClassCodeResponse, CommandResponse, CreateRunRequest, CreateRunResponse,
    DashboardQuery, JoinQueueResponse, LeaveQueueResponse, PlayerSocketQuery, QueueRequest,
    ReadyRequest, SubmitMoveRequest,
};
use websocket::{run_dashboard_ws_connection, run_player_ws_connection};

const CREATE_RUN_ENDPOINT: &str = "/api/run/create";
const CLASS_CODE_ENDPOINT: &str = "/api/class/{class_code}";
const QUEUE_JOIN_ENDPOINT: &str = "/api/queue/join";
const QUEUE_LEAVE_ENDPOINT: &str = "/api/queue/leave";
const GAME_MOVE_ENDPOINT: &str = "/api/game/move";
const GAME_READY_ENDPOINT: &str = "/api/game/ready";
const GAME_VIEW_ENDPOINT: &str = "/api/game/{game_id}";
const GAME_WS_ENDPOINT: &str = "/api/game/{game_id}/ws";
const DASHBOARD_SNAPSHOT_ENDPOINT: &str = "/api/run/{run_id}/dashboard";
const DASHBOARD_WS_ENDPOINT: &str = "/api/run/{run_id}/dashboard/ws";
const HEALTH_ENDPOINT: &str = "/api/health";

/// Runtime configuration for the HTTP/WebSocket server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayServerConfig {
    pub bind: String,
    /// Base URL of the browser client; used to build dashboard and student links.
    pub client_base_url: String,
    pub orchestrator: OrchestratorConfig,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            client_base_url: "http://localhost:3001".to_string(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl GatewayServerConfig {
    pub fn validate(&self) -> Result<()> {
        self.bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid --bind '{}'", self.bind))?;
        let base = self.client_base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            bail!(
                "--client-base-url must start with http:// or https://, got '{}'",
                self.client_base_url
            );
        }
        self.orchestrator.validate()
    }
}

/// Shared state behind every gateway route.
pub struct GatewayServerState {
    pub(crate) config: GatewayServerConfig,
    pub(crate) registry: SessionRegistry,
}

impl GatewayServerState {
    pub fn new(config: GatewayServerConfig) -> Result<Self> {
        config.validate()?;
        let registry = SessionRegistry::new(config.orchestrator.clone())
            .context("failed to initialize session registry")?;
        Ok(Self { config, registry })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    fn client_base_url(&self) -> &str {
        self.config.client_base_url.trim().trim_end_matches('/')
    }

    fn dashboard_url(&self, session: &ClassSession) -> String {
        format!(
            "{}/dashboard/{}?token={}",
            self.client_base_url(),
            session.run_id,
            session.dashboard_token.as_str()
        )
    }

    fn student_url(&self, session: &ClassSession) -> String {
        format!("{}/join?code={}", self.client_base_url(), session.class_code)
    }
}

fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice::<T>(body).map_err(|error| {
        ApiError::bad_request("InvalidRequest", format!("failed to parse request body: {error}"))
    })
}

fn parse_player_id(raw: &str) -> Result<PlayerId, ApiError> {
    PlayerId::parse(raw)
        .map_err(|error| ApiError::bad_request("InvalidPlayerId", error.to_string()))
}

fn require_dashboard_token(query: &DashboardQuery) -> Result<&str, ApiError> {
    query
        .token
        .as_deref()
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| ApiError::unauthorized("missing dashboard token"))
}

/// Move and ready refusals reported as `{accepted: false, reason}`.
/// `Unauthorized` here means the player holds no seat in the game.
fn is_game_rule_rejection(error: &OrchestratorError) -> bool {
    matches!(
        error,
        OrchestratorError::DuplicateMove { .. }
            | OrchestratorError::StaleRound { .. }
            | OrchestratorError::GameAbandoned
            | OrchestratorError::Unauthorized(_)
    )
}

async fn handle_create_run(
    State(state): State<Arc<GatewayServerState>>,
    body: Bytes,
) -> Result<Json<CreateRunResponse>, ApiError> {
    let request = parse_json_body::<CreateRunRequest>(&body)?;
    let session = state.registry.create_session(&request.class_code)?;
    Ok(Json(CreateRunResponse {
        dashboard_url: state.dashboard_url(&session),
        student_url: state.student_url(&session),
        run_id: session.run_id,
        class_code: session.class_code,
    }))
}

async fn handle_resolve_class_code(
    State(state): State<Arc<GatewayServerState>>,
    Path(class_code): Path<String>,
) -> Result<Json<ClassCodeResponse>, ApiError> {
    let session = state.registry.resolve_class_code(&class_code)?;
    Ok(Json(ClassCodeResponse {
        run_id: session.run_id,
        class_code: session.class_code,
    }))
}

async fn handle_queue_join(
    State(state): State<Arc<GatewayServerState>>,
    body: Bytes,
) -> Result<Json<JoinQueueResponse>, ApiError> {
    let request = parse_json_body::<QueueRequest>(&body)?;
    let player_id = parse_player_id(&request.player_id)?;
    let outcome = state
        .registry
        .join_queue(&RunId::from_raw(request.run_id), player_id)?;
    Ok(Json(JoinQueueResponse::from(outcome)))
}

async fn handle_queue_leave(
    State(state): State<Arc<GatewayServerState>>,
    body: Bytes,
) -> Result<Json<LeaveQueueResponse>, ApiError> {
    let request = parse_json_body::<QueueRequest>(&body)?;
    let player_id = parse_player_id(&request.player_id)?;
    let status = state
        .registry
        .leave_queue(&RunId::from_raw(request.run_id), &player_id)
        .await?;
    Ok(Json(LeaveQueueResponse { status }))
}

async fn handle_game_move(
    State(state): State<Arc<GatewayServerState>>,
    body: Bytes,
) -> Result<Json<CommandResponse>, ApiError> {
    let request = parse_json_body::<SubmitMoveRequest>(&body)?;
    let player_id = parse_player_id(&request.player_id)?;
    let result = state
        .registry
        .submit_move(
            &GameId::from_raw(request.game_id),
            &player_id,
            request.round,
            request.decision,
        )
        .await;
    match result {
        Ok(()) => Ok(Json(CommandResponse::accepted())),
        Err(error) if is_game_rule_rejection(&error) => Ok(Json(CommandResponse::rejected(&error))),
        Err(error) => Err(error.into()),
    }
}

async fn handle_game_ready(
    State(state): State<Arc<GatewayServerState>>,
    body: Bytes,
) -> Result<Json<CommandResponse>, ApiError> {
    let request = parse_json_body::<ReadyRequest>(&body)?;
    let player_id = parse_player_id(&request.player_id)?;
    match state
        .registry
        .ready(&GameId::from_raw(request.game_id), &player_id)
        .await
    {
        Ok(()) => Ok(Json(CommandResponse::accepted())),
        Err(error) if is_game_rule_rejection(&error) => Ok(Json(CommandResponse::rejected(&error))),
        Err(error) => Err(error.into()),
    }
}

async fn handle_game_view(
    State(state): State<Arc<GatewayServerState>>,
    Path(game_id): Path<String>,
) -> Result<Response, ApiError> {
    let view = state.registry.game_view(&GameId::from_raw(game_id))?;
    Ok(Json(view).into_response())
}

async fn handle_dashboard_snapshot(
    State(state): State<Arc<GatewayServerState>>,
    Path(run_id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<Response, ApiError> {
    let token = require_dashboard_token(&query)?;
    let dashboard = state
        .registry
        .resolve_dashboard(&RunId::from_raw(run_id), token)?;
    let snapshot = dashboard.snapshot();
    Ok(Json(snapshot.as_ref()).into_response())
}

async fn handle_dashboard_ws_upgrade(
    State(state): State<Arc<GatewayServerState>>,
    Path(run_id): Path<String>,
    Query(query): Query<DashboardQuery>,
    websocket: WebSocketUpgrade,
) -> Response {
    let dashboard = match require_dashboard_token(&query).and_then(|token| {
        state
            .registry
            .resolve_dashboard(&RunId::from_raw(run_id), token)
            .map_err(ApiError::from)
    }) {
        Ok(dashboard) => dashboard,
        Err(error) => return error.into_response(),
    };
    websocket
        .on_upgrade(move |socket| run_dashboard_ws_connection(socket, dashboard))
        .into_response()
}

async fn handle_player_ws_upgrade(
    State(state): State<Arc<GatewayServerState>>,
    Path(game_id): Path<String>,
    Query(query): Query<PlayerSocketQuery>,
    websocket: WebSocketUpgrade,
) -> Response {
    let Some(raw_player_id) = query.player_id.as_deref() else {
        return ApiError::bad_request("InvalidPlayerId", "missing playerId query parameter")
            .into_response();
    };
    let player_id = match parse_player_id(raw_player_id) {
        Ok(player_id) => player_id,
        Err(error) => return error.into_response(),
    };
    let game_id = GameId::from_raw(game_id);
    let game = match state.registry.seated_game(&game_id, &player_id) {
        Ok(game) => game,
        Err(error) => return ApiError::from(error).into_response(),
    };
    websocket
        .on_upgrade(move |socket| run_player_ws_connection(state, socket, game, player_id))
        .into_response()
}

async fn handle_health(State(state): State<Arc<GatewayServerState>>) -> Response {
    match state.registry.list_sessions() {
        Ok(sessions) => Json(json!({
            "status": "ok",
            "runs": sessions.len(),
            "benchmark": state.registry.benchmark(),
        }))
        .into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

//! Request, response, and error payloads for the commons gateway.
use super::*;

#[derive(Debug)]
pub(super) struct ApiError {
    pub(super) status: StatusCode,
    pub(super) code: &'static str,
    pub(super) message: String,
}

impl ApiError {
    pub(super) fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub(super) fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub(super) fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", message)
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(error: OrchestratorError) -> Self {
        let status = match &error {
            OrchestratorError::InvalidClassCode(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            OrchestratorError::NotFound { .. } => StatusCode::NOT_FOUND,
            OrchestratorError::DuplicateMove { .. }
            | OrchestratorError::StaleRound { .. }
            | OrchestratorError::GameAbandoned
            | OrchestratorError::PlayerFinished { .. }
            | OrchestratorError::ActorUnavailable { .. } => StatusCode::CONFLICT,
            OrchestratorError::InvalidTransition(_)
            | OrchestratorError::Journal(_)
            | OrchestratorError::Poisoned(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %error, "orchestrator failure");
        }
        Self::new(status, error.code(), error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": {
                    "code": self.code,
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateRunRequest {
    pub(super) class_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateRunResponse {
    pub(super) run_id: RunId,
    pub(super) class_code: String,
    pub(super) dashboard_url: String,
    pub(super) student_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ClassCodeResponse {
    pub(super) run_id: RunId,
    pub(super) class_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct QueueRequest {
    pub(super) run_id: String,
    pub(super) player_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct JoinQueueResponse {
    pub(super) status: PlayerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) game_id: Option<GameId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) queue_position: Option<usize>,
}

impl From<JoinOutcome> for JoinQueueResponse {
    fn from(outcome: JoinOutcome) -> Self {
        match outcome {
            JoinOutcome::Queued { position } => Self {
                status: PlayerStatus::Queued,
                game_id: None,
                queue_position: Some(position),
            },
            JoinOutcome::InGame { game_id } => Self {
                status: PlayerStatus::InGame,
                game_id: Some(game_id),
                queue_position: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct LeaveQueueResponse {
    pub(super) status: PlayerStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SubmitMoveRequest {
    pub(super) game_id: String,
    pub(super) round: u8,
    pub(super) player_id: String,
    pub(super) decision: Decision,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ReadyRequest {
    pub(super) game_id: String,
    pub(super) player_id: String,
}

/// Outcome of a move or ready command. Game-rule refusals are reported
/// here rather than as HTTP errors.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CommandResponse {
    pub(super) accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) message: Option<String>,
}

impl CommandResponse {
    pub(super) fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
            message: None,
        }
    }

    pub(super) fn rejected(error: &OrchestratorError) -> Self {
        Self {
            accepted: false,
            reason: Some(error.code()),
            message: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct DashboardQuery {
    pub(super) token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PlayerSocketQuery {
    pub(super) player_id: Option<String>,
}

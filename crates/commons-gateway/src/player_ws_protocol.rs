//! Frames exchanged with a player over the game WebSocket.

use anyhow::{bail, Context, Result};
use commons_game::Decision;
use serde::Deserialize;
use serde_json::{json, Value};

pub const PLAYER_WS_HEARTBEAT_INTERVAL_SECONDS: u64 = 15;

pub const PLAYER_WS_ERROR_CODE_INVALID_JSON: &str = "invalid_json";
pub const PLAYER_WS_ERROR_CODE_UNSUPPORTED_TYPE: &str = "unsupported_type";
pub const PLAYER_WS_ERROR_CODE_INVALID_PAYLOAD: &str = "invalid_payload";

const PLAYER_WS_REQUEST_TYPES: &[&str] = &["move", "ready"];

/// Inbound player command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerWsRequest {
    Move { round: u8, decision: Decision },
    Ready,
}

#[derive(Debug, Deserialize)]
struct RawPlayerWsRequest {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    round: Option<u8>,
    #[serde(default)]
    decision: Option<Decision>,
}

pub fn parse_player_ws_request(raw: &str) -> Result<PlayerWsRequest> {
    let frame = serde_json::from_str::<RawPlayerWsRequest>(raw)
        .context("failed to parse player websocket frame JSON")?;
    match frame.kind.trim() {
        "move" => {
            let Some(round) = frame.round else {
                bail!("move frame requires a 'round'");
            };
            let Some(decision) = frame.decision else {
                bail!("move frame requires a 'decision' of Contribute or Protect");
            };
            Ok(PlayerWsRequest::Move { round, decision })
        }
        "ready" => Ok(PlayerWsRequest::Ready),
        other => bail!(
            "unsupported player websocket frame type '{}'; supported types are {}",
            other,
            PLAYER_WS_REQUEST_TYPES.join(", ")
        ),
    }
}

/// Maps a parse failure onto a stable error code.
pub fn classify_player_ws_parse_error(message: &str) -> &'static str {
    if message.contains("unsupported player websocket frame type") {
        PLAYER_WS_ERROR_CODE_UNSUPPORTED_TYPE
    } else if message.contains("failed to parse") {
        PLAYER_WS_ERROR_CODE_INVALID_JSON
    } else {
        PLAYER_WS_ERROR_CODE_INVALID_PAYLOAD
    }
}

pub fn build_player_ws_error_frame(code: &str, message: &str) -> Value {
    json!({
        "type": "error",
        "code": code,
        "message": message,
    })
}

pub fn build_player_ws_ack_frame(request: &PlayerWsRequest) -> Value {
    match request {
        PlayerWsRequest::Move { round, decision } => json!({
            "type": "moveAccepted",
            "round": round,
            "decision": decision,
        }),
        PlayerWsRequest::Ready => json!({ "type": "readyAccepted" }),
    }
}

pub fn build_player_ws_heartbeat_frame(ts_unix_ms: u64) -> Value {
    json!({
        "type": "heartbeat",
        "tsUnixMs": ts_unix_ms,
    })
}

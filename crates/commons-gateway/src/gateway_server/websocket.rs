//! Live dashboard and player WebSocket loops.
use super::*;
use commons_core::current_unix_timestamp_ms;
use commons_dashboard::RunAggregate;
use commons_orchestrator::{DashboardHandle, GameHandle, GameUpdate};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};

use crate::player_ws_protocol::{
    build_player_ws_ack_frame, build_player_ws_error_frame, build_player_ws_heartbeat_frame,
    classify_player_ws_parse_error, parse_player_ws_request, PlayerWsRequest,
    PLAYER_WS_HEARTBEAT_INTERVAL_SECONDS,
};

type WsSender = SplitSink<WebSocket, WsMessage>;

fn ws_message_from_json<T: Serialize>(payload: &T) -> Option<WsMessage> {
    match serde_json::to_string(payload) {
        Ok(raw) => Some(WsMessage::Text(raw.into())),
        Err(error) => {
            tracing::error!(error = %error, "failed to serialize websocket frame");
            None
        }
    }
}

async fn send_json<T: Serialize>(sender: &mut WsSender, payload: &T) -> bool {
    match ws_message_from_json(payload) {
        Some(message) => sender.send(message).await.is_ok(),
        None => true,
    }
}

fn heartbeat_interval() -> tokio::time::Interval {
    tokio::time::interval(Duration::from_secs(
        PLAYER_WS_HEARTBEAT_INTERVAL_SECONDS.max(1),
    ))
}

/// Pushes the current aggregate, then every newly published one.
pub(super) async fn run_dashboard_ws_connection(socket: WebSocket, dashboard: DashboardHandle) {
    let (mut sender, mut receiver) = socket.split();
    let mut snapshots = WatchStream::new(dashboard.subscribe());
    let mut heartbeat = heartbeat_interval();
    heartbeat.tick().await;

    loop {
        tokio::select! {
            snapshot = snapshots.next() => {
                let Some(snapshot) = snapshot else {
                    break;
                };
                let snapshot: &RunAggregate = snapshot.as_ref();
                if !send_json(&mut sender, snapshot).await {
                    break;
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(WsMessage::Ping(payload))) => {
                        if sender.send(WsMessage::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = heartbeat.tick() => {
                if sender.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!(run_id = %dashboard.run_id(), "dashboard websocket closed");
}

async fn dispatch_player_text_frame(
    state: &GatewayServerState,
    game: &GameHandle,
    player_id: &PlayerId,
    raw: &str,
) -> Value {
    let request = match parse_player_ws_request(raw) {
        Ok(request) => request,
        Err(error) => {
            let message = format!("{error:#}");
            return build_player_ws_error_frame(
                classify_player_ws_parse_error(&message),
                &message,
            );
        }
    };
    let result = match request {
        PlayerWsRequest::Move { round, decision } => {
            state
                .registry
                .submit_move(game.game_id(), player_id, round, decision)
                .await
        }
        PlayerWsRequest::Ready => state.registry.ready(game.game_id(), player_id).await,
    };
    match result {
        Ok(()) => build_player_ws_ack_frame(&request),
        Err(error) => build_player_ws_error_frame(error.code(), &error.to_string()),
    }
}

fn is_final_update(update: &GameUpdate) -> bool {
    matches!(
        update,
        GameUpdate::GameCompleted { .. } | GameUpdate::GameAbandoned { .. }
    )
}

/// Streams game updates to one seated player and relays their commands.
///
/// The socket closes after the game ends; closing it earlier counts as a disconnect.
pub(super) async fn run_player_ws_connection(
    state: Arc<GatewayServerState>,
    socket: WebSocket,
    game: GameHandle,
    player_id: PlayerId,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = BroadcastStream::new(game.subscribe());
    let mut heartbeat = heartbeat_interval();
    heartbeat.tick().await;

    let view = game.view();
    let mut finished = view.phase.is_terminal();
    let opening = GameUpdate::Snapshot { view };
    if send_json(&mut sender, &opening).await && !finished {
        loop {
            tokio::select! {
                update = updates.next() => {
                    match update {
                        Some(Ok(update)) => {
                            if !send_json(&mut sender, &update).await {
                                break;
                            }
                            if is_final_update(&update) {
                                finished = true;
                                break;
                            }
                        }
                        Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                            tracing::debug!(
                                game_id = %game.game_id(),
                                player_id = %player_id,
                                skipped,
                                "player socket lagged; resending snapshot"
                            );
                            let snapshot = GameUpdate::Snapshot { view: game.view() };
                            if !send_json(&mut sender, &snapshot).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                inbound = receiver.next() => {
                    let message = match inbound {
                        Some(Ok(message)) => message,
                        Some(Err(_)) | None => break,
                    };
                    match message {
                        WsMessage::Text(text) => {
                            let response =
                                dispatch_player_text_frame(&state, &game, &player_id, text.as_str()).await;
                            if !send_json(&mut sender, &response).await {
                                break;
                            }
                        }
                        WsMessage::Binary(_) => {
                            let response = build_player_ws_error_frame(
                                crate::player_ws_protocol::PLAYER_WS_ERROR_CODE_INVALID_PAYLOAD,
                                "player websocket frames must be JSON text",
                            );
                            if !send_json(&mut sender, &response).await {
                                break;
                            }
                        }
                        WsMessage::Ping(payload) => {
                            if sender.send(WsMessage::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        WsMessage::Pong(_) => {}
                        WsMessage::Close(_) => break,
                    }
                }
                _ = heartbeat.tick() => {
                    let frame = build_player_ws_heartbeat_frame(current_unix_timestamp_ms());
                    if sender.send(WsMessage::Ping(Vec::new().into())).await.is_err()
                        || !send_json(&mut sender, &frame).await
                    {
                        break;
                    }
                }
            }
        }
    }

    if finished {
        let _ = sender.send(WsMessage::Close(None)).await;
        return;
    }
    match state
        .registry
        .disconnect(game.run_id(), &player_id)
        .await
    {
        Ok(status) => tracing::debug!(
            game_id = %game.game_id(),
            player_id = %player_id,
            status = ?status,
            "player websocket disconnected"
        ),
        Err(error) => tracing::debug!(
            game_id = %game.game_id(),
            player_id = %player_id,
            error = %error,
            "player disconnect could not be applied"
        ),
    }
}

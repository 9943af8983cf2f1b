//! HTTP and WebSocket surface of the classroom commons orchestrator.
pub mod gateway_server;
pub mod player_ws_protocol;

pub use gateway_server::*;
pub use player_ws_protocol::*;

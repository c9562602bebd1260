use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Query,
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::AppState;
use crate::ws::connection::{on_accept, resolve_room};

/// Query parameters of a relay connection URL
#[derive(Debug, Default, Deserialize)]
pub struct RoomQuery {
    pub room: Option<String>,
}

/// Sorts an incoming request into a WebSocket upgrade (`Ok(Some)`), a plain
/// HTTP request (`Ok(None)`) or a broken handshake (`Err`, already a response).
///
/// Only requests that never asked for an upgrade count as plain. Anything
/// that asked and got the handshake wrong is rejected.
pub fn classify(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Option<WebSocketUpgrade>, Response> {
    match ws {
        Ok(ws) => Ok(Some(ws)),
        Err(
            WebSocketUpgradeRejection::MethodNotGet(_)
            | WebSocketUpgradeRejection::InvalidConnectionHeader(_)
            | WebSocketUpgradeRejection::InvalidUpgradeHeader(_),
        ) => Ok(None),
        Err(rejection) => {
            warn!("Rejected malformed WebSocket handshake: {}", rejection.body_text());
            Err(rejection.into_response())
        }
    }
}

/// Accepts a WebSocket upgrade into the room named by `?room=`.
///
/// A query string that fails to parse is treated like a missing room.
pub fn upgrade(ws: WebSocketUpgrade, query: Option<Query<RoomQuery>>, state: AppState) -> Response {
    let room_id = resolve_room(query.and_then(|Query(query)| query.room));
    info!("New WebSocket connection attempt for room {}", room_id);
    ws.on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| on_accept(state, socket, room_id))
}

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Query, State,
    },
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::debug;

use crate::handlers::relay::{classify, upgrade, RoomQuery};
use crate::models::{MemoryUsage, StatusResponse};
use crate::state::AppState;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

fn sample_memory() -> MemoryUsage {
    let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new()));
    let Ok(mut sys) = sys_lock.lock() else {
        return MemoryUsage::default();
    };
    sys.refresh_memory();
    let (rss, virtual_memory) = match sysinfo::get_current_pid() {
        Ok(pid) => {
            sys.refresh_process(pid);
            sys.process(pid)
                .map_or((0, 0), |process| (process.memory(), process.virtual_memory()))
        }
        Err(_) => (0, 0),
    };
    MemoryUsage {
        rss,
        virtual_memory,
        system_total: sys.total_memory(),
        system_used: sys.used_memory(),
    }
}

/// Read-only view of the relay. Never mutates the registry.
pub fn collect_status(state: &AppState) -> StatusResponse {
    let snapshot = state.registry.lock().snapshot();
    StatusResponse {
        uptime_seconds: state.uptime().as_secs(),
        connection_count: snapshot.total_members,
        room_count: snapshot.room_count,
        memory_usage: sample_memory(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

pub fn render_summary(status: &StatusResponse) -> String {
    format!(
        "Room relay is running\n\
         Uptime: {}s\n\
         Connections: {}\n\
         Rooms: {}\n\
         Memory (rss): {:.1} MB\n\
         Timestamp: {}\n",
        status.uptime_seconds,
        status.connection_count,
        status.room_count,
        status.memory_usage.rss as f64 / 1024.0 / 1024.0,
        status.timestamp,
    )
}

/// `GET /status`
pub async fn status_json(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    query: Option<Query<RoomQuery>>,
    State(state): State<AppState>,
) -> Response {
    match classify(ws) {
        Ok(Some(ws)) => return upgrade(ws, query, state),
        Ok(None) => {}
        Err(rejection) => return rejection,
    }
    debug!("Status requested");
    Json(collect_status(&state)).into_response()
}

/// Every other path: WebSocket upgrades join a room, plain requests get a
/// human-readable summary.
pub async fn status_text(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    query: Option<Query<RoomQuery>>,
    State(state): State<AppState>,
) -> Response {
    match classify(ws) {
        Ok(Some(ws)) => return upgrade(ws, query, state),
        Ok(None) => {}
        Err(rejection) => return rejection,
    }
    let body = render_summary(&collect_status(&state));
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

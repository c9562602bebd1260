use axum::extract::ws::WebSocket;
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::RelayError;
use crate::models::Connection;
use crate::state::AppState;
use crate::utils::scope_guard::ScopeGuard;
use crate::ws::attacher::AttachOptions;
use crate::ws::reaper::schedule_grace_eviction;
use crate::ws::registry::{Departure, SharedRegistry};

/// Room used when a client does not name one.
pub const DEFAULT_ROOM: &str = "default-room";

/// Maps the `room` query parameter to a room id. Missing or blank values land
/// in [`DEFAULT_ROOM`].
pub fn resolve_room(requested: Option<String>) -> String {
    requested
        .filter(|room| !room.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ROOM.to_string())
}

/// Adds the connection to its room, creating the room if needed. Returns the
/// room's member count afterwards.
pub fn register(registry: &SharedRegistry, connection: &Connection) -> usize {
    let mut registry = registry.lock();
    registry.upsert(&connection.room_id);
    registry.add_member(&connection.room_id, connection.connection_id);
    registry
        .get(&connection.room_id)
        .map_or(0, |room| room.member_count())
}

/// Serves an upgraded socket until it closes.
///
/// Teardown is driven by a drop guard so it also runs if this task is
/// cancelled; `on_close` is the only place membership is decremented.
pub async fn on_accept(state: AppState, socket: WebSocket, room_id: String) {
    let mut connection = Connection::new(room_id);
    let members = register(&state.registry, &connection);
    info!(
        "Connection {} joined room {} ({} members)",
        connection.connection_id, connection.room_id, members
    );

    if let Err(e) = connection.mark_attached() {
        on_error(connection.connection_id, &connection.room_id, &e);
        on_close(&state, &mut connection);
        return;
    }

    let connection_id = connection.connection_id;
    let room_id = connection.room_id.clone();
    let teardown_state = state.clone();
    let _teardown = ScopeGuard::new(move || on_close(&teardown_state, &mut connection));

    let options = AttachOptions {
        connection_id,
        shutdown: state.shutdown.clone(),
    };
    if let Err(e) = state.attacher.attach(socket, &room_id, options).await {
        on_error(connection_id, &room_id, &e);
    }
}

/// Releases the connection's room membership. Repeated calls are ignored.
pub fn on_close(state: &AppState, connection: &mut Connection) {
    if !connection.close() {
        debug!(
            "Connection {} already {:?}",
            connection.connection_id,
            connection.state()
        );
        return;
    }

    let departure = state
        .registry
        .lock()
        .remove_member(&connection.room_id, &connection.connection_id);

    match departure {
        Departure::Remaining(members) => info!(
            "Connection {} left room {} after {}s ({} members)",
            connection.connection_id,
            connection.room_id,
            (Utc::now() - connection.connected_at).num_seconds(),
            members
        ),
        Departure::Emptied => {
            info!(
                "Connection {} left room {}, room is empty",
                connection.connection_id, connection.room_id
            );
            schedule_grace_eviction(
                state.registry.clone(),
                connection.room_id.clone(),
                state.grace_period,
            );
        }
        Departure::RoomAbsent => warn!(
            "Connection {} closed after room {} was already deleted",
            connection.connection_id, connection.room_id
        ),
    }
}

/// Logs a connection failure. Never touches the registry; teardown follows
/// through `on_close`.
pub fn on_error(connection_id: Uuid, room_id: &str, err: &RelayError) {
    error!(
        "Connection {} in room {} failed: {}",
        connection_id, room_id, err
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ws::attacher::BroadcastAttacher;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    fn test_state() -> AppState {
        let (_tx, rx) = watch::channel(false);
        AppState::new(&Config::default(), Arc::new(BroadcastAttacher::new(8)), rx)
    }

    #[test]
    fn missing_or_empty_room_falls_back() {
        assert_eq!(resolve_room(None), DEFAULT_ROOM);
        assert_eq!(resolve_room(Some(String::new())), DEFAULT_ROOM);
        assert_eq!(resolve_room(Some("  ".to_string())), DEFAULT_ROOM);
        assert_eq!(resolve_room(Some("abc".to_string())), "abc");
    }

    #[tokio::test]
    async fn register_counts_members_per_room() {
        let state = test_state();
        let a = Connection::new("abc".to_string());
        let b = Connection::new("abc".to_string());
        let c = Connection::new("xyz".to_string());
        assert_eq!(register(&state.registry, &a), 1);
        assert_eq!(register(&state.registry, &b), 2);
        assert_eq!(register(&state.registry, &c), 1);

        let snapshot = state.registry.lock().snapshot();
        assert_eq!(snapshot.room_count, 2);
        assert_eq!(snapshot.total_members, 3);
    }

    #[tokio::test]
    async fn duplicate_close_decrements_once() {
        let state = test_state();
        let mut leaving = Connection::new("abc".to_string());
        let staying = Connection::new("abc".to_string());
        register(&state.registry, &leaving);
        register(&state.registry, &staying);
        leaving.mark_attached().unwrap();

        on_close(&state, &mut leaving);
        on_close(&state, &mut leaving);

        let registry = state.registry.lock();
        let room = registry.get("abc").unwrap();
        assert_eq!(room.member_count(), 1);
        assert!(room.member_ids.contains(&staying.connection_id));
    }

    #[tokio::test(start_paused = true)]
    async fn last_close_schedules_grace_eviction() {
        let state = test_state();
        let mut connection = Connection::new("abc".to_string());
        register(&state.registry, &connection);
        on_close(&state, &mut connection);
        assert!(state.registry.lock().contains("abc"));

        tokio::time::sleep(state.grace_period + Duration::from_secs(1)).await;
        assert!(!state.registry.lock().contains("abc"));
    }

    #[tokio::test(start_paused = true)]
    async fn close_after_room_was_reaped_is_harmless() {
        let state = test_state();
        let mut connection = Connection::new("abc".to_string());
        register(&state.registry, &connection);
        state.registry.lock().remove_member("abc", &connection.connection_id);
        tokio::time::advance(Duration::from_secs(2)).await;
        state.registry.lock().sweep_inactive(Duration::from_secs(1));

        on_close(&state, &mut connection);
        assert_eq!(state.registry.lock().snapshot().room_count, 0);
    }
}

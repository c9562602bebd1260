use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::models::{RegistrySnapshot, Room};

/// Registry handle shared by the accept tasks, grace timers and the reaper.
#[derive(Clone, Default)]
pub struct SharedRegistry(Arc<Mutex<RoomRegistry>>);

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Critical sections never await and a panic aborts the process, so a
    /// poisoned lock still guards consistent data.
    pub fn lock(&self) -> MutexGuard<'_, RoomRegistry> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Outcome of removing a member from a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The room was not in the registry (already evicted).
    RoomAbsent,
    /// The room still has members.
    Remaining(usize),
    /// The last member left; the room is now waiting out its grace period.
    Emptied,
}

/// In-memory map from room id to room metadata. Pure data, no I/O.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    /// Returns the existing room or creates an empty one. Idempotent.
    pub fn upsert(&mut self, room_id: &str) -> &Room {
        self.rooms.entry(room_id.to_string()).or_insert_with(|| {
            debug!("Creating room {}", room_id);
            Room::new(room_id, Instant::now())
        })
    }

    /// Adds a member to an existing room. No-op (returns `false`) when the
    /// room is absent; callers `upsert` first.
    pub fn add_member(&mut self, room_id: &str, connection_id: Uuid) -> bool {
        match self.rooms.get_mut(room_id) {
            Some(room) => {
                room.member_ids.insert(connection_id);
                room.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Removes a member. Emptying a room does not delete it; the caller
    /// schedules a grace eviction that re-checks the room when it fires.
    pub fn remove_member(&mut self, room_id: &str, connection_id: &Uuid) -> Departure {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return Departure::RoomAbsent;
        };
        room.member_ids.remove(connection_id);
        room.last_activity = Instant::now();
        if room.is_empty() {
            Departure::Emptied
        } else {
            Departure::Remaining(room.member_count())
        }
    }

    /// Grace timer callback. Deletes the room only if it is still present,
    /// still empty and has seen no join or leave for `grace`. A missing room
    /// is not an error.
    pub fn evict_if_abandoned(&mut self, room_id: &str, grace: Duration) -> bool {
        let now = Instant::now();
        let abandoned = self
            .rooms
            .get(room_id)
            .is_some_and(|room| room.is_empty() && room.idle_for(now) >= grace);
        if abandoned {
            self.rooms.remove(room_id);
        }
        abandoned
    }

    /// Deletes every empty room idle for longer than `max_idle`. Returns the
    /// ids of the evicted rooms.
    pub fn sweep_inactive(&mut self, max_idle: Duration) -> Vec<String> {
        let now = Instant::now();
        let stale: Vec<String> = self
            .rooms
            .values()
            .filter(|room| room.is_empty() && room.idle_for(now) > max_idle)
            .map(|room| room.id.clone())
            .collect();
        for room_id in &stale {
            if let Some(room) = self.rooms.remove(room_id) {
                debug!(
                    "Swept room {}, created {}s ago",
                    room_id,
                    now.saturating_duration_since(room.created_at).as_secs()
                );
            }
        }
        stale
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            room_count: self.rooms.len(),
            total_members: self.rooms.values().map(Room::member_count).sum(),
        }
    }
}

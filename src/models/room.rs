use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// One collaboratively edited document's connection pool.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub member_ids: HashSet<Uuid>,
    pub created_at: Instant,
    pub last_activity: Instant,
}

impl Room {
    pub fn new(id: &str, now: Instant) -> Self {
        Self {
            id: id.to_string(),
            member_ids: HashSet::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn member_count(&self) -> usize {
        self.member_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }

    /// Time elapsed since the last join or leave.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

/// Aggregate view of the registry used for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub room_count: usize,
    pub total_members: usize,
}

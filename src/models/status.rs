use serde::{Deserialize, Serialize};

/// Process memory figures, in bytes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub rss: u64,
    pub virtual_memory: u64,
    pub system_total: u64,
    pub system_used: u64,
}

/// Response for `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub uptime_seconds: u64,
    pub connection_count: usize,
    pub room_count: usize,
    pub memory_usage: MemoryUsage,
    #[serde(rename = "timestampISO8601")]
    pub timestamp: String,
}

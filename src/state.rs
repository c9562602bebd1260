use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::Config;
use crate::ws::attacher::SyncAttacher;
use crate::ws::registry::SharedRegistry;

/// State shared by every route, constructed once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub attacher: Arc<dyn SyncAttacher>,
    pub grace_period: Duration,
    pub idle_timeout: Duration,
    pub started_at: Instant,
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        config: &Config,
        attacher: Arc<dyn SyncAttacher>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry: SharedRegistry::new(),
            attacher,
            grace_period: config.grace_period(),
            idle_timeout: config.idle_timeout(),
            started_at: Instant::now(),
            shutdown,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

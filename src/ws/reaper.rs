use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::models::RegistrySnapshot;
use crate::utils::shutdown::wait_for_shutdown;
use crate::ws::registry::SharedRegistry;

/// Fire-and-recheck grace timer for a room whose last member just left.
///
/// The timer is never cancelled. When it fires the registry decides whether
/// the room is still abandoned, so a rejoin simply makes it a no-op.
pub fn schedule_grace_eviction(registry: SharedRegistry, room_id: String, grace: Duration) {
    let Ok(handle) = Handle::try_current() else {
        warn!("No runtime available, room {} left to the reaper", room_id);
        return;
    };
    handle.spawn(async move {
        tokio::time::sleep(grace).await;
        if registry.lock().evict_if_abandoned(&room_id, grace) {
            info!("Room {} deleted after grace period", room_id);
        } else {
            debug!("Grace timer for room {} found it active or gone", room_id);
        }
    });
}

/// One reaper pass: evicts idle empty rooms and reports what is left.
pub fn sweep_once(registry: &SharedRegistry, max_idle: Duration) -> (Vec<String>, RegistrySnapshot) {
    let mut registry = registry.lock();
    let evicted = registry.sweep_inactive(max_idle);
    (evicted, registry.snapshot())
}

/// Periodic sweep until shutdown is published. The first sweep runs one full
/// `period` after start.
pub async fn run_reaper(
    registry: SharedRegistry,
    period: Duration,
    max_idle: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    info!(
        "Idle room reaper started (every {}s, idle timeout {}s)",
        period.as_secs(),
        max_idle.as_secs()
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (evicted, snapshot) = sweep_once(&registry, max_idle);
                for room_id in &evicted {
                    info!("Reaper deleted idle room {}", room_id);
                }
                info!(
                    "Status: {} rooms, {} connections ({} idle rooms deleted)",
                    snapshot.room_count,
                    snapshot.total_members,
                    evicted.len()
                );
            }
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("Idle room reaper stopped");
                break;
            }
        }
    }
}

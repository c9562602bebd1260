use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::RelayError;
use crate::utils::shutdown::wait_for_shutdown;

/// Per-connection options handed to the sync attacher.
#[derive(Debug, Clone)]
pub struct AttachOptions {
    pub connection_id: Uuid,
    /// Flips to `true` when the process is shutting down.
    pub shutdown: watch::Receiver<bool>,
}

/// Owns a connection's data channel once it has been accepted into a room.
///
/// `attach` runs until the connection ends. The relay never looks at the
/// payloads exchanged here.
#[async_trait]
pub trait SyncAttacher: Send + Sync + 'static {
    async fn attach(
        &self,
        socket: WebSocket,
        room_id: &str,
        options: AttachOptions,
    ) -> Result<(), RelayError>;
}

#[derive(Debug, Clone)]
struct RelayFrame {
    sender_id: Uuid,
    message: Message,
}

/// Fans every text/binary frame out to the other connections of the same room.
pub struct BroadcastAttacher {
    channels: Mutex<HashMap<String, broadcast::Sender<RelayFrame>>>,
    capacity: usize,
}

impl BroadcastAttacher {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            // broadcast::channel panics on zero capacity
            capacity: capacity.max(1),
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<RelayFrame>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(
        &self,
        room_id: &str,
    ) -> (broadcast::Sender<RelayFrame>, broadcast::Receiver<RelayFrame>) {
        let mut channels = self.channels();
        let tx = channels
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel::<RelayFrame>(self.capacity).0)
            .clone();
        let rx = tx.subscribe();
        (tx, rx)
    }

    /// Drops the room's channel once nobody listens on it anymore.
    fn release(&self, room_id: &str) {
        let mut channels = self.channels();
        if channels
            .get(room_id)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            channels.remove(room_id);
            debug!("Released relay channel for room {}", room_id);
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.channels()
            .get(room_id)
            .map_or(0, |tx| tx.receiver_count())
    }

    #[cfg(test)]
    pub fn channel_count(&self) -> usize {
        self.channels().len()
    }
}

#[async_trait]
impl SyncAttacher for BroadcastAttacher {
    async fn attach(
        &self,
        socket: WebSocket,
        room_id: &str,
        options: AttachOptions,
    ) -> Result<(), RelayError> {
        let AttachOptions {
            connection_id,
            mut shutdown,
        } = options;
        let (tx, mut rx) = self.subscribe(room_id);
        let (mut sink, mut stream) = socket.split();

        // Client -> room
        let inbound = async {
            while let Some(message) = stream.next().await {
                match message? {
                    message @ (Message::Binary(_) | Message::Text(_)) => {
                        // Err only means no one else is listening yet
                        let _ = tx.send(RelayFrame {
                            sender_id: connection_id,
                            message,
                        });
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Ok::<(), RelayError>(())
        };

        // Room -> client, skipping our own frames
        let outbound = async {
            loop {
                match rx.recv().await {
                    Ok(frame) => {
                        if frame.sender_id == connection_id {
                            continue;
                        }
                        sink.send(frame.message).await?;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            "Connection {} in room {} lagged by {} frames",
                            connection_id, room_id, skipped
                        );
                        return Err(RelayError::Lagged(skipped));
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            Ok::<(), RelayError>(())
        };

        let mut shutting_down = false;
        let outcome = tokio::select! {
            res = inbound => res,
            res = outbound => res,
            _ = wait_for_shutdown(&mut shutdown) => {
                shutting_down = true;
                Ok(())
            }
        };

        drop(rx);
        self.release(room_id);

        if shutting_down {
            debug!("Closing connection {} for shutdown", connection_id);
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!("Close frame to {} not delivered: {}", connection_id, e);
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_are_shared_per_room_and_released_when_unused() {
        let attacher = BroadcastAttacher::new(8);
        let (_tx_a, rx_a) = attacher.subscribe("abc");
        let (_tx_b, rx_b) = attacher.subscribe("abc");
        let (_tx_c, rx_c) = attacher.subscribe("xyz");
        assert_eq!(attacher.subscriber_count("abc"), 2);
        assert_eq!(attacher.subscriber_count("xyz"), 1);
        assert_eq!(attacher.channel_count(), 2);

        drop(rx_a);
        attacher.release("abc");
        assert_eq!(attacher.channel_count(), 2);

        drop(rx_b);
        attacher.release("abc");
        assert_eq!(attacher.subscriber_count("abc"), 0);
        assert_eq!(attacher.channel_count(), 1);

        drop(rx_c);
        attacher.release("xyz");
        attacher.release("xyz");
        assert_eq!(attacher.channel_count(), 0);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let attacher = BroadcastAttacher::new(0);
        let (tx, mut rx) = attacher.subscribe("abc");
        tx.send(RelayFrame {
            sender_id: Uuid::new_v4(),
            message: Message::Binary(vec![1]),
        })
        .unwrap();
        assert!(rx.try_recv().is_ok());
    }
}

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Attached,
    Closed,
}

/// One client's transport-level session.
///
/// Rooms only hold the `connection_id`; this record is owned by the task
/// serving the socket.
#[derive(Debug)]
pub struct Connection {
    pub connection_id: Uuid,
    pub room_id: String,
    pub connected_at: DateTime<Utc>,
    state: ConnectionState,
}

impl Connection {
    pub fn new(room_id: String) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            room_id,
            connected_at: Utc::now(),
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connecting -> Attached, once the socket has been handed to the sync attacher.
    pub fn mark_attached(&mut self) -> Result<(), RelayError> {
        match self.state {
            ConnectionState::Connecting => {
                self.state = ConnectionState::Attached;
                Ok(())
            }
            from => Err(RelayError::IllegalTransition {
                from,
                to: ConnectionState::Attached,
            }),
        }
    }

    /// Moves to Closed. Returns `true` only for the first call, so teardown
    /// side effects run exactly once.
    pub fn close(&mut self) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        self.state = ConnectionState::Closed;
        true
    }
}

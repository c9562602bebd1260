use thiserror::Error;

use crate::models::ConnectionState;

/// Errors raised while serving a single relay connection.
///
/// None of these escape the accept task; they are logged and the connection
/// is torn down.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    #[error("receiver lagged behind and skipped {0} frames")]
    Lagged(u64),

    #[error("illegal connection transition from {from:?} to {to:?}")]
    IllegalTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

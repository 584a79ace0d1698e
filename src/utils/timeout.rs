use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Default timeout for single operations such as one connect attempt
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed interval between stream client reconnect attempts
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// How long tools wait for queued frames to reach the socket
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Time given to sessions to wind down on server shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `fut`, mapping expiry to [`ProtocolError::Timeout`]
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(res) => res,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

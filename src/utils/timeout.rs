//! Async timeout wrappers and the default durations used across the engine.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// Interval at which an external heartbeat policy is expected to probe idle peers.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// How long a graceful disconnect waits for its notice to flush before closing anyway.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// How long server shutdown waits for live connections to drain.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a future with a deadline, mapping expiry to [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_deadline() {
        let out = with_timeout_error(async { Ok(42) }, Duration::from_secs(1)).await;
        assert!(matches!(out, Ok(42)));
    }

    #[tokio::test]
    async fn maps_expiry_to_timeout() {
        let out = with_timeout_error(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(out, Err(ProtocolError::Timeout)));
    }
}

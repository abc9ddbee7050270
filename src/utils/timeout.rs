//! Async timeout wrappers.

use crate::error::{DistError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Default bound on opening a connection plus the whole handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a fallible future, mapping elapsed time to `DistError::Timeout`.
pub async fn with_timeout_error<F, T>(fut: F, dur: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(dur, fut).await {
        Ok(result) => result,
        Err(_) => Err(DistError::Timeout),
    }
}

/// Like [`with_timeout_error`], unbounded when `dur` is `None`.
pub async fn with_optional_timeout<F, T>(fut: F, dur: Option<Duration>) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match dur {
        Some(dur) => with_timeout_error(fut, dur).await,
        None => fut.await,
    }
}

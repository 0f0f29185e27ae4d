//! Shared utility functions.

use std::future::Future;
use std::time::Duration;

use tokio::time::{timeout, Instant};

use crate::{Error, Result};

/// Bound a fallible future by `duration`.
///
/// The future is dropped on expiry. Callers holding a provider from
/// [`crate::core::LoadBalancer::select_server`] still owe it a release.
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, fut).await {
        Ok(inner) => inner,
        Err(_) => Err(Error::Timeout(duration)),
    }
}

/// Run `fut` and measure how long it took.
pub async fn timed<F, T>(fut: F) -> (T, Duration)
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    (out, start.elapsed())
}

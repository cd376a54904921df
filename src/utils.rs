use anyhow::{bail, Result};
use core::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::types::FetchTimeout;

/// with_timeout awaits `fut`, giving up with `FetchTimeout` once `timeout`
/// elapses. The abandoned future is dropped, which cancels it.
pub(crate) async fn with_timeout<T, E>(
    fut: impl Future<Output = core::result::Result<T, E>>,
    timeout: Option<Duration>,
) -> Result<T>
where
    E: Into<anyhow::Error>,
{
    let Some(limit) = timeout else {
        return fut.await.map_err(Into::into);
    };
    match tokio::time::timeout(limit, fut).await {
        Ok(r) => r.map_err(Into::into),
        Err(_) => {
            warn!(timeout = ?limit, "Fetch timed out");
            bail!(FetchTimeout(limit))
        }
    }
}

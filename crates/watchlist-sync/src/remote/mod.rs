//! Remote (per-user, network-backed) watchlist stores.

pub mod firebase;
pub mod memory;

use std::future::Future;
use std::time::Duration;
use stockwatch_core::{SyncError, SyncResult};

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound a remote operation; running past `limit` fails with `RemoteTimeout`.
pub(crate) async fn bounded<T, F>(limit: Duration, operation: F) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::RemoteTimeout(limit)),
    }
}

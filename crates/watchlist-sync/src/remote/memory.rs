use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use stockwatch_core::{
    ensure_principal, MergeSummary, RemoteStore, Session, SyncError, SyncResult, Ticker,
    UserProfile, Watchlist, WatchlistEntry,
};

use super::{bounded, DEFAULT_REMOTE_TIMEOUT};

/// Number of calls each remote operation has received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteCallCounts {
    pub fetch: usize,
    pub merge: usize,
    pub remove: usize,
    pub create_profile: usize,
}

impl RemoteCallCounts {
    pub fn total(&self) -> usize {
        self.fetch + self.merge + self.remove + self.create_profile
    }
}

/// Remote store kept in process memory.
///
/// Used as the offline backend when no cloud database is configured. It can
/// be switched offline and given artificial latency to exercise outage paths.
pub struct MemoryRemoteStore {
    watchlists: DashMap<String, Watchlist>,
    profiles: DashMap<String, UserProfile>,
    online: AtomicBool,
    latency: Duration,
    timeout: Duration,
    fetch_calls: AtomicUsize,
    merge_calls: AtomicUsize,
    remove_calls: AtomicUsize,
    profile_calls: AtomicUsize,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            watchlists: DashMap::new(),
            profiles: DashMap::new(),
            online: AtomicBool::new(true),
            latency: Duration::ZERO,
            timeout: DEFAULT_REMOTE_TIMEOUT,
            fetch_calls: AtomicUsize::new(0),
            merge_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Seed a user's watchlist directly, bypassing call accounting.
    pub fn seed(&self, user_id: &str, entries: Vec<WatchlistEntry>) {
        self.watchlists.insert(user_id.to_string(), entries.into());
    }

    pub fn snapshot(&self, user_id: &str) -> Watchlist {
        self.watchlists
            .get(user_id)
            .map(|w| w.value().clone())
            .unwrap_or_default()
    }

    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles.get(user_id).map(|p| p.value().clone())
    }

    pub fn calls(&self) -> RemoteCallCounts {
        RemoteCallCounts {
            fetch: self.fetch_calls.load(Ordering::SeqCst),
            merge: self.merge_calls.load(Ordering::SeqCst),
            remove: self.remove_calls.load(Ordering::SeqCst),
            create_profile: self.profile_calls.load(Ordering::SeqCst),
        }
    }

    async fn round_trip(&self) -> SyncResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(SyncError::RemoteUnavailable("remote store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch(&self, principal: &Session, user_id: &str) -> SyncResult<Watchlist> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        ensure_principal(principal, user_id)?;
        bounded(self.timeout, async {
            self.round_trip().await?;
            Ok(self.snapshot(user_id))
        })
        .await
    }

    async fn merge(
        &self,
        principal: &Session,
        user_id: &str,
        entries: Vec<WatchlistEntry>,
    ) -> SyncResult<MergeSummary> {
        self.merge_calls.fetch_add(1, Ordering::SeqCst);
        ensure_principal(principal, user_id)?;
        bounded(self.timeout, async {
            self.round_trip().await?;
            let mut watchlist = self.watchlists.entry(user_id.to_string()).or_default();
            Ok(watchlist.merge(entries))
        })
        .await
    }

    async fn remove(&self, principal: &Session, user_id: &str, ticker: &Ticker) -> SyncResult<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        ensure_principal(principal, user_id)?;
        bounded(self.timeout, async {
            self.round_trip().await?;
            if let Some(mut watchlist) = self.watchlists.get_mut(user_id) {
                watchlist.remove(ticker);
            }
            Ok(())
        })
        .await
    }

    async fn create_profile(
        &self,
        principal: &Session,
        user_id: &str,
        profile: &UserProfile,
    ) -> SyncResult<()> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        ensure_principal(principal, user_id)?;
        bounded(self.timeout, async {
            self.round_trip().await?;
            self.profiles.insert(user_id.to_string(), profile.clone());
            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stockwatch_core::SignInMethod;

    fn session(user_id: &str) -> Session {
        Session {
            user_id: user_id.to_string(),
            email: None,
            id_token: format!("token-{}", user_id),
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::hours(1),
            method: SignInMethod::Password,
        }
    }

    fn entry(symbol: &str, secs: i64) -> WatchlistEntry {
        WatchlistEntry::new(
            Ticker::parse(symbol).unwrap(),
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_merge_does_not_replace() {
        let store = MemoryRemoteStore::new();
        let alice = session("alice");
        store.seed("alice", vec![entry("MSFT", 30), entry("GOOG", 40)]);

        let summary = store
            .merge(&alice, "alice", vec![entry("AAPL", 10), entry("MSFT", 20)])
            .await
            .unwrap();
        assert_eq!(summary.changed(), 2);

        let watchlist = store.fetch(&alice, "alice").await.unwrap();
        assert_eq!(
            watchlist.entries(),
            vec![entry("AAPL", 10), entry("MSFT", 20), entry("GOOG", 40)]
        );
    }

    #[tokio::test]
    async fn test_other_user_not_authorized() {
        let store = MemoryRemoteStore::new();
        let err = store.fetch(&session("alice"), "bob").await.unwrap_err();
        assert!(matches!(err, SyncError::NotAuthorized { ref user_id, .. } if user_id == "bob"));
    }

    #[tokio::test]
    async fn test_offline_and_timeout() {
        let store = MemoryRemoteStore::new();
        store.set_online(false);
        let err = store.fetch(&session("alice"), "alice").await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable(_)));

        let slow = MemoryRemoteStore::new()
            .with_latency(Duration::from_millis(200))
            .with_timeout(Duration::from_millis(20));
        let err = slow.fetch(&session("alice"), "alice").await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteTimeout(_)));
        assert!(err.is_remote_outage());
    }

    #[tokio::test]
    async fn test_remove_and_profile() {
        let store = MemoryRemoteStore::new();
        let alice = session("alice");
        store.seed("alice", vec![entry("AAPL", 0)]);

        store.remove(&alice, "alice", &Ticker::parse("TSLA").unwrap()).await.unwrap();
        store.remove(&alice, "alice", &Ticker::parse("AAPL").unwrap()).await.unwrap();
        assert!(store.snapshot("alice").is_empty());

        let profile = UserProfile::for_signup(Some("a@example.com".to_string()));
        store.create_profile(&alice, "alice", &profile).await.unwrap();
        assert_eq!(store.profile("alice"), Some(profile));
        assert_eq!(store.calls().remove, 2);
        assert_eq!(store.calls().total(), 3);
    }
}

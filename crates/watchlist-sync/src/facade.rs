use serde::Serialize;
use std::sync::Arc;
use stockwatch_core::{
    LocalStore, RemoteStore, Session, StoreKind, SyncResult, Ticker, Watchlist, WatchlistEntry,
};

use crate::session::SessionManager;

/// A watchlist read together with where it came from.
#[derive(Debug, Clone, Serialize)]
pub struct WatchlistView {
    pub watchlist: Watchlist,
    pub source: StoreKind,
    /// Set when the remote store could not be reached and local contents
    /// are shown instead.
    pub warning: Option<String>,
}

/// Routes watchlist operations to the store the current session makes
/// authoritative: remote when signed in, local otherwise.
pub struct WatchlistFacade {
    sessions: Arc<SessionManager>,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
}

impl WatchlistFacade {
    pub fn new(
        sessions: Arc<SessionManager>,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            sessions,
            local,
            remote,
        }
    }

    pub fn active_store(&self) -> StoreKind {
        if self.sessions.is_authenticated() {
            StoreKind::Remote
        } else {
            StoreKind::Local
        }
    }

    pub async fn list(&self) -> SyncResult<Watchlist> {
        match self.sessions.current() {
            Some(session) => self.remote.fetch(&session, &session.user_id).await,
            None => Ok(self.local.get().await),
        }
    }

    /// Like [`list`](Self::list), but a remote outage degrades to the local
    /// watchlist with a warning instead of failing.
    pub async fn list_with_fallback(&self) -> SyncResult<WatchlistView> {
        let Some(session) = self.sessions.current() else {
            return Ok(WatchlistView {
                watchlist: self.local.get().await,
                source: StoreKind::Local,
                warning: None,
            });
        };

        match self.remote.fetch(&session, &session.user_id).await {
            Ok(watchlist) => Ok(WatchlistView {
                watchlist,
                source: StoreKind::Remote,
                warning: None,
            }),
            Err(e) if e.is_remote_outage() => {
                tracing::warn!(user_id = %session.user_id, "Showing local watchlist: {}", e);
                Ok(WatchlistView {
                    watchlist: self.local.get().await,
                    source: StoreKind::Local,
                    warning: Some(format!("Cloud watchlist unavailable: {}", e)),
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn add(&self, raw_ticker: &str) -> SyncResult<Ticker> {
        let ticker = Ticker::parse(raw_ticker)?;
        let entry = WatchlistEntry::now(ticker.clone());
        match self.sessions.current() {
            Some(session) => {
                self.remote
                    .merge(&session, &session.user_id, vec![entry])
                    .await?;
            }
            None => self.local.add(entry).await?,
        }
        tracing::debug!(ticker = %ticker, store = %self.active_store(), "Added to watchlist");
        Ok(ticker)
    }

    pub async fn remove(&self, raw_ticker: &str) -> SyncResult<Ticker> {
        let ticker = Ticker::parse(raw_ticker)?;
        match self.sessions.current() {
            Some(session) => self.remote.remove(&session, &session.user_id, &ticker).await?,
            None => self.local.remove(&ticker).await?,
        }
        tracing::debug!(ticker = %ticker, "Removed from watchlist");
        Ok(ticker)
    }

    pub async fn contains(&self, raw_ticker: &str) -> SyncResult<bool> {
        let ticker = Ticker::parse(raw_ticker)?;
        Ok(self.list().await?.contains(&ticker))
    }

    pub fn session(&self) -> Option<Session> {
        self.sessions.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryLocalStore, MemoryRemoteStore};
    use chrono::Utc;
    use stockwatch_core::{SessionEvent, SignInMethod, SyncError, ValidationError};

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

    struct Harness {
        facade: WatchlistFacade,
        sessions: Arc<SessionManager>,
        local: Arc<MemoryLocalStore>,
        remote: Arc<MemoryRemoteStore>,
    }

    fn harness() -> Harness {
        let sessions = Arc::new(SessionManager::new());
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemoteStore::new());
        let facade = WatchlistFacade::new(sessions.clone(), local.clone(), remote.clone());
        Harness {
            facade,
            sessions,
            local,
            remote,
        }
    }

    #[tokio::test]
    async fn test_anonymous_calls_never_touch_remote() {
        let h = harness();
        assert_eq!(h.facade.active_store(), StoreKind::Local);

        h.facade.add("aapl").await.unwrap();
        h.facade.add("MSFT").await.unwrap();
        h.facade.remove("MSFT").await.unwrap();
        assert!(h.facade.contains("AAPL").await.unwrap());

        assert_eq!(h.remote.calls().total(), 0);
        assert_eq!(h.local.get().await.len(), 1);
    }

    #[tokio::test]
    async fn test_signed_in_calls_never_touch_local() {
        let h = harness();
        h.sessions.publish(SessionEvent::SignedIn(session("alice")));
        assert_eq!(h.facade.active_store(), StoreKind::Remote);

        h.facade.add("NVDA").await.unwrap();
        h.facade.add("AMD").await.unwrap();
        h.facade.remove("AMD").await.unwrap();

        assert!(h.local.get().await.is_empty());
        let remote = h.remote.snapshot("alice");
        assert_eq!(remote.tickers(), vec![Ticker::parse("NVDA").unwrap()]);
    }

    #[tokio::test]
    async fn test_add_twice_one_entry_earliest_kept() {
        let h = harness();
        h.sessions.publish(SessionEvent::SignedIn(session("alice")));

        h.facade.add("AAPL").await.unwrap();
        let first = h.remote.snapshot("alice").entries()[0].clone();
        h.facade.add("aapl").await.unwrap();

        let watchlist = h.facade.list().await.unwrap();
        assert_eq!(watchlist.entries(), vec![first]);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let h = harness();
        h.facade.add("AAPL").await.unwrap();
        let before = h.facade.list().await.unwrap();

        h.facade.remove("TSLA").await.unwrap();
        assert_eq!(h.facade.list().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_invalid_ticker_rejected() {
        let h = harness();
        let err = h.facade.add("  ").await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::EmptyTicker)
        ));
        let err = h.facade.add("BRK.B").await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::TickerInvalidChar { ch: '.', .. })
        ));
    }

    #[tokio::test]
    async fn test_fallback_to_local_when_remote_down() {
        let h = harness();
        h.facade.add("AAPL").await.unwrap();
        h.sessions.publish(SessionEvent::SignedIn(session("alice")));
        h.remote.set_online(false);

        assert!(h.facade.list().await.unwrap_err().is_remote_outage());

        let view = h.facade.list_with_fallback().await.unwrap();
        assert_eq!(view.source, StoreKind::Local);
        assert!(view.warning.is_some());
        assert_eq!(view.watchlist.len(), 1);

        h.remote.set_online(true);
        let view = h.facade.list_with_fallback().await.unwrap();
        assert_eq!(view.source, StoreKind::Remote);
        assert!(view.warning.is_none());
    }

    #[tokio::test]
    async fn test_sign_out_routes_back_to_local() {
        let h = harness();
        h.sessions.publish(SessionEvent::SignedIn(session("alice")));
        h.facade.add("AAPL").await.unwrap();
        h.sessions.publish(SessionEvent::SignedOut {
            user_id: "alice".to_string(),
        });

        assert_eq!(h.facade.active_store(), StoreKind::Local);
        assert!(h.facade.list().await.unwrap().is_empty());
    }
}

use async_trait::async_trait;

use crate::{
    AuthError, FederatedCredential, MergeSummary, Session, SyncError, SyncResult, Ticker,
    UserProfile, Watchlist, WatchlistEntry,
};

/// Client-local watchlist for anonymous sessions.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Current watchlist. Missing or unreadable data reads as empty.
    async fn get(&self) -> Watchlist;

    /// Persist an entry. Adding an existing ticker changes nothing.
    async fn add(&self, entry: WatchlistEntry) -> SyncResult<()>;

    /// Remove a ticker. Removing an absent ticker is a no-op.
    async fn remove(&self, ticker: &Ticker) -> SyncResult<()>;

    async fn clear(&self) -> SyncResult<()>;

    /// Remove exactly the given entries, leaving anything added or re-added
    /// since they were read. Used after a reconciliation merge.
    async fn remove_merged(&self, entries: &[WatchlistEntry]) -> SyncResult<()>;
}

/// Keeps the signed-in session across restarts.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    async fn load_session(&self) -> Option<Session>;

    async fn save_session(&self, session: &Session) -> SyncResult<()>;

    async fn clear_session(&self) -> SyncResult<()>;
}

/// Per-user, network-backed watchlist.
///
/// Every call takes the authenticated `principal`; requests for any other
/// user fail with [`SyncError::NotAuthorized`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch(&self, principal: &Session, user_id: &str) -> SyncResult<Watchlist>;

    /// Union by ticker, earliest `added_at` wins. Entries already present
    /// remotely and not named in `entries` are never touched. The whole set
    /// is applied in one write.
    async fn merge(
        &self,
        principal: &Session,
        user_id: &str,
        entries: Vec<WatchlistEntry>,
    ) -> SyncResult<MergeSummary>;

    async fn remove(&self, principal: &Session, user_id: &str, ticker: &Ticker) -> SyncResult<()>;

    /// Write the profile record without touching the watchlist.
    async fn create_profile(
        &self,
        principal: &Session,
        user_id: &str,
        profile: &UserProfile,
    ) -> SyncResult<()>;

    fn backend_name(&self) -> &'static str;
}

/// Reject requests for a user other than the authenticated principal.
pub fn ensure_principal(principal: &Session, user_id: &str) -> SyncResult<()> {
    if principal.user_id != user_id {
        return Err(SyncError::NotAuthorized {
            user_id: user_id.to_string(),
            reason: format!("signed in as '{}'", principal.user_id),
        });
    }
    Ok(())
}

/// Backend-agnostic identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_in_with_federated(
        &self,
        credential: &FederatedCredential,
    ) -> Result<Session, AuthError>;

    async fn sign_out(&self, session: &Session) -> Result<(), AuthError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    /// Exchange the refresh token for a fresh id token.
    async fn refresh(&self, session: &Session) -> Result<Session, AuthError>;

    fn provider_name(&self) -> &'static str;
}

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::validation::validate_ticker;
use crate::ValidationError;

/// Stock symbol, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        validate_ticker(trimmed)?;
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Ticker {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ticker::parse(s)
    }
}

impl TryFrom<String> for Ticker {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ticker::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One saved ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistEntry {
    pub ticker: Ticker,
    pub added_at: DateTime<Utc>,
}

impl WatchlistEntry {
    pub fn new(ticker: Ticker, added_at: DateTime<Utc>) -> Self {
        Self { ticker, added_at }
    }

    pub fn now(ticker: Ticker) -> Self {
        Self::new(ticker, Utc::now())
    }
}

/// What happened to a single entry when it was folded into a watchlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeEffect {
    Inserted,
    /// The ticker existed with a later timestamp; the earlier one replaced it.
    Backdated,
    Unchanged,
}

/// Tally of a merge. `changed()` is zero for a repeated merge of the same entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub inserted: usize,
    pub backdated: usize,
    pub unchanged: usize,
}

impl MergeSummary {
    pub fn changed(&self) -> usize {
        self.inserted + self.backdated
    }

    fn record(&mut self, effect: MergeEffect) {
        match effect {
            MergeEffect::Inserted => self.inserted += 1,
            MergeEffect::Backdated => self.backdated += 1,
            MergeEffect::Unchanged => self.unchanged += 1,
        }
    }
}

/// A set of entries keyed by ticker. Serialized as an array of
/// `{ticker, addedAt}` ordered by insertion time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<WatchlistEntry>", into = "Vec<WatchlistEntry>")]
pub struct Watchlist {
    entries: BTreeMap<Ticker, WatchlistEntry>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, ticker: &Ticker) -> bool {
        self.entries.contains_key(ticker)
    }

    pub fn get(&self, ticker: &Ticker) -> Option<&WatchlistEntry> {
        self.entries.get(ticker)
    }

    /// Insert if absent. An existing entry is left untouched.
    pub fn insert(&mut self, entry: WatchlistEntry) -> bool {
        if self.entries.contains_key(&entry.ticker) {
            return false;
        }
        self.entries.insert(entry.ticker.clone(), entry);
        true
    }

    pub fn remove(&mut self, ticker: &Ticker) -> Option<WatchlistEntry> {
        self.entries.remove(ticker)
    }

    /// Remove only entries identical to one in `entries` (same ticker and
    /// `added_at`). Returns how many were removed.
    pub fn remove_exact(&mut self, entries: &[WatchlistEntry]) -> usize {
        let mut removed = 0;
        for entry in entries {
            if self.entries.get(&entry.ticker) == Some(entry) {
                self.entries.remove(&entry.ticker);
                removed += 1;
            }
        }
        removed
    }

    /// Union by ticker where the earliest `added_at` wins.
    pub fn upsert_earliest(&mut self, entry: WatchlistEntry) -> MergeEffect {
        match self.entries.get_mut(&entry.ticker) {
            None => {
                self.entries.insert(entry.ticker.clone(), entry);
                MergeEffect::Inserted
            }
            Some(existing) if entry.added_at < existing.added_at => {
                existing.added_at = entry.added_at;
                MergeEffect::Backdated
            }
            Some(_) => MergeEffect::Unchanged,
        }
    }

    pub fn merge<I>(&mut self, entries: I) -> MergeSummary
    where
        I: IntoIterator<Item = WatchlistEntry>,
    {
        let mut summary = MergeSummary::default();
        for entry in entries {
            summary.record(self.upsert_earliest(entry));
        }
        summary
    }

    /// Entries ordered by `added_at`, ticker as tie-break.
    pub fn entries(&self) -> Vec<WatchlistEntry> {
        let mut entries: Vec<WatchlistEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.ticker.cmp(&b.ticker)));
        entries
    }

    pub fn tickers(&self) -> Vec<Ticker> {
        self.entries().into_iter().map(|e| e.ticker).collect()
    }
}

impl FromIterator<WatchlistEntry> for Watchlist {
    fn from_iter<T: IntoIterator<Item = WatchlistEntry>>(iter: T) -> Self {
        let mut watchlist = Watchlist::new();
        watchlist.merge(iter);
        watchlist
    }
}

impl From<Vec<WatchlistEntry>> for Watchlist {
    fn from(entries: Vec<WatchlistEntry>) -> Self {
        entries.into_iter().collect()
    }
}

impl From<Watchlist> for Vec<WatchlistEntry> {
    fn from(watchlist: Watchlist) -> Self {
        watchlist.entries()
    }
}

/// How the current user authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "provider", rename_all = "snake_case")]
pub enum SignInMethod {
    Password,
    Federated(String),
}

/// An authenticated user. Absence of a session means anonymous.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub method: SignInMethod,
}

impl Session {
    /// Tokens are treated as expired a minute early to absorb clock skew.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(60) >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("id_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("method", &self.method)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    SignUp,
    SignIn,
    SignOut,
}

/// Session lifecycle transitions published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedUp(Session),
    SignedIn(Session),
    SignedOut { user_id: String },
}

impl SessionEvent {
    pub fn kind(&self) -> TransitionKind {
        match self {
            SessionEvent::SignedUp(_) => TransitionKind::SignUp,
            SessionEvent::SignedIn(_) => TransitionKind::SignIn,
            SessionEvent::SignedOut { .. } => TransitionKind::SignOut,
        }
    }

    /// The new session for login/signup transitions.
    pub fn login_session(&self) -> Option<&Session> {
        match self {
            SessionEvent::SignedUp(session) | SessionEvent::SignedIn(session) => Some(session),
            SessionEvent::SignedOut { .. } => None,
        }
    }
}

/// Credential obtained by the host from a federated provider (Google etc.).
#[derive(Clone, PartialEq, Eq)]
pub struct FederatedCredential {
    pub provider_id: String,
    pub id_token: String,
}

impl fmt::Debug for FederatedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatedCredential")
            .field("provider_id", &self.provider_id)
            .field("id_token", &"<redacted>")
            .finish()
    }
}

/// Per-user record created alongside the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: Option<String>,
    pub points: i64,
}

impl UserProfile {
    pub fn for_signup(email: Option<String>) -> Self {
        Self { email, points: 0 }
    }
}

/// Which store is authoritative for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Local,
    Remote,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Local => write!(f, "local"),
            StoreKind::Remote => write!(f, "remote"),
        }
    }
}

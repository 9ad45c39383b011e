//! Client-local watchlist persistence.

use async_trait::async_trait;
use stockwatch_core::{
    LocalStore, Session, SessionPersistence, SyncResult, Ticker, Watchlist, WatchlistEntry,
};
use tokio::sync::{Mutex, RwLock};

use crate::db::LocalDb;

/// Well-known key holding the serialized watchlist.
pub const WATCHLIST_KEY: &str = "watchlist";
/// Key holding the persisted session.
pub const SESSION_KEY: &str = "session";

/// Local store backed by the SQLite key/value table. The watchlist is one
/// JSON record under [`WATCHLIST_KEY`].
pub struct SqliteLocalStore {
    db: LocalDb,
    // Serializes read-modify-write cycles on the watchlist record.
    write_lock: Mutex<()>,
}

impl SqliteLocalStore {
    pub fn new(db: LocalDb) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    pub fn db(&self) -> &LocalDb {
        &self.db
    }

    async fn read_watchlist(&self) -> SyncResult<Watchlist> {
        match self.db.get_value(WATCHLIST_KEY).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(watchlist) => Ok(watchlist),
                Err(e) => {
                    tracing::warn!("Discarding unreadable local watchlist: {}", e);
                    Ok(Watchlist::new())
                }
            },
            None => Ok(Watchlist::new()),
        }
    }

    async fn write_watchlist(&self, watchlist: &Watchlist) -> SyncResult<()> {
        let raw = serde_json::to_string(watchlist)?;
        self.db.put_value(WATCHLIST_KEY, &raw).await
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn get(&self) -> Watchlist {
        match self.read_watchlist().await {
            Ok(watchlist) => watchlist,
            Err(e) => {
                tracing::warn!("Local watchlist unavailable, treating as empty: {}", e);
                Watchlist::new()
            }
        }
    }

    async fn add(&self, entry: WatchlistEntry) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut watchlist = self.read_watchlist().await?;
        if watchlist.insert(entry) {
            self.write_watchlist(&watchlist).await?;
        }
        Ok(())
    }

    async fn remove(&self, ticker: &Ticker) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut watchlist = self.read_watchlist().await?;
        if watchlist.remove(ticker).is_some() {
            self.write_watchlist(&watchlist).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        self.db.delete_value(WATCHLIST_KEY).await
    }

    async fn remove_merged(&self, entries: &[WatchlistEntry]) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut watchlist = self.read_watchlist().await?;
        if watchlist.remove_exact(entries) == 0 {
            return Ok(());
        }
        if watchlist.is_empty() {
            self.db.delete_value(WATCHLIST_KEY).await
        } else {
            self.write_watchlist(&watchlist).await
        }
    }
}

#[async_trait]
impl SessionPersistence for SqliteLocalStore {
    async fn load_session(&self) -> Option<Session> {
        let raw = match self.db.get_value(SESSION_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Could not read persisted session: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Discarding unreadable persisted session: {}", e);
                None
            }
        }
    }

    async fn save_session(&self, session: &Session) -> SyncResult<()> {
        let raw = serde_json::to_string(session)?;
        self.db.put_value(SESSION_KEY, &raw).await
    }

    async fn clear_session(&self) -> SyncResult<()> {
        self.db.delete_value(SESSION_KEY).await
    }
}

/// In-process local store.
#[derive(Default)]
pub struct MemoryLocalStore {
    watchlist: RwLock<Watchlist>,
    session: RwLock<Option<Session>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<WatchlistEntry>) -> Self {
        Self {
            watchlist: RwLock::new(entries.into()),
            session: RwLock::new(None),
        }
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self) -> Watchlist {
        self.watchlist.read().await.clone()
    }

    async fn add(&self, entry: WatchlistEntry) -> SyncResult<()> {
        self.watchlist.write().await.insert(entry);
        Ok(())
    }

    async fn remove(&self, ticker: &Ticker) -> SyncResult<()> {
        self.watchlist.write().await.remove(ticker);
        Ok(())
    }

    async fn clear(&self) -> SyncResult<()> {
        *self.watchlist.write().await = Watchlist::new();
        Ok(())
    }

    async fn remove_merged(&self, entries: &[WatchlistEntry]) -> SyncResult<()> {
        self.watchlist.write().await.remove_exact(entries);
        Ok(())
    }
}

#[async_trait]
impl SessionPersistence for MemoryLocalStore {
    async fn load_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    async fn save_session(&self, session: &Session) -> SyncResult<()> {
        *self.session.write().await = Some(session.clone());
        Ok(())
    }

    async fn clear_session(&self) -> SyncResult<()> {
        *self.session.write().await = None;
        Ok(())
    }
}

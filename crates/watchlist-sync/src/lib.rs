//! Watchlist synchronization core.
//!
//! Anonymous users keep their watchlist in a [`LocalStore`]; signed-in users in
//! a per-user [`RemoteStore`]. The [`WatchlistFacade`] routes calls to whichever
//! store the current session makes authoritative, and the [`Reconciler`] folds
//! the local watchlist into the remote one once per login/signup.

pub mod db;
pub mod facade;
pub mod local_store;
pub mod reconciler;
pub mod remote;
pub mod session;

pub use db::LocalDb;
pub use facade::{WatchlistFacade, WatchlistView};
pub use local_store::{MemoryLocalStore, SqliteLocalStore};
pub use reconciler::{
    publish_and_settle, ReconcileOutcome, ReconcileReport, Reconciler, ReconcilerState,
    ReconcilerStatus,
};
pub use remote::firebase::FirebaseRemoteStore;
pub use remote::memory::{MemoryRemoteStore, RemoteCallCounts};
pub use remote::DEFAULT_REMOTE_TIMEOUT;
pub use session::{AuthService, SessionManager};

pub use stockwatch_core::{LocalStore, RemoteStore, SessionPersistence};

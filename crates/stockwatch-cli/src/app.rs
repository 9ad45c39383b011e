use anyhow::{Context, Result};
use contact_service::ContactService;
use identity_client::{provider_from_config, DisabledIdentityProvider};
use market_data_client::{
    CachedMarketData, MarketDataClient, MarketDataProvider, NewsApiClient, NewsProvider,
};
use std::sync::Arc;
use std::time::Duration;
use stockwatch_core::{AuthError, IdentityProvider, RemoteStore, Session};
use tokio::task::JoinHandle;
use watchlist_sync::{
    AuthService, FirebaseRemoteStore, LocalDb, MemoryRemoteStore, ReconcileReport, Reconciler,
    SessionManager, SqliteLocalStore, WatchlistFacade,
};

use crate::config::AppConfig;

/// Everything a command needs, wired once at startup.
pub struct App {
    pub sessions: Arc<SessionManager>,
    pub auth: AuthService,
    pub facade: WatchlistFacade,
    pub reconciler: Arc<Reconciler>,
    pub market: Option<Arc<dyn MarketDataProvider>>,
    pub news: Option<Arc<dyn NewsProvider>>,
    pub contact: Option<ContactService>,
    pub remote_backend: &'static str,
    settle_timeout: Duration,
    listener: JoinHandle<()>,
}

impl App {
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let db_path = config.db_path();
        let db = LocalDb::open(&db_path)
            .await
            .with_context(|| format!("opening local database {}", db_path.display()))?;
        let local = Arc::new(SqliteLocalStore::new(db));
        tracing::debug!("Local store at {}", db_path.display());

        let identity: Arc<dyn IdentityProvider>;
        let remote: Arc<dyn RemoteStore>;
        match &config.database_url {
            Some(url) if config.cloud_sync_enabled() => {
                identity = provider_from_config(&config.identity);
                remote = Arc::new(FirebaseRemoteStore::new(url.clone(), config.remote_timeout)?);
            }
            _ => {
                tracing::warn!(
                    "Firebase not configured (set FIREBASE_API_KEY and FIREBASE_DATABASE_URL); \
                     watchlist stays on this device"
                );
                identity = Arc::new(DisabledIdentityProvider);
                remote = Arc::new(MemoryRemoteStore::new().with_timeout(config.remote_timeout));
            }
        }

        let app = Self::assemble(config, local, identity, remote);
        // A session from an earlier cloud-enabled run is meaningless without the cloud store
        if config.cloud_sync_enabled() {
            app.auth.restore().await;
        }
        Ok(app)
    }

    /// Wire the services around already-built stores.
    pub fn assemble(
        config: &AppConfig,
        local: Arc<SqliteLocalStore>,
        identity: Arc<dyn IdentityProvider>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new());
        let auth = AuthService::new(identity, sessions.clone(), remote.clone())
            .with_persistence(local.clone());
        let facade = WatchlistFacade::new(sessions.clone(), local.clone(), remote.clone());
        let reconciler = Arc::new(Reconciler::new(local, remote.clone()));
        let listener = reconciler.clone().listen(&sessions);

        let market = config.market_data.clone().and_then(|market_config| {
            match MarketDataClient::new(market_config) {
                Ok(client) => {
                    let cached: Arc<dyn MarketDataProvider> =
                        Arc::new(CachedMarketData::new(Arc::new(client)));
                    Some(cached)
                }
                Err(e) => {
                    tracing::warn!("Market data disabled: {}", e);
                    None
                }
            }
        });

        let news = config
            .news
            .clone()
            .and_then(|news_config| match NewsApiClient::new(news_config) {
                Ok(client) => {
                    let news: Arc<dyn NewsProvider> = Arc::new(client);
                    Some(news)
                }
                Err(e) => {
                    tracing::warn!("Headlines disabled: {}", e);
                    None
                }
            });

        let contact = match ContactService::from_config(&config.contact) {
            Ok(service) => Some(service),
            Err(e) => {
                tracing::debug!("Contact form disabled: {}", e);
                None
            }
        };

        Self {
            sessions,
            auth,
            facade,
            reconciler,
            market,
            news,
            contact,
            remote_backend: remote.backend_name(),
            settle_timeout: config.remote_timeout + Duration::from_secs(5),
            listener,
        }
    }

    /// Run an auth step that may publish a login, then wait for the
    /// reconciliation it triggers.
    pub async fn sign_in_and_settle<F>(
        &self,
        step: F,
    ) -> Result<(Session, Option<ReconcileReport>), AuthError>
    where
        F: std::future::Future<Output = Result<Session, AuthError>>,
    {
        let mut status = self.reconciler.status();
        let before = status.borrow_and_update().runs_completed;

        let session = step.await?;

        let settled = tokio::time::timeout(
            self.settle_timeout,
            status.wait_for(|s| s.runs_completed > before),
        )
        .await;
        let report = match settled {
            Ok(Ok(status)) => status.last_report.clone(),
            Ok(Err(_)) => None,
            Err(_) => {
                tracing::warn!("Reconciliation still running after {:?}", self.settle_timeout);
                None
            }
        };
        Ok((session, report))
    }

    /// Refresh the session's id token when it is about to expire.
    pub async fn refresh_session(&self) {
        match self.auth.refresh_if_expired().await {
            Ok(_) => {}
            Err(AuthError::SessionExpired) => {
                tracing::warn!("Session expired, signing out");
                if let Err(e) = self.auth.sign_out().await {
                    tracing::warn!("Sign-out failed: {}", e);
                }
            }
            Err(e) => tracing::warn!("Could not refresh session: {}", e),
        }
    }

    pub async fn shutdown(self) {
        self.listener.abort();
    }
}

use anyhow::{Context, Result};
use contact_service::ContactConfig;
use identity_client::IdentityConfig;
use market_data_client::{MarketDataConfig, NewsConfig};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use watchlist_sync::DEFAULT_REMOTE_TIMEOUT;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub identity: IdentityConfig,
    /// Realtime Database root, e.g. `https://<project>-default-rtdb.firebaseio.com`.
    pub database_url: Option<String>,
    pub remote_timeout: Duration,
    pub market_data: Option<MarketDataConfig>,
    pub news: Option<NewsConfig>,
    pub contact: ContactConfig,
    pub data_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let remote_timeout = match env::var("REMOTE_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("REMOTE_TIMEOUT_SECS must be seconds, got {}", raw))?,
            ),
            Err(_) => DEFAULT_REMOTE_TIMEOUT,
        };

        let config = Self {
            identity: IdentityConfig::from_env()?,
            database_url: env::var("FIREBASE_DATABASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            remote_timeout,
            market_data: MarketDataConfig::from_env(),
            news: NewsConfig::from_env(),
            contact: ContactConfig::from_env(),
            data_dir: env::var("STOCKWATCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_dir()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.remote_timeout.is_zero() {
            anyhow::bail!("REMOTE_TIMEOUT_SECS must be greater than 0");
        }
        if let Some(url) = &self.database_url {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                anyhow::bail!("FIREBASE_DATABASE_URL must be an http(s) URL, got {}", url);
            }
        }
        Ok(())
    }

    /// Cloud sync needs both an auth API key and a database URL.
    pub fn cloud_sync_enabled(&self) -> bool {
        self.identity.is_configured() && self.database_url.is_some()
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("stockwatch.db")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("stockwatch"))
        .unwrap_or_else(|| PathBuf::from(".stockwatch"))
}

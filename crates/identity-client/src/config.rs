use std::time::Duration;
use thiserror::Error;

pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("FIREBASE_API_KEY not set")]
    MissingApiKey,

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Firebase Authentication settings.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub identity_toolkit_url: String,
    pub secure_token_url: String,
    pub request_timeout: Duration,
    /// Redirect URI reported to `signInWithIdp`.
    pub request_uri: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            auth_domain: None,
            project_id: None,
            identity_toolkit_url: IDENTITY_TOOLKIT_URL.to_string(),
            secure_token_url: SECURE_TOKEN_URL.to_string(),
            request_timeout: Duration::from_secs(15),
            request_uri: "http://localhost".to_string(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl IdentityConfig {
    /// Reads `FIREBASE_API_KEY`, `FIREBASE_AUTH_DOMAIN`, `FIREBASE_PROJECT_ID`,
    /// `AUTH_TIMEOUT_SECS` and, when set, `FIREBASE_AUTH_EMULATOR_HOST`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            api_key: non_empty_var("FIREBASE_API_KEY"),
            auth_domain: non_empty_var("FIREBASE_AUTH_DOMAIN"),
            project_id: non_empty_var("FIREBASE_PROJECT_ID"),
            ..Self::default()
        };

        if let Some(host) = non_empty_var("FIREBASE_AUTH_EMULATOR_HOST") {
            config = config.with_emulator(&host);
        }

        if let Some(raw) = non_empty_var("AUTH_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: "AUTH_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(domain) = &config.auth_domain {
            config.request_uri = format!("https://{}", domain);
        }

        Ok(config)
    }

    /// Route requests through the local Auth emulator at `host` (`host:port`).
    pub fn with_emulator(mut self, host: &str) -> Self {
        let host = host.trim_end_matches('/');
        self.identity_toolkit_url = format!("http://{}/identitytoolkit.googleapis.com/v1", host);
        self.secure_token_url = format!("http://{}/securetoken.googleapis.com/v1", host);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

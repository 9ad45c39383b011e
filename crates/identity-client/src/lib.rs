//! Identity providers for stockwatch sessions.

pub mod config;
pub mod disabled;
pub mod firebase;

pub use config::{ConfigError, IdentityConfig};
pub use disabled::DisabledIdentityProvider;
pub use firebase::FirebaseAuthClient;
pub use stockwatch_core::IdentityProvider;

use std::sync::Arc;

/// Firebase when an API key is configured, otherwise the disabled provider.
pub fn provider_from_config(config: &IdentityConfig) -> Arc<dyn IdentityProvider> {
    match FirebaseAuthClient::from_config(config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!("Authentication disabled: {}", e);
            Arc::new(DisabledIdentityProvider)
        }
    }
}

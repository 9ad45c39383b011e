use async_trait::async_trait;
use stockwatch_core::{AuthError, FederatedCredential, IdentityProvider, Session};

/// Stand-in for deployments without authentication configured.
///
/// Every attempt to obtain a session fails with [`AuthError::NotConfigured`];
/// operations that need no session succeed so the rest of the app keeps
/// working anonymously.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledIdentityProvider;

#[async_trait]
impl IdentityProvider for DisabledIdentityProvider {
    async fn sign_up(&self, _email: &str, _password: &str) -> Result<Session, AuthError> {
        Err(AuthError::NotConfigured)
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<Session, AuthError> {
        Err(AuthError::NotConfigured)
    }

    async fn sign_in_with_federated(
        &self,
        _credential: &FederatedCredential,
    ) -> Result<Session, AuthError> {
        Err(AuthError::NotConfigured)
    }

    async fn sign_out(&self, _session: &Session) -> Result<(), AuthError> {
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        tracing::info!(email, "Authentication disabled, password reset not sent");
        Ok(())
    }

    async fn refresh(&self, _session: &Session) -> Result<Session, AuthError> {
        Err(AuthError::NotConfigured)
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

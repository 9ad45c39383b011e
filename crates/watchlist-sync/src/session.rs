//! Explicit session state and the auth service that drives its transitions.

use std::sync::Arc;
use stockwatch_core::validation::{require_non_empty, validate_email, validate_password};
use stockwatch_core::{
    AuthError, FederatedCredential, IdentityProvider, RemoteStore, Session, SessionEvent,
    SessionPersistence, UserProfile,
};
use tokio::sync::{broadcast, watch};

const SESSION_EVENT_CAPACITY: usize = 64;

/// Owns the current session and publishes its transitions.
///
/// Restoring a persisted session is not a transition and publishes nothing.
pub struct SessionManager {
    current: watch::Sender<Option<Session>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self { current, events }
    }

    pub fn current(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Latest-value view of the session.
    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }

    /// Every login, signup and logout, in order.
    pub fn on_session_change(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Install a session loaded from persistence without publishing an event.
    pub fn restore(&self, session: Session) {
        self.current.send_replace(Some(session));
    }

    /// Swap in refreshed tokens for the same user.
    pub fn update_tokens(&self, session: Session) {
        self.current.send_modify(|current| {
            if current.as_ref().map(|s| s.user_id.as_str()) == Some(session.user_id.as_str()) {
                *current = Some(session);
            }
        });
    }

    pub fn publish(&self, event: SessionEvent) {
        match &event {
            SessionEvent::SignedUp(session) | SessionEvent::SignedIn(session) => {
                self.current.send_replace(Some(session.clone()));
            }
            SessionEvent::SignedOut { .. } => {
                self.current.send_replace(None);
            }
        }
        tracing::debug!(transition = ?event.kind(), "Session transition");
        if self.events.send(event).is_err() {
            tracing::debug!("No session subscribers");
        }
    }
}

/// Wraps an [`IdentityProvider`]: validates input, installs and persists the
/// resulting session and publishes the transition.
pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    sessions: Arc<SessionManager>,
    remote: Arc<dyn RemoteStore>,
    persistence: Option<Arc<dyn SessionPersistence>>,
}

impl AuthService {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        sessions: Arc<SessionManager>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            provider,
            sessions,
            remote,
            persistence: None,
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn SessionPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Load a persisted session into the session manager.
    pub async fn restore(&self) -> Option<Session> {
        let session = self.persistence.as_ref()?.load_session().await?;
        tracing::info!(user_id = %session.user_id, "Restored persisted session");
        self.sessions.restore(session.clone());
        Some(session)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        validate_email(email)?;
        validate_password(password)?;

        let session = self.provider.sign_up(email.trim(), password).await?;
        let profile = UserProfile::for_signup(session.email.clone());
        if let Err(e) = self
            .remote
            .create_profile(&session, &session.user_id, &profile)
            .await
        {
            tracing::warn!(user_id = %session.user_id, "Could not create user profile: {}", e);
        }

        self.establish(SessionEvent::SignedUp(session.clone())).await;
        Ok(session)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        validate_email(email)?;
        require_non_empty("password", password)?;

        let session = self.provider.sign_in(email.trim(), password).await?;
        self.establish(SessionEvent::SignedIn(session.clone())).await;
        Ok(session)
    }

    /// `None` means the user dismissed the provider window.
    pub async fn sign_in_with_federated(
        &self,
        credential: Option<FederatedCredential>,
    ) -> Result<Session, AuthError> {
        let credential = credential.ok_or(AuthError::PopupClosed)?;
        let session = self.provider.sign_in_with_federated(&credential).await?;
        self.establish(SessionEvent::SignedIn(session.clone())).await;
        Ok(session)
    }

    /// Ends the session locally even when the provider call fails.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(session) = self.sessions.current() else {
            return Ok(());
        };
        if let Err(e) = self.provider.sign_out(&session).await {
            tracing::warn!("Provider sign-out failed, ending session locally: {}", e);
        }
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.clear_session().await {
                tracing::warn!("Could not clear persisted session: {}", e);
            }
        }
        self.sessions.publish(SessionEvent::SignedOut {
            user_id: session.user_id,
        });
        Ok(())
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        validate_email(email)?;
        self.provider.send_password_reset(email.trim()).await
    }

    /// Refresh the id token when it is about to expire. `Ok(None)` when anonymous.
    pub async fn refresh_if_expired(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.sessions.current() else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        let refreshed = self.provider.refresh(&session).await?;
        self.sessions.update_tokens(refreshed.clone());
        self.persist(&refreshed).await;
        tracing::debug!(user_id = %refreshed.user_id, "Refreshed id token");
        Ok(Some(refreshed))
    }

    async fn establish(&self, event: SessionEvent) {
        if let Some(session) = event.login_session() {
            tracing::info!(
                user_id = %session.user_id,
                provider = self.provider.provider_name(),
                "Signed in"
            );
            self.persist(session).await;
        }
        self.sessions.publish(event);
    }

    async fn persist(&self, session: &Session) {
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save_session(session).await {
                tracing::warn!("Could not persist session: {}", e);
            }
        }
    }
}

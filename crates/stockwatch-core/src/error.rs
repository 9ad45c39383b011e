use std::time::Duration;

use thiserror::Error;

/// Field-level input errors. Messages are shown to the user as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ticker cannot be empty")]
    EmptyTicker,

    #[error("ticker length {len} exceeds max {max}")]
    TickerTooLong { len: usize, max: usize },

    #[error("ticker contains invalid character '{ch}' at index {index}")]
    TickerInvalidChar { ch: char, index: usize },

    #[error("Please enter a valid email address.")]
    InvalidEmail,

    #[error("Password must be at least {min} characters.")]
    PasswordTooShort { min: usize },

    #[error("Only letters and spaces are allowed.")]
    InvalidName { field: &'static str },

    #[error("{field} cannot be empty")]
    EmptyField { field: &'static str },
}

impl ValidationError {
    /// Name of the form field the error belongs to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::EmptyTicker
            | ValidationError::TickerTooLong { .. }
            | ValidationError::TickerInvalidChar { .. } => "ticker",
            ValidationError::InvalidEmail => "email",
            ValidationError::PasswordTooShort { .. } => "password",
            ValidationError::InvalidName { field } | ValidationError::EmptyField { field } => field,
        }
    }
}

/// Failures reported by the identity provider. None of them touch the
/// current session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("An account already exists for this email")]
    EmailInUse,

    #[error("Password is too weak")]
    WeakPassword,

    #[error("This account has been disabled")]
    UserDisabled,

    #[error("Too many attempts, try again later")]
    TooManyAttempts,

    #[error("Sign-in cancelled by user")]
    PopupClosed,

    #[error("Federated sign-in was blocked, allow the provider window and retry")]
    PopupBlocked,

    #[error("Identity provider not configured")]
    NotConfigured,

    #[error("Session expired, sign in again")]
    SessionExpired,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Identity provider error {code}: {message}")]
    Provider { code: String, message: String },
}

/// Errors from the watchlist stores, the reconciler and the facade.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("not signed in")]
    NotSignedIn,

    #[error("not authorized to access the watchlist of '{user_id}': {reason}")]
    NotAuthorized { user_id: String, reason: String },

    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("remote store timed out after {0:?}")]
    RemoteTimeout(Duration),

    #[error("local storage error: {0}")]
    LocalStorage(String),

    #[error("merged into remote store but clearing local watchlist failed: {0}")]
    ReconciliationPartialFailure(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Outages after which the local store stays the fallback source of truth.
    pub fn is_remote_outage(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteUnavailable(_) | SyncError::RemoteTimeout(_)
        )
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

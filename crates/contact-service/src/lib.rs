mod form;
mod web3forms;

pub use form::{ContactForm, FieldErrors};
pub use web3forms::{Web3FormsClient, WEB3FORMS_SUBMIT_URL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Endpoint reply to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// A destination that accepts contact-form submissions.
#[async_trait]
pub trait ContactEndpoint: Send + Sync {
    async fn submit(&self, form: &ContactForm) -> Result<SubmissionReceipt, ContactError>;
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("Please correct the errors in the form: {0}")]
    InvalidForm(FieldErrors),
    #[error("Submission rejected: {0}")]
    Rejected(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Clone)]
pub struct ContactConfig {
    pub access_key: Option<String>,
    pub endpoint_url: String,
}

impl ContactConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        Self {
            access_key: std::env::var("CONTACT_ACCESS_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            endpoint_url: std::env::var("CONTACT_ENDPOINT_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| WEB3FORMS_SUBMIT_URL.to_string()),
        }
    }
}

/// Validates contact forms and hands them to the configured endpoint.
#[derive(Clone)]
pub struct ContactService {
    endpoint: Arc<dyn ContactEndpoint>,
}

impl ContactService {
    pub fn new(endpoint: Arc<dyn ContactEndpoint>) -> Self {
        Self { endpoint }
    }

    pub fn from_config(config: &ContactConfig) -> Result<Self, ContactError> {
        let access_key = config
            .access_key
            .clone()
            .ok_or_else(|| ContactError::Config("CONTACT_ACCESS_KEY not set".to_string()))?;
        let client = Web3FormsClient::new(access_key, config.endpoint_url.clone())?;
        tracing::info!("Contact form submissions enabled ({})", client.name());
        Ok(Self::new(Arc::new(client)))
    }

    /// Validate and submit, awaiting the endpoint's answer.
    pub async fn submit(&self, form: &ContactForm) -> Result<SubmissionReceipt, ContactError> {
        form.validate().map_err(ContactError::InvalidForm)?;

        let receipt = self.endpoint.submit(form).await?;
        if !receipt.success {
            let reason = receipt
                .message
                .clone()
                .unwrap_or_else(|| "Failed to send message. Please try again.".to_string());
            tracing::warn!("Contact form rejected by {}: {}", self.endpoint.name(), reason);
            return Err(ContactError::Rejected(reason));
        }

        tracing::info!("Contact form sent via {}", self.endpoint.name());
        Ok(receipt)
    }

    /// Validate now, then send in the background. Delivery failures are only
    /// logged.
    pub fn submit_detached(&self, form: ContactForm) -> Result<JoinHandle<()>, ContactError> {
        form.validate().map_err(ContactError::InvalidForm)?;
        let service = self.clone();
        Ok(tokio::spawn(async move {
            if let Err(e) = service.submit(&form).await {
                tracing::warn!("Background contact submission failed: {}", e);
            }
        }))
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::{ContactEndpoint, ContactError, ContactForm, SubmissionReceipt};

pub const WEB3FORMS_SUBMIT_URL: &str = "https://api.web3forms.com/submit";

#[derive(Serialize)]
struct Payload<'a> {
    access_key: &'a str,
    #[serde(flatten)]
    form: &'a ContactForm,
}

/// Web3Forms JSON submission API.
pub struct Web3FormsClient {
    access_key: String,
    submit_url: String,
    client: Client,
}

impl Web3FormsClient {
    pub fn new(access_key: String, submit_url: String) -> Result<Self, ContactError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ContactError::Http(e.to_string()))?;

        Ok(Self {
            access_key,
            submit_url,
            client,
        })
    }
}

#[async_trait]
impl ContactEndpoint for Web3FormsClient {
    async fn submit(&self, form: &ContactForm) -> Result<SubmissionReceipt, ContactError> {
        let payload = Payload {
            access_key: &self.access_key,
            form,
        };

        let response = self
            .client
            .post(&self.submit_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ContactError::Http(e.to_string()))?;

        // Rejections come back as non-2xx with a JSON body carrying `success: false`
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ContactError::Http(e.to_string()))?;
        match serde_json::from_str::<SubmissionReceipt>(&text) {
            Ok(receipt) => Ok(receipt),
            Err(_) if status.is_success() => Err(ContactError::Http(format!(
                "unexpected response: {}",
                text
            ))),
            Err(_) => Err(ContactError::Http(format!("HTTP {}: {}", status, text))),
        }
    }

    fn name(&self) -> &str {
        "web3forms"
    }
}

//! Firebase Authentication over the Identity Toolkit REST API.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stockwatch_core::{AuthError, FederatedCredential, IdentityProvider, Session, SignInMethod};

use crate::config::{ConfigError, IdentityConfig};

pub struct FirebaseAuthClient {
    client: Client,
    api_key: String,
    identity_toolkit_url: String,
    secure_token_url: String,
    request_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OobRequest<'a> {
    request_type: &'static str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map an Identity Toolkit error message onto [`AuthError`].
///
/// Messages look like `WEAK_PASSWORD : Password should be at least 6
/// characters`; only the leading code is significant.
pub fn map_provider_error(message: &str) -> AuthError {
    let code = message.split(':').next().unwrap_or_default().trim();
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS"
        | "USER_NOT_FOUND" => AuthError::InvalidCredentials,
        "EMAIL_EXISTS" => AuthError::EmailInUse,
        "WEAK_PASSWORD" => AuthError::WeakPassword,
        "USER_DISABLED" => AuthError::UserDisabled,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthError::TooManyAttempts,
        "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "INVALID_ID_TOKEN" => {
            AuthError::SessionExpired
        }
        "INVALID_EMAIL" | "MISSING_EMAIL" => {
            AuthError::Validation(stockwatch_core::ValidationError::InvalidEmail)
        }
        "CONFIGURATION_NOT_FOUND" | "OPERATION_NOT_ALLOWED" | "API_KEY_INVALID" => {
            AuthError::NotConfigured
        }
        _ => AuthError::Provider {
            code: code.to_string(),
            message: message.to_string(),
        },
    }
}

/// Form-encoded `postBody` for `accounts:signInWithIdp`.
fn idp_post_body(credential: &FederatedCredential) -> String {
    format!(
        "id_token={}&providerId={}",
        urlencoding::encode(&credential.id_token),
        urlencoding::encode(&credential.provider_id)
    )
}

fn parse_expires_in(raw: Option<&str>) -> ChronoDuration {
    let secs = raw.and_then(|s| s.parse::<i64>().ok()).unwrap_or(3600);
    ChronoDuration::seconds(secs)
}

impl FirebaseAuthClient {
    pub fn new(config: &IdentityConfig, api_key: String) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            identity_toolkit_url: config.identity_toolkit_url.trim_end_matches('/').to_string(),
            secure_token_url: config.secure_token_url.trim_end_matches('/').to_string(),
            request_uri: config.request_uri.clone(),
        })
    }

    pub fn from_config(config: &IdentityConfig) -> Result<Self, ConfigError> {
        let api_key = config.api_key.clone().ok_or(ConfigError::MissingApiKey)?;
        Self::new(config, api_key).map_err(|e| ConfigError::InvalidValue {
            name: "FIREBASE_API_KEY",
            value: e.to_string(),
        })
    }

    async fn post<B, T>(&self, url: String, body: &B) -> Result<T, AuthError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => map_provider_error(&envelope.error.message),
                Err(_) => AuthError::Network(format!("HTTP {}: {}", status, text)),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Network(format!("invalid response: {}", e)))
    }

    fn accounts_url(&self, method: &str) -> String {
        format!("{}/accounts:{}", self.identity_toolkit_url, method)
    }

    fn session_from(token: TokenResponse, method: SignInMethod) -> Session {
        Session {
            user_id: token.local_id,
            email: token.email,
            id_token: token.id_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + parse_expires_in(token.expires_in.as_deref()),
            method,
        }
    }

    async fn password_flow(
        &self,
        method: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let token: TokenResponse = self.post(self.accounts_url(method), &request).await?;
        Ok(Self::session_from(token, SignInMethod::Password))
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuthClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let session = self.password_flow("signUp", email, password).await?;
        tracing::info!(user_id = %session.user_id, "Created Firebase account");
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.password_flow("signInWithPassword", email, password).await
    }

    async fn sign_in_with_federated(
        &self,
        credential: &FederatedCredential,
    ) -> Result<Session, AuthError> {
        let request = IdpRequest {
            post_body: idp_post_body(credential),
            request_uri: self.request_uri.clone(),
            return_idp_credential: true,
            return_secure_token: true,
        };
        let token: TokenResponse = self.post(self.accounts_url("signInWithIdp"), &request).await?;
        Ok(Self::session_from(
            token,
            SignInMethod::Federated(credential.provider_id.clone()),
        ))
    }

    /// Firebase id tokens are stateless; ending the session is purely local.
    async fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        tracing::debug!(user_id = %session.user_id, "Firebase sign-out");
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let request = OobRequest {
            request_type: "PASSWORD_RESET",
            email,
        };
        let _: serde_json::Value = self.post(self.accounts_url("sendOobCode"), &request).await?;
        tracing::info!("Password reset email requested");
        Ok(())
    }

    async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        let refresh_token = session
            .refresh_token
            .as_deref()
            .ok_or(AuthError::SessionExpired)?;
        let request = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token,
        };
        let url = format!("{}/token", self.secure_token_url);
        let token: RefreshResponse = self.post(url, &request).await?;

        if token.user_id != session.user_id {
            return Err(AuthError::SessionExpired);
        }

        Ok(Session {
            user_id: token.user_id,
            email: session.email.clone(),
            id_token: token.id_token,
            refresh_token: Some(token.refresh_token),
            expires_at: Utc::now() + parse_expires_in(Some(&token.expires_in)),
            method: session.method.clone(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "firebase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn error(message: &str) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": 400, "message": message}})),
        )
            .into_response()
    }

    fn form_fields(raw: &str) -> HashMap<String, String> {
        raw.split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| {
                (
                    urlencoding::decode(k).unwrap().into_owned(),
                    urlencoding::decode(v).unwrap().into_owned(),
                )
            })
            .collect()
    }

    async fn accounts(
        Path(method): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> Response {
        if query.get("key").map(String::as_str) != Some("test-key") {
            return error("API_KEY_INVALID");
        }
        let email = body["email"].as_str().unwrap_or_default().to_string();
        match method.as_str() {
            "accounts:signUp" if email == "taken@example.com" => error("EMAIL_EXISTS"),
            "accounts:signUp" => Json(json!({
                "localId": "uid-new",
                "email": email,
                "idToken": "id-new",
                "refreshToken": "refresh-new",
                "expiresIn": "3600"
            }))
            .into_response(),
            "accounts:signInWithPassword" if body["password"] == "secret1" => Json(json!({
                "localId": "uid-jane",
                "email": email,
                "idToken": "id-jane",
                "refreshToken": "refresh-jane",
                "expiresIn": "3600",
                "registered": true
            }))
            .into_response(),
            "accounts:signInWithPassword" => error("INVALID_LOGIN_CREDENTIALS"),
            "accounts:signInWithIdp" => {
                let fields = form_fields(body["postBody"].as_str().unwrap_or_default());
                if fields.get("providerId").map(String::as_str) != Some("google.com")
                    || fields.get("id_token").map(String::as_str) != Some("g/t+k=1&x")
                {
                    return error("INVALID_IDP_RESPONSE");
                }
                Json(json!({
                    "localId": "uid-google",
                    "email": "g@example.com",
                    "idToken": "id-google",
                    "refreshToken": "refresh-google",
                    "expiresIn": "3600",
                    "providerId": "google.com"
                }))
                .into_response()
            }
            "accounts:sendOobCode" => {
                assert_eq!(body["requestType"], "PASSWORD_RESET");
                Json(json!({"email": email})).into_response()
            }
            _ => error("UNKNOWN_METHOD"),
        }
    }

    async fn token(Json(body): Json<Value>) -> Response {
        match body["refresh_token"].as_str() {
            Some("refresh-jane") => Json(json!({
                "id_token": "id-jane-2",
                "refresh_token": "refresh-jane-2",
                "expires_in": "3600",
                "token_type": "Bearer",
                "user_id": "uid-jane",
                "project_id": "demo"
            }))
            .into_response(),
            _ => error("INVALID_REFRESH_TOKEN"),
        }
    }

    async fn spawn_fake_auth() -> FirebaseAuthClient {
        let app = Router::new()
            .route("/identitytoolkit.googleapis.com/v1/:method", post(accounts))
            .route("/securetoken.googleapis.com/v1/token", post(token));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = IdentityConfig {
            api_key: Some("test-key".to_string()),
            ..IdentityConfig::default()
        }
        .with_emulator(&addr.to_string());
        FirebaseAuthClient::from_config(&config).unwrap()
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            map_provider_error("WEAK_PASSWORD : Password should be at least 6 characters"),
            AuthError::WeakPassword
        );
        assert_eq!(map_provider_error("EMAIL_EXISTS"), AuthError::EmailInUse);
        assert_eq!(
            map_provider_error("INVALID_LOGIN_CREDENTIALS"),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            map_provider_error("TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled"),
            AuthError::TooManyAttempts
        );
        assert!(matches!(
            map_provider_error("QUOTA_EXCEEDED"),
            AuthError::Provider { ref code, .. } if code == "QUOTA_EXCEEDED"
        ));
    }

    #[tokio::test]
    async fn test_password_sign_in() {
        let client = spawn_fake_auth().await;

        let session = client.sign_in("jane@example.com", "secret1").await.unwrap();
        assert_eq!(session.user_id, "uid-jane");
        assert_eq!(session.method, SignInMethod::Password);
        assert!(!session.is_expired());

        let err = client.sign_in("jane@example.com", "nope").await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_sign_up_existing_email() {
        let client = spawn_fake_auth().await;
        let err = client.sign_up("taken@example.com", "secret1").await.unwrap_err();
        assert_eq!(err, AuthError::EmailInUse);

        let session = client.sign_up("new@example.com", "secret1").await.unwrap();
        assert_eq!(session.email.as_deref(), Some("new@example.com"));
    }

    #[tokio::test]
    async fn test_federated_and_reset() {
        let client = spawn_fake_auth().await;
        let session = client
            .sign_in_with_federated(&FederatedCredential {
                provider_id: "google.com".to_string(),
                id_token: "g/t+k=1&x".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(session.method, SignInMethod::Federated("google.com".to_string()));

        client.send_password_reset("jane@example.com").await.unwrap();
    }

    #[test]
    fn test_idp_post_body_is_form_encoded() {
        let body = idp_post_body(&FederatedCredential {
            provider_id: "google.com".to_string(),
            id_token: "a+b&providerId=evil".to_string(),
        });
        assert_eq!(body, "id_token=a%2Bb%26providerId%3Devil&providerId=google.com");
    }

    #[tokio::test]
    async fn test_refresh_rotates_tokens() {
        let client = spawn_fake_auth().await;
        let session = client.sign_in("jane@example.com", "secret1").await.unwrap();

        let refreshed = client.refresh(&session).await.unwrap();
        assert_eq!(refreshed.id_token, "id-jane-2");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh-jane-2"));
        assert_eq!(refreshed.email, session.email);

        let mut stale = session.clone();
        stale.refresh_token = Some("revoked".to_string());
        assert_eq!(client.refresh(&stale).await.unwrap_err(), AuthError::SessionExpired);
    }

    #[tokio::test]
    async fn test_unreachable_is_network_error() {
        let config = IdentityConfig {
            api_key: Some("test-key".to_string()),
            ..IdentityConfig::default()
        }
        .with_emulator("127.0.0.1:9");
        let client = FirebaseAuthClient::from_config(&config).unwrap();
        let err = client.sign_in("jane@example.com", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::Network(_)));
    }
}

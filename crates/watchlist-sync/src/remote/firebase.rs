//! Firebase Realtime Database backed watchlist.
//!
//! Layout: `users/{uid}/watchlist/{TICKER} = {ticker, addedAt}` and profile
//! fields directly under `users/{uid}`. Requests authenticate with the
//! session's id token as the `auth` query parameter.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;
use stockwatch_core::{
    ensure_principal, MergeEffect, MergeSummary, RemoteStore, Session, SyncError, SyncResult,
    Ticker, UserProfile, Watchlist, WatchlistEntry,
};

use super::bounded;

#[derive(Clone)]
pub struct FirebaseRemoteStore {
    client: Client,
    database_url: String,
    timeout: Duration,
}

impl FirebaseRemoteStore {
    pub fn new(database_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            database_url: database_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.database_url, path)
    }

    fn transport_error(&self, e: reqwest::Error) -> SyncError {
        if e.is_timeout() {
            SyncError::RemoteTimeout(self.timeout)
        } else {
            SyncError::RemoteUnavailable(e.to_string())
        }
    }

    async fn check_status(response: Response, user_id: &str) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SyncError::NotAuthorized {
                user_id: user_id.to_string(),
                reason: format!("HTTP {}: {}", status, body),
            });
        }
        Err(SyncError::RemoteUnavailable(format!("HTTP {}: {}", status, body)))
    }

    async fn read_watchlist(&self, principal: &Session, user_id: &str) -> SyncResult<Watchlist> {
        let response = self
            .client
            .get(self.url(&format!("users/{}/watchlist", user_id)))
            .query(&[("auth", principal.id_token.as_str())])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = Self::check_status(response, user_id).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(format!("invalid response: {}", e)))?;

        decode_watchlist(body)
    }

    async fn patch(&self, principal: &Session, user_id: &str, path: &str, body: &Value) -> SyncResult<()> {
        let response = self
            .client
            .patch(self.url(path))
            .query(&[("auth", principal.id_token.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        Self::check_status(response, user_id).await?;
        Ok(())
    }
}

/// Decode the watchlist node, skipping children that are not valid entries.
///
/// The database hands back an object whose keys are all small integers
/// (numeric tickers such as `"0"`, `"1"`) as a JSON array, with `null` in the
/// gaps, so both shapes are accepted.
fn decode_watchlist(node: Value) -> SyncResult<Watchlist> {
    let children: Vec<(String, Value)> = match node {
        Value::Null => Vec::new(),
        Value::Object(map) => map.into_iter().collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .filter(|(_, value)| !value.is_null())
            .map(|(index, value)| (index.to_string(), value))
            .collect(),
        other => {
            return Err(SyncError::RemoteUnavailable(format!(
                "unexpected watchlist node: {}",
                other
            )))
        }
    };

    Ok(children
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<WatchlistEntry>(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping malformed remote watchlist entry '{}': {}", key, e);
                None
            }
        })
        .collect())
}

#[async_trait]
impl RemoteStore for FirebaseRemoteStore {
    async fn fetch(&self, principal: &Session, user_id: &str) -> SyncResult<Watchlist> {
        ensure_principal(principal, user_id)?;
        bounded(self.timeout, self.read_watchlist(principal, user_id)).await
    }

    async fn merge(
        &self,
        principal: &Session,
        user_id: &str,
        entries: Vec<WatchlistEntry>,
    ) -> SyncResult<MergeSummary> {
        ensure_principal(principal, user_id)?;
        bounded(self.timeout, async {
            let mut merged = self.read_watchlist(principal, user_id).await?;
            let mut summary = MergeSummary::default();
            let mut changed = Map::new();

            for entry in entries {
                let ticker = entry.ticker.clone();
                match merged.upsert_earliest(entry) {
                    MergeEffect::Unchanged => summary.unchanged += 1,
                    effect => {
                        if effect == MergeEffect::Inserted {
                            summary.inserted += 1;
                        } else {
                            summary.backdated += 1;
                        }
                        if let Some(winner) = merged.get(&ticker) {
                            changed.insert(ticker.to_string(), serde_json::to_value(winner)?);
                        }
                    }
                }
            }

            if changed.is_empty() {
                tracing::debug!(user_id, "Remote watchlist already contains every entry");
                return Ok(summary);
            }

            // A single multi-path PATCH keeps the merge all-or-nothing.
            self.patch(
                principal,
                user_id,
                &format!("users/{}/watchlist", user_id),
                &Value::Object(changed),
            )
            .await?;

            tracing::info!(
                user_id,
                inserted = summary.inserted,
                backdated = summary.backdated,
                "Merged entries into remote watchlist"
            );
            Ok(summary)
        })
        .await
    }

    async fn remove(&self, principal: &Session, user_id: &str, ticker: &Ticker) -> SyncResult<()> {
        ensure_principal(principal, user_id)?;
        bounded(self.timeout, async {
            let response = self
                .client
                .delete(self.url(&format!("users/{}/watchlist/{}", user_id, ticker)))
                .query(&[("auth", principal.id_token.as_str())])
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;
            Self::check_status(response, user_id).await?;
            Ok(())
        })
        .await
    }

    async fn create_profile(
        &self,
        principal: &Session,
        user_id: &str,
        profile: &UserProfile,
    ) -> SyncResult<()> {
        ensure_principal(principal, user_id)?;
        let body = serde_json::to_value(profile)?;
        bounded(
            self.timeout,
            self.patch(principal, user_id, &format!("users/{}", user_id), &body),
        )
        .await
    }

    fn backend_name(&self) -> &'static str {
        "firebase-rtdb"
    }
}

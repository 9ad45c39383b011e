//! Recent headlines about a company, from NewsAPI.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stockwatch_core::Ticker;

use crate::{CompanyInfo, MarketDataError};

pub const NEWS_API_URL: &str = "https://newsapi.org";
/// Headlines shown with a lookup.
pub const DEFAULT_ARTICLE_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub url: String,
    pub source: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    /// Up to `limit` articles matching `query`.
    async fn headlines(&self, query: &str, limit: usize)
        -> Result<Vec<NewsArticle>, MarketDataError>;

    fn provider_name(&self) -> &'static str;
}

/// Search by company name when known, else by ticker. `&` would split the
/// query string, so it is spelled out.
pub fn company_query(ticker: &Ticker, company: Option<&CompanyInfo>) -> String {
    let name = company
        .map(|c| c.name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(ticker.as_str());
    name.replace('&', "and")
}

#[derive(Debug, Clone)]
pub struct NewsConfig {
    pub api_key: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl NewsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: NEWS_API_URL.to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }

    /// `None` when `NEWS_API_KEY` is unset.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("NEWS_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("NEWS_API_BASE_URL") {
            config.base_url = base_url;
        }
        Some(config)
    }
}

#[derive(Clone)]
pub struct NewsApiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl NewsApiClient {
    pub fn new(config: NewsConfig) -> Result<Self, MarketDataError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MarketDataError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NewsProvider for NewsApiClient {
    async fn headlines(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<NewsArticle>, MarketDataError> {
        let page_size = limit.to_string();
        let response = self
            .client
            .get(format!("{}/v2/everything", self.base_url))
            .query(&[
                ("q", query),
                ("pageSize", page_size.as_str()),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MarketDataError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body: NewsApiResponse = response
            .json()
            .await
            .map_err(|e| MarketDataError::Unavailable(format!("HTTP {}: {}", status, e)))?;

        if status == StatusCode::TOO_MANY_REQUESTS || body.code.as_deref() == Some("rateLimited") {
            return Err(MarketDataError::RateLimited { attempts: 1 });
        }
        if body.status != "ok" {
            return Err(MarketDataError::Unavailable(format!(
                "news: {}",
                body.message
                    .or(body.code)
                    .unwrap_or_else(|| status.to_string())
            )));
        }

        let articles: Vec<NewsArticle> = body
            .articles
            .into_iter()
            .filter_map(RawArticle::into_article)
            .take(limit)
            .collect();
        tracing::debug!(query, articles = articles.len(), "Fetched headlines");
        Ok(articles)
    }

    fn provider_name(&self) -> &'static str {
        "newsapi"
    }
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    status: String,
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    source: Option<RawSource>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

impl RawArticle {
    /// Articles withdrawn by the publisher come back titled `[Removed]`.
    fn into_article(self) -> Option<NewsArticle> {
        let title = self.title.filter(|t| t != "[Removed]")?;
        Some(NewsArticle {
            title,
            url: self.url?,
            source: self.source.and_then(|s| s.name),
            description: self.description,
            published_at: self.published_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode as HttpStatus;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn article(n: usize) -> serde_json::Value {
        json!({
            "source": {"id": null, "name": "Wire"},
            "author": "Staff",
            "title": format!("Headline {}", n),
            "description": "Body",
            "url": format!("https://news.example.com/{}", n),
            "publishedAt": "2024-05-01T12:00:00Z"
        })
    }

    async fn everything(Query(query): Query<HashMap<String, String>>) -> Response {
        if query.get("apiKey").map(String::as_str) != Some("news-key") {
            return (
                HttpStatus::UNAUTHORIZED,
                Json(json!({"status": "error", "code": "apiKeyInvalid", "message": "Your API key is invalid."})),
            )
                .into_response();
        }
        match query.get("q").map(String::as_str) {
            Some("Procter and Gamble") => Json(json!({
                "status": "ok",
                "totalResults": 5,
                "articles": [
                    {"source": {"name": null}, "title": "[Removed]", "url": "https://removed.com"},
                    article(1), article(2), article(3), article(4)
                ]
            }))
            .into_response(),
            Some("BUSY") => (
                HttpStatus::TOO_MANY_REQUESTS,
                Json(json!({"status": "error", "code": "rateLimited", "message": "Too many requests"})),
            )
                .into_response(),
            _ => Json(json!({"status": "ok", "totalResults": 0, "articles": []})).into_response(),
        }
    }

    async fn spawn_fake_news(api_key: &str) -> NewsApiClient {
        let app = Router::new().route("/v2/everything", get(everything));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = NewsConfig::new(api_key);
        config.base_url = format!("http://{}", addr);
        NewsApiClient::new(config).unwrap()
    }

    #[test]
    fn test_query_prefers_company_name() {
        let ticker = Ticker::parse("pg").unwrap();
        assert_eq!(company_query(&ticker, None), "PG");

        let info = CompanyInfo {
            ticker: ticker.clone(),
            name: "Procter & Gamble".to_string(),
            exchange: Some("XNYS".to_string()),
        };
        assert_eq!(company_query(&ticker, Some(&info)), "Procter and Gamble");
    }

    #[tokio::test]
    async fn test_top_articles_only() {
        let client = spawn_fake_news("news-key").await;
        let articles = client
            .headlines("Procter and Gamble", DEFAULT_ARTICLE_COUNT)
            .await
            .unwrap();

        assert_eq!(articles.len(), 3);
        assert_eq!(articles[0].title, "Headline 1");
        assert_eq!(articles[0].source.as_deref(), Some("Wire"));
        assert!(articles[0].published_at.is_some());
    }

    #[tokio::test]
    async fn test_no_matches_is_empty() {
        let client = spawn_fake_news("news-key").await;
        assert!(client.headlines("Nothing", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_envelopes() {
        let client = spawn_fake_news("news-key").await;
        let err = client.headlines("BUSY", 3).await.unwrap_err();
        assert!(matches!(err, MarketDataError::RateLimited { .. }));

        let client = spawn_fake_news("wrong").await;
        let err = client.headlines("Apple", 3).await.unwrap_err();
        assert_eq!(
            err,
            MarketDataError::Unavailable("news: Your API key is invalid.".to_string())
        );
    }
}

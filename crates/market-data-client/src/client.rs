use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use stockwatch_core::Ticker;

use crate::rate_limiter::RateLimiter;
use crate::{CompanyInfo, MarketDataError, MarketDataProvider, OhlcBar};

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
const MAX_ATTEMPTS: u32 = 3;
/// Largest page the aggregates endpoint serves; it defaults to 5000.
const PAGE_LIMIT: &str = "50000";
const MAX_PAGES: usize = 20;

#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub api_key: String,
    pub base_url: String,
    /// Requests allowed per minute.
    pub rate_limit: usize,
    /// Pause before retrying a 429 response.
    pub retry_wait: Duration,
    pub request_timeout: Duration,
}

impl MarketDataConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            // Free tier allows 5 req/min; paid plans should raise MARKET_DATA_RATE_LIMIT.
            rate_limit: 5,
            retry_wait: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// `None` when `MARKET_DATA_API_KEY` is unset.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("MARKET_DATA_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let mut config = Self::new(api_key);

        if let Ok(base_url) = std::env::var("MARKET_DATA_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(limit) = std::env::var("MARKET_DATA_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.rate_limit = limit;
        }
        Some(config)
    }
}

#[derive(Clone)]
pub struct MarketDataClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry_wait: Duration,
    rate_limiter: RateLimiter,
}

impl MarketDataClient {
    pub fn new(config: MarketDataConfig) -> Result<Self, MarketDataError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MarketDataError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry_wait: config.retry_wait,
            rate_limiter: RateLimiter::per_minute(config.rate_limit),
        })
    }

    /// Send and decode a JSON response; 404 means the ticker is unknown.
    async fn fetch_json<T: DeserializeOwned>(
        &self,
        ticker: &Ticker,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, MarketDataError> {
        let response = self.send_request(builder).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(MarketDataError::NotFound(ticker.to_string()));
        }
        if !status.is_success() {
            return Err(MarketDataError::Unavailable(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MarketDataError::Unavailable(e.to_string()))
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, MarketDataError> {
        let request = builder
            .build()
            .map_err(|e| MarketDataError::Unavailable(e.to_string()))?;

        for attempt in 1..=MAX_ATTEMPTS {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| MarketDataError::Unavailable("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| MarketDataError::Unavailable(e.to_string()))?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            if attempt < MAX_ATTEMPTS {
                tracing::warn!(
                    "Market data 429 rate limited, waiting {}s before retry {}/{}",
                    self.retry_wait.as_secs(),
                    attempt,
                    MAX_ATTEMPTS - 1
                );
                tokio::time::sleep(self.retry_wait).await;
            }
        }

        Err(MarketDataError::RateLimited {
            attempts: MAX_ATTEMPTS,
        })
    }
}

#[async_trait]
impl MarketDataProvider for MarketDataClient {
    async fn get_history(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcBar>, MarketDataError> {
        if start > end {
            return Err(MarketDataError::InvalidRange { start, end });
        }

        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url,
            ticker,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );

        let mut page: AggregateResponse = self
            .fetch_json(
                ticker,
                self.client.get(&url).query(&[
                    ("apiKey", self.api_key.as_str()),
                    ("adjusted", "true"),
                    ("sort", "asc"),
                    ("limit", PAGE_LIMIT),
                ]),
            )
            .await?;
        let mut results = std::mem::take(&mut page.results);
        let mut pages = 1;

        while let Some(next_url) = page.next_url.take() {
            if pages >= MAX_PAGES {
                return Err(MarketDataError::Unavailable(format!(
                    "history for {} spans more than {} pages",
                    ticker, MAX_PAGES
                )));
            }
            // next_url carries the cursor but not the key
            page = self
                .fetch_json(
                    ticker,
                    self.client
                        .get(&next_url)
                        .query(&[("apiKey", self.api_key.as_str())]),
                )
                .await?;
            results.append(&mut page.results);
            pages += 1;
        }

        let mut bars: Vec<OhlcBar> = results
            .into_iter()
            .filter_map(|r| {
                Some(OhlcBar {
                    timestamp: DateTime::<Utc>::from_timestamp_millis(r.t)?,
                    open: r.o,
                    high: r.h,
                    low: r.l,
                    close: r.c,
                    volume: r.v,
                })
            })
            .collect();

        if bars.is_empty() {
            return Err(MarketDataError::NotFound(ticker.to_string()));
        }
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);

        tracing::debug!(ticker = %ticker, bars = bars.len(), "Fetched price history");
        Ok(bars)
    }

    async fn get_company_info(&self, ticker: &Ticker) -> Result<CompanyInfo, MarketDataError> {
        let url = format!("{}/v3/reference/tickers/{}", self.base_url, ticker);
        let details: TickerDetailsResponse = self
            .fetch_json(
                ticker,
                self.client
                    .get(&url)
                    .query(&[("apiKey", self.api_key.as_str())]),
            )
            .await?;

        let results = details
            .results
            .ok_or_else(|| MarketDataError::NotFound(ticker.to_string()))?;
        Ok(CompanyInfo {
            ticker: ticker.clone(),
            name: results.name,
            exchange: results.primary_exchange,
        })
    }

    fn provider_name(&self) -> &'static str {
        "polygon"
    }
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: Option<TickerDetails>,
}

#[derive(Debug, Deserialize)]
struct TickerDetails {
    name: String,
    primary_exchange: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
    #[serde(default)]
    next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp (ms)
    o: f64, // open
    h: f64, // high
    l: f64, // low
    c: f64, // close
    #[serde(default)]
    v: f64, // volume
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode as HttpStatus;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const DAY_MS: i64 = 86_400_000;

    #[derive(Clone)]
    struct FakeApi {
        hits: Arc<AtomicUsize>,
        base: Arc<String>,
    }

    async fn aggs(
        State(api): State<FakeApi>,
        Path((symbol, from, to)): Path<(String, String, String)>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Response {
        api.hits.fetch_add(1, Ordering::SeqCst);
        if query.get("apiKey").map(String::as_str) != Some("test-key") {
            return HttpStatus::UNAUTHORIZED.into_response();
        }
        match symbol.as_str() {
            // Deliberately out of order
            "AAPL" => Json(json!({
                "ticker": "AAPL",
                "resultsCount": 2,
                "results": [
                    {"t": 1_700_000_000_000i64 + DAY_MS, "o": 2.0, "h": 3.0, "l": 1.5, "c": 2.5, "v": 100.0},
                    {"t": 1_700_000_000_000i64, "o": 1.0, "h": 2.0, "l": 0.5, "c": 1.5, "v": 90.0}
                ]
            }))
            .into_response(),
            // Truncated first page that points at a second one
            "PAGED" if !query.contains_key("cursor") => {
                assert_eq!(query.get("limit").map(String::as_str), Some("50000"));
                Json(json!({
                    "ticker": "PAGED",
                    "queryCount": 3,
                    "resultsCount": 2,
                    "results": [
                        {"t": 1_700_000_000_000i64, "o": 1.0, "h": 1.0, "l": 1.0, "c": 1.0, "v": 1.0},
                        {"t": 1_700_000_000_000i64 + DAY_MS, "o": 2.0, "h": 2.0, "l": 2.0, "c": 2.0, "v": 1.0}
                    ],
                    "next_url": format!(
                        "{}/v2/aggs/ticker/PAGED/range/1/day/{}/{}?cursor=page2",
                        api.base, from, to
                    )
                }))
                .into_response()
            }
            "PAGED" => Json(json!({
                "ticker": "PAGED",
                "resultsCount": 1,
                "results": [
                    {"t": 1_700_000_000_000i64 + 2 * DAY_MS, "o": 3.0, "h": 3.0, "l": 3.0, "c": 3.0, "v": 1.0}
                ]
            }))
            .into_response(),
            "EMPTY" => Json(json!({"ticker": "EMPTY", "resultsCount": 0})).into_response(),
            "BUSY" => HttpStatus::TOO_MANY_REQUESTS.into_response(),
            _ => HttpStatus::INTERNAL_SERVER_ERROR.into_response(),
        }
    }

    async fn details(Path(symbol): Path<String>) -> Response {
        match symbol.as_str() {
            "AAPL" => Json(json!({
                "status": "OK",
                "results": {
                    "ticker": "AAPL",
                    "name": "Apple Inc.",
                    "market": "stocks",
                    "primary_exchange": "XNAS"
                }
            }))
            .into_response(),
            _ => (
                HttpStatus::NOT_FOUND,
                Json(json!({"status": "NOT_FOUND", "message": "Ticker not found."})),
            )
                .into_response(),
        }
    }

    async fn spawn_fake_api() -> (MarketDataClient, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);
        let app = Router::new()
            .route("/v2/aggs/ticker/:symbol/range/1/day/:from/:to", get(aggs))
            .route("/v3/reference/tickers/:symbol", get(details))
            .with_state(FakeApi {
                hits: hits.clone(),
                base: Arc::new(base.clone()),
            });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = MarketDataConfig::new("test-key");
        config.base_url = base;
        config.rate_limit = 100;
        config.retry_wait = Duration::ZERO;
        (MarketDataClient::new(config).unwrap(), hits)
    }

    fn range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2023, 11, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 11, 30).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_history_sorted_oldest_first() {
        let (client, _) = spawn_fake_api().await;
        let (start, end) = range();
        let bars = client
            .get_history(&Ticker::parse("aapl").unwrap(), start, end)
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(bars[0].close, 1.5);
    }

    #[tokio::test]
    async fn test_follows_next_url_until_complete() {
        let (client, hits) = spawn_fake_api().await;
        let (start, end) = range();
        let bars = client
            .get_history(&Ticker::parse("PAGED").unwrap(), start, end)
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(bars.len(), 3);
        // Newest bar comes from the second page
        assert_eq!(bars.last().unwrap().close, 3.0);
    }

    #[tokio::test]
    async fn test_company_info() {
        let (client, _) = spawn_fake_api().await;
        let info = client
            .get_company_info(&Ticker::parse("aapl").unwrap())
            .await
            .unwrap();
        assert_eq!(info.name, "Apple Inc.");
        assert_eq!(info.exchange.as_deref(), Some("XNAS"));

        let err = client
            .get_company_info(&Ticker::parse("ZZZZ").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, MarketDataError::NotFound("ZZZZ".to_string()));
    }

    #[tokio::test]
    async fn test_empty_result_is_not_found() {
        let (client, _) = spawn_fake_api().await;
        let (start, end) = range();
        let err = client
            .get_history(&Ticker::parse("EMPTY").unwrap(), start, end)
            .await
            .unwrap_err();
        assert_eq!(err, MarketDataError::NotFound("EMPTY".to_string()));
    }

    #[tokio::test]
    async fn test_rate_limited_after_three_attempts() {
        let (client, hits) = spawn_fake_api().await;
        let (start, end) = range();
        let err = client
            .get_history(&Ticker::parse("BUSY").unwrap(), start, end)
            .await
            .unwrap_err();
        assert_eq!(err, MarketDataError::RateLimited { attempts: 3 });
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let (client, _) = spawn_fake_api().await;
        let (start, end) = range();
        let err = client
            .get_history(&Ticker::parse("BOOM").unwrap(), start, end)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketDataError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_inverted_range_rejected() {
        let (client, hits) = spawn_fake_api().await;
        let (start, end) = range();
        let err = client
            .get_history(&Ticker::parse("AAPL").unwrap(), end, start)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketDataError::InvalidRange { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}

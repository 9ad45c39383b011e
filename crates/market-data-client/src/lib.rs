//! Daily price history, company details and headlines for watchlist tickers.

pub mod cache;
pub mod client;
pub mod news;
pub mod period;
pub mod rate_limiter;
pub mod snapshot;

pub use cache::CachedMarketData;
pub use client::{MarketDataClient, MarketDataConfig};
pub use news::{company_query, NewsApiClient, NewsArticle, NewsConfig, NewsProvider};
pub use period::HistoryPeriod;
pub use rate_limiter::RateLimiter;
pub use snapshot::{StockSnapshot, Trend};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use stockwatch_core::{Ticker, ValidationError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("No price data for {0}")]
    NotFound(String),

    #[error("Rate limited by market data API after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Market data unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// One daily OHLC bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Listing details shown next to a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub ticker: Ticker,
    pub name: String,
    /// Primary exchange code, e.g. `XNAS`.
    pub exchange: Option<String>,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily bars for `ticker` between `start` and `end` inclusive, oldest
    /// first.
    async fn get_history(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcBar>, MarketDataError>;

    async fn get_period_history(
        &self,
        ticker: &Ticker,
        period: HistoryPeriod,
    ) -> Result<Vec<OhlcBar>, MarketDataError> {
        let (start, end) = period.range_ending(Utc::now().date_naive());
        self.get_history(ticker, start, end).await
    }

    async fn get_company_info(&self, ticker: &Ticker) -> Result<CompanyInfo, MarketDataError>;

    fn provider_name(&self) -> &'static str;
}

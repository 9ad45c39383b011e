use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use stockwatch_core::Ticker;
use tokio::time::Instant;

use crate::{CompanyInfo, MarketDataError, MarketDataProvider, OhlcBar};

/// Cached history is reused for a day before it is fetched again.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(24 * 60 * 60);

type CacheKey = (Ticker, NaiveDate, NaiveDate);

struct CachedHistory {
    bars: Arc<Vec<OhlcBar>>,
    fetched_at: Instant,
}

/// Per-(ticker, range) history cache in front of another provider, plus
/// company details per ticker. Errors are never cached.
pub struct CachedMarketData {
    inner: Arc<dyn MarketDataProvider>,
    entries: DashMap<CacheKey, CachedHistory>,
    companies: DashMap<Ticker, (CompanyInfo, Instant)>,
    freshness: Duration,
}

impl CachedMarketData {
    pub fn new(inner: Arc<dyn MarketDataProvider>) -> Self {
        Self::with_freshness(inner, DEFAULT_FRESHNESS)
    }

    pub fn with_freshness(inner: Arc<dyn MarketDataProvider>, freshness: Duration) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            companies: DashMap::new(),
            freshness,
        }
    }

    pub fn invalidate(&self, ticker: &Ticker) {
        self.entries.retain(|(cached, _, _), _| cached != ticker);
        self.companies.remove(ticker);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn fresh(&self, key: &CacheKey) -> Option<Arc<Vec<OhlcBar>>> {
        let entry = self.entries.get(key)?;
        let fresh = entry.fetched_at.elapsed() < self.freshness;
        let bars = entry.bars.clone();
        fresh.then_some(bars)
    }
}

#[async_trait]
impl MarketDataProvider for CachedMarketData {
    async fn get_history(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcBar>, MarketDataError> {
        let key = (ticker.clone(), start, end);
        if let Some(bars) = self.fresh(&key) {
            tracing::debug!(ticker = %ticker, "Price history cache hit");
            return Ok(bars.as_ref().clone());
        }

        let bars = self.inner.get_history(ticker, start, end).await?;
        self.entries.insert(
            key,
            CachedHistory {
                bars: Arc::new(bars.clone()),
                fetched_at: Instant::now(),
            },
        );
        Ok(bars)
    }

    async fn get_company_info(&self, ticker: &Ticker) -> Result<CompanyInfo, MarketDataError> {
        if let Some(cached) = self.companies.get(ticker) {
            let (info, fetched_at) = cached.value();
            if fetched_at.elapsed() < self.freshness {
                return Ok(info.clone());
            }
        }

        let info = self.inner.get_company_info(ticker).await?;
        self.companies
            .insert(ticker.clone(), (info.clone(), Instant::now()));
        Ok(info)
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for CountingProvider {
        async fn get_history(
            &self,
            ticker: &Ticker,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<OhlcBar>, MarketDataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if ticker.as_str() == "NONE" {
                return Err(MarketDataError::NotFound(ticker.to_string()));
            }
            Ok(vec![OhlcBar {
                timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 10.0,
            }])
        }

        async fn get_company_info(
            &self,
            ticker: &Ticker,
        ) -> Result<CompanyInfo, MarketDataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CompanyInfo {
                ticker: ticker.clone(),
                name: format!("{} Corp", ticker),
                exchange: None,
            })
        }

        fn provider_name(&self) -> &'static str {
            "counting"
        }
    }

    fn dates() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_fresh_entries_served_from_cache() {
        let inner = Arc::new(CountingProvider::default());
        let cache = CachedMarketData::new(inner.clone());
        let aapl = Ticker::parse("AAPL").unwrap();
        let (start, end) = dates();

        let first = cache.get_history(&aapl, start, end).await.unwrap();
        let second = cache.get_history(&aapl, start, end).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        // A different range is a different entry
        cache.get_history(&aapl, start, start).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);

        cache.invalidate(&aapl);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_stale_entries_refetched() {
        let inner = Arc::new(CountingProvider::default());
        let cache = CachedMarketData::with_freshness(inner.clone(), Duration::ZERO);
        let aapl = Ticker::parse("AAPL").unwrap();
        let (start, end) = dates();

        cache.get_history(&aapl, start, end).await.unwrap();
        cache.get_history(&aapl, start, end).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_not_cached() {
        let inner = Arc::new(CountingProvider::default());
        let cache = CachedMarketData::new(inner.clone());
        let none = Ticker::parse("NONE").unwrap();
        let (start, end) = dates();

        assert!(cache.get_history(&none, start, end).await.is_err());
        assert!(cache.get_history(&none, start, end).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_company_info_cached_until_invalidated() {
        let inner = Arc::new(CountingProvider::default());
        let cache = CachedMarketData::new(inner.clone());
        let aapl = Ticker::parse("AAPL").unwrap();

        let info = cache.get_company_info(&aapl).await.unwrap();
        assert_eq!(cache.get_company_info(&aapl).await.unwrap(), info);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        cache.invalidate(&aapl);
        cache.get_company_info(&aapl).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}

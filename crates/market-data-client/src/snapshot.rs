use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use stockwatch_core::Ticker;

use crate::{CompanyInfo, OhlcBar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn between(current: f64, reference: f64) -> Self {
        if current > reference {
            Trend::Up
        } else if current < reference {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Trend::Up => "▲",
            Trend::Down => "▼",
            Trend::Flat => "-",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// Latest session's prices with trend markers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockSnapshot {
    pub ticker: Ticker,
    pub as_of: DateTime<Utc>,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub previous_close: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
}

impl StockSnapshot {
    /// Build from bars ordered oldest first. `None` when there are no bars.
    pub fn from_bars(ticker: Ticker, bars: &[OhlcBar]) -> Option<Self> {
        let (latest, earlier) = bars.split_last()?;
        Some(Self {
            ticker,
            as_of: latest.timestamp,
            open: round2(latest.open),
            close: round2(latest.close),
            high: round2(latest.high),
            low: round2(latest.low),
            previous_close: earlier.last().map(|b| round2(b.close)),
            name: None,
            exchange: None,
        })
    }

    pub fn with_company(mut self, info: &CompanyInfo) -> Self {
        self.name = Some(info.name.clone());
        self.exchange = info.exchange.clone();
        self
    }

    /// Open against the previous close; flat when there is no previous bar.
    pub fn open_trend(&self) -> Trend {
        self.previous_close
            .map(|prev| Trend::between(self.open, prev))
            .unwrap_or(Trend::Flat)
    }

    /// Close against the open.
    pub fn close_trend(&self) -> Trend {
        Trend::between(self.close, self.open)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl fmt::Display for StockSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.exchange) {
            (Some(name), Some(exchange)) => writeln!(f, "{} ({})", name, exchange)?,
            (Some(name), None) => writeln!(f, "{}", name)?,
            _ => {}
        }
        write!(
            f,
            "{}  OPEN ${:.2} {}  CLOSE ${:.2} {}  LOW ${:.2}  HIGH ${:.2}",
            self.ticker,
            self.open,
            self.open_trend(),
            self.close,
            self.close_trend(),
            self.low,
            self.high
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(day: i64, open: f64, close: f64) -> OhlcBar {
        OhlcBar {
            timestamp: Utc.timestamp_opt(1_700_000_000 + day * 86_400, 0).unwrap(),
            open,
            high: open.max(close) + 1.0,
            low: open.min(close) - 1.0,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn test_trends_from_latest_bars() {
        let ticker = Ticker::parse("AAPL").unwrap();
        let snapshot =
            StockSnapshot::from_bars(ticker, &[bar(0, 10.0, 11.0), bar(1, 11.5, 11.2)]).unwrap();

        assert_eq!(snapshot.previous_close, Some(11.0));
        assert_eq!(snapshot.open_trend(), Trend::Up);
        assert_eq!(snapshot.close_trend(), Trend::Down);
        assert!(snapshot.to_string().contains("OPEN $11.50 ▲"));
    }

    #[test]
    fn test_single_bar_and_empty() {
        let ticker = Ticker::parse("MSFT").unwrap();
        let snapshot = StockSnapshot::from_bars(ticker.clone(), &[bar(0, 5.0, 5.0)]).unwrap();
        assert_eq!(snapshot.previous_close, None);
        assert_eq!(snapshot.open_trend(), Trend::Flat);
        assert_eq!(snapshot.close_trend(), Trend::Flat);

        assert!(StockSnapshot::from_bars(ticker, &[]).is_none());
    }

    #[test]
    fn test_prices_rounded_to_cents() {
        let ticker = Ticker::parse("NVDA").unwrap();
        let snapshot = StockSnapshot::from_bars(ticker, &[bar(0, 1.23456, 2.34567)]).unwrap();
        assert_eq!(snapshot.open, 1.23);
        assert_eq!(snapshot.close, 2.35);
    }

    #[test]
    fn test_company_header() {
        let ticker = Ticker::parse("AAPL").unwrap();
        let snapshot = StockSnapshot::from_bars(ticker.clone(), &[bar(0, 5.0, 6.0)])
            .unwrap()
            .with_company(&CompanyInfo {
                ticker,
                name: "Apple Inc.".to_string(),
                exchange: Some("XNAS".to_string()),
            });
        let text = snapshot.to_string();
        assert!(text.starts_with("Apple Inc. (XNAS)\nAAPL  OPEN $5.00"));
    }
}

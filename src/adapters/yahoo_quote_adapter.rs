//! Live quotes from the Yahoo Finance chart endpoint.
//!
//! The client is blocking. Async callers must run lookups on a blocking
//! thread (`tokio::task::spawn_blocking`).

use std::time::Duration;

use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::domain::error::FireError;
use crate::domain::money::CENTS_SCALE;
use crate::domain::quote::{Quote, normalize_symbol};
use crate::ports::config_port::ConfigPort;
use crate::ports::quote_port::QuotePort;

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_TIMEOUT_SECS: i64 = 10;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; firetrack)";

const UNKNOWN_NAME: &str = "Unknown";

pub struct YahooQuoteAdapter {
    base_url: String,
    client: Client,
}

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(alias = "longName")]
    long_name: Option<String>,
    #[serde(alias = "shortName")]
    short_name: Option<String>,
}

impl YahooQuoteAdapter {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self, FireError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FireError::ConfigInvalid {
                section: "quotes".into(),
                key: "base_url".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FireError> {
        let base_url = config
            .get_string("quotes", "base_url")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_secs = config.get_int("quotes", "timeout_secs", DEFAULT_TIMEOUT_SECS);
        if timeout_secs <= 0 {
            return Err(FireError::ConfigInvalid {
                section: "quotes".into(),
                key: "timeout_secs".into(),
                reason: "must be a positive number of seconds".into(),
            });
        }
        let user_agent = config
            .get_string("quotes", "user_agent")
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        Self::new(
            &base_url,
            Duration::from_secs(timeout_secs as u64),
            &user_agent,
        )
    }

    fn fetch(&self, symbol: &str) -> Result<Option<Quote>, reqwest::Error> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        debug!("Requesting quote from {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("interval", "1d"), ("range", "1d")])
            .send()?;
        if !response.status().is_success() {
            debug!(status = %response.status(), "quote request was not successful");
            return Ok(None);
        }

        let body: ChartResponse = response.json()?;
        let Some(meta) = body
            .chart
            .result
            .and_then(|items| items.into_iter().next())
            .map(|item| item.meta)
        else {
            return Ok(None);
        };

        let price = meta
            .regular_market_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .and_then(|p| Decimal::try_from(p).ok())
            .map(|p| p.round_dp(CENTS_SCALE))
            .filter(|p| *p > Decimal::ZERO);
        let Some(price) = price else {
            return Ok(None);
        };

        let name = meta
            .long_name
            .or(meta.short_name)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());

        Ok(Some(Quote {
            symbol: symbol.to_string(),
            name,
            price,
        }))
    }
}

impl QuotePort for YahooQuoteAdapter {
    #[instrument(name = "YahooQuoteLookup", skip(self))]
    fn lookup(&self, symbol: &str) -> Option<Quote> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return None;
        }
        match self.fetch(&symbol) {
            Ok(quote) => quote,
            Err(e) => {
                warn!(%symbol, error = %e, "quote lookup failed");
                None
            }
        }
    }
}

//! Yahoo Finance chart adapter for daily bars.
//!
//! # Endpoint
//! `GET {base}/v8/finance/chart/{symbol}?period1=..&period2=..&interval=1d`
//!
//! The chart response carries parallel arrays (`timestamp`,
//! `indicators.quote[0].close`, `indicators.quote[0].volume`) in which
//! missing values are `null`. Rows with a missing or non-finite close or
//! volume are dropped.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use cb_common::config::HistoryConfig;

use super::provider::{HistoryProvider, ProviderError};
use super::DailyBar;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Daily history from the Yahoo Finance chart API.
pub struct YahooHistoryProvider {
    client: reqwest::Client,
    base_url: String,
}

impl YahooHistoryProvider {
    /// Create a provider against the given base URL.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::InvalidRequest(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create from config
    pub fn from_config(config: &HistoryConfig) -> Result<Self, ProviderError> {
        Self::new(config.base_url.clone(), Duration::from_secs(config.timeout_secs))
    }
}

/// Unix timestamp of midnight UTC at the start of `date`.
fn day_start_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

#[async_trait]
impl HistoryProvider for YahooHistoryProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn get_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, ProviderError> {
        if start >= end {
            return Err(ProviderError::InvalidRequest(format!(
                "empty window {} .. {}",
                start, end
            )));
        }

        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let period1 = day_start_timestamp(start).to_string();
        let period2 = day_start_timestamp(end).to_string();

        debug!(symbol = symbol, %start, %end, "Fetching daily bars");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.as_str()),
                ("period2", period2.as_str()),
                ("interval", "1d"),
                ("events", "history"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::DataNotAvailable(format!(
                "{}: symbol not found",
                symbol
            )));
        }
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
            });
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("{}: {}", symbol, e)))?;

        parse_chart(symbol, body)
    }
}

// ============================================================================
// Chart API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn parse_chart(symbol: &str, body: ChartResponse) -> Result<Vec<DailyBar>, ProviderError> {
    if let Some(err) = body.chart.error {
        return Err(ProviderError::DataNotAvailable(format!(
            "{}: {} {}",
            symbol,
            err.code.unwrap_or_default(),
            err.description.unwrap_or_default()
        )));
    }

    let result = body
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| ProviderError::DataNotAvailable(format!("{}: empty result", symbol)))?;

    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse(format!("{}: no quote indicator", symbol)))?;

    let offset = result.meta.gmtoffset;
    let mut bars: Vec<DailyBar> = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let close = quote.close.get(i).copied().flatten()?;
            let volume = quote.volume.get(i).copied().flatten()?;
            if !close.is_finite() || !volume.is_finite() {
                return None;
            }
            let date = DateTime::from_timestamp(ts + offset, 0)?.date_naive();
            Some(DailyBar::new(date, close, volume))
        })
        .collect();

    bars.sort_by_key(|b| b.date);

    Ok(bars)
}

// ============================================================================
// Tests
// ============================================================================

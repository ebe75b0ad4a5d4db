//! Data source abstractions.
//!
//! `ListingSource` produces the instrument universe; `HistoryProvider`
//! produces daily bars. Both report failures as `ProviderError` so the
//! callers can degrade instead of aborting.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

use super::{DailyBar, Instrument};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data sources.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Connection failed, timed out, or the body could not be read
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("HTTP {status}")]
    Http { status: u16 },

    /// Response arrived but could not be understood
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// No data for the requested symbol
    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Failures of the transport rather than of the data.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http { .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Http {
                status: status.as_u16(),
            },
            None => Self::Network(e.to_string()),
        }
    }
}

// ============================================================================
// Listing Source
// ============================================================================

/// A strategy that produces the list of instruments to scan.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Source name used in logs (e.g., "tpex_json")
    fn name(&self) -> &'static str;

    /// Fetch the current instrument list.
    async fn fetch_instruments(&self) -> Result<Vec<Instrument>, ProviderError>;
}

// ============================================================================
// History Provider
// ============================================================================

/// Per-symbol results of one batch request.
pub type BatchHistory = HashMap<String, Result<Vec<DailyBar>, ProviderError>>;

/// Trait for daily history providers.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Provider name used in logs
    fn name(&self) -> &'static str;

    /// Fetch daily bars for one symbol, oldest first.
    ///
    /// `end` is exclusive.
    async fn get_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, ProviderError>;

    /// Fetch daily bars for a batch of symbols.
    ///
    /// Individual failures are returned per symbol. The whole batch fails
    /// only when every symbol failed at the transport level.
    async fn get_daily_bars_batch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BatchHistory, ProviderError> {
        let mut results = BatchHistory::with_capacity(symbols.len());
        let mut last_transport_error = None;
        let mut transport_failures = 0usize;

        for symbol in symbols {
            let result = self.get_daily_bars(symbol, start, end).await;
            if let Err(e) = &result {
                if e.is_transport() {
                    transport_failures += 1;
                    last_transport_error = Some(e.clone());
                }
            }
            results.insert(symbol.clone(), result);
        }

        if !symbols.is_empty() && transport_failures == symbols.len() {
            let last = last_transport_error
                .map(|e| e.to_string())
                .unwrap_or_default();
            return Err(ProviderError::Network(format!(
                "all {} symbols in batch failed, last error: {}",
                symbols.len(),
                last
            )));
        }

        Ok(results)
    }
}

// ============================================================================
// Tests
// ============================================================================

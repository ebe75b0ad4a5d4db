//! Market data module for TPEx convertible bonds.
//!
//! Provides instrument list acquisition with ordered fallback and daily
//! history retrieval.
//!
//! # Data Sources
//! - **TPEx JSON** (Primary): CB daily trading result, `aaData` rows
//! - **TPEx CSV** (Secondary): same report as a CSV download
//! - **Backup list** (Last resort): fixed watch list compiled into the binary
//! - **Yahoo chart API**: daily bars keyed by `<code>.TWO`

mod backup;
mod listing;
mod provider;
mod tpex;
mod yahoo;

pub use backup::{backup_instruments, BackupListSource};
pub use listing::{Acquisition, AttemptOutcome, ListingRouter, SourceAttempt};
pub use provider::{BatchHistory, HistoryProvider, ListingSource, ProviderError};
pub use tpex::{parse_csv_listing, parse_json_listing, ListingFormat, TpexListingSource};
pub use yahoo::YahooHistoryProvider;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Data Types
// ============================================================================

/// Width of a TPEx convertible-bond code.
pub const INSTRUMENT_CODE_LEN: usize = 5;

/// A tradable convertible bond.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Five-digit bond code (e.g., "33241")
    pub code: String,
    /// Display name
    pub name: String,
}

impl Instrument {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }

    /// Build an instrument from a raw listing row.
    ///
    /// Returns `None` unless the trimmed code is exactly five ASCII digits.
    pub fn from_listing_row(code: &str, name: &str) -> Option<Self> {
        let code = code.trim();
        if code.len() != INSTRUMENT_CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        Some(Self::new(code, name.trim()))
    }

    /// Symbol used by the history provider (e.g., "33241.TWO").
    pub fn symbol(&self, suffix: &str) -> String {
        format!("{}{}", self.code, suffix)
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.name)
    }
}

/// One daily bar. Only the fields the filter needs are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    /// Trading date (exchange local)
    pub date: NaiveDate,
    /// Close price
    pub close: f64,
    /// Raw volume as reported by the provider (shares or lots)
    pub volume: f64,
}

impl DailyBar {
    pub fn new(date: NaiveDate, close: f64, volume: f64) -> Self {
        Self { date, close, volume }
    }
}

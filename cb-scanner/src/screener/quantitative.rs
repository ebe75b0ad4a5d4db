//! Quantitative filter for convertible bonds.
//!
//! Implements a short-circuiting funnel over each bond's daily series:
//! 0. History: at least `min_rows` usable bars
//! 1. Price: last close inside `[min_price, max_price]`
//! 2. Volume: average of the last `volume_window` volumes, in lots, at least `min_avg_vol_lots`
//! 3. Drop: decline from the close `drop_lookback` bars earlier exceeds `drop_rate_threshold`
//!
//! # Volume units
//!
//! Providers report CB volume either in shares or in lots (1 lot = 1,000
//! shares) with nothing in the payload saying which. An average above
//! `share_unit_threshold` is taken to be shares and divided by
//! `shares_per_lot`; anything else is taken to be lots already.

use serde::{Deserialize, Serialize};

use cb_common::config::FilterConfig;

use crate::data::{DailyBar, Instrument, ProviderError};

// ============================================================================
// Filter Stage
// ============================================================================

/// Funnel stage, used to track where instruments are eliminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FilterStage {
    /// All instruments from acquisition
    Input,
    /// History retrieved with enough rows
    History,
    /// Price band
    Price,
    /// Average volume
    Volume,
    /// Short-term drop
    Drop,
    /// Matches
    Final,
}

impl std::fmt::Display for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "輸入"),
            Self::History => write!(f, "歷史資料"),
            Self::Price => write!(f, "價格區間"),
            Self::Volume => write!(f, "均量"),
            Self::Drop => write!(f, "急跌"),
            Self::Final => write!(f, "最終結果"),
        }
    }
}

// ============================================================================
// Filter Result
// ============================================================================

/// Result of one funnel stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    /// Stage name
    pub stage: FilterStage,
    /// Number of instruments that passed this stage
    pub passed: usize,
    /// Number of instruments eliminated at this stage
    pub eliminated: usize,
    /// Elimination rate (%)
    pub elimination_rate: f64,
}

impl FilterResult {
    pub fn new(stage: FilterStage, input_count: usize, passed_count: usize) -> Self {
        let eliminated = input_count.saturating_sub(passed_count);
        let elimination_rate = if input_count > 0 {
            (eliminated as f64 / input_count as f64) * 100.0
        } else {
            0.0
        };

        Self {
            stage,
            passed: passed_count,
            eliminated,
            elimination_rate,
        }
    }
}

// ============================================================================
// Evaluation Outcome
// ============================================================================

/// An instrument that passed every condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub instrument: Instrument,
    /// Most recent close
    pub last_close: f64,
    /// Decline from the reference close, in percent
    pub drop_percent: f64,
    /// Average volume in whole lots
    pub display_volume: i64,
}

/// Why an instrument is not a match.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SkipReason {
    #[error("history unavailable: {0}")]
    Fetch(ProviderError),

    #[error("no series returned")]
    MissingSeries,

    #[error("only {rows} usable rows, need {required}")]
    InsufficientRows { rows: usize, required: usize },

    #[error("last close {close} outside price band")]
    PriceOutOfBand { close: f64 },

    #[error("average volume {lots} lots below minimum")]
    VolumeTooLow { lots: i64 },

    #[error("reference close {price} is not positive")]
    InvalidReferencePrice { price: f64 },

    #[error("drop {drop:.4} not above threshold")]
    DropTooSmall { drop: f64 },
}

impl SkipReason {
    /// Funnel stage at which the instrument was eliminated.
    pub fn stage(&self) -> FilterStage {
        match self {
            Self::Fetch(_) | Self::MissingSeries | Self::InsufficientRows { .. } => {
                FilterStage::History
            }
            Self::PriceOutOfBand { .. } => FilterStage::Price,
            Self::VolumeTooLow { .. } => FilterStage::Volume,
            Self::InvalidReferencePrice { .. } | Self::DropTooSmall { .. } => FilterStage::Drop,
        }
    }

    /// Short label used for tallies in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch_failed",
            Self::MissingSeries => "missing_series",
            Self::InsufficientRows { .. } => "insufficient_rows",
            Self::PriceOutOfBand { .. } => "price_out_of_band",
            Self::VolumeTooLow { .. } => "volume_too_low",
            Self::InvalidReferencePrice { .. } => "invalid_reference_price",
            Self::DropTooSmall { .. } => "drop_too_small",
        }
    }
}

// ============================================================================
// Pure Conditions
// ============================================================================

/// Convert a raw average volume to lots.
pub fn normalize_volume_lots(avg_raw: f64, share_unit_threshold: f64, shares_per_lot: f64) -> f64 {
    if avg_raw > share_unit_threshold {
        avg_raw / shares_per_lot
    } else {
        avg_raw
    }
}

/// Fractional decline from `prior` to `last`. Positive means the price fell.
pub fn drop_rate(prior: f64, last: f64) -> f64 {
    (prior - last) / prior
}

// ============================================================================
// Quantitative Filter
// ============================================================================

/// Filter over one instrument's daily series.
///
/// Stateless; evaluating the same input twice gives the same outcome.
#[derive(Debug, Clone)]
pub struct QuantitativeFilter {
    config: FilterConfig,
}

impl QuantitativeFilter {
    /// Create a new filter with the given configuration.
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn passes_price(&self, close: f64) -> bool {
        self.config.min_price <= close && close <= self.config.max_price
    }

    /// Average lots over the trailing window, truncated to whole lots.
    pub fn average_lots(&self, bars: &[DailyBar]) -> i64 {
        let window = self.config.volume_window.min(bars.len());
        if window == 0 {
            return 0;
        }

        let tail = &bars[bars.len() - window..];
        let avg_raw = tail.iter().map(|b| b.volume).sum::<f64>() / window as f64;

        normalize_volume_lots(
            avg_raw,
            self.config.share_unit_threshold,
            self.config.shares_per_lot,
        ) as i64
    }

    pub fn passes_volume(&self, lots: i64) -> bool {
        lots >= self.config.min_avg_vol_lots
    }

    pub fn passes_drop(&self, drop: f64) -> bool {
        drop > self.config.drop_rate_threshold
    }

    /// Evaluate one instrument. `bars` must be ordered oldest first.
    pub fn evaluate(&self, instrument: &Instrument, bars: &[DailyBar]) -> Result<Match, SkipReason> {
        let required = self.config.min_rows.max(self.config.drop_lookback + 1);
        if bars.len() < required {
            return Err(SkipReason::InsufficientRows {
                rows: bars.len(),
                required,
            });
        }

        let last_close = bars[bars.len() - 1].close;
        if !self.passes_price(last_close) {
            return Err(SkipReason::PriceOutOfBand { close: last_close });
        }

        let lots = self.average_lots(bars);
        if !self.passes_volume(lots) {
            return Err(SkipReason::VolumeTooLow { lots });
        }

        let prior_close = bars[bars.len() - 1 - self.config.drop_lookback].close;
        if prior_close <= 0.0 {
            return Err(SkipReason::InvalidReferencePrice { price: prior_close });
        }

        let drop = drop_rate(prior_close, last_close);
        if !self.passes_drop(drop) {
            return Err(SkipReason::DropTooSmall { drop });
        }

        Ok(Match {
            instrument: instrument.clone(),
            last_close,
            drop_percent: drop * 100.0,
            display_volume: lots,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

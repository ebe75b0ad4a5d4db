//! Convertible-bond screener.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌────────────────┐    ┌──────────────┐
//! │ Instruments  │───▶│ ScreenerEngine │───▶│ ScanOutcome  │
//! │ (listing)    │    │ batch history  │    │ matches and  │
//! └──────────────┘    └───────┬────────┘    │ skip tallies │
//!                             │             └──────────────┘
//!                  ┌──────────┴─────────┐
//!                  │ QuantitativeFilter │
//!                  │ rows, price,       │
//!                  │ volume, drop       │
//!                  └────────────────────┘
//! ```

pub mod engine;
pub mod quantitative;
pub mod report;

pub use engine::{ScanOutcome, ScreenerEngine};
pub use quantitative::{FilterResult, FilterStage, Match, QuantitativeFilter, SkipReason};
pub use report::{format_alert, format_backup_warning, format_match, ALERT_HEADER};

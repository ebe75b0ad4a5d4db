//! Configuration management for the CB scanner.
//!
//! The scanner reads an optional JSON file at `~/.cb-scanner/config.json`
//! (or the path in `CB_SCANNER_CONFIG`). Every field has a default, so a
//! missing file or a partial file is fine.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `DISCORD_WEBHOOK` → notification.webhook_url
//! - `CB_SCANNER_LOG_LEVEL` → observability.log_level
//! - `CB_SCANNER_LOG_FORMAT` → observability.log_format
//! - `CB_SCANNER_DRY_RUN` → notification.dry_run
//! - `CB_SCANNER_BATCH_SIZE` → history.batch_size
//! - `CB_SCANNER_LOOKBACK_DAYS` → history.lookback_days

use crate::error::{Result, ResultExt};
use crate::validation::Validate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding an explicit config file path.
pub const CONFIG_PATH_ENV: &str = "CB_SCANNER_CONFIG";

/// Environment variable holding the webhook destination.
pub const WEBHOOK_ENV: &str = "DISCORD_WEBHOOK";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".cb-scanner"),
        |dirs| dirs.home_dir().join(".cb-scanner"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for one scanner run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Instrument list acquisition
    #[serde(default)]
    pub listing: ListingConfig,

    /// Daily history retrieval
    #[serde(default)]
    pub history: HistoryConfig,

    /// Filter thresholds
    #[serde(default)]
    pub filter: FilterConfig,

    /// Webhook notification
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Pass the configuration through validation.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(WEBHOOK_ENV) {
            let url = url.trim().to_string();
            self.notification.webhook_url = if url.is_empty() { None } else { Some(url) };
        }

        if let Some(level) = lookup("CB_SCANNER_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("CB_SCANNER_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        if let Some(flag) = lookup("CB_SCANNER_DRY_RUN") {
            self.notification.dry_run = matches!(flag.trim(), "1" | "true" | "TRUE" | "yes");
        }

        if let Some(size) = lookup("CB_SCANNER_BATCH_SIZE") {
            if let Ok(n) = size.trim().parse() {
                self.history.batch_size = n;
            }
        }
        if let Some(days) = lookup("CB_SCANNER_LOOKBACK_DAYS") {
            if let Ok(n) = days.trim().parse() {
                self.history.lookback_days = n;
            }
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Listing
// ============================================================================

/// Instrument list acquisition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// TPEx CB daily result endpoint, JSON flavour
    #[serde(default = "default_json_url")]
    pub json_url: String,

    /// TPEx CB daily result endpoint, CSV flavour
    #[serde(default = "default_csv_url")]
    pub csv_url: String,

    /// Referer header sent with listing requests
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Browser-like user agent sent with listing requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout
    #[serde(default = "default_listing_timeout")]
    pub timeout_secs: u64,

    /// A strategy must return strictly more than this many instruments
    #[serde(default = "default_min_instruments")]
    pub min_instruments: usize,

    /// Pause before the first live request
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            json_url: default_json_url(),
            csv_url: default_csv_url(),
            referer: default_referer(),
            user_agent: default_user_agent(),
            timeout_secs: default_listing_timeout(),
            min_instruments: default_min_instruments(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

fn default_json_url() -> String {
    "https://www.tpex.org.tw/web/bond/tradeinfo/cb/cb_daily_result.php?l=zh-tw&o=json".to_string()
}

fn default_csv_url() -> String {
    "https://www.tpex.org.tw/web/bond/tradeinfo/cb/cb_daily_result.php?l=zh-tw&o=csv".to_string()
}

fn default_referer() -> String {
    "https://www.tpex.org.tw/web/bond/tradeinfo/cb/cb_daily_result.php?l=zh-tw".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_listing_timeout() -> u64 {
    15
}

fn default_min_instruments() -> usize {
    10
}

fn default_initial_delay_ms() -> u64 {
    2_000
}

// ============================================================================
// History
// ============================================================================

/// Daily history retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Chart API base URL
    #[serde(default = "default_history_base_url")]
    pub base_url: String,

    /// Exchange suffix appended to instrument codes
    #[serde(default = "default_symbol_suffix")]
    pub symbol_suffix: String,

    /// Identifiers per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Trailing calendar-day window ending today
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Per-request timeout
    #[serde(default = "default_history_timeout")]
    pub timeout_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_history_base_url(),
            symbol_suffix: default_symbol_suffix(),
            batch_size: default_batch_size(),
            lookback_days: default_lookback_days(),
            timeout_secs: default_history_timeout(),
        }
    }
}

fn default_history_base_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

fn default_symbol_suffix() -> String {
    ".TWO".to_string()
}

fn default_batch_size() -> usize {
    30
}

fn default_lookback_days() -> u32 {
    60
}

fn default_history_timeout() -> u64 {
    20
}

// ============================================================================
// Filter
// ============================================================================

/// Filter thresholds. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Lowest acceptable last close (inclusive)
    #[serde(default = "default_min_price")]
    pub min_price: f64,

    /// Highest acceptable last close (inclusive)
    #[serde(default = "default_max_price")]
    pub max_price: f64,

    /// Minimum average volume, in lots
    #[serde(default = "default_min_avg_vol_lots")]
    pub min_avg_vol_lots: i64,

    /// Drop from the reference close must exceed this fraction
    #[serde(default = "default_drop_rate_threshold")]
    pub drop_rate_threshold: f64,

    /// Bars averaged for the volume condition
    #[serde(default = "default_volume_window")]
    pub volume_window: usize,

    /// Bars between the reference close and the last close
    #[serde(default = "default_drop_lookback")]
    pub drop_lookback: usize,

    /// Minimum usable bars per instrument
    #[serde(default = "default_min_rows")]
    pub min_rows: usize,

    /// Average volumes above this are taken to be shares, not lots
    #[serde(default = "default_share_unit_threshold")]
    pub share_unit_threshold: f64,

    /// Shares per lot
    #[serde(default = "default_shares_per_lot")]
    pub shares_per_lot: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_price: default_min_price(),
            max_price: default_max_price(),
            min_avg_vol_lots: default_min_avg_vol_lots(),
            drop_rate_threshold: default_drop_rate_threshold(),
            volume_window: default_volume_window(),
            drop_lookback: default_drop_lookback(),
            min_rows: default_min_rows(),
            share_unit_threshold: default_share_unit_threshold(),
            shares_per_lot: default_shares_per_lot(),
        }
    }
}

fn default_min_price() -> f64 {
    110.0
}

fn default_max_price() -> f64 {
    150.0
}

fn default_min_avg_vol_lots() -> i64 {
    50
}

fn default_drop_rate_threshold() -> f64 {
    0.05
}

fn default_volume_window() -> usize {
    10
}

fn default_drop_lookback() -> usize {
    3
}

fn default_min_rows() -> usize {
    10
}

fn default_share_unit_threshold() -> f64 {
    10_000.0
}

fn default_shares_per_lot() -> f64 {
    1_000.0
}

// ============================================================================
// Notification
// ============================================================================

/// Webhook notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook URL; notifications are disabled when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Display name of the posting bot
    #[serde(default = "default_username")]
    pub username: String,

    /// Avatar shown next to posts
    #[serde(default = "default_avatar_url")]
    pub avatar_url: String,

    /// Warn the channel when the backup list had to be used
    #[serde(default = "default_true")]
    pub notify_on_backup: bool,

    /// Log messages instead of posting them
    #[serde(default)]
    pub dry_run: bool,

    /// Per-request timeout
    #[serde(default = "default_notification_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: default_username(),
            avatar_url: default_avatar_url(),
            notify_on_backup: true,
            dry_run: false,
            timeout_secs: default_notification_timeout(),
        }
    }
}

fn default_username() -> String {
    "鄭大戰情室".to_string()
}

fn default_avatar_url() -> String {
    "https://cdn-icons-png.flaticon.com/512/2910/2910795.png".to_string()
}

fn default_true() -> bool {
    true
}

fn default_notification_timeout() -> u64 {
    30
}

//! CB Scanner Library
//!
//! One-shot scanner for TPEx convertible bonds. Each run acquires the bond
//! list, pulls recent daily history, keeps the bonds that have dropped
//! sharply on real volume while still priced in the sweet spot, and posts
//! them to a webhook.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       cb-scanner (one-shot)                         │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐     │
//! │  │  ListingRouter  │─▶│  ScreenerEngine │─▶│ WebhookNotifier │     │
//! │  │ json→csv→backup │  │ batches + filter│  │  split + post   │     │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in a run is fatal: failed sources fall through to the next one,
//! failed batches and bonds are tallied as skips, and failed deliveries are
//! logged.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod notification;
pub mod screener;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use std::sync::Arc;
use tracing::info;

use cb_common::config::Config;

use crate::data::{HistoryProvider, ListingRouter, YahooHistoryProvider};
use crate::notification::WebhookNotifier;
use crate::screener::{format_alert, format_backup_warning, ScanOutcome, ScreenerEngine};

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Source that produced the instrument list
    pub source: &'static str,
    /// Whether the backup list was used
    pub used_backup: bool,
    /// Scan result
    pub outcome: ScanOutcome,
    /// Whether the match alert was delivered
    pub alert_sent: bool,
    /// Run start
    pub started_at: DateTime<Local>,
    /// Run end
    pub finished_at: DateTime<Local>,
    /// Wall-clock duration in seconds
    pub duration_secs: f64,
}

/// Scanner service: acquisition, screening and notification for one run.
pub struct ScannerService {
    router: ListingRouter,
    engine: ScreenerEngine,
    notifier: WebhookNotifier,
    notify_on_backup: bool,
}

impl ScannerService {
    /// Assemble a service from prebuilt parts.
    pub fn new(
        router: ListingRouter,
        engine: ScreenerEngine,
        notifier: WebhookNotifier,
        notify_on_backup: bool,
    ) -> Self {
        Self {
            router,
            engine,
            notifier,
            notify_on_backup,
        }
    }

    /// Build the production pipeline: TPEx listing, Yahoo history, webhook.
    pub fn from_config(config: &Config) -> Result<Self> {
        let router = ListingRouter::from_config(&config.listing);

        let provider: Arc<dyn HistoryProvider> = Arc::new(
            YahooHistoryProvider::from_config(&config.history)
                .context("Failed to build history provider")?,
        );
        let engine = ScreenerEngine::new(provider, config.filter.clone(), config.history.clone());

        let notifier = WebhookNotifier::new(&config.notification);

        Ok(Self::new(
            router,
            engine,
            notifier,
            config.notification.notify_on_backup,
        ))
    }

    /// Run once for the current local date.
    pub async fn run(&self) -> RunSummary {
        self.run_on(chrono::Local::now().date_naive()).await
    }

    /// Run once with `today` as the exclusive end of the history window.
    pub async fn run_on(&self, today: NaiveDate) -> RunSummary {
        let started_at = Local::now();

        info!(
            sources = ?self.router.source_names(),
            webhook = self.notifier.is_enabled(),
            dry_run = self.notifier.is_dry_run(),
            "Starting run"
        );
        if !self.notifier.is_enabled() && !self.notifier.is_dry_run() {
            info!("No webhook configured, results will only be logged");
        }

        let acquisition = self.router.acquire().await;
        let trail: Vec<String> = acquisition.attempts.iter().map(ToString::to_string).collect();
        info!(attempts = ?trail, "Listing attempts");
        info!(
            source = acquisition.source,
            count = acquisition.instruments.len(),
            used_backup = acquisition.used_backup,
            "Instrument list acquired"
        );

        if acquisition.used_backup && self.notify_on_backup {
            self.notifier
                .notify(&format_backup_warning(acquisition.instruments.len()))
                .await;
        }

        let outcome = self.engine.scan(&acquisition.instruments, today).await;

        let alert_sent = match format_alert(&outcome.matches) {
            Some(message) => self.notifier.notify(&message).await,
            None => {
                info!("No bonds matched, nothing to send");
                false
            }
        };

        let finished_at = Local::now();
        let duration_secs = (finished_at - started_at).num_milliseconds() as f64 / 1000.0;

        RunSummary {
            source: acquisition.source,
            used_backup: acquisition.used_backup,
            outcome,
            alert_sent,
            started_at,
            finished_at,
            duration_secs,
        }
    }
}

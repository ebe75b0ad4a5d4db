//! Listing router with ordered fallback.
//!
//! Tries each registered listing source in registration order and keeps the
//! first result that looks like a real market listing (strictly more than
//! `min_instruments` entries). When every source fails, the backup list is
//! returned instead, so acquisition itself never fails.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use cb_common::config::ListingConfig;

use super::backup::{backup_instruments, BackupListSource};
use super::provider::{ListingSource, ProviderError};
use super::tpex::{ListingFormat, TpexListingSource};
use super::Instrument;

// ============================================================================
// Acquisition Result
// ============================================================================

/// What happened when a single source was tried.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Result accepted
    Accepted(usize),
    /// Source answered but with too few instruments to be plausible
    TooFew(usize),
    /// Source failed
    Failed(ProviderError),
}

/// One entry in the acquisition trail.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAttempt {
    pub source: &'static str,
    pub outcome: AttemptOutcome,
}

impl std::fmt::Display for SourceAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.outcome {
            AttemptOutcome::Accepted(n) => write!(f, "{}: accepted {}", self.source, n),
            AttemptOutcome::TooFew(n) => write!(f, "{}: too few ({})", self.source, n),
            AttemptOutcome::Failed(e) => write!(f, "{}: failed ({})", self.source, e),
        }
    }
}

/// Result of instrument list acquisition.
#[derive(Debug, Clone)]
pub struct Acquisition {
    /// Instruments to scan (never empty)
    pub instruments: Vec<Instrument>,
    /// Name of the source that produced them
    pub source: &'static str,
    /// Whether the backup list was used
    pub used_backup: bool,
    /// Every live source tried, in order
    pub attempts: Vec<SourceAttempt>,
}

// ============================================================================
// Listing Router
// ============================================================================

/// Dispatches listing requests over an ordered list of strategies.
pub struct ListingRouter {
    sources: Vec<Arc<dyn ListingSource>>,
    backup: Arc<dyn ListingSource>,
    min_instruments: usize,
    initial_delay: Duration,
}

impl ListingRouter {
    /// Create an empty router. Only the backup list is available until
    /// sources are registered.
    pub fn new(min_instruments: usize) -> Self {
        Self {
            sources: Vec::new(),
            backup: Arc::new(BackupListSource),
            min_instruments,
            initial_delay: Duration::ZERO,
        }
    }

    /// Create the standard TPEx JSON → TPEx CSV → backup chain.
    ///
    /// A source whose client cannot be built is left out; the backup list
    /// is always reachable.
    pub fn from_config(config: &ListingConfig) -> Self {
        let mut router = Self::new(config.min_instruments)
            .with_initial_delay(Duration::from_millis(config.initial_delay_ms));

        for (format, source) in [
            (ListingFormat::Json, TpexListingSource::json(config)),
            (ListingFormat::Csv, TpexListingSource::csv(config)),
        ] {
            match source {
                Ok(source) => router.register(Arc::new(source)),
                Err(e) => warn!(format = ?format, error = %e, "Skipping listing source"),
            }
        }

        router
    }

    /// Pause before the first live request.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Replace the last-resort source.
    pub fn with_backup(mut self, backup: Arc<dyn ListingSource>) -> Self {
        self.backup = backup;
        self
    }

    /// Append a source. Sources are tried in registration order.
    pub fn register(&mut self, source: Arc<dyn ListingSource>) {
        info!(
            source = source.name(),
            position = self.sources.len(),
            "Registered listing source"
        );
        self.sources.push(source);
    }

    /// Names of the registered live sources, in order.
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Acquire the instrument list.
    pub async fn acquire(&self) -> Acquisition {
        if !self.sources.is_empty() && !self.initial_delay.is_zero() {
            debug!(delay_ms = self.initial_delay.as_millis() as u64, "Waiting before listing request");
            tokio::time::sleep(self.initial_delay).await;
        }

        let mut attempts = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let name = source.name();
            debug!(source = name, "Trying listing source");

            match source.fetch_instruments().await {
                Ok(instruments) if instruments.len() > self.min_instruments => {
                    info!(source = name, count = instruments.len(), "Listing source succeeded");
                    attempts.push(SourceAttempt {
                        source: name,
                        outcome: AttemptOutcome::Accepted(instruments.len()),
                    });
                    return Acquisition {
                        instruments,
                        source: name,
                        used_backup: false,
                        attempts,
                    };
                }
                Ok(instruments) => {
                    warn!(
                        source = name,
                        count = instruments.len(),
                        required = self.min_instruments + 1,
                        "Listing source returned too few instruments, trying next"
                    );
                    attempts.push(SourceAttempt {
                        source: name,
                        outcome: AttemptOutcome::TooFew(instruments.len()),
                    });
                }
                Err(e) => {
                    warn!(source = name, error = %e, "Listing source failed, trying next");
                    attempts.push(SourceAttempt {
                        source: name,
                        outcome: AttemptOutcome::Failed(e),
                    });
                }
            }
        }

        warn!(tried = attempts.len(), "All live listing sources failed, using backup list");

        let instruments = match self.backup.fetch_instruments().await {
            Ok(list) if !list.is_empty() => list,
            Ok(_) => {
                warn!(source = self.backup.name(), "Backup source was empty, using built-in list");
                backup_instruments()
            }
            Err(e) => {
                warn!(source = self.backup.name(), error = %e, "Backup source failed, using built-in list");
                backup_instruments()
            }
        };

        Acquisition {
            instruments,
            source: self.backup.name(),
            used_backup: true,
            attempts,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedSource {
        name: &'static str,
        result: Result<usize, ProviderError>,
        calls: AtomicU32,
    }

    impl FixedSource {
        fn ok(name: &'static str, count: usize) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Ok(count),
                calls: AtomicU32::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Err(ProviderError::Http { status: 403 }),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl ListingSource for FixedSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch_instruments(&self) -> Result<Vec<Instrument>, ProviderError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let count = self.result.clone()?;
            Ok((0..count)
                .map(|i| Instrument::new(format!("{:05}", 10000 + i), format!("bond {}", i)))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_first_plausible_source_wins() {
        let primary = FixedSource::ok("primary", 200);
        let secondary = FixedSource::ok("secondary", 150);

        let mut router = ListingRouter::new(10);
        router.register(primary.clone());
        router.register(secondary.clone());

        let acq = router.acquire().await;
        assert_eq!(acq.source, "primary");
        assert_eq!(acq.instruments.len(), 200);
        assert!(!acq.used_backup);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        let primary = FixedSource::ok("primary", 10);
        let secondary = FixedSource::ok("secondary", 11);

        let mut router = ListingRouter::new(10);
        router.register(primary.clone());
        router.register(secondary.clone());

        let acq = router.acquire().await;
        assert_eq!(acq.source, "secondary");
        assert_eq!(acq.instruments.len(), 11);
        assert_eq!(
            acq.attempts,
            vec![
                SourceAttempt {
                    source: "primary",
                    outcome: AttemptOutcome::TooFew(10),
                },
                SourceAttempt {
                    source: "secondary",
                    outcome: AttemptOutcome::Accepted(11),
                },
            ]
        );
    }

    #[test]
    fn test_attempt_display() {
        let attempt = SourceAttempt {
            source: "tpex_json",
            outcome: AttemptOutcome::Failed(ProviderError::Http { status: 403 }),
        };
        assert!(attempt.to_string().starts_with("tpex_json: failed ("));
        assert_eq!(
            SourceAttempt {
                source: "tpex_csv",
                outcome: AttemptOutcome::TooFew(3),
            }
            .to_string(),
            "tpex_csv: too few (3)"
        );
    }

    #[tokio::test]
    async fn test_failure_falls_through_to_next() {
        let primary = FixedSource::failing("primary");
        let secondary = FixedSource::ok("secondary", 50);

        let mut router = ListingRouter::new(10);
        router.register(primary.clone());
        router.register(secondary.clone());

        let acq = router.acquire().await;
        assert_eq!(acq.source, "secondary");
        assert_eq!(primary.calls(), 1);
        assert!(matches!(
            acq.attempts[0].outcome,
            AttemptOutcome::Failed(ProviderError::Http { status: 403 })
        ));
    }

    #[tokio::test]
    async fn test_all_failures_return_backup_list() {
        let mut router = ListingRouter::new(10);
        router.register(FixedSource::failing("primary"));
        router.register(FixedSource::ok("secondary", 3));

        let acq = router.acquire().await;
        assert!(acq.used_backup);
        assert_eq!(acq.source, "backup");
        assert_eq!(acq.instruments, backup_instruments());
        assert_eq!(acq.attempts.len(), 2);
    }

    #[tokio::test]
    async fn test_no_sources_returns_backup_list() {
        let acq = ListingRouter::new(10).acquire().await;
        assert!(acq.used_backup);
        assert!(acq.attempts.is_empty());
        assert_eq!(acq.instruments, backup_instruments());
    }

    #[tokio::test]
    async fn test_failing_backup_still_yields_built_in_list() {
        let router = ListingRouter::new(10).with_backup(FixedSource::failing("custom_backup"));
        let acq = router.acquire().await;
        assert_eq!(acq.source, "custom_backup");
        assert_eq!(acq.instruments, backup_instruments());
    }

    #[test]
    fn test_from_config_order() {
        let router = ListingRouter::from_config(&ListingConfig::default());
        assert_eq!(router.source_names(), vec!["tpex_json", "tpex_csv"]);
    }

    #[tokio::test]
    async fn test_unbuildable_sources_are_skipped() {
        let config = ListingConfig {
            referer: "https://x\ny".to_string(),
            initial_delay_ms: 0,
            ..ListingConfig::default()
        };

        let router = ListingRouter::from_config(&config);
        assert!(router.source_names().is_empty());

        let acq = router.acquire().await;
        assert!(acq.used_backup);
        assert_eq!(acq.instruments, backup_instruments());
    }
}

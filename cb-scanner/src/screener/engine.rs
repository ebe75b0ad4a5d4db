//! Screener engine module.
//!
//! Pulls history for the acquired instruments in fixed-size batches and runs
//! each series through the quantitative filter.

use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use cb_common::config::{FilterConfig, HistoryConfig};

use crate::data::{HistoryProvider, Instrument};

use super::quantitative::{FilterResult, FilterStage, Match, QuantitativeFilter, SkipReason};

// ============================================================================
// Scan Outcome
// ============================================================================

/// Result of scanning one instrument list.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Matches, in input order
    pub matches: Vec<Match>,
    /// Number of instruments scanned
    pub total_scanned: usize,
    /// Skip tally keyed by reason label
    pub skipped: BTreeMap<&'static str, usize>,
    /// Batches whose every request failed at the transport level
    pub failed_batches: usize,
    /// Per-stage funnel
    pub funnel: Vec<FilterResult>,
}

impl ScanOutcome {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Scanned {} bonds: {} matched, {} skipped, {} failed batches",
            self.total_scanned,
            self.matches.len(),
            self.skipped_total(),
            self.failed_batches
        )
    }
}

/// Build the funnel from the eliminating stage of every skip.
fn build_funnel(total: usize, eliminated_at: &BTreeMap<FilterStage, usize>) -> Vec<FilterResult> {
    let mut remaining = total;
    let mut funnel = vec![FilterResult::new(FilterStage::Input, total, total)];

    for stage in [
        FilterStage::History,
        FilterStage::Price,
        FilterStage::Volume,
        FilterStage::Drop,
    ] {
        let dropped = eliminated_at.get(&stage).copied().unwrap_or(0);
        let passed = remaining.saturating_sub(dropped);
        funnel.push(FilterResult::new(stage, remaining, passed));
        remaining = passed;
    }

    funnel.push(FilterResult::new(FilterStage::Final, remaining, remaining));
    funnel
}

// ============================================================================
// Screener Engine
// ============================================================================

/// Batch scanner over a history provider.
pub struct ScreenerEngine {
    provider: Arc<dyn HistoryProvider>,
    filter: QuantitativeFilter,
    history: HistoryConfig,
}

impl ScreenerEngine {
    pub fn new(provider: Arc<dyn HistoryProvider>, filter: FilterConfig, history: HistoryConfig) -> Self {
        Self {
            provider,
            filter: QuantitativeFilter::new(filter),
            history,
        }
    }

    /// History window for a run on `today`: `[today - lookback, today)`.
    pub fn window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = today - Duration::days(i64::from(self.history.lookback_days));
        (start, today)
    }

    /// Scan all instruments. Never fails; every problem becomes a skip.
    pub async fn scan(&self, instruments: &[Instrument], today: NaiveDate) -> ScanOutcome {
        let (start, end) = self.window(today);
        let batch_size = self.history.batch_size.max(1);
        let batch_count = instruments.len().div_ceil(batch_size);

        info!(
            instruments = instruments.len(),
            batches = batch_count,
            provider = self.provider.name(),
            %start,
            %end,
            "Starting bond scan"
        );

        let mut outcome = ScanOutcome {
            total_scanned: instruments.len(),
            ..Default::default()
        };
        let mut eliminated_at: BTreeMap<FilterStage, usize> = BTreeMap::new();

        for (index, batch) in instruments.chunks(batch_size).enumerate() {
            let symbols: Vec<String> = batch
                .iter()
                .map(|inst| inst.symbol(&self.history.symbol_suffix))
                .collect();

            debug!(batch = index + 1, of = batch_count, size = batch.len(), "Fetching batch");

            let mut history = match self.provider.get_daily_bars_batch(&symbols, start, end).await {
                Ok(history) => history,
                Err(e) => {
                    warn!(batch = index + 1, size = batch.len(), error = %e, "Batch failed, skipping");
                    outcome.failed_batches += 1;
                    for _ in batch {
                        let reason = SkipReason::Fetch(e.clone());
                        *eliminated_at.entry(reason.stage()).or_default() += 1;
                        *outcome.skipped.entry(reason.label()).or_default() += 1;
                    }
                    continue;
                }
            };

            for (inst, symbol) in batch.iter().zip(&symbols) {
                let result = match history.remove(symbol) {
                    Some(Ok(bars)) => self.filter.evaluate(inst, &bars),
                    Some(Err(e)) => Err(SkipReason::Fetch(e)),
                    None => Err(SkipReason::MissingSeries),
                };

                match result {
                    Ok(m) => {
                        info!(
                            code = %m.instrument.code,
                            close = m.last_close,
                            drop_pct = m.drop_percent,
                            lots = m.display_volume,
                            "Match found"
                        );
                        outcome.matches.push(m);
                    }
                    Err(reason) => {
                        debug!(code = %inst.code, reason = %reason, "Skipped");
                        *eliminated_at.entry(reason.stage()).or_default() += 1;
                        *outcome.skipped.entry(reason.label()).or_default() += 1;
                    }
                }
            }
        }

        outcome.funnel = build_funnel(outcome.total_scanned, &eliminated_at);

        for stage in &outcome.funnel {
            debug!(
                stage = %stage.stage,
                passed = stage.passed,
                eliminated = stage.eliminated,
                rate = format!("{:.1}%", stage.elimination_rate),
                "Funnel"
            );
        }
        info!(
            matched = outcome.matches.len(),
            skipped = ?outcome.skipped,
            failed_batches = outcome.failed_batches,
            "{}",
            outcome.summary()
        );

        outcome
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DailyBar, ProviderError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned series and records every requested symbol.
    struct CannedProvider {
        series: HashMap<String, Result<Vec<DailyBar>, ProviderError>>,
        requested: Mutex<Vec<String>>,
        windows: Mutex<Vec<(NaiveDate, NaiveDate)>>,
    }

    impl CannedProvider {
        fn new() -> Self {
            Self {
                series: HashMap::new(),
                requested: Mutex::new(Vec::new()),
                windows: Mutex::new(Vec::new()),
            }
        }

        fn with(mut self, symbol: &str, result: Result<Vec<DailyBar>, ProviderError>) -> Self {
            self.series.insert(symbol.to_string(), result);
            self
        }
    }

    #[async_trait]
    impl HistoryProvider for CannedProvider {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn get_daily_bars(
            &self,
            symbol: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<DailyBar>, ProviderError> {
            self.requested.lock().unwrap().push(symbol.to_string());
            self.windows.lock().unwrap().push((start, end));
            self.series
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| Err(ProviderError::Network("connection refused".into())))
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
    }

    fn series(prior: f64, last: f64, volume: f64) -> Vec<DailyBar> {
        let start = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        (0..10)
            .map(|i| {
                let close = if i == 9 { last } else { prior };
                DailyBar::new(start + Duration::days(i), close, volume)
            })
            .collect()
    }

    fn history(batch_size: usize) -> HistoryConfig {
        HistoryConfig {
            batch_size,
            ..HistoryConfig::default()
        }
    }

    #[test]
    fn test_window_is_lookback_days_ending_today() {
        let engine = ScreenerEngine::new(
            Arc::new(CannedProvider::new()),
            FilterConfig::default(),
            HistoryConfig::default(),
        );
        let (start, end) = engine.window(today());
        assert_eq!(end, today());
        assert_eq!((end - start).num_days(), 60);
    }

    #[tokio::test]
    async fn test_scan_collects_matches_and_skips() {
        let provider = CannedProvider::new()
            .with("33241.TWO", Ok(series(140.0, 130.0, 60_000.0)))
            .with("30321.TWO", Ok(series(140.0, 130.0, 45.0)))
            .with("31351.TWO", Ok(series(120.0, 100.0, 80_000.0)))
            .with("68621.TWO", Err(ProviderError::DataNotAvailable("delisted".into())));

        let instruments = vec![
            Instrument::new("33241", "雙鴻五"),
            Instrument::new("30321", "偉訓一"),
            Instrument::new("31351", "凌航一"),
            Instrument::new("68621", "三集瑞一"),
        ];

        let engine = ScreenerEngine::new(Arc::new(provider), FilterConfig::default(), history(30));
        let outcome = engine.scan(&instruments, today()).await;

        assert_eq!(outcome.total_scanned, 4);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].instrument.code, "33241");
        assert_eq!(outcome.skipped.get("volume_too_low"), Some(&1));
        assert_eq!(outcome.skipped.get("price_out_of_band"), Some(&1));
        assert_eq!(outcome.skipped.get("fetch_failed"), Some(&1));
        assert_eq!(outcome.failed_batches, 0);

        let last = outcome.funnel.last().unwrap();
        assert_eq!(last.stage, FilterStage::Final);
        assert_eq!(last.passed, 1);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_scan() {
        // First batch has no known symbols, so every request fails at transport level.
        let provider = CannedProvider::new().with("33241.TWO", Ok(series(140.0, 130.0, 60_000.0)));
        let instruments = vec![
            Instrument::new("99991", "unknown a"),
            Instrument::new("99992", "unknown b"),
            Instrument::new("33241", "雙鴻五"),
        ];

        let engine = ScreenerEngine::new(Arc::new(provider), FilterConfig::default(), history(2));
        let outcome = engine.scan(&instruments, today()).await;

        assert_eq!(outcome.failed_batches, 1);
        assert_eq!(outcome.skipped.get("fetch_failed"), Some(&2));
        assert_eq!(outcome.matches.len(), 1);
    }

    #[tokio::test]
    async fn test_symbols_use_suffix_and_window() {
        let provider = Arc::new(CannedProvider::new());
        let engine = ScreenerEngine::new(provider.clone(), FilterConfig::default(), history(30));
        engine.scan(&[Instrument::new("15902", "亞德客二")], today()).await;

        assert_eq!(*provider.requested.lock().unwrap(), vec!["15902.TWO".to_string()]);
        assert_eq!(
            provider.windows.lock().unwrap()[0],
            (NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(), today())
        );
    }

    #[tokio::test]
    async fn test_empty_instrument_list() {
        let engine = ScreenerEngine::new(
            Arc::new(CannedProvider::new()),
            FilterConfig::default(),
            HistoryConfig::default(),
        );
        let outcome = engine.scan(&[], today()).await;
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.skipped_total(), 0);
        assert_eq!(outcome.funnel.len(), 6);
    }

    #[test]
    fn test_build_funnel() {
        let mut eliminated = BTreeMap::new();
        eliminated.insert(FilterStage::History, 2);
        eliminated.insert(FilterStage::Price, 5);
        eliminated.insert(FilterStage::Drop, 1);

        let funnel = build_funnel(10, &eliminated);
        let passed: Vec<usize> = funnel.iter().map(|r| r.passed).collect();
        assert_eq!(passed, vec![10, 8, 3, 3, 2, 2]);
    }
}

//! CB Scanner - scheduled TPEx convertible-bond scan.
//!
//! Runs once and exits. The exit status is always success; every failure
//! is reported through the log instead.

use cb_common::config::Config;
use cb_common::logging::init_logging;
use cb_common::validation::Validate;
use cb_scanner::ScannerService;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let (config, problems) = load_config();

    init_logging(&config.observability);

    tracing::info!("CB Scanner v{}", env!("CARGO_PKG_VERSION"));
    for problem in &problems {
        tracing::error!(error = %problem, "Configuration problem, using defaults");
    }

    // Run on a task so a panic is reported like any other failure.
    let handle = tokio::spawn(async move {
        let service = ScannerService::from_config(&config)?;
        anyhow::Ok(service.run().await)
    });

    match handle.await {
        Ok(Ok(summary)) => tracing::info!(
            source = summary.source,
            used_backup = summary.used_backup,
            matches = summary.outcome.matches.len(),
            alert_sent = summary.alert_sent,
            started_at = %summary.started_at.format("%Y-%m-%d %H:%M:%S"),
            duration = format!("{:.1}s", summary.duration_secs),
            "Scan finished"
        ),
        Ok(Err(e)) => tracing::error!(error = format!("{:#}", e), "Scan failed"),
        Err(e) => tracing::error!(error = %e, "Scan aborted"),
    }
}

/// Load, override and validate the configuration.
///
/// Any problem falls back to defaults (plus environment overrides when those
/// alone are valid). Problems are returned for logging, since the subscriber
/// depends on the configuration.
fn load_config() -> (Config, Vec<String>) {
    let mut problems = Vec::new();

    match Config::load_with_env().and_then(Config::validated) {
        Ok(config) => return (config, problems),
        Err(e) => problems.push(e.to_string()),
    }

    let mut fallback = Config::default();
    fallback.apply_env_overrides();
    if let Err(e) = fallback.validate() {
        problems.push(format!("invalid environment overrides: {}", e));
        let webhook_url = fallback.notification.webhook_url.take();
        fallback = Config::default();
        fallback.notification.webhook_url = webhook_url;
    }

    (fallback, problems)
}

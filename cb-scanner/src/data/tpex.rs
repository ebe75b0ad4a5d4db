//! TPEx convertible-bond listing adapter.
//!
//! Downloads the CB daily trading result report and extracts the
//! instrument universe from it.
//!
//! # Formats
//! - JSON: `{"aaData": [["33241", "雙鴻五", ...], ...]}`
//! - CSV: title and header rows, then one row per bond with the code in the
//!   first column and the name in the second, then footer notes
//!
//! The exchange rejects requests without browser-like headers, so the
//! client always sends a user agent, an `Accept` header and a referer.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use cb_common::config::ListingConfig;

use super::provider::{ListingSource, ProviderError};
use super::Instrument;

const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Which flavour of the report to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingFormat {
    Json,
    Csv,
}

// ============================================================================
// TPEx Listing Source
// ============================================================================

/// Fetches the instrument list from the TPEx CB daily report.
pub struct TpexListingSource {
    client: reqwest::Client,
    url: String,
    format: ListingFormat,
}

impl TpexListingSource {
    /// Create a source for the given report URL.
    pub fn new(
        url: impl Into<String>,
        format: ListingFormat,
        config: &ListingConfig,
    ) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        let referer = HeaderValue::from_str(&config.referer)
            .map_err(|e| ProviderError::InvalidRequest(format!("Invalid referer: {}", e)))?;
        headers.insert(REFERER, referer);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::InvalidRequest(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            format,
        })
    }

    /// JSON source using the configured URL.
    pub fn json(config: &ListingConfig) -> Result<Self, ProviderError> {
        Self::new(config.json_url.clone(), ListingFormat::Json, config)
    }

    /// CSV source using the configured URL.
    pub fn csv(config: &ListingConfig) -> Result<Self, ProviderError> {
        Self::new(config.csv_url.clone(), ListingFormat::Csv, config)
    }

    async fn fetch_body(&self) -> Result<String, ProviderError> {
        debug!(url = %self.url, format = ?self.format, "Fetching TPEx listing");

        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::Http {
                status: response.status().as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read body: {}", e)))
    }
}

#[async_trait]
impl ListingSource for TpexListingSource {
    fn name(&self) -> &'static str {
        match self.format {
            ListingFormat::Json => "tpex_json",
            ListingFormat::Csv => "tpex_csv",
        }
    }

    async fn fetch_instruments(&self) -> Result<Vec<Instrument>, ProviderError> {
        let body = self.fetch_body().await?;

        let instruments = match self.format {
            ListingFormat::Json => parse_json_listing(&body)?,
            ListingFormat::Csv => parse_csv_listing(&body),
        };

        info!(
            source = self.name(),
            count = instruments.len(),
            "Parsed TPEx listing"
        );

        Ok(instruments)
    }
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Debug, Deserialize)]
struct TpexJsonReport {
    #[serde(rename = "aaData", default)]
    aa_data: Vec<Vec<serde_json::Value>>,
}

/// Render a JSON cell as text; numbers keep their literal form.
fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Keep valid rows, first occurrence of each code wins.
fn collect_instruments<I>(rows: I) -> Vec<Instrument>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter_map(|(code, name)| Instrument::from_listing_row(&code, &name))
        .filter(|inst| seen.insert(inst.code.clone()))
        .collect()
}

/// Parse the JSON report body.
pub fn parse_json_listing(body: &str) -> Result<Vec<Instrument>, ProviderError> {
    let report: TpexJsonReport = serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("TPEx JSON: {}", e)))?;

    let rows = report.aa_data.iter().filter_map(|row| {
        let code = row.first().map(cell_text)?;
        let name = row.get(1).map(cell_text).unwrap_or_default();
        Some((code, name))
    });

    Ok(collect_instruments(rows))
}

/// Parse the CSV report body.
///
/// Non-data rows (titles, headers, footnotes) are dropped by the code check.
pub fn parse_csv_listing(body: &str) -> Vec<Instrument> {
    let rows = body.lines().filter_map(|line| {
        let fields = split_csv_line(line);
        let code = fields.first()?;
        let name = fields.get(1).cloned().unwrap_or_default();
        Some((strip_excel_literal(code).to_string(), name))
    });

    collect_instruments(rows)
}

/// Split one CSV line, honouring double-quoted fields and `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_start_matches('\u{feff}').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            '\r' if !in_quotes => {}
            _ => current.push(c),
        }
    }
    fields.push(current);

    fields
}

/// TPEx sometimes exports codes as `="33241"` to keep leading zeros in Excel.
fn strip_excel_literal(field: &str) -> &str {
    let trimmed = field.trim();
    trimmed
        .strip_prefix('=')
        .map(|s| s.trim_matches('"'))
        .unwrap_or(trimmed)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_listing() {
        let body = r#"{
            "reportDate": "113/05/02",
            "aaData": [
                ["33241", "雙鴻五", "125.50", "3"],
                ["30321", "偉訓一", "118.00", "12"],
                ["3032", "偉訓", "50.00", "1"],
                ["33241", "duplicate", "0", "0"]
            ]
        }"#;

        let instruments = parse_json_listing(body).unwrap();
        assert_eq!(
            instruments,
            vec![
                Instrument::new("33241", "雙鴻五"),
                Instrument::new("30321", "偉訓一"),
            ]
        );
    }

    #[test]
    fn test_parse_json_numeric_cells() {
        let body = r#"{"aaData": [[64721, "保瑞一"]]}"#;
        let instruments = parse_json_listing(body).unwrap();
        assert_eq!(instruments, vec![Instrument::new("64721", "保瑞一")]);
    }

    #[test]
    fn test_parse_json_missing_data_is_empty() {
        assert!(parse_json_listing(r#"{"iTotalRecords": 0}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_json_rejects_html() {
        let err = parse_json_listing("<html>blocked</html>").unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[test]
    fn test_parse_csv_listing() {
        let body = "\u{feff}可轉換公司債當日交易結果\r\n\
                    資料日期:113/05/02\r\n\
                    代號,名稱,收市,漲跌\r\n\
                    33241,雙鴻五,125.50,+1.00\r\n\
                    \"30321\",\"偉訓一\",\"1,118.00\",\"-0.50\"\r\n\
                    =\"15902\",亞德客二,140.00,0\r\n\
                    共3筆\r\n";

        let instruments = parse_csv_listing(body);
        assert_eq!(
            instruments,
            vec![
                Instrument::new("33241", "雙鴻五"),
                Instrument::new("30321", "偉訓一"),
                Instrument::new("15902", "亞德客二"),
            ]
        );
    }

    #[test]
    fn test_split_csv_line_quotes() {
        let fields = split_csv_line(r#"a,"b,c","say ""hi""",d"#);
        assert_eq!(fields, vec!["a", "b,c", "say \"hi\"", "d"]);
    }

    #[test]
    fn test_strip_excel_literal() {
        assert_eq!(strip_excel_literal("=\"00123\""), "00123");
        assert_eq!(strip_excel_literal(" 33241 "), "33241");
    }

    #[test]
    fn test_source_names() {
        let config = ListingConfig::default();
        assert_eq!(TpexListingSource::json(&config).unwrap().name(), "tpex_json");
        assert_eq!(TpexListingSource::csv(&config).unwrap().name(), "tpex_csv");
    }
}

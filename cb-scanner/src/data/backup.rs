//! Built-in backup watch list.
//!
//! Used when every live listing strategy fails, so a blocked exchange
//! endpoint still leaves something to scan.

use async_trait::async_trait;

use super::provider::{ListingSource, ProviderError};
use super::Instrument;

const BACKUP_LIST: &[(&str, &str)] = &[
    ("33241", "雙鴻五"),
    ("30321", "偉訓一"),
    ("31351", "凌航一"),
    ("68621", "三集瑞一"),
    ("64721", "保瑞一"),
    ("23741", "佳能一"),
    ("55341", "長虹六"),
    ("65761", "逸達二"),
    ("15902", "亞德客二"),
    ("47144", "永捷四"),
];

/// The fixed backup list, in order.
pub fn backup_instruments() -> Vec<Instrument> {
    BACKUP_LIST
        .iter()
        .map(|(code, name)| Instrument::new(*code, *name))
        .collect()
}

/// `ListingSource` view of the backup list. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackupListSource;

#[async_trait]
impl ListingSource for BackupListSource {
    fn name(&self) -> &'static str {
        "backup"
    }

    async fn fetch_instruments(&self) -> Result<Vec<Instrument>, ProviderError> {
        Ok(backup_instruments())
    }
}

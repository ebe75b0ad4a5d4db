//! Alert text for screener results.
//!
//! Everything here is pure string building; delivery lives in
//! `crate::notification`.

use super::quantitative::Match;

/// Fixed header of the match alert.
pub const ALERT_HEADER: &str = "🎯 **鄭大短波段狙擊手** (V12.3)\n發現「急跌+有量+甜蜜點」機會：\n\n";

/// Format one match as a two-line entry.
pub fn format_match(m: &Match) -> String {
    format!(
        "**{} {}**\n現價: {:.1} | 3日跌幅: -{:.2}% | 均量: {}張",
        m.instrument.code, m.instrument.name, m.last_close, m.drop_percent, m.display_volume
    )
}

/// Build the alert message, or `None` when there is nothing to report.
pub fn format_alert(matches: &[Match]) -> Option<String> {
    if matches.is_empty() {
        return None;
    }

    let body = matches
        .iter()
        .map(format_match)
        .collect::<Vec<_>>()
        .join("\n");

    Some(format!("{}{}", ALERT_HEADER, body))
}

/// Warning sent when the live listing sources were all unusable.
pub fn format_backup_warning(count: usize) -> String {
    format!(
        "⚠️ **櫃買中心資料取得失敗**\n已改用內建備援清單（{} 檔）進行掃描，結果可能不完整。",
        count
    )
}

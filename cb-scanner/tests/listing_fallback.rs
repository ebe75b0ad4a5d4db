//! Integration tests for instrument list acquisition.
//!
//! Runs the TPEx JSON → CSV → backup chain against a mock exchange.

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cb_common::config::ListingConfig;
use cb_scanner::data::{backup_instruments, ListingRouter};

/// Listing config pointing at the mock server, with no initial delay.
fn listing_config(server: &MockServer) -> ListingConfig {
    ListingConfig {
        json_url: format!("{}/cb/daily.php?o=json", server.uri()),
        csv_url: format!("{}/cb/daily.php?o=csv", server.uri()),
        initial_delay_ms: 0,
        timeout_secs: 5,
        ..ListingConfig::default()
    }
}

fn json_report(count: usize) -> String {
    let rows: Vec<serde_json::Value> = (0..count)
        .map(|i| serde_json::json!([format!("{:05}", 20001 + i), format!("測試{}", i), "120.00"]))
        .collect();
    serde_json::json!({ "reportDate": "113/05/02", "aaData": rows }).to_string()
}

fn csv_report(count: usize) -> String {
    let mut body = String::from("可轉換公司債當日交易結果\r\n代號,名稱,收市\r\n");
    for i in 0..count {
        body.push_str(&format!("{:05},測試{},120.00\r\n", 30001 + i, i));
    }
    body.push_str(&format!("共{}筆\r\n", count));
    body
}

#[tokio::test]
async fn test_json_source_preferred() {
    let server = MockServer::start().await;
    let config = listing_config(&server);

    Mock::given(method("GET"))
        .and(path("/cb/daily.php"))
        .and(header("referer", config.referer.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string(json_report(25)))
        .expect(1)
        .mount(&server)
        .await;

    let router = ListingRouter::from_config(&config);
    let acq = router.acquire().await;

    assert_eq!(acq.source, "tpex_json");
    assert!(!acq.used_backup);
    assert_eq!(acq.instruments.len(), 25);
    assert_eq!(acq.instruments[0].code, "20001");
}

#[tokio::test]
async fn test_csv_used_when_json_blocked() {
    let server = MockServer::start().await;
    let config = listing_config(&server);

    Mock::given(method("GET"))
        .and(query_param("o", "json"))
        .respond_with(ResponseTemplate::new(403).set_body_string("<html>blocked</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("o", "csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(csv_report(12)))
        .mount(&server)
        .await;

    let acq = ListingRouter::from_config(&config).acquire().await;

    assert_eq!(acq.source, "tpex_csv");
    assert_eq!(acq.instruments.len(), 12);
    assert_eq!(acq.instruments[11].code, "30012");
    assert_eq!(acq.attempts.len(), 2);
}

#[tokio::test]
async fn test_short_listings_fall_back_to_backup() {
    let server = MockServer::start().await;
    let config = listing_config(&server);

    // Exactly the threshold is not enough.
    Mock::given(method("GET"))
        .and(query_param("o", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(json_report(10)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("o", "csv"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let acq = ListingRouter::from_config(&config).acquire().await;

    assert!(acq.used_backup);
    assert_eq!(acq.source, "backup");
    assert_eq!(acq.instruments, backup_instruments());
}

#[tokio::test]
async fn test_unreachable_exchange_falls_back_to_backup() {
    let config = ListingConfig {
        json_url: "http://127.0.0.1:9/json".to_string(),
        csv_url: "http://127.0.0.1:9/csv".to_string(),
        initial_delay_ms: 0,
        timeout_secs: 2,
        ..ListingConfig::default()
    };

    let acq = ListingRouter::from_config(&config).acquire().await;

    assert!(acq.used_backup);
    assert_eq!(acq.instruments.len(), 10);
}

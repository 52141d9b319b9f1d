//! Transfer behaviour: retries, resume, integrity restarts, slow links, free
//! space and concurrent duplicates

use crate::common::{server_host, url, BodyEnd, FixedFreeSpace, ListingCrawler, RawFileServer, Workspace};
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::storage::Storage;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    Mock::given(method("GET"))
        .and(path("/files/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let folder = ws.downloads().join("album");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/album", vec![url(&base, "/files/gone.jpg")])
        .into_registry();

    let mut coordinator = ws.coordinator(ws.config("[rate-limiting]\ndownload-attempts = 5"), registry);
    coordinator.submit(&format!("{}/album", base)).unwrap();
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.completed, 0);
    assert_eq!(report.failed.get("404"), Some(&1));
    assert!(!folder.join("gone.jpg").exists());

    let mut log = csv::Reader::from_path(ws.dir.path().join("logs/Download_Error_URLs.csv"))
        .expect("Download errors should be logged");
    let rows: Vec<csv::StringRecord> = log.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 1);
    assert!(rows[0][0].ends_with("/files/gone.jpg"));
    assert_eq!(&rows[0][3], format!("{}/album", base));
    assert_eq!(&rows[0][4], format!("{}/album", base));
}

#[tokio::test]
async fn test_truncated_body_without_range_support_stops_at_attempt_limit() {
    // every answer ignores Range and ends after 10 of 1000 bytes
    let server = RawFileServer::start(1000, 10, BodyEnd::HangUp).await;
    let base = server.uri().to_string();
    let ws = Workspace::new();

    let folder = ws.downloads().join("album");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/album", vec![url(&base, "/files/cut.mp4")])
        .into_registry();

    let mut coordinator = ws.coordinator(ws.config("[rate-limiting]\ndownload-attempts = 2"), registry);
    coordinator.submit(&format!("{}/album", base)).unwrap();
    let report = tokio::time::timeout(Duration::from_secs(20), coordinator.run())
        .await
        .expect("Run must end once the attempts are used up")
        .expect("Run failed");

    assert_eq!(server.requests(), 2);
    assert_eq!(report.completed, 0);
    assert_eq!(report.total_failed(), 1);
    assert!(!folder.join("cut.mp4").exists());
}

#[tokio::test]
async fn test_slow_transfer_aborted_after_window() {
    // one byte every 200ms against a 1000 B/s floor
    let server = RawFileServer::start(
        100,
        1,
        BodyEnd::Trickle {
            interval: Duration::from_millis(200),
        },
    )
    .await;
    let base = server.uri().to_string();
    let ws = Workspace::new();

    let folder = ws.downloads().join("album");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/album", vec![url(&base, "/files/slow.mp4")])
        .into_registry();

    let config = ws.config(
        "[rate-limiting]\ndownload-attempts = 2\nslow-download-speed = 1000\nslow-download-window = 1",
    );
    let mut coordinator = ws.coordinator(config, registry);
    coordinator.submit(&format!("{}/album", base)).unwrap();
    let report = tokio::time::timeout(Duration::from_secs(20), coordinator.run())
        .await
        .expect("Slow transfers must be given up")
        .expect("Run failed");

    assert_eq!(server.requests(), 2);
    assert_eq!(report.failed.get("Slow Download"), Some(&1));
    assert!(!folder.join("slow.mp4").exists());
}

#[tokio::test]
async fn test_unsatisfiable_range_restarts_from_zero() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    // first registered mock wins for requests that match both
    Mock::given(method("GET"))
        .and(path("/files/clip.mp4"))
        .and(header("range", "bytes=5-"))
        .respond_with(ResponseTemplate::new(416))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh content".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let folder = ws.downloads().join("album");
    std::fs::create_dir_all(&folder).unwrap();
    std::fs::write(folder.join("clip.mp4.part"), b"stale").unwrap();

    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/album", vec![url(&base, "/files/clip.mp4")])
        .into_registry();

    // the restart is free, so a single attempt is enough
    let mut coordinator = ws.coordinator(ws.config("[rate-limiting]\ndownload-attempts = 1"), registry);
    coordinator.submit(&format!("{}/album", base)).unwrap();
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.completed, 1);
    assert_eq!(report.total_failed(), 0);
    assert_eq!(std::fs::read(folder.join("clip.mp4")).unwrap(), b"fresh content");
    assert!(!folder.join("clip.mp4.part").exists());
}

#[tokio::test]
async fn test_transient_failure_retried_up_to_attempt_limit() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    Mock::given(method("GET"))
        .and(path("/files/busy.jpg"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let folder = ws.downloads().join("album");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/album", vec![url(&base, "/files/busy.jpg")])
        .into_registry();

    let mut coordinator = ws.coordinator(ws.config("[rate-limiting]\ndownload-attempts = 3"), registry);
    coordinator.submit(&format!("{}/album", base)).unwrap();
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.total_failed(), 1);
    assert_eq!(report.failed.get("503"), Some(&1));

    // still incomplete, so a later run will try again
    let failed = ws.storage.lock().get_failed_items().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].url_path, "/files/busy.jpg");
}

#[tokio::test]
async fn test_low_free_space_fails_item_without_writing() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 64]))
        .expect(0)
        .mount(&mock_server)
        .await;

    let folder = ws.downloads().join("album");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/album", vec![url(&base, "/files/a.jpg")])
        .into_registry();

    let mut config = ws.config("");
    config.general.required_free_space_mb = 1;
    let mut coordinator = ws
        .coordinator(config, registry)
        .with_free_space_source(Arc::new(FixedFreeSpace(1024)));
    coordinator.submit(&format!("{}/album", base)).unwrap();
    let report = coordinator.run().await.expect("Low disk space must not end the run");

    assert_eq!(report.completed, 0);
    assert_eq!(report.total_failed(), 1);
    assert!(!folder.join("a.jpg").exists());
    assert!(!folder.join("a.jpg.part").exists());
    assert_eq!(ws.storage.lock().get_failed_items().unwrap().len(), 1);
}

#[tokio::test]
async fn test_partial_file_is_resumed_with_range() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    Mock::given(method("GET"))
        .and(path("/files/clip.mp4"))
        .and(header("range", "bytes=6-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 6-10/11")
                .set_body_bytes(b"world".to_vec()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let folder = ws.downloads().join("album");
    std::fs::create_dir_all(&folder).unwrap();
    std::fs::write(folder.join("clip.mp4.part"), b"hello ").unwrap();

    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/album", vec![url(&base, "/files/clip.mp4")])
        .into_registry();

    let mut coordinator = ws.coordinator(ws.config(""), registry);
    coordinator.submit(&format!("{}/album", base)).unwrap();
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.completed, 1);
    assert_eq!(std::fs::read(folder.join("clip.mp4")).unwrap(), b"hello world");
    assert!(!folder.join("clip.mp4.part").exists());
}

#[tokio::test]
async fn test_concurrent_duplicates_download_once() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    Mock::given(method("GET"))
        .and(path("/files/same.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 2048]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let folder = ws.downloads().join("album");
    let same = url(&base, "/files/same.jpg");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/album", vec![same.clone(); 5])
        .into_registry();

    let mut coordinator = ws.coordinator(ws.config(""), registry);
    coordinator.submit(&format!("{}/album", base)).unwrap();
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.completed, 1);
    assert_eq!(report.skipped.get("Already Downloaded"), Some(&4));

    let files: Vec<_> = std::fs::read_dir(&folder).unwrap().collect();
    assert_eq!(files.len(), 1);
}

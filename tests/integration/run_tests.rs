//! Whole runs: history, expansion limits, referers, crawler failures,
//! cancellation and the index crawler

use crate::common::{server_host, url, BodyEnd, ListingCrawler, RawFileServer, Workspace};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use sumi_harvest::config::load_config;
use sumi_harvest::crawler::{CrawlerRegistry, ScrapeItemKind};
use sumi_harvest::storage::Storage;
use sumi_harvest::HarvestError;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_file(server: &MockServer, file_path: &str, body: Vec<u8>, times: u64) {
    Mock::given(method("GET"))
        .and(path(file_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_second_run_downloads_nothing() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    mount_file(&mock_server, "/files/1.jpg", vec![1u8; 100], 1).await;
    mount_file(&mock_server, "/files/2.png", vec![2u8; 200], 1).await;

    let folder = ws.downloads().join("album");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/album", vec![url(&base, "/files/1.jpg"), url(&base, "/files/2.png")])
        .into_registry();

    let mut first = ws.coordinator(ws.config(""), registry.clone());
    first.submit(&format!("{}/album", base)).unwrap();
    let report = first.run().await.expect("First run failed");
    assert_eq!(report.completed, 2);
    assert_eq!(report.completed_bytes, 300);

    let mut second = ws.coordinator(ws.config(""), registry);
    second.submit(&format!("{}/album", base)).unwrap();
    let report = second.run().await.expect("Second run failed");
    assert_eq!(report.completed, 0);
    assert_eq!(report.skipped.get("Already Downloaded"), Some(&2));

    let counts = ws.storage.lock().history_counts().unwrap();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.completed, 2);
}

#[tokio::test]
async fn test_children_limit_truncates_album() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    let files = (0..100).map(|i| url(&base, &format!("/files/{}.jpg", i))).collect();
    let folder = ws.downloads().join("album");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .with_kind(ScrapeItemKind::FileHostAlbum)
        .page("/album", files)
        .into_registry();

    let config = ws.config("[download-options]\nmaximum-number-of-children = [0, 0, 0, 10]");
    let mut coordinator = ws.coordinator(config, registry).with_dry_run(true);
    coordinator.submit(&format!("{}/album", base)).unwrap();
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.planned, 10);
    assert_eq!(report.truncated, 90);
    assert_eq!(report.completed, 0);
}

#[tokio::test]
async fn test_referer_seen_on_earlier_run_is_skipped() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    mount_file(&mock_server, "/files/a1.jpg", vec![1u8; 10], 1).await;
    mount_file(&mock_server, "/files/a2.jpg", vec![2u8; 10], 1).await;
    mount_file(&mock_server, "/files/a3.jpg", vec![3u8; 10], 0).await;
    mount_file(&mock_server, "/files/b1.jpg", vec![4u8; 10], 1).await;

    let folder = ws.downloads().join("pages");
    let options = "[download-options]\nskip-referer-seen-before = true";

    // run 1: both files of page A, first sighting of its referer
    let first_registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/a", vec![url(&base, "/files/a1.jpg"), url(&base, "/files/a2.jpg")])
        .into_registry();
    let mut first = ws.coordinator(ws.config(options), first_registry);
    first.submit(&format!("{}/a", base)).unwrap();
    let report = first.run().await.expect("First run failed");
    assert_eq!(report.completed, 2);

    // run 2: page A gained a file, page B is new
    let second_registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/a", vec![url(&base, "/files/a3.jpg")])
        .page("/b", vec![url(&base, "/files/b1.jpg")])
        .into_registry();
    let mut second = ws.coordinator(ws.config(options), second_registry);
    second.submit(&format!("{}/a", base)).unwrap();
    second.submit(&format!("{}/b", base)).unwrap();
    let report = second.run().await.expect("Second run failed");

    assert_eq!(report.completed, 1);
    assert_eq!(report.skipped.get("Referer Seen Before"), Some(&1));
    assert!(folder.join("b1.jpg").exists());
    assert!(!folder.join("a3.jpg").exists());
}

#[tokio::test]
async fn test_shared_file_across_pages_downloads_once() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    mount_file(&mock_server, "/files/1.jpg", vec![1u8; 10], 1).await;
    mount_file(&mock_server, "/files/2.jpg", vec![2u8; 10], 1).await;
    mount_file(&mock_server, "/files/3.jpg", vec![3u8; 10], 1).await;

    let folder = ws.downloads().join("pages");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page(
            "/a",
            vec![url(&base, "/files/1.jpg"), url(&base, "/files/2.jpg"), url(&base, "/files/3.jpg")],
        )
        .page("/b", vec![url(&base, "/files/1.jpg")])
        .into_registry();

    let config = ws.config("[download-options]\nskip-referer-seen-before = true");
    let mut coordinator = ws.coordinator(config, registry);
    coordinator.submit(&format!("{}/a", base)).unwrap();
    coordinator.submit(&format!("{}/b", base)).unwrap();
    let report = coordinator.run().await.expect("Run failed");

    // four items reach the Download Manager, the shared file transfers once
    assert_eq!(report.completed + report.total_skipped(), 4);
    assert_eq!(report.completed, 3);
    assert_eq!(report.skipped.get("Already Downloaded"), Some(&1));
    assert_eq!(report.skipped.get("Referer Seen Before"), None);
}

#[tokio::test]
async fn test_index_crawler_end_to_end() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let host = server_host(&base);
    let ws = Workspace::new();

    Mock::given(method("GET"))
        .and(path("/gallery/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><title>Holiday</title></head><body>
            <img src="/files/a.jpg">
            <a href="/files/b.png">b</a>
            <a href="/gallery/page2">next</a>
            <a href="mailto:someone@example.com">mail</a>
            </body></html>"#,
            "text/html",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/gallery/page2"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><title>Holiday</title></head><body>
            <video><source src="/files/c.mp4"></video>
            <a href="/gallery/">back</a>
            </body></html>"#,
            "text/html",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    mount_file(&mock_server, "/files/a.jpg", vec![1u8; 32], 1).await;
    mount_file(&mock_server, "/files/b.png", vec![2u8; 32], 1).await;
    mount_file(&mock_server, "/files/c.mp4", vec![3u8; 32], 1).await;

    let config = ws.config(&format!("[crawlers]\nindex-hosts = [\"{}\"]", host));
    let registry = CrawlerRegistry::from_config(&config.crawlers);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut coordinator = ws.coordinator(config, registry).with_events(tx);
    coordinator.submit(&format!("{}/gallery/", base)).unwrap();
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.completed, 3);
    let folder = ws.downloads().join(format!("Holiday ({})", host));
    for name in ["a.jpg", "b.png", "c.mp4"] {
        assert!(folder.join(name).exists(), "{} missing", name);
    }

    let mut origins = HashMap::new();
    while let Ok(done) = rx.try_recv() {
        origins.insert(done.path.file_name().unwrap().to_string_lossy().into_owned(), done.origin);
    }
    assert_eq!(origins.len(), 3);
    let root = url(&base, "/gallery/");
    assert!(origins.values().all(|origin| *origin == root));
}

#[tokio::test]
async fn test_duplicate_content_keeps_one_copy() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    mount_file(&mock_server, "/files/first.jpg", vec![9u8; 4096], 1).await;
    mount_file(&mock_server, "/files/second.jpg", vec![9u8; 4096], 1).await;

    let folder = ws.downloads().join("album");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/album", vec![url(&base, "/files/first.jpg"), url(&base, "/files/second.jpg")])
        .into_registry();

    let config = ws.config("[dupe-cleanup]\nhashing = \"post-download\"\nsend-deleted-to-trash = false");
    let mut coordinator = ws.coordinator(config, registry);
    coordinator.submit(&format!("{}/album", base)).unwrap();
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.completed, 2);
    assert_eq!(report.hashes.computed, 2);
    assert_eq!(report.dedup_removed, 1);
    let remaining = [folder.join("first.jpg"), folder.join("second.jpg")]
        .iter()
        .filter(|p| p.exists())
        .count();
    assert_eq!(remaining, 1);

    let log = std::fs::read_to_string(ws.dir.path().join("logs/Dedupe.csv")).unwrap();
    assert_eq!(log.lines().count(), 2);
}

#[tokio::test]
async fn test_unsupported_url_is_logged() {
    let ws = Workspace::new();
    let mut coordinator = ws.coordinator(ws.config(""), CrawlerRegistry::new());
    coordinator.submit("https://unknown.example/some/page").unwrap();
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.unsupported, 1);
    let log = std::fs::read_to_string(ws.dir.path().join("logs/Unsupported_URLs.csv")).unwrap();
    assert!(log.contains("https://unknown.example/some/page"));
}

#[tokio::test]
async fn test_retry_failed_requeues_referers() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    Mock::given(method("GET"))
        .and(path("/files/flaky.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    mount_file(&mock_server, "/files/flaky.jpg", vec![5u8; 50], 1).await;

    let folder = ws.downloads().join("album");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/album", vec![url(&base, "/files/flaky.jpg")])
        .into_registry();

    let config = "[rate-limiting]\ndownload-attempts = 1";
    let mut first = ws.coordinator(ws.config(config), registry.clone());
    first.submit(&format!("{}/album", base)).unwrap();
    assert_eq!(first.run().await.unwrap().total_failed(), 1);

    let mut retry = ws.coordinator(ws.config(config), registry);
    assert_eq!(retry.retry_failed().unwrap(), 1);
    let report = retry.run().await.expect("Retry run failed");
    assert_eq!(report.completed, 1);
    assert!(ws.storage.lock().get_failed_items().unwrap().is_empty());
}

#[tokio::test]
async fn test_nested_thread_dropped_while_post_media_downloads() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    mount_file(&mock_server, "/files/post.jpg", vec![1u8; 64], 1).await;
    mount_file(&mock_server, "/files/nested.jpg", vec![2u8; 64], 0).await;

    let folder = ws.downloads().join("thread");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .with_kind(ScrapeItemKind::Forum)
        .page("/threads/1", vec![url(&base, "/files/post.jpg")])
        .links("/threads/1", vec![url(&base, "/threads/2")])
        .page("/threads/2", vec![url(&base, "/files/nested.jpg")])
        .into_registry();

    let config = ws.config("[download-options]\nmaximum-thread-depth = 0");
    let mut coordinator = ws.coordinator(config, registry);
    coordinator.submit(&format!("{}/threads/1", base)).unwrap();
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.completed, 1);
    assert_eq!(report.truncated, 1);
    assert!(folder.join("post.jpg").exists());
    assert!(!folder.join("nested.jpg").exists());
}

#[tokio::test]
async fn test_nested_thread_followed_within_depth() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    mount_file(&mock_server, "/files/post.jpg", vec![1u8; 64], 1).await;
    mount_file(&mock_server, "/files/nested.jpg", vec![2u8; 64], 1).await;

    let folder = ws.downloads().join("thread");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .with_kind(ScrapeItemKind::Forum)
        .page("/threads/1", vec![url(&base, "/files/post.jpg")])
        .links("/threads/1", vec![url(&base, "/threads/2")])
        .page("/threads/2", vec![url(&base, "/files/nested.jpg")])
        .into_registry();

    let config = ws.config("[download-options]\nmaximum-thread-depth = 1");
    let mut coordinator = ws.coordinator(config, registry);
    coordinator.submit(&format!("{}/threads/1", base)).unwrap();
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.completed, 2);
    assert_eq!(report.truncated, 0);
}

#[tokio::test]
async fn test_scrape_depth_caps_page_chain() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    let folder = ws.downloads().join("chain");
    let mut crawler = ListingCrawler::new(&server_host(&base), &folder);
    for depth in 0..4 {
        let page = format!("/p{}", depth);
        let file = format!("/files/{}.jpg", depth);
        let expected = if depth <= 2 { 1 } else { 0 };
        mount_file(&mock_server, &file, vec![depth as u8; 16], expected).await;
        crawler = crawler
            .page(&page, vec![url(&base, &file)])
            .links(&page, vec![url(&base, &format!("/p{}", depth + 1))]);
    }

    let config = ws.config("[download-options]\nmaximum-scrape-depth = 2");
    let mut coordinator = ws.coordinator(config, crawler.into_registry());
    coordinator.submit(&format!("{}/p0", base)).unwrap();
    let report = coordinator.run().await.expect("Run failed");

    assert_eq!(report.completed, 3);
    assert_eq!(report.truncated, 1);
    assert!(folder.join("2.jpg").exists());
    assert!(!folder.join("3.jpg").exists());
}

#[tokio::test]
async fn test_scrape_failure_logged_while_sibling_root_completes() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let ws = Workspace::new();

    mount_file(&mock_server, "/files/ok.jpg", vec![4u8; 64], 1).await;

    let folder = ws.downloads().join("album");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/album", vec![url(&base, "/files/ok.jpg")])
        .into_registry();

    let mut coordinator = ws.coordinator(ws.config(""), registry);
    coordinator.submit(&format!("{}/missing", base)).unwrap();
    coordinator.submit(&format!("{}/album", base)).unwrap();
    let report = coordinator.run().await.expect("A failed scrape must not end the run");

    assert_eq!(report.completed, 1);
    assert_eq!(report.scrape_failures.get("404"), Some(&1));
    assert!(folder.join("ok.jpg").exists());

    let mut log = csv::Reader::from_path(ws.dir.path().join("logs/Scrape_Error_URLs.csv"))
        .expect("Scrape errors should be logged");
    let rows: Vec<csv::StringRecord> = log.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][0], format!("{}/missing", base));
    assert_eq!(&rows[0][1], "404");
}

#[tokio::test]
async fn test_index_album_skips_files_completed_earlier() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let host = server_host(&base);
    let ws = Workspace::new();

    Mock::given(method("GET"))
        .and(path("/gallery/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><title>Trip</title></head><body>
            <a href="/files/a.jpg">a</a>
            <a href="/files/b.jpg">b</a>
            </body></html>"#,
            "text/html",
        ))
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_file(&mock_server, "/files/a.jpg", vec![1u8; 32], 1).await;
    mount_file(&mock_server, "/files/b.jpg", vec![2u8; 32], 1).await;

    let config = ws.config(&format!("[crawlers]\nindex-hosts = [\"{}\"]", host));
    let registry = CrawlerRegistry::from_config(&config.crawlers);

    let mut first = ws.coordinator(config.clone(), registry.clone());
    first.submit(&format!("{}/gallery/", base)).unwrap();
    assert_eq!(first.run().await.expect("First run failed").completed, 2);

    // the crawler leaves both files out, so no download task is started
    let mut second = ws.coordinator(config, registry);
    second.submit(&format!("{}/gallery/", base)).unwrap();
    let report = second.run().await.expect("Second run failed");
    assert_eq!(report.completed, 0);
    assert_eq!(report.skipped.get("Already Downloaded"), Some(&2));
}

/// Starts a download that stalls mid-body and cancels the run once its
/// `.part` file exists
async fn cancel_mid_transfer(general: &str) -> (Workspace, PathBuf) {
    let server = RawFileServer::start(1_000_000, 4096, BodyEnd::Stall).await;
    let base = server.uri().to_string();
    let ws = Workspace::new();

    let folder = ws.downloads().join("album");
    let registry = ListingCrawler::new(&server_host(&base), &folder)
        .page("/album", vec![url(&base, "/files/big.mp4")])
        .into_registry();

    let mut coordinator = ws.coordinator(ws.config(general), registry);
    coordinator.submit(&format!("{}/album", base)).unwrap();

    let part = folder.join("big.mp4.part");
    let cancel = coordinator.cancel_handle();
    let watched = part.clone();
    tokio::spawn(async move {
        for _ in 0..100 {
            if watched.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        cancel.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(20), coordinator.run())
        .await
        .expect("A cancelled run must end");
    assert!(matches!(result, Err(HarvestError::Cancelled)));
    assert_eq!(server.requests(), 1);
    (ws, part)
}

#[tokio::test]
async fn test_cancel_mid_transfer_keeps_partial_file() {
    let (ws, part) = cancel_mid_transfer("").await;
    assert!(part.exists());
    assert!(!ws.downloads().join("album/big.mp4").exists());

    // the interrupted file stays queued for a later run
    assert_eq!(ws.storage.lock().get_failed_items().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_mid_transfer_deletes_partial_file_when_asked() {
    let (_ws, part) = cancel_mid_transfer("delete-partial-files-on-cancel = true").await;
    assert!(!part.exists());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let ws = Workspace::new();
    let mut coordinator = ws.coordinator(ws.config(""), CrawlerRegistry::new());
    coordinator.submit("https://unknown.example/a").unwrap();
    coordinator.cancel_handle().cancel();

    assert!(matches!(coordinator.run().await, Err(HarvestError::Cancelled)));
}

#[test]
fn test_config_rejects_bad_index_host() {
    let ws = Workspace::new();
    let path = ws.dir.path().join("bad.toml");
    std::fs::write(
        &path,
        "[general]\ndownload-folder = 'd'\ndatabase-path = 'h.db'\n[crawlers]\nindex-hosts = ['a/b']\n",
    )
    .unwrap();
    assert!(load_config(&path).is_err());
}

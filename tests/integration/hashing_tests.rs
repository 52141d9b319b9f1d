//! Digest reuse and retention policies against a real history database

use crate::common::Workspace;
use chrono::{Duration, Utc};
use std::sync::Arc;
use sumi_harvest::config::RetentionPolicy;
use sumi_harvest::hashing::{Deduplicator, FileMeta, HashAlgorithm, HashEngine};

fn meta(days_ago: i64) -> FileMeta {
    FileMeta {
        original_filename: None,
        referer: None,
        downloaded_at: Utc::now() - Duration::days(days_ago),
    }
}

#[tokio::test]
async fn test_digest_reused_while_size_unchanged() {
    let ws = Workspace::new();
    let folder = ws.downloads();
    std::fs::create_dir_all(&folder).unwrap();
    let file = folder.join("photo.jpg");
    std::fs::write(&file, vec![3u8; 1000]).unwrap();

    let first = HashEngine::new(Arc::clone(&ws.storage), vec![HashAlgorithm::DEFAULT]);
    let digest = first.hash_file(&file, &meta(0)).await.unwrap();
    assert!(digest.is_some());
    assert_eq!(first.stats().computed, 1);

    // a later run trusts the stored digest
    let second = HashEngine::new(Arc::clone(&ws.storage), vec![HashAlgorithm::DEFAULT]);
    assert_eq!(second.hash_file(&file, &meta(0)).await.unwrap(), digest);
    assert_eq!(second.stats().reused, 1);
    assert_eq!(second.stats().computed, 0);

    // a size change forces a recompute
    std::fs::write(&file, vec![3u8; 1001]).unwrap();
    let changed = second.hash_file(&file, &meta(0)).await.unwrap();
    assert_ne!(changed, digest);
    assert_eq!(second.stats().computed, 1);
}

#[tokio::test]
async fn test_hash_directory_skips_partial_files() {
    let ws = Workspace::new();
    let folder = ws.downloads().join("album");
    std::fs::create_dir_all(&folder).unwrap();
    std::fs::write(folder.join("a.jpg"), b"aaaa").unwrap();
    std::fs::write(folder.join("b.jpg"), b"bbbb").unwrap();
    std::fs::write(folder.join("c.jpg.part"), b"cc").unwrap();
    std::fs::write(folder.join("empty.jpg"), b"").unwrap();

    let engine = HashEngine::new(Arc::clone(&ws.storage), vec![HashAlgorithm::DEFAULT]);
    assert_eq!(engine.hash_directory(&ws.downloads()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_keep_oldest_survives_dedup() {
    let ws = Workspace::new();
    let folder = ws.downloads();
    std::fs::create_dir_all(&folder).unwrap();
    let older = folder.join("older.jpg");
    let newer = folder.join("newer.jpg");
    let other = folder.join("other.jpg");
    std::fs::write(&older, vec![8u8; 512]).unwrap();
    std::fs::write(&newer, vec![8u8; 512]).unwrap();
    std::fs::write(&other, vec![9u8; 512]).unwrap();

    let engine = HashEngine::new(Arc::clone(&ws.storage), vec![HashAlgorithm::DEFAULT]);
    engine.hash_file(&newer, &meta(1)).await.unwrap();
    engine.hash_file(&older, &meta(5)).await.unwrap();
    engine.hash_file(&other, &meta(3)).await.unwrap();

    let dedup = Deduplicator::new(Arc::clone(&ws.storage), RetentionPolicy::KeepOldest, false);
    let report = dedup.run().await.unwrap();

    assert_eq!(report.groups, 1);
    assert_eq!(report.removed.len(), 1);
    assert_eq!(report.removed[0].kept, older);
    assert!(older.exists());
    assert!(!newer.exists());
    assert!(other.exists());
}

#[tokio::test]
async fn test_keep_newest_deletes_outright() {
    let ws = Workspace::new();
    let folder = ws.downloads();
    std::fs::create_dir_all(&folder).unwrap();
    let older = folder.join("older.jpg");
    let newer = folder.join("newer.jpg");
    std::fs::write(&older, vec![8u8; 512]).unwrap();
    std::fs::write(&newer, vec![8u8; 512]).unwrap();

    let engine = HashEngine::new(Arc::clone(&ws.storage), vec![HashAlgorithm::DEFAULT]);
    engine.hash_file(&older, &meta(5)).await.unwrap();
    engine.hash_file(&newer, &meta(1)).await.unwrap();

    let dedup = Deduplicator::new(Arc::clone(&ws.storage), RetentionPolicy::KeepNewest, false);
    let report = dedup.run().await.unwrap();

    assert_eq!(report.removed.len(), 1);
    assert!(newer.exists());
    assert!(!older.exists());
    assert!(!report.removed[0].trashed);
}

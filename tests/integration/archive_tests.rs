//! Index generation over archives written by a crawl

use crate::common::{create_test_config, mount_small_site, run_crawl};
use std::fs::{self, OpenOptions};
use std::io::Write;
use tempfile::TempDir;
use warc_crawler::archive::{read_index, ArchiveStore, INDEX_FILE_NAME};
use warc_crawler::IndexEntry;
use wiremock::MockServer;

fn sorted(mut entries: Vec<IndexEntry>) -> Vec<IndexEntry> {
    entries.sort_by(|a, b| a.url.cmp(&b.url));
    entries
}

async fn crawl_small_site(dir: &TempDir) {
    let server = MockServer::start().await;
    mount_small_site(&server, 1).await;
    let config = create_test_config(dir.path(), vec![format!("{}/", server.uri())]);
    drop(run_crawl(config).await);
}

#[tokio::test]
async fn test_generated_index_matches_appended_rows() {
    let dir = TempDir::new().unwrap();
    crawl_small_site(&dir).await;

    let index_path = dir.path().join(INDEX_FILE_NAME);
    let appended = read_index(&index_path).unwrap();

    let mut archive = ArchiveStore::new(dir.path(), 1 << 20, "test");
    assert_eq!(archive.generate_index().unwrap().len(), appended.len());
    let generated = read_index(&index_path).unwrap();
    assert_eq!(sorted(generated), sorted(appended));
}

#[tokio::test]
async fn test_generate_index_is_deterministic() {
    let dir = TempDir::new().unwrap();
    crawl_small_site(&dir).await;

    let index_path = dir.path().join(INDEX_FILE_NAME);
    let mut archive = ArchiveStore::new(dir.path(), 1 << 20, "test");

    archive.generate_index().unwrap();
    let first = fs::read(&index_path).unwrap();
    fs::remove_file(&index_path).unwrap();
    archive.generate_index().unwrap();
    let second = fs::read(&index_path).unwrap();

    assert_eq!(first, second);
    assert!(first.starts_with(b"CDX "));
    assert!(!dir.path().join(format!("{}.tmp", INDEX_FILE_NAME)).exists());
}

#[tokio::test]
async fn test_truncated_archive_keeps_complete_records() {
    let dir = TempDir::new().unwrap();
    crawl_small_site(&dir).await;

    let entries = read_index(&dir.path().join(INDEX_FILE_NAME)).unwrap();
    let last = entries
        .iter()
        .filter(|e| e.warc_file == "archive-web-00000.warc.gz")
        .max_by_key(|e| e.compressed_offset)
        .unwrap()
        .clone();

    // Simulate a crash in the middle of writing one more record
    let path = dir.path().join(&last.warc_file);
    let bytes = fs::read(&path).unwrap();
    let start = last.compressed_offset as usize;
    let half = &bytes[start..start + (last.compressed_length as usize) / 2];
    OpenOptions::new()
        .append(true)
        .open(&path)
        .unwrap()
        .write_all(half)
        .unwrap();

    let mut archive = ArchiveStore::new(dir.path(), 1 << 20, "test");
    assert_eq!(archive.generate_index().unwrap().len(), entries.len());
    let generated = read_index(&dir.path().join(INDEX_FILE_NAME)).unwrap();
    assert_eq!(sorted(generated), sorted(entries));

    let cached = archive.open_cached(&last.url).unwrap().unwrap();
    assert_eq!(cached.status_code, 200);
}

//! Resuming interrupted crawls from a destination directory

use crate::common::{create_test_config, mount_small_site, run_crawl};
use std::fs;
use tempfile::TempDir;
use tokio::sync::watch;
use warc_crawler::storage::{open_progress_store, FrontierStore, PROGRESS_FILE_NAME};
use warc_crawler::{Coordinator, CrawlError, UrlRecord, UrlStatus};
use wiremock::MockServer;

fn assert_small_site_done(coordinator: &Coordinator, base: &str) {
    let frontier = coordinator.frontier();
    assert_eq!(frontier.len(), 4);
    for page in ["/", "/page1", "/page2"] {
        assert_eq!(
            frontier.status(&format!("{}{}", base, page)),
            UrlStatus::Crawled,
            "{}",
            page
        );
    }
    assert_eq!(
        frontier.status(&format!("{}/logo.png", base)),
        UrlStatus::Downloaded
    );
}

#[tokio::test]
async fn test_second_run_fetches_nothing() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_small_site(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), vec![format!("{}/", base)]);
    drop(run_crawl(config.clone()).await);

    let coordinator = run_crawl(config).await;
    assert_small_site_done(&coordinator, &base);
    // Mock expectations verify each URL was requested once
}

#[tokio::test]
async fn test_processing_urls_are_retried() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_small_site(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let seed = format!("{}/", base);
    {
        let mut store = open_progress_store(dir.path()).unwrap();
        let word = UrlRecord::new(UrlStatus::Processing, 0, false).word();
        store.save(&[(seed.clone(), word)], &[]).unwrap();
    }

    let config = create_test_config(dir.path(), vec![seed.clone()]);
    let (_tx, rx) = watch::channel(false);
    let mut coordinator = Coordinator::new(config, rx).unwrap();
    assert_eq!(coordinator.frontier().status(&seed), UrlStatus::ToCrawl);

    coordinator.run().await.unwrap();
    assert_small_site_done(&coordinator, &base);
}

#[tokio::test]
async fn test_destination_is_exclusive() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), vec!["http://127.0.0.1:9/".to_string()]);

    let (_tx, rx) = watch::channel(false);
    let mut first = Coordinator::new(config.clone(), rx.clone()).unwrap();
    let second = Coordinator::new(config.clone(), rx.clone());
    assert!(matches!(second, Err(CrawlError::DirectoryLocked { .. })));

    first.shutdown().unwrap();
    assert!(Coordinator::new(config, rx).is_ok());
}

#[tokio::test]
async fn test_frontier_rebuilt_from_archives() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_small_site(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), vec![format!("{}/", base)]);
    drop(run_crawl(config.clone()).await);

    for suffix in ["", "-wal", "-shm"] {
        let _ = fs::remove_file(dir.path().join(format!("{}{}", PROGRESS_FILE_NAME, suffix)));
    }

    let (_tx, rx) = watch::channel(false);
    let mut coordinator = Coordinator::new(config, rx).unwrap();
    assert_small_site_done(&coordinator, &base);
    assert!(coordinator
        .frontier()
        .is_prerequisite(&format!("{}/logo.png", base)));

    coordinator.run().await.unwrap();
    assert_eq!(coordinator.frontier().len(), 4);
}

#[tokio::test]
async fn test_reconsider_leaves_finished_urls_alone() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_small_site(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), vec![format!("{}/", base)]);
    drop(run_crawl(config.clone()).await);

    let (_tx, rx) = watch::channel(false);
    let mut coordinator = Coordinator::new(config, rx).unwrap();
    let queued = coordinator
        .reconsider_for_scraping(&format!("{}/**", base))
        .unwrap();
    assert_eq!(queued, 0);
    assert_small_site_done(&coordinator, &base);

    coordinator.run().await.unwrap();
    assert_small_site_done(&coordinator, &base);
}

#[tokio::test]
async fn test_interrupted_pages_are_served_from_archive() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_small_site(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), vec![format!("{}/", base)]);
    drop(run_crawl(config.clone()).await);

    // Archived, but the crash happened before the status was saved
    let page1 = format!("{}/page1", base);
    {
        let mut store = open_progress_store(dir.path()).unwrap();
        let word = UrlRecord::new(UrlStatus::Processing, 0, false).word();
        store.save(&[(page1.clone(), word)], &[]).unwrap();
    }

    let (_tx, rx) = watch::channel(false);
    let mut coordinator = Coordinator::new(config, rx).unwrap();
    assert_eq!(coordinator.frontier().status(&page1), UrlStatus::ToCrawl);

    coordinator.run().await.unwrap();
    assert_small_site_done(&coordinator, &base);
    assert_eq!(coordinator.frontier().http_status(&page1), 200);
}

#[tokio::test]
async fn test_failed_urls_are_fetched_again() {
    use crate::common::{html, mount};
    use wiremock::ResponseTemplate;

    let server = MockServer::start().await;
    let base = server.uri();
    let seed = format!("{}/", base);
    mount(&server, "/", ResponseTemplate::new(503), 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), vec![seed.clone()]);
    let coordinator = run_crawl(config.clone()).await;
    assert_eq!(coordinator.frontier().status(&seed), UrlStatus::Error);
    assert_eq!(coordinator.frontier().http_status(&seed), 503);
    drop(coordinator);

    server.reset().await;
    mount(&server, "/", html("<p>back</p>"), 1).await;

    let (_tx, rx) = watch::channel(false);
    let mut coordinator = Coordinator::new(config, rx).unwrap();
    assert_eq!(coordinator.reconsider_failed_urls(None).unwrap(), 1);
    coordinator.run().await.unwrap();
    assert_eq!(coordinator.frontier().status(&seed), UrlStatus::Crawled);
    assert_eq!(coordinator.frontier().http_status(&seed), 200);
}

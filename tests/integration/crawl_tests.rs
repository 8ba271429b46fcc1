//! End-to-end crawls against mock servers

use crate::common::{create_test_config, html, mount, mount_small_site, run_crawl};
use flate2::read::MultiGzDecoder;
use std::io::Read;
use tempfile::TempDir;
use warc_crawler::archive::{read_index, INDEX_FILE_NAME};
use warc_crawler::crawler::TransportError;
use warc_crawler::UrlStatus;
use wiremock::{MockServer, ResponseTemplate};

fn read_archive(path: &std::path::Path) -> String {
    let mut text = String::new();
    MultiGzDecoder::new(std::fs::File::open(path).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    text
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_small_site(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), vec![format!("{}/", base)]);
    let mut coordinator = run_crawl(config).await;

    let frontier = coordinator.frontier();
    assert_eq!(frontier.len(), 4);
    assert_eq!(frontier.status(&format!("{}/", base)), UrlStatus::Crawled);
    assert_eq!(frontier.status(&format!("{}/page1", base)), UrlStatus::Crawled);
    assert_eq!(frontier.status(&format!("{}/page2", base)), UrlStatus::Crawled);
    assert_eq!(frontier.http_status(&format!("{}/page2", base)), 200);

    let logo = format!("{}/logo.png", base);
    assert_eq!(frontier.status(&logo), UrlStatus::Downloaded);
    assert!(frontier.is_prerequisite(&logo));

    // Pages and images go to separate archives
    assert!(dir.path().join("archive-web-00000.warc.gz").exists());
    assert!(dir.path().join("archive-media-00000.warc.gz").exists());
    assert!(!dir.path().join(".lock").exists());

    let entries = read_index(&dir.path().join(INDEX_FILE_NAME)).unwrap();
    assert_eq!(entries.len(), 4);

    let cached = coordinator.open_cached(&format!("{}/page1", base)).unwrap().unwrap();
    assert_eq!(cached.status_code, 200);
    assert_eq!(cached.content_type.as_deref(), Some("text/html"));
    assert_eq!(cached.payload, b"<html><body>Content 1</body></html>");

    let entry = coordinator.try_get_cached(&logo).unwrap().unwrap();
    assert_eq!(entry.warc_file, "archive-media-00000.warc.gz");
    assert_eq!(entry.payload_length, Some(4));
    assert!(coordinator.try_get_cached("http://unknown.invalid/").unwrap().is_none());
}

#[tokio::test]
async fn test_requests_precede_their_responses() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(&server, "/", html("<html><body>alone</body></html>"), 1).await;

    let dir = TempDir::new().unwrap();
    run_crawl(create_test_config(dir.path(), vec![format!("{}/", base)])).await;

    let text = read_archive(&dir.path().join("archive-web-00000.warc.gz"));
    let warcinfo = text.find("WARC-Type: warcinfo").unwrap();
    let request = text.find("WARC-Type: request").unwrap();
    let response = text.find("WARC-Type: response").unwrap();
    assert!(warcinfo < request && request < response);
    assert!(text.contains("WARC-Concurrent-To: <urn:uuid:"));
    assert!(text.contains("GET / HTTP/1.1\r\n"));
    assert!(text.contains("User-Agent: TestBot/1.0.0"));
    assert!(text.contains("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Content-Type: text/html\r\n"));
}

#[tokio::test]
async fn test_errors_and_redirects() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(
        &server,
        "/",
        html(r#"<a href="/missing">gone</a> <a href="/old">moved</a> <a href="/new">new</a>"#),
        1,
    )
    .await;
    mount(
        &server,
        "/old",
        ResponseTemplate::new(301).insert_header("Location", "/new"),
        1,
    )
    .await;
    mount(&server, "/new", html("<p>new</p>"), 1).await;
    mount(&server, "/missing", ResponseTemplate::new(404), 1).await;

    let dir = TempDir::new().unwrap();
    let mut coordinator =
        run_crawl(create_test_config(dir.path(), vec![format!("{}/", base)])).await;

    let frontier = coordinator.frontier();
    assert_eq!(frontier.status(&format!("{}/missing", base)), UrlStatus::Error);
    assert_eq!(frontier.http_status(&format!("{}/missing", base)), 404);
    assert_eq!(frontier.status(&format!("{}/old", base)), UrlStatus::Redirect);
    assert_eq!(frontier.http_status(&format!("{}/old", base)), 301);
    assert_eq!(frontier.status(&format!("{}/new", base)), UrlStatus::Crawled);

    // Error responses are never archived; redirects are
    assert!(coordinator
        .try_get_cached(&format!("{}/missing", base))
        .unwrap()
        .is_none());
    let redirect = coordinator.open_cached(&format!("{}/old", base)).unwrap().unwrap();
    assert_eq!(redirect.status_code, 301);
    assert_eq!(
        redirect.location.map(|l| l.to_string()),
        Some(format!("{}/new", base))
    );
}

#[tokio::test]
async fn test_transport_error_is_recorded() {
    // Reserve a port, then free it so connections are refused
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let seed = format!("http://127.0.0.1:{}/", port);
    let dir = TempDir::new().unwrap();
    let coordinator = run_crawl(create_test_config(dir.path(), vec![seed.clone()])).await;

    assert_eq!(coordinator.frontier().status(&seed), UrlStatus::Error);
    assert_eq!(
        coordinator.frontier().http_status(&seed),
        TransportError::Connect.code()
    );
    assert!(!dir.path().join("archive-web-00000.warc.gz").exists());
}

#[tokio::test]
async fn test_out_of_scope_links_are_skipped() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(
        &server,
        "/",
        html(r#"<a href="http://elsewhere.invalid/page">away</a>
                <a href="mailto:someone@example.com">mail</a>"#),
        1,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let coordinator = run_crawl(create_test_config(dir.path(), vec![format!("{}/", base)])).await;

    let frontier = coordinator.frontier();
    assert_eq!(frontier.len(), 2);
    assert_eq!(
        frontier.status("http://elsewhere.invalid/page"),
        UrlStatus::Skipped
    );
}

#[tokio::test]
async fn test_gzip_response_is_archived_raw() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"<html><body>zipped</body></html>").unwrap();
    let compressed = encoder.finish().unwrap();

    let server = MockServer::start().await;
    let base = server.uri();
    mount(
        &server,
        "/",
        ResponseTemplate::new(200)
            .set_body_raw(compressed, "text/html")
            .insert_header("Content-Encoding", "gzip"),
        1,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let mut coordinator =
        run_crawl(create_test_config(dir.path(), vec![format!("{}/", base)])).await;

    let seed = format!("{}/", base);
    assert_eq!(coordinator.frontier().status(&seed), UrlStatus::Crawled);
    let cached = coordinator.open_cached(&seed).unwrap().unwrap();
    assert_eq!(cached.payload, b"<html><body>zipped</body></html>");
    assert!(cached
        .headers
        .iter()
        .any(|(name, value)| name == "Content-Encoding" && value == "gzip"));
}

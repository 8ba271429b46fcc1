//! Shared helpers for the integration tests

use std::path::Path;
use tokio::sync::watch;
use warc_crawler::config::{ArchiveConfig, Config, CrawlerConfig, ScopeConfig, UserAgentConfig};
use warc_crawler::crawler::Coordinator;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration writing to `destination`
pub fn create_test_config(destination: &Path, seeds: Vec<String>) -> Config {
    Config {
        crawler: CrawlerConfig {
            parallelism: 3,
            error_delay_ms: 0,
            request_timeout_secs: 5,
            connect_timeout_secs: 5,
            ..CrawlerConfig::default()
        },
        archive: ArchiveConfig {
            destination: destination.to_path_buf(),
            max_archive_length: 1 << 20,
            large_file_threshold: 1 << 20,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        scope: ScopeConfig {
            seeds,
            domains: vec![],
            rules: vec![],
            prerequisites_anywhere: true,
        },
    }
}

/// An HTML page response
pub fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

/// Mounts a GET route answered exactly `times` times
pub async fn mount(server: &MockServer, route: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

/// Mounts a small site: a home page linking to two pages and a logo
pub async fn mount_small_site(server: &MockServer, times: u64) {
    mount(
        server,
        "/",
        html(r#"<html><head><title>Home</title></head><body>
            <a href="/page1">Page 1</a>
            <a href="page2#section">Page 2</a>
            <img src="/logo.png">
            </body></html>"#),
        times,
    )
    .await;
    mount(server, "/page1", html("<html><body>Content 1</body></html>"), times).await;
    mount(server, "/page2", html("<html><body>Content 2</body></html>"), times).await;
    mount(
        server,
        "/logo.png",
        ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"),
        times,
    )
    .await;
}

/// Creates a coordinator over `config` and runs it to completion
pub async fn run_crawl(config: Config) -> Coordinator {
    let (_tx, rx) = watch::channel(false);
    let mut coordinator = Coordinator::new(config, rx).expect("Failed to create coordinator");
    coordinator.run().await.expect("Crawl failed");
    coordinator
}

//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full crawl
//! cycle end-to-end through the real HTTP transport. The crawler is blocking, so
//! every crawl runs inside `spawn_blocking`.

use scrape_pool::config::{parse_config, Config};
use scrape_pool::crawler::{crawl, load_snapshot, save_snapshot, CrawlerFactory};
use scrape_pool::storage::{FileSink, LinkSet, SqliteSink};
use scrape_pool::CrawlError;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds a validated configuration crawling `seed` with the given output section
fn create_test_config(seed: &str, extra: &str, output: &str) -> Config {
    let toml = format!(
        r#"
[crawler]
seed = "{seed}"
threads = 2
data-limit = 100
rate-limit-backoff-secs = 1
request-timeout-secs = 5
user-agent = "TestBot/1.0"

[options]
save-links = true
save-content = true
{extra}

[output]
{output}

[[content]]
name = "emails"
pattern = '[a-z0-9]+@example\.com'

[[content]]
name = "images"
selector = "img[src]"
attribute = "src"
"#
    );
    parse_config(&toml).expect("test config should be valid")
}

fn file_output(dir: &Path) -> String {
    format!("backend = \"file\"\ndirectory = \"{}\"", dir.display())
}

fn sqlite_output(db: &Path) -> String {
    format!("backend = \"sqlite\"\ndatabase-path = \"{}\"", db.display())
}

async fn mount_page(server: &MockServer, route: &str, body: String) {
    mount_page_delayed(server, route, body, Duration::ZERO).await;
}

async fn mount_page_delayed(server: &MockServer, route: &str, body: String, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html")
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// What a finished crawl looked like
///
/// The crawler itself owns a blocking HTTP client and must be dropped off the runtime.
#[derive(Debug)]
struct CrawlOutcome {
    running: bool,
    visited: usize,
    emails: Option<usize>,
    images: Option<usize>,
}

async fn run_crawl(config: Config) -> Result<CrawlOutcome, CrawlError> {
    tokio::task::spawn_blocking(move || -> Result<CrawlOutcome, CrawlError> {
        let crawler = crawl(&config)?;
        Ok(CrawlOutcome {
            running: crawler.is_running(),
            visited: crawler.visited_count(),
            emails: crawler.collected("emails"),
            images: crawler.collected("images"),
        })
    })
    .await
    .expect("crawl task panicked")
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Mounts a small closed site: / -> page1, page2; page1 -> page2; page2 -> /
///
/// Only the two inner pages are delayed.
async fn mount_small_site(server: &MockServer, delay: Duration) {
    let base = server.uri();
    mount_page(
        server,
        "/",
        format!(
            r#"<html><head><title>Home</title></head><body>
            <a href="{base}/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            <p>Contact: info@example.com</p>
            </body></html>"#
        ),
    )
    .await;
    mount_page_delayed(
        server,
        "/page1",
        r#"<html><body>
            <a href="/page2">Page 2</a>
            <p>sales@example.com and support@example.com</p>
            <img src="/images/logo.png">
            </body></html>"#
            .to_string(),
        delay,
    )
    .await;
    mount_page_delayed(
        server,
        "/page2",
        r#"<html><body>
            <a href="/">Home</a>
            <img src="/images/photo.jpg">
            </body></html>"#
            .to_string(),
        delay,
    )
    .await;
}

#[tokio::test]
async fn test_full_crawl_file_backend() {
    let mock_server = MockServer::start().await;
    mount_small_site(&mock_server, Duration::ZERO).await;
    let base = mock_server.uri();

    let dir = tempdir().unwrap();
    let config = create_test_config(&format!("{}/", base), "", &file_output(dir.path()));

    let outcome = run_crawl(config).await.expect("crawl should succeed");

    assert!(!outcome.running);
    assert_eq!(outcome.visited, 3);
    assert_eq!(outcome.emails, Some(3));
    assert_eq!(outcome.images, Some(2));

    let sink = FileSink::new(dir.path());
    let mut visited = read_lines(&sink.links_path(LinkSet::Visited));
    visited.sort();
    assert_eq!(
        visited,
        vec![
            format!("{}/", base),
            format!("{}/page1", base),
            format!("{}/page2", base),
        ]
    );

    let mut emails = read_lines(&sink.content_path("emails"));
    emails.sort();
    assert_eq!(
        emails,
        vec!["info@example.com", "sales@example.com", "support@example.com"]
    );

    let images = read_lines(&sink.content_path("images"));
    assert_eq!(images.len(), 2);
    assert!(images.contains(&format!("{}/images/logo.png", base)));
}

#[tokio::test]
async fn test_crawl_sqlite_backend_skips_failing_pages() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        r#"<html><body>
            <a href="/limited">Busy</a>
            <a href="/missing">Gone</a>
            <a href="/ok">Fine</a>
            </body></html>"#
            .to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_page(
        &mock_server,
        "/ok",
        r#"<html><body><a href="/">Home</a> ok@example.com</body></html>"#.to_string(),
    )
    .await;

    let dir = tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(&format!("{}/", base), "", &sqlite_output(&db_path));

    let outcome = run_crawl(config)
        .await
        .expect("crawl should succeed despite failing pages");

    assert!(!outcome.running);
    assert_eq!(outcome.emails, Some(1));

    let sink = SqliteSink::new(&db_path).unwrap();
    assert_eq!(sink.count_links(LinkSet::Visited).unwrap(), 4);
    assert_eq!(sink.count_links(LinkSet::Unvisited).unwrap(), 0);
    assert_eq!(
        sink.load_content("emails").unwrap(),
        vec!["ok@example.com".to_string()]
    );

    mock_server.verify().await;
}

#[tokio::test]
async fn test_crawl_stops_at_data_limit() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    // a long chain of pages, each with one address
    for i in 0..20 {
        let route = if i == 0 { "/".to_string() } else { format!("/p{}", i) };
        mount_page(
            &mock_server,
            &route,
            format!(
                r#"<html><body><a href="/p{}">next</a> user{}@example.com</body></html>"#,
                i + 1,
                i
            ),
        )
        .await;
    }

    let dir = tempdir().unwrap();
    let toml = format!(
        r#"
[crawler]
seed = "{base}/"
threads = 1
data-limit = 3

[options]
save-content = true

[output]
{output}

[[content]]
name = "emails"
pattern = '[a-z0-9]+@example\.com'
"#,
        output = file_output(dir.path())
    );
    let config = parse_config(&toml).unwrap();

    let outcome = run_crawl(config).await.unwrap();

    assert_eq!(outcome.emails, Some(3));
    assert!(outcome.visited < 20);

    let sink = FileSink::new(dir.path());
    assert_eq!(read_lines(&sink.content_path("emails")).len(), 3);
    // save-links is off
    assert!(!sink.links_path(LinkSet::Visited).exists());
}

#[tokio::test]
async fn test_seed_without_links_fails() {
    let mock_server = MockServer::start().await;
    mount_page(
        &mock_server,
        "/",
        "<html><body><p>Nothing to follow</p></body></html>".to_string(),
    )
    .await;

    let dir = tempdir().unwrap();
    let config = create_test_config(
        &format!("{}/", mock_server.uri()),
        "",
        &file_output(dir.path()),
    );

    let result = run_crawl(config).await;

    assert!(matches!(result, Err(CrawlError::NoLinksFound { .. })));
}

#[tokio::test]
async fn test_unreachable_seed_fails() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let dir = tempdir().unwrap();
    let config = create_test_config(
        &format!("{}/", mock_server.uri()),
        "",
        &file_output(dir.path()),
    );

    let result = run_crawl(config).await;

    assert!(matches!(result, Err(CrawlError::Fetch(_))));
}

#[tokio::test]
async fn test_language_restriction_over_http() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    mount_page(
        &mock_server,
        "/",
        r#"<html lang="en"><body><a href="/de">Deutsch</a> en@example.com</body></html>"#
            .to_string(),
    )
    .await;
    mount_page(
        &mock_server,
        "/de",
        r#"<html lang="de"><body><a href="/">English</a> de@example.com</body></html>"#
            .to_string(),
    )
    .await;

    let dir = tempdir().unwrap();
    let config = create_test_config(
        &format!("{}/", base),
        "restrict-language = true\nlanguage = \"en\"",
        &file_output(dir.path()),
    );

    let outcome = run_crawl(config).await.unwrap();

    // both pages are visited, only the English one contributes content
    assert_eq!(outcome.visited, 2);
    let emails = read_lines(&FileSink::new(dir.path()).content_path("emails"));
    assert_eq!(emails, vec!["en@example.com".to_string()]);
}

#[tokio::test]
async fn test_snapshot_file_resumes_crawl() {
    let mock_server = MockServer::start().await;
    mount_small_site(&mock_server, Duration::from_millis(500)).await;
    let base = mock_server.uri();

    let dir = tempdir().unwrap();
    let snapshot_path = dir.path().join("snapshots").join("crawl.json");
    let config = create_test_config(&format!("{}/", base), "", &file_output(dir.path()));

    let resumed_visits = tokio::task::spawn_blocking(move || {
        let factory = CrawlerFactory::from_config(&config)
            .unwrap()
            .with_config_hash("hash-1");

        // the inner pages are slow, so the snapshot lands while they are in flight
        let crawler = factory.create(&config.crawler.seed);
        crawler.try_start().unwrap();
        let snapshot = crawler.snapshot();
        crawler.close();
        save_snapshot(&snapshot, &snapshot_path).unwrap();

        let loaded = load_snapshot(&snapshot_path).unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.config_hash.as_deref(), Some("hash-1"));

        let resumed = factory.restore(loaded).unwrap();
        resumed.join();
        resumed.close();
        resumed.visited_count()
    })
    .await
    .unwrap();

    assert_eq!(resumed_visits, 3);

    // every page was fetched exactly once across both sessions
    let requests = mock_server.received_requests().await.unwrap();
    let mut paths: Vec<String> = requests.iter().map(|r| r.url.path().to_string()).collect();
    paths.sort();
    assert_eq!(paths, vec!["/", "/page1", "/page2"]);

    let sink = FileSink::new(dir.path());
    assert_eq!(read_lines(&sink.links_path(LinkSet::Visited)).len(), 3);
    assert_eq!(read_lines(&sink.content_path("emails")).len(), 3);
}

//! Integration tests for robots.txt compliance and crawl-delay
//!
//! robots.txt is served by a wiremock server; pages come from the in-memory
//! site so the tests can see exactly which URLs reached the extractor.

mod common;

use common::{engine_config, job_config, FakeSite};
use std::sync::Arc;
use sumi_sitecrawl::{CrawlEngine, JobStatus, SkipReason};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn robots_server(body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_robots_disallowed_page_never_reaches_extractor() {
    let server = robots_server(
        "User-agent: *\nDisallow: /private/\n\nSitemap: https://cdn.test/sitemap.xml\n",
    )
    .await;
    let base = server.uri();
    let site = Arc::new(
        FakeSite::new()
            .page(&format!("{}/", base), &["/private/page", "/public"])
            .page(&format!("{}/private/page", base), &[])
            .page(&format!("{}/public", base), &[]),
    );

    let dir = tempfile::tempdir().unwrap();
    let engine = CrawlEngine::new(engine_config(dir.path()), site.clone()).unwrap();

    let mut config = job_config(&format!("{}/", base));
    config.respect_robots = true;
    let job_id = engine.start_job(config).unwrap();
    let job = engine.wait(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let private_url = format!("{}/private/page", base);
    let pages = engine.list_pages(&job_id, 100, 0).unwrap().pages;
    let private = pages.iter().find(|p| p.url == private_url).unwrap();
    assert!(!private.success);
    assert_eq!(private.skip_reason, Some(SkipReason::RobotsDisallowed));
    assert!(private.fetched_at.is_none());
    assert_eq!(site.calls_for(&private_url), 0);

    let public = pages.iter().find(|p| p.url == format!("{}/public", base)).unwrap();
    assert!(public.success);

    assert_eq!(job.counters.pages_skipped, 1);
    assert_eq!(job.counters.pages_ok, 2);

    let logs = engine.get_logs(&job_id).unwrap();
    assert!(logs.contains("https://cdn.test/sitemap.xml"));
    assert!(logs.contains("robots-disallowed"));
}

#[tokio::test]
async fn test_ignoring_robots_crawls_everything() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .expect(0)
        .mount(&server)
        .await;
    let base = server.uri();
    let site = Arc::new(
        FakeSite::new()
            .page(&format!("{}/", base), &["/private/page"])
            .page(&format!("{}/private/page", base), &[]),
    );

    let dir = tempfile::tempdir().unwrap();
    let engine = CrawlEngine::new(engine_config(dir.path()), site.clone()).unwrap();

    let job_id = engine.start_job(job_config(&format!("{}/", base))).unwrap();
    let job = engine.wait(&job_id).await.unwrap();

    assert_eq!(job.counters.pages_ok, 2);
    assert_eq!(site.calls().len(), 2);
}

#[tokio::test]
async fn test_missing_robots_allows_crawl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let base = server.uri();
    let site = Arc::new(
        FakeSite::new()
            .page(&format!("{}/", base), &["/a"])
            .page(&format!("{}/a", base), &[]),
    );

    let dir = tempfile::tempdir().unwrap();
    let engine = CrawlEngine::new(engine_config(dir.path()), site).unwrap();

    let mut config = job_config(&format!("{}/", base));
    config.respect_robots = true;
    let job_id = engine.start_job(config).unwrap();
    let job = engine.wait(&job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.counters.pages_ok, 2);
}

#[tokio::test]
async fn test_crawl_delay_spaces_requests() {
    let server = robots_server("User-agent: *\nCrawl-delay: 0.5\n").await;
    let base = server.uri();
    let site = Arc::new(
        FakeSite::new()
            .page(&format!("{}/", base), &["/a", "/b", "/c"])
            .page(&format!("{}/a", base), &[])
            .page(&format!("{}/b", base), &[])
            .page(&format!("{}/c", base), &[]),
    );

    let dir = tempfile::tempdir().unwrap();
    let engine = CrawlEngine::new(engine_config(dir.path()), site).unwrap();

    let mut config = job_config(&format!("{}/", base));
    config.respect_robots = true;
    let started = std::time::Instant::now();
    let job_id = engine.start_job(config).unwrap();
    let job = engine.wait(&job_id).await.unwrap();

    // Crawl-delay 0.5s narrows the 10/s rate to 2/s with a burst of 2:
    // the third request waits 0.5s and the fourth 1s.
    assert_eq!(job.counters.pages_ok, 4);
    assert!(started.elapsed() >= std::time::Duration::from_millis(900));
}

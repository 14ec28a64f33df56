use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::fetch::{Fetch, FetchOutcome};
use crate::frontier::Frontier;
use crate::path_map;
use crate::urls::CanonicalUrl;

pub const DEFAULT_MAX_PAGES: usize = 50;

#[derive(Debug, Clone)]
pub struct CrawlTarget {
    pub url: CanonicalUrl,
    pub max_pages: usize,
}

impl CrawlTarget {
    pub fn new(url: CanonicalUrl, max_pages: usize) -> Self {
        Self { url, max_pages }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPage {
    pub url: CanonicalUrl,
    pub relative_path: String,
    pub bytes: usize,
}

#[derive(Debug)]
pub struct CrawlReport {
    pub staging_root: PathBuf,
    pub pages: Vec<StagedPage>,
    pub skipped: usize,
    pub cancelled: bool,
}

impl CrawlReport {
    pub fn pages_downloaded(&self) -> usize {
        self.pages.len()
    }

    pub fn staged_bytes(&self) -> usize {
        self.pages.iter().map(|page| page.bytes).sum()
    }
}

/// Crawls `target` breadth-first and writes every downloaded page under `staging_root`.
///
/// Up to `concurrency` URLs are fetched at once; their results are applied in dequeue order.
/// Only failing to create `staging_root` is an error: per-page failures are logged and skipped.
pub async fn crawl(
    target: &CrawlTarget,
    staging_root: &Path,
    fetcher: &dyn Fetch,
    concurrency: usize,
    cancel: &CancellationToken,
) -> anyhow::Result<CrawlReport> {
    tokio::fs::create_dir_all(staging_root)
        .await
        .with_context(|| format!("create staging dir: {}", staging_root.display()))?;

    let mut report = CrawlReport {
        staging_root: staging_root.to_path_buf(),
        pages: Vec::new(),
        skipped: 0,
        cancelled: false,
    };

    let mut frontier = Frontier::new(target.max_pages);
    frontier.seed(target.url.clone());
    let batch_size = concurrency.max(1);

    loop {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            let Some(url) = frontier.pop_next() else {
                break;
            };
            batch.push(url);
        }
        if batch.is_empty() {
            break;
        }

        let fetches = futures::future::join_all(batch.iter().map(|url| fetcher.fetch(url)));
        let outcomes = tokio::select! {
            _ = cancel.cancelled() => None,
            outcomes = fetches => Some(outcomes),
        };
        let Some(outcomes) = outcomes else {
            tracing::info!(in_flight = batch.len(), "crawl cancelled");
            report.cancelled = true;
            break;
        };

        for (url, outcome) in batch.into_iter().zip(outcomes) {
            match outcome {
                FetchOutcome::Success(page) => {
                    let relative_path = path_map::map(&url);
                    if let Err(err) = persist_page(staging_root, &relative_path, &page.body).await
                    {
                        tracing::warn!(%url, ?err, "failed to stage page; skipping");
                        frontier.release(&url);
                        report.skipped += 1;
                        continue;
                    }
                    frontier.mark_visited(&url);
                    tracing::info!(%url, path = %relative_path, bytes = page.body.len(), "downloaded");

                    let mut offered = 0_usize;
                    for link in page.links {
                        let Ok(link) = CanonicalUrl::try_from(link) else {
                            continue;
                        };
                        if !target.url.same_origin(&link) {
                            continue;
                        }
                        if frontier.offer(link) {
                            offered += 1;
                        }
                    }
                    tracing::debug!(%url, offered, queued = frontier.queued(), "links offered");

                    report.pages.push(StagedPage {
                        url,
                        relative_path,
                        bytes: page.body.len(),
                    });
                }
                FetchOutcome::NonOkStatus(status) => {
                    tracing::debug!(%url, status, "non-200 response; skipping");
                    frontier.release(&url);
                    report.skipped += 1;
                }
                FetchOutcome::TransportError(message) => {
                    tracing::warn!(%url, error = %message, "fetch failed; skipping");
                    frontier.release(&url);
                    report.skipped += 1;
                }
            }
        }
    }

    tracing::info!(
        seed = %target.url,
        staging = %report.staging_root.display(),
        pages = frontier.pages_downloaded(),
        bytes = report.staged_bytes(),
        skipped = report.skipped,
        cancelled = report.cancelled,
        "crawl finished"
    );
    Ok(report)
}

async fn persist_page(root: &Path, relative_path: &str, body: &[u8]) -> anyhow::Result<()> {
    let path = path_map::staged_path(root, relative_path)?;
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("staged page must have parent: {}", path.display()))?;
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create page parent dir: {}", parent.display()))?;

    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        tracing::debug!(path = %path.display(), "staged path collision; overwriting");
    }
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("write page: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use url::Url;

    use super::*;
    use crate::fetch::{FetchedPage, extract_links};
    use crate::urls::validate;

    const ORIGIN: &str = "https://example.com";

    /// In-memory site keyed by path (and query); records every fetch in order.
    #[derive(Default)]
    struct StubSite {
        pages: HashMap<&'static str, (u16, String)>,
        fetched: Mutex<Vec<String>>,
    }

    impl StubSite {
        fn new() -> Self {
            Self::default()
        }

        fn page(mut self, path: &'static str, status: u16, body: impl Into<String>) -> Self {
            self.pages.insert(path, (status, body.into()));
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetch for StubSite {
        async fn fetch(&self, url: &CanonicalUrl) -> FetchOutcome {
            let key = match url.as_url().query() {
                Some(query) => format!("{}?{query}", url.path()),
                None => url.path().to_owned(),
            };
            self.fetched.lock().unwrap().push(key.clone());

            match self.pages.get(key.as_str()) {
                Some((200, body)) => FetchOutcome::Success(FetchedPage {
                    body: body.clone().into_bytes(),
                    links: extract_links(url.as_url(), body.as_bytes()).unwrap(),
                }),
                Some((status, _)) => FetchOutcome::NonOkStatus(*status),
                None => FetchOutcome::TransportError(format!("connection refused: {url}")),
            }
        }
    }

    fn links(hrefs: &[&str]) -> String {
        let anchors = hrefs
            .iter()
            .map(|href| format!(r#"<a href="{href}">{href}</a>"#))
            .collect::<String>();
        format!("<!doctype html><html><body>{anchors}</body></html>")
    }

    fn target(max_pages: usize) -> CrawlTarget {
        CrawlTarget::new(validate(&format!("{ORIGIN}/")).unwrap(), max_pages)
    }

    async fn run(site: &StubSite, max_pages: usize, concurrency: usize) -> CrawlReport {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().join("stage");
        let report = crawl(
            &target(max_pages),
            &root,
            site,
            concurrency,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        // Keep the tempdir alive only for the duration of the crawl.
        drop(temp);
        report
    }

    fn staged_paths(report: &CrawlReport) -> Vec<&str> {
        report
            .pages
            .iter()
            .map(|p| p.relative_path.as_str())
            .collect()
    }

    #[tokio::test]
    async fn single_page_budget_keeps_only_the_seed() {
        let site = StubSite::new()
            .page("/", 200, links(&["/a", "/b", "/c"]))
            .page("/a", 200, "a")
            .page("/b", 200, "b")
            .page("/c", 200, "c");
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().join("stage");

        let report = crawl(&target(1), &root, &site, 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(staged_paths(&report), vec!["index.html"]);
        assert_eq!(site.fetched(), vec!["/"]);
        assert!(root.join("index.html").is_file());
    }

    #[tokio::test]
    async fn failing_seed_yields_empty_staging_dir() {
        let site = StubSite::new().page("/", 404, "not found");
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().join("stage");

        let report = crawl(&target(10), &root, &site, 1, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.pages.is_empty());
        assert_eq!(report.skipped, 1);
        assert!(root.is_dir());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn traversal_is_breadth_first_in_document_order() {
        let site = StubSite::new()
            .page("/", 200, links(&["/b", "/a"]))
            .page("/b", 200, links(&["/b/deep"]))
            .page("/a", 200, links(&["/a/deep"]))
            .page("/b/deep", 200, "b deep")
            .page("/a/deep", 200, "a deep");

        let report = run(&site, 10, 1).await;

        assert_eq!(site.fetched(), vec!["/", "/b", "/a", "/b/deep", "/a/deep"]);
        assert_eq!(
            staged_paths(&report),
            vec![
                "index.html",
                "b/index.html",
                "a/index.html",
                "b/deep/index.html",
                "a/deep/index.html",
            ]
        );
    }

    #[tokio::test]
    async fn pages_linked_twice_are_fetched_once() {
        let site = StubSite::new()
            .page("/", 200, links(&["/a", "/b", "/a#again", "./a"]))
            .page("/a", 200, links(&["/", "/b"]))
            .page("/b", 200, links(&["/a", "/"]));

        let report = run(&site, 10, 1).await;

        assert_eq!(site.fetched(), vec!["/", "/a", "/b"]);
        assert_eq!(report.pages_downloaded(), 3);
    }

    #[tokio::test]
    async fn cross_origin_links_are_never_followed() {
        let site = StubSite::new()
            .page(
                "/",
                200,
                links(&[
                    "https://other.example/",
                    "http://example.com/insecure",
                    "https://example.com:8443/port",
                    "mailto:someone@example.com",
                    "/inside",
                ]),
            )
            .page("/inside", 200, "inside");

        let report = run(&site, 10, 1).await;

        assert_eq!(site.fetched(), vec!["/", "/inside"]);
        assert!(
            report
                .pages
                .iter()
                .all(|page| page.url.as_url().host_str() == Some("example.com"))
        );
    }

    #[tokio::test]
    async fn failed_urls_are_retried_when_rediscovered() {
        let site = StubSite::new()
            .page("/", 200, links(&["/flaky", "/a"]))
            .page("/flaky", 503, "unavailable")
            .page("/a", 200, links(&["/flaky"]));

        let report = run(&site, 10, 1).await;

        assert_eq!(site.fetched(), vec!["/", "/flaky", "/a", "/flaky"]);
        assert_eq!(report.pages_downloaded(), 2);
        assert_eq!(report.skipped, 2);
    }

    #[tokio::test]
    async fn transport_errors_do_not_abort_the_crawl() {
        let site = StubSite::new()
            .page("/", 200, links(&["/gone", "/ok"]))
            .page("/ok", 200, "ok");

        let report = run(&site, 10, 1).await;

        assert_eq!(staged_paths(&report), vec!["index.html", "ok/index.html"]);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn concurrent_crawl_never_overshoots_budget() {
        let site = StubSite::new()
            .page("/", 200, links(&["/a", "/b", "/c", "/d"]))
            .page("/a", 200, "a")
            .page("/b", 200, "b")
            .page("/c", 200, "c")
            .page("/d", 200, "d");

        let report = run(&site, 3, 4).await;

        assert_eq!(site.fetched(), vec!["/", "/a", "/b"]);
        assert_eq!(report.pages_downloaded(), 3);
    }

    #[tokio::test]
    async fn concurrent_batch_does_not_refetch_in_flight_pages() {
        let site = StubSite::new()
            .page("/", 200, links(&["/a", "/b"]))
            .page("/a", 200, links(&["/b"]))
            .page("/b", 200, links(&["/a"]));

        let report = run(&site, 10, 2).await;

        assert_eq!(site.fetched(), vec!["/", "/a", "/b"]);
        assert_eq!(report.pages_downloaded(), 3);
    }

    #[tokio::test]
    async fn cancelled_crawl_stops_before_fetching() {
        let site = StubSite::new().page("/", 200, "root");
        let temp = tempfile::TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = crawl(&target(10), temp.path(), &site, 1, &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report.pages.is_empty());
        assert!(site.fetched().is_empty());
    }

    /// Serves the seed, then cancels the crawl while the next fetch is still in flight.
    struct CancellingSite {
        cancel: CancellationToken,
        fetched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Fetch for CancellingSite {
        async fn fetch(&self, url: &CanonicalUrl) -> FetchOutcome {
            self.fetched.lock().unwrap().push(url.path().to_owned());
            if url.path() == "/" {
                let body = links(&["/slow"]);
                return FetchOutcome::Success(FetchedPage {
                    links: extract_links(url.as_url(), body.as_bytes()).unwrap(),
                    body: body.into_bytes(),
                });
            }
            self.cancel.cancel();
            std::future::pending::<FetchOutcome>().await
        }
    }

    #[tokio::test]
    async fn cancellation_abandons_the_in_flight_batch() {
        let cancel = CancellationToken::new();
        let site = CancellingSite {
            cancel: cancel.clone(),
            fetched: Mutex::new(Vec::new()),
        };
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().join("stage");

        let report = crawl(&target(10), &root, &site, 1, &cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(*site.fetched.lock().unwrap(), vec!["/", "/slow"]);
        assert_eq!(staged_paths(&report), vec!["index.html"]);
        assert!(report.pages.iter().all(|page| page.url.path() != "/slow"));
        assert!(root.join("index.html").is_file());
        assert!(!root.join("slow").exists());
    }

    #[tokio::test]
    async fn unstageable_pages_are_skipped_and_later_writes_win() {
        let seed = links(&["/v1.2", "/v1.2/intro", "/blog", "/blog/"]);
        let site = StubSite::new()
            .page("/", 200, seed.clone())
            .page("/v1.2", 200, "version")
            .page("/v1.2/intro", 200, "intro")
            .page("/blog", 200, "no slash")
            .page("/blog/", 200, "slash");
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().join("stage");

        let report = crawl(&target(10), &root, &site, 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            site.fetched(),
            vec!["/", "/v1.2", "/v1.2/intro", "/blog", "/blog/"]
        );
        // `/v1.2` is staged as a file, so `/v1.2/intro` has no directory to land in.
        assert_eq!(
            staged_paths(&report),
            vec!["index.html", "v1.2", "blog/index.html", "blog/index.html"]
        );
        assert_eq!(report.skipped, 1);
        assert_eq!(
            report.staged_bytes(),
            seed.len() + "version".len() + "no slash".len() + "slash".len()
        );
        assert_eq!(std::fs::read_to_string(root.join("v1.2")).unwrap(), "version");
        assert_eq!(
            std::fs::read_to_string(root.join("blog").join("index.html")).unwrap(),
            "slash"
        );
    }

    #[tokio::test]
    async fn query_variants_are_distinct_pages() {
        let site = StubSite::new()
            .page("/", 200, links(&["/list?page=2", "/list?page=3"]))
            .page("/list?page=2", 200, "two")
            .page("/list?page=3", 200, "three");

        let report = run(&site, 10, 1).await;

        assert_eq!(report.pages_downloaded(), 3);
        let urls = report
            .pages
            .iter()
            .map(|p| p.url.as_url().clone())
            .collect::<Vec<Url>>();
        assert_eq!(urls[1].query(), Some("page=2"));
    }
}

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use scraper::{Html, Selector};
use url::Url;

use crate::urls::CanonicalUrl;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0 Safari/537.36";

const LINK_SELECTOR: &str = "a[href], area[href]";

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub body: Vec<u8>,
    /// Hrefs in document order, resolved against the page URL. Not de-duplicated.
    pub links: Vec<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(FetchedPage),
    NonOkStatus(u16),
    TransportError(String),
}

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &CanonicalUrl) -> FetchOutcome;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build crawl http client")?;
        Ok(Self { client })
    }

    async fn get(&self, url: &CanonicalUrl) -> anyhow::Result<FetchOutcome> {
        let response = self
            .client
            .get(url.as_url().clone())
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Ok(FetchOutcome::NonOkStatus(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .with_context(|| format!("read body: {url}"))?
            .to_vec();
        let links = extract_links(url.as_url(), &body).context("extract links")?;

        Ok(FetchOutcome::Success(FetchedPage { body, links }))
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &CanonicalUrl) -> FetchOutcome {
        match self.get(url).await {
            Ok(outcome) => outcome,
            Err(err) => FetchOutcome::TransportError(format!("{err:#}")),
        }
    }
}

/// Collects the href of every anchor-like element, resolved against `base`.
pub fn extract_links(base: &Url, body: &[u8]) -> anyhow::Result<Vec<Url>> {
    let selector = Selector::parse(LINK_SELECTOR)
        .map_err(|err| anyhow::anyhow!("parse link selector: {err}"))?;

    let html = String::from_utf8_lossy(body);
    let document = Html::parse_document(&html);

    let links = document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .collect();
    Ok(links)
}

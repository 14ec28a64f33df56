use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, TimeZone};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::archive::{self, ArchiveSummary};
use crate::crawl::{self, CrawlTarget, DEFAULT_MAX_PAGES};
use crate::error::JobError;
use crate::fetch::{Fetch, FetchConfig, HttpFetcher};
use crate::urls::{self, CanonicalUrl};

#[derive(Debug, Clone)]
pub struct MirrorOptions {
    pub max_pages: usize,
    pub concurrency: usize,
    pub fetch: FetchConfig,
    /// Parent for staging directories; the system temp dir when unset.
    pub staging_base: Option<PathBuf>,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            concurrency: 1,
            fetch: FetchConfig::default(),
            staging_base: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MirrorSummary {
    pub seed: CanonicalUrl,
    pub pages: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub archive: ArchiveSummary,
}

pub fn archive_file_name<Tz>(now: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("website_{}.zip", now.format("%Y%m%d_%H%M%S"))
}

/// Mirrors `raw_url` into the zip at `out_zip`.
pub async fn run(
    raw_url: &str,
    out_zip: &Path,
    options: &MirrorOptions,
    cancel: &CancellationToken,
) -> Result<MirrorSummary, JobError> {
    let raw_url = raw_url.trim();
    if raw_url.is_empty() {
        return Err(JobError::invalid_input("URL is required"));
    }
    let seed = urls::validate(raw_url)?;

    let fetcher = HttpFetcher::new(&options.fetch).map_err(JobError::Io)?;
    run_with_fetcher(seed, out_zip, options, &fetcher, cancel).await
}

/// Crawls into a private staging directory, packages it, and removes the staging directory
/// whether or not packaging succeeded.
pub async fn run_with_fetcher(
    seed: CanonicalUrl,
    out_zip: &Path,
    options: &MirrorOptions,
    fetcher: &dyn Fetch,
    cancel: &CancellationToken,
) -> Result<MirrorSummary, JobError> {
    let staging = create_staging_dir(options.staging_base.as_deref()).map_err(JobError::Io)?;
    tracing::info!(seed = %seed, staging = %staging.path().display(), "mirror: crawl");

    let target = CrawlTarget::new(seed.clone(), options.max_pages);
    let result = async {
        let report = crawl::crawl(&target, staging.path(), fetcher, options.concurrency, cancel)
            .await
            .context("crawl")?;
        tracing::info!(out = %out_zip.display(), "mirror: package");
        let archive = archive::package_async(staging.path(), out_zip)
            .await
            .context("package archive")?;
        anyhow::Ok((report, archive))
    }
    .await;

    remove_staging_dir(staging);

    let (report, archive) = result.map_err(JobError::Io)?;
    Ok(MirrorSummary {
        seed,
        pages: report.pages_downloaded(),
        skipped: report.skipped,
        cancelled: report.cancelled,
        archive,
    })
}

fn create_staging_dir(base: Option<&Path>) -> anyhow::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("website_");
    match base {
        Some(base) => {
            std::fs::create_dir_all(base)
                .with_context(|| format!("create staging base: {}", base.display()))?;
            builder
                .tempdir_in(base)
                .with_context(|| format!("create staging dir in {}", base.display()))
        }
        None => builder.tempdir().context("create staging dir"),
    }
}

fn remove_staging_dir(staging: TempDir) {
    let path = staging.path().to_path_buf();
    if let Err(err) = staging.close() {
        tracing::warn!(path = %path.display(), ?err, "failed to remove staging dir");
    }
}

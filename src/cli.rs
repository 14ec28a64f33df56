use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::crawl::DEFAULT_MAX_PAGES;
use crate::fetch::FetchConfig;
use crate::mirror::MirrorOptions;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Crawl a site and package it as a zip archive.
    Mirror(MirrorArgs),
    /// Convert an mp3 into a chaptered m4b audiobook.
    M4b(M4bArgs),
}

#[derive(Debug, Args)]
pub struct MirrorArgs {
    /// Start URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Output path for the zip archive.
    #[arg(long)]
    pub out: PathBuf,

    /// Maximum pages to download.
    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: usize,

    /// Maximum concurrent HTTP requests.
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Per-request timeout.
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,
}

impl MirrorArgs {
    pub fn options(&self) -> MirrorOptions {
        MirrorOptions {
            max_pages: self.max_pages,
            concurrency: self.concurrency,
            fetch: FetchConfig {
                timeout: Duration::from_secs(self.timeout_secs),
                ..FetchConfig::default()
            },
            staging_base: None,
        }
    }
}

#[derive(Debug, Args)]
pub struct M4bArgs {
    /// Input audio file.
    #[arg(long)]
    pub input: PathBuf,

    /// Output path for the m4b.
    #[arg(long)]
    pub out: PathBuf,

    /// JSON file with `[{"title", "start_time", "end_time"?}]` chapters.
    #[arg(long)]
    pub chapters: Option<PathBuf>,
}

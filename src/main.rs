use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;
use tokio_util::sync::CancellationToken;

use sitezip::cli::{Cli, Command, M4bArgs, MirrorArgs};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    sitezip::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Mirror(args) => mirror(args).await.context("mirror")?,
        Command::M4b(args) => m4b(args).await.context("m4b")?,
    }

    Ok(())
}

async fn mirror(args: MirrorArgs) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; packaging what was downloaded");
            on_ctrl_c.cancel();
        }
    });

    let summary = sitezip::mirror::run(&args.url, &args.out, &args.options(), &cancel).await?;
    println!(
        "{} ({} pages, {} skipped)",
        summary.archive.path.display(),
        summary.pages,
        summary.skipped
    );
    Ok(())
}

async fn m4b(args: M4bArgs) -> anyhow::Result<()> {
    let chapters = match &args.chapters {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("read chapters: {}", path.display()))?;
            sitezip::chapters::parse_strict(&raw)
                .with_context(|| format!("parse chapters: {}", path.display()))?
        }
        None => None,
    };

    let config = sitezip::encode::EncoderConfig::from_env();
    sitezip::convert::run(&args.input, &args.out, chapters.as_ref(), &config).await?;
    println!("{}", args.out.display());
    Ok(())
}

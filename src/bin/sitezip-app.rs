use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use sitezip::app::queue::InProcessQueue;
use sitezip::app::{AppState, DEFAULT_MAX_UPLOAD_MB, router};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:5000")]
    addr: SocketAddr,

    /// Parent directory for per-request temp dirs (system temp dir when unset).
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Upload size limit in MiB.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_MB)]
    max_upload_mb: usize,

    /// Jobs allowed to run at once.
    #[arg(long, default_value_t = 1)]
    max_concurrency: usize,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    sitezip::logging::init_with_default("info,tower_http=debug")?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting sitezip-app");

    let work_dir = args
        .work_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("sitezip"));
    std::fs::create_dir_all(&work_dir)
        .with_context(|| format!("create work dir: {}", work_dir.display()))?;

    let mut state = AppState::new(work_dir);
    state.queue = InProcessQueue::new(args.max_concurrency);
    state.max_upload_bytes = args.max_upload_mb.saturating_mul(1024 * 1024);

    if let Err(err) = sitezip::encode::check_available(&state.encoder).await {
        tracing::warn!(
            bin = %state.encoder.bin,
            err = %format!("{err:#}"),
            "encoder not available; mp3 conversion will fail"
        );
    }

    let cancel = state.cancel.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
            }
            cancel.cancel();
        })
        .await?;
    Ok(())
}

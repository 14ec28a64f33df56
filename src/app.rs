pub mod handlers;
pub mod queue;

use std::path::PathBuf;

use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use self::queue::InProcessQueue;
use crate::encode::EncoderConfig;
use crate::mirror::MirrorOptions;

pub const DEFAULT_MAX_UPLOAD_MB: usize = 100;

#[derive(Debug, Clone)]
pub struct AppState {
    /// Parent of every request-scoped temp dir.
    pub work_dir: PathBuf,
    pub mirror: MirrorOptions,
    pub encoder: EncoderConfig,
    pub queue: InProcessQueue,
    pub cancel: CancellationToken,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(work_dir: PathBuf) -> Self {
        let mirror = MirrorOptions {
            staging_base: Some(work_dir.clone()),
            ..MirrorOptions::default()
        };
        Self {
            work_dir,
            mirror,
            encoder: EncoderConfig::from_env(),
            queue: InProcessQueue::new(1),
            cancel: CancellationToken::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/api/website-to-zip", post(handlers::website_to_zip))
        .route("/api/mp3-to-m4b", post(handlers::mp3_to_m4b))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %uuid::Uuid::new_v4(),
                )
            }),
        )
        .with_state(state)
}

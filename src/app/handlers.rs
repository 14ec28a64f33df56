use std::path::Path;

use anyhow::Context as _;
use axum::Json;
use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt as _;
use serde::Deserialize;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt as _;
use tokio_util::io::ReaderStream;

use super::AppState;
use crate::error::JobError;
use crate::{chapters, convert, mirror, urls};

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        tracing::error!(?err, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        if err.is_client_error() {
            tracing::info!(%err, "rejected request");
            return Self::bad_request(err.to_string());
        }
        tracing::error!(%err, "job failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct WebsiteRequest {
    #[serde(default)]
    pub url: Option<String>,
}

pub async fn website_to_zip(
    State(state): State<AppState>,
    payload: Result<Json<WebsiteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|err| ApiError::bad_request(err.body_text()))?;
    let raw = request.url.as_deref().map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ApiError::bad_request("URL is required"));
    }
    let seed = urls::validate(raw).map_err(JobError::from)?;

    let work = request_dir(&state.work_dir, "zip_").map_err(ApiError::internal)?;
    let file_name = mirror::archive_file_name(chrono::Local::now());
    let out = work.path().join(&file_name);

    let summary = state
        .queue
        .run(mirror::run(seed.as_str(), &out, &state.mirror, &state.cancel))
        .await
        .map_err(ApiError::internal)??;
    tracing::info!(
        seed = %summary.seed,
        pages = summary.pages,
        skipped = summary.skipped,
        cancelled = summary.cancelled,
        "website archived"
    );

    stream_file(work, &out, "application/zip", &file_name).await
}

pub async fn mp3_to_m4b(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let work = request_dir(&state.work_dir, "m4b_").map_err(ApiError::internal)?;
    let input = work.path().join("input.mp3");

    let mut upload_name = None;
    let mut chapters_raw = None;
    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "mp3_file" => {
                upload_name = Some(field.file_name().unwrap_or_default().to_owned());
                let bytes = spool(&mut field, &input).await?;
                tracing::debug!(bytes, "upload spooled");
            }
            "chapters" => chapters_raw = Some(field.text().await?),
            other => tracing::debug!(field = other, "ignoring form field"),
        }
    }

    let Some(upload_name) = upload_name else {
        return Err(ApiError::bad_request("No file provided"));
    };
    if upload_name.trim().is_empty() {
        return Err(ApiError::bad_request("No file selected"));
    }
    let chapters = chapters::from_request_field(chapters_raw.as_deref()).map_err(JobError::from)?;

    let file_name = convert::output_file_name(&upload_name);
    let output = work.path().join(&file_name);
    state
        .queue
        .run(convert::run(
            &input,
            &output,
            chapters.as_ref(),
            &state.encoder,
        ))
        .await
        .map_err(ApiError::internal)??;

    stream_file(work, &output, "audio/x-m4b", &file_name).await
}

fn request_dir(work_dir: &Path, prefix: &str) -> anyhow::Result<TempDir> {
    std::fs::create_dir_all(work_dir)
        .with_context(|| format!("create work dir: {}", work_dir.display()))?;
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(work_dir)
        .with_context(|| format!("create request dir in {}", work_dir.display()))
}

async fn spool(field: &mut Field<'_>, path: &Path) -> Result<u64, ApiError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("create upload: {}", path.display()))
        .map_err(ApiError::internal)?;

    let mut written = 0_u64;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk)
            .await
            .context("write upload")
            .map_err(ApiError::internal)?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .context("flush upload")
        .map_err(ApiError::internal)?;
    Ok(written)
}

/// Streams `path` back; `work` is removed once the body is finished or dropped.
async fn stream_file(
    work: TempDir,
    path: &Path,
    content_type: &'static str,
    file_name: &str,
) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("open output: {}", path.display()))
        .map_err(ApiError::internal)?;
    let len = file
        .metadata()
        .await
        .with_context(|| format!("stat output: {}", path.display()))
        .map_err(ApiError::internal)?
        .len();

    let stream = ReaderStream::new(file).map(move |chunk| {
        let _work = &work;
        chunk
    });

    let mut resp = Response::new(Body::from_stream(stream));
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp.headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    resp.headers_mut()
        .insert(header::CONTENT_DISPOSITION, content_disposition(file_name)?);
    Ok(resp)
}

fn content_disposition(file_name: &str) -> Result<HeaderValue, ApiError> {
    let value = if file_name.is_ascii() {
        format!("attachment; filename=\"{file_name}\"")
    } else {
        let encoded = file_name
            .bytes()
            .map(|b| {
                if b.is_ascii_alphanumeric() || b"-._~".contains(&b) {
                    char::from(b).to_string()
                } else {
                    format!("%{b:02X}")
                }
            })
            .collect::<String>();
        format!("attachment; filename*=UTF-8''{encoded}")
    };
    HeaderValue::from_str(&value)
        .context("build content-disposition header")
        .map_err(ApiError::internal)
}

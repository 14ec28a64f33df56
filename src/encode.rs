use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context as _;

pub const AUDIO_CODEC: &str = "aac";
pub const AUDIO_BITRATE: &str = "64k";

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub bin: String,
}

impl EncoderConfig {
    pub fn from_env() -> Self {
        let bin = std::env::var("SITEZIP_FFMPEG_BIN")
            .ok()
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "ffmpeg".to_owned());
        Self { bin }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            bin: "ffmpeg".to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub chapter_metadata: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("run encoder {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder failed ({status}): {diagnostics}")]
    Failed { status: String, diagnostics: String },
}

/// Arguments for an AAC transcode, with chapter metadata mapped from a second input.
pub fn build_args(request: &EncodeRequest) -> Vec<OsString> {
    let mut args = vec![
        OsString::from("-hide_banner"),
        OsString::from("-loglevel"),
        OsString::from("error"),
        OsString::from("-y"),
        OsString::from("-i"),
        request.input.as_os_str().to_owned(),
    ];

    if let Some(metadata) = &request.chapter_metadata {
        args.push(OsString::from("-i"));
        args.push(metadata.as_os_str().to_owned());
        args.push(OsString::from("-map_metadata"));
        args.push(OsString::from("1"));
        args.push(OsString::from("-map_chapters"));
        args.push(OsString::from("1"));
    }

    args.extend([
        OsString::from("-map"),
        OsString::from("0:a"),
        OsString::from("-c:a"),
        OsString::from(AUDIO_CODEC),
        OsString::from("-b:a"),
        OsString::from(AUDIO_BITRATE),
    ]);
    args.push(request.output.as_os_str().to_owned());
    args
}

/// Runs the encoder. Any non-zero exit or diagnostic output counts as failure, in which case
/// the partial output file is removed.
pub async fn encode(config: &EncoderConfig, request: &EncodeRequest) -> Result<(), EncodeError> {
    let args = build_args(request);
    tracing::info!(
        bin = %config.bin,
        input = %request.input.display(),
        output = %request.output.display(),
        chapters = request.chapter_metadata.is_some(),
        "encode"
    );

    let output = tokio::process::Command::new(&config.bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| EncodeError::Spawn {
            bin: config.bin.clone(),
            source,
        })?;

    let diagnostics = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    if output.status.success() && diagnostics.is_empty() {
        return Ok(());
    }

    remove_partial_output(&request.output).await;
    Err(EncodeError::Failed {
        status: output.status.to_string(),
        diagnostics,
    })
}

/// Checks that the encoder binary runs at all.
pub async fn check_available(config: &EncoderConfig) -> anyhow::Result<()> {
    let status = tokio::process::Command::new(&config.bin)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .with_context(|| format!("run {} -version", config.bin))?;
    if !status.success() {
        anyhow::bail!("{} -version failed ({status})", config.bin);
    }
    Ok(())
}

async fn remove_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial encoder output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(path = %path.display(), ?err, "failed to remove partial encoder output")
        }
    }
}

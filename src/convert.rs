use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;

use crate::chapters::{self, ChapterList};
use crate::encode::{self, EncodeRequest, EncoderConfig};
use crate::error::JobError;

/// Transcodes `input` into an `.m4b` at `output`, embedding `chapters` when given.
///
/// The chapter metadata file lives next to `output` and is removed once the encoder exits.
pub async fn run(
    input: &Path,
    output: &Path,
    chapters: Option<&ChapterList>,
    config: &EncoderConfig,
) -> Result<(), JobError> {
    let meta = tokio::fs::metadata(input)
        .await
        .with_context(|| format!("stat input: {}", input.display()))
        .map_err(JobError::Io)?;
    if meta.len() == 0 {
        return Err(JobError::invalid_input("input file is empty"));
    }

    let metadata_file = match chapters {
        Some(chapters) => Some(write_chapter_file(output, chapters).map_err(JobError::Io)?),
        None => None,
    };

    let request = EncodeRequest {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        chapter_metadata: metadata_file.as_ref().map(|f| f.path().to_path_buf()),
    };
    let result = encode::encode(config, &request).await;
    drop(metadata_file);

    result?;
    tracing::info!(output = %output.display(), "converted");
    Ok(())
}

fn write_chapter_file(
    output: &Path,
    chapters: &ChapterList,
) -> anyhow::Result<tempfile::NamedTempFile> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::Builder::new()
        .prefix("chapters_")
        .suffix(".txt")
        .tempfile_in(dir)
        .with_context(|| format!("create chapter metadata in {}", dir.display()))?;
    file.write_all(chapters::format(chapters).as_bytes())
        .context("write chapter metadata")?;
    file.flush().context("flush chapter metadata")?;
    tracing::debug!(path = %file.path().display(), chapters = chapters.len(), "chapter metadata");
    Ok(file)
}

/// Download name for a converted upload: the upload's stem with an `.m4b` extension.
pub fn output_file_name(original: &str) -> String {
    let last = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let stem = match last.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => last,
    };
    let stem = stem
        .chars()
        .filter(|c| *c != '"' && !c.is_control())
        .collect::<String>();
    let stem = stem.trim();
    if stem.is_empty() {
        "audio.m4b".to_owned()
    } else {
        format!("{stem}.m4b")
    }
}

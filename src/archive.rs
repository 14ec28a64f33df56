use std::fs::File;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Context as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub entries: Vec<String>,
}

/// Zips every regular file under `staging_root` into `out_zip`.
///
/// Entries are named by their slash-joined path relative to the root and are added in sorted
/// walk order with a fixed timestamp, so the same tree always yields the same archive.
/// The archive is written to a temp file beside `out_zip` and renamed into place, so a failed
/// run never leaves a truncated zip behind.
pub fn package(staging_root: &Path, out_zip: &Path) -> anyhow::Result<ArchiveSummary> {
    if !staging_root.is_dir() {
        anyhow::bail!("staging root is not a directory: {}", staging_root.display());
    }

    let dir = match out_zip.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let part = tempfile::Builder::new()
        .prefix(".sitezip-")
        .suffix(".zip.part")
        .tempfile_in(dir)
        .with_context(|| format!("create zip: {}", out_zip.display()))?;
    let mut zip = zip::ZipWriter::new(part);

    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let mut entries = Vec::new();
    add_dir_recursive(&mut zip, staging_root, &[], options, &mut entries)
        .context("zip add staging tree")?;

    let mut part = zip.finish().context("zip finish")?;
    part.flush().context("flush zip")?;
    part.persist(out_zip)
        .map_err(|err| err.error)
        .with_context(|| format!("persist zip: {}", out_zip.display()))?;

    tracing::info!(path = %out_zip.display(), entries = entries.len(), "archive written");
    Ok(ArchiveSummary {
        path: out_zip.to_path_buf(),
        entries,
    })
}

/// Runs [`package`] on the blocking pool.
pub async fn package_async(
    staging_root: &Path,
    out_zip: &Path,
) -> anyhow::Result<ArchiveSummary> {
    let staging_root = staging_root.to_path_buf();
    let out_zip = out_zip.to_path_buf();
    tokio::task::spawn_blocking(move || package(&staging_root, &out_zip))
        .await
        .context("join zip task")?
}

fn add_dir_recursive<W: io::Write + io::Seek>(
    zip: &mut zip::ZipWriter<W>,
    dir: &Path,
    prefix: &[String],
    options: zip::write::SimpleFileOptions,
    entries: &mut Vec<String>,
) -> anyhow::Result<()> {
    let mut dir_entries = std::fs::read_dir(dir)
        .with_context(|| format!("read dir: {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("list dir: {}", dir.display()))?;
    dir_entries.sort_by_key(|e| e.file_name());

    for entry in dir_entries {
        let path = entry.path();
        let mut segments = prefix.to_vec();
        segments.push(entry.file_name().to_string_lossy().into_owned());

        let file_type = entry.file_type().context("read file type")?;
        if file_type.is_dir() {
            add_dir_recursive(zip, &path, &segments, options, entries)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let name = segments.join("/");
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("zip start_file: {name}"))?;
        let mut f = File::open(&path).with_context(|| format!("open: {}", path.display()))?;
        io::copy(&mut f, zip).with_context(|| format!("zip write: {name}"))?;
        entries.push(name);
    }

    Ok(())
}

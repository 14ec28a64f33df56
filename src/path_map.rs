use std::path::{Path, PathBuf};

use crate::urls::CanonicalUrl;

const INDEX_DOCUMENT: &str = "index.html";

/// Maps a URL to its slash-separated location inside the staging tree.
///
/// Directory-style paths (`/`, `/blog/`) and extension-less paths (`/blog`) both land on an
/// `index.html` document, so `/blog` and `/blog/` share `blog/index.html`.
pub fn map(url: &CanonicalUrl) -> String {
    let path = url.path();
    let directory_style = path.is_empty() || path.ends_with('/');

    let mut segments = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();

    let has_extension = segments.last().is_some_and(|last| last.contains('.'));
    if directory_style || !has_extension {
        segments.push(INDEX_DOCUMENT);
    }

    segments.join("/")
}

/// Joins a mapped path onto `root`, refusing anything that could escape it.
pub fn staged_path(root: &Path, relative: &str) -> anyhow::Result<PathBuf> {
    if relative.is_empty() {
        anyhow::bail!("staged path must not be empty");
    }
    if relative.starts_with('/') || relative.starts_with('\\') {
        anyhow::bail!("staged path must be relative: {relative}");
    }

    let mut path = root.to_path_buf();
    for segment in relative.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            anyhow::bail!("staged path has unsafe segment {segment:?}: {relative}");
        }
        path.push(segment);
    }

    Ok(path)
}

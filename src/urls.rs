use std::fmt;

use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum UrlError {
    #[error("malformed url: {0}")]
    Malformed(#[from] url::ParseError),

    #[error("unsupported url scheme (must be http/https): {0}")]
    UnsupportedScheme(String),

    #[error("url must have a host: {0}")]
    MissingHost(String),
}

/// A crawlable URL used as the identity for dedup and origin checks.
///
/// Parsing applies WHATWG normalization (lower-cased host, elided default port, resolved dot
/// segments); the fragment is dropped so `page#a` and `page#b` are the same document. The query
/// is kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    pub fn same_origin(&self, other: &CanonicalUrl) -> bool {
        same_origin(self, other)
    }
}

impl TryFrom<Url> for CanonicalUrl {
    type Error = UrlError;

    fn try_from(mut url: Url) -> Result<Self, Self::Error> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UrlError::UnsupportedScheme(url.to_string()));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(UrlError::MissingHost(url.to_string()));
        }
        url.set_fragment(None);
        Ok(Self(url))
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

pub fn validate(raw: &str) -> Result<CanonicalUrl, UrlError> {
    let url = Url::parse(raw.trim())?;
    CanonicalUrl::try_from(url)
}

pub fn same_origin(a: &CanonicalUrl, b: &CanonicalUrl) -> bool {
    let (a, b) = (a.as_url(), b.as_url());
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

pub fn resolve(base: &CanonicalUrl, href: &str) -> Result<CanonicalUrl, UrlError> {
    let joined = base.as_url().join(href.trim())?;
    CanonicalUrl::try_from(joined)
}

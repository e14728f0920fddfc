use std::fmt;
use std::path::{Path, PathBuf};

pub mod cache;
pub mod fetch;

pub use cache::{AssetCache, CacheStats};
pub use fetch::{CachingFetcher, FetchError, Fetcher, FileFetcher, MemoryFetcher, RouterFetcher};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;

/// Where an asset lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    File(PathBuf),
    Http(String),
}

impl Locator {
    /// Classify a locator string. `http://` and `https://` are remote,
    /// `file://` and anything else is treated as a filesystem path.
    pub fn parse(raw: &str) -> Self {
        if has_prefix_ignore_case(raw, "http://") || has_prefix_ignore_case(raw, "https://") {
            Locator::Http(raw.to_string())
        } else if let Some(path) = raw.strip_prefix("file://") {
            Locator::File(PathBuf::from(path))
        } else {
            Locator::File(PathBuf::from(raw))
        }
    }

    /// Resolve a URI referenced from inside this asset (e.g. a sidecar `.bin`).
    pub fn join(&self, relative: &str) -> Locator {
        let nested = Locator::parse(relative);
        if matches!(nested, Locator::Http(_)) || Path::new(relative).is_absolute() {
            return nested;
        }

        let relative = percent_decode(relative);
        match self {
            Locator::File(path) => {
                let dir = path.parent().unwrap_or_else(|| Path::new(""));
                Locator::File(dir.join(relative))
            }
            Locator::Http(url) => {
                // Drop any query/fragment before locating the directory.
                let base = url.split(['?', '#']).next().unwrap_or(url);
                let dir = match base.rfind('/') {
                    Some(pos) if pos > base.find("//").map_or(0, |p| p + 1) => &base[..=pos],
                    _ => base,
                };
                let sep = if dir.ends_with('/') { "" } else { "/" };
                Locator::Http(format!("{dir}{sep}{relative}"))
            }
        }
    }

    /// File name component, used for logging and export naming.
    pub fn file_name(&self) -> &str {
        match self {
            Locator::File(path) => path.file_name().and_then(|n| n.to_str()).unwrap_or("asset"),
            Locator::Http(url) => {
                let base = url.split(['?', '#']).next().unwrap_or(url);
                base.rsplit('/').find(|s| !s.is_empty()).unwrap_or("asset")
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::File(path) => write!(f, "{}", path.display()),
            Locator::Http(url) => f.write_str(url),
        }
    }
}

impl From<&str> for Locator {
    fn from(raw: &str) -> Self {
        Locator::parse(raw)
    }
}

/// Identifies one loadable 3D asset. Supplied by the caller and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetDescriptor {
    locator: Locator,
}

impl AssetDescriptor {
    pub fn new(locator: impl Into<Locator>) -> Self {
        Self {
            locator: locator.into(),
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }
}

fn has_prefix_ignore_case(raw: &str, prefix: &str) -> bool {
    raw.len() >= prefix.len() && raw.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// glTF URIs may carry `%XX` escapes (spaces in sidecar names are common).
pub(crate) fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

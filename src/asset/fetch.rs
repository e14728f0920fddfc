//! Asset fetchers.
//!
//! A [`Fetcher`] turns a [`Locator`] into bytes, reporting progress as the
//! body arrives. Progress is reported as `(received, total)` where `total` is
//! only known when the transport exposes it.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use super::Locator;
use super::cache::AssetCache;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{locator}: HTTP {status} {reason}")]
    Status {
        locator: String,
        status: u16,
        reason: String,
    },
    #[error("{locator}: not found")]
    NotFound { locator: String },
    #[error("{locator}: I/O error")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{locator}: transport error: {message}")]
    Transport { locator: String, message: String },
    #[error("{locator}: no fetcher handles this scheme")]
    UnsupportedScheme { locator: String },
}

impl FetchError {
    /// HTTP-equivalent status for the failure, where one applies.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}

/// Callback receiving `(bytes received so far, total if known)`.
pub type ProgressFn<'a> = dyn FnMut(u64, Option<u64>) + 'a;

pub trait Fetcher: Send + Sync {
    /// Check that the resource is reachable without downloading it.
    /// Returns the content length when the transport reports one.
    fn probe(&self, locator: &Locator) -> Result<Option<u64>, FetchError>;

    fn fetch(&self, locator: &Locator, progress: &mut ProgressFn<'_>)
    -> Result<Arc<[u8]>, FetchError>;
}

impl<F: Fetcher + ?Sized> Fetcher for Box<F> {
    fn probe(&self, locator: &Locator) -> Result<Option<u64>, FetchError> {
        (**self).probe(locator)
    }

    fn fetch(
        &self,
        locator: &Locator,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Arc<[u8]>, FetchError> {
        (**self).fetch(locator, progress)
    }
}

impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    fn probe(&self, locator: &Locator) -> Result<Option<u64>, FetchError> {
        (**self).probe(locator)
    }

    fn fetch(
        &self,
        locator: &Locator,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Arc<[u8]>, FetchError> {
        (**self).fetch(locator, progress)
    }
}

/// Drain `reader` in fixed chunks, reporting progress after each one.
fn read_with_progress(
    mut reader: impl Read,
    total: Option<u64>,
    locator: &Locator,
    progress: &mut ProgressFn<'_>,
) -> Result<Arc<[u8]>, FetchError> {
    let mut body = Vec::with_capacity(total.unwrap_or(0).min(1 << 30) as usize);
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut chunk).map_err(|source| FetchError::Io {
            locator: locator.to_string(),
            source,
        })?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
        progress(body.len() as u64, total);
    }
    trace!(%locator, bytes = body.len(), "body received");
    Ok(Arc::from(body))
}

/// Reads assets from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl FileFetcher {
    fn path<'a>(&self, locator: &'a Locator) -> Result<&'a std::path::Path, FetchError> {
        match locator {
            Locator::File(path) => Ok(path),
            Locator::Http(_) => Err(FetchError::UnsupportedScheme {
                locator: locator.to_string(),
            }),
        }
    }

    fn io_error(locator: &Locator, source: std::io::Error) -> FetchError {
        if source.kind() == std::io::ErrorKind::NotFound {
            FetchError::NotFound {
                locator: locator.to_string(),
            }
        } else {
            FetchError::Io {
                locator: locator.to_string(),
                source,
            }
        }
    }
}

impl Fetcher for FileFetcher {
    fn probe(&self, locator: &Locator) -> Result<Option<u64>, FetchError> {
        let metadata = std::fs::metadata(self.path(locator)?)
            .map_err(|source| Self::io_error(locator, source))?;
        Ok(Some(metadata.len()))
    }

    fn fetch(
        &self,
        locator: &Locator,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Arc<[u8]>, FetchError> {
        let file = std::fs::File::open(self.path(locator)?)
            .map_err(|source| Self::io_error(locator, source))?;
        let total = file.metadata().ok().map(|m| m.len());
        debug!(%locator, ?total, "reading asset from disk");
        read_with_progress(file, total, locator, progress)
    }
}

/// Fetches assets over HTTP(S) with a blocking agent.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

#[cfg(feature = "http")]
impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(30))
    }
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    fn url<'a>(&self, locator: &'a Locator) -> Result<&'a str, FetchError> {
        match locator {
            Locator::Http(url) => Ok(url),
            Locator::File(_) => Err(FetchError::UnsupportedScheme {
                locator: locator.to_string(),
            }),
        }
    }

    fn call(&self, request: ureq::Request, locator: &Locator) -> Result<ureq::Response, FetchError> {
        match request.call() {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(status, response)) => Err(FetchError::Status {
                locator: locator.to_string(),
                status,
                reason: response.status_text().to_string(),
            }),
            Err(err) => Err(FetchError::Transport {
                locator: locator.to_string(),
                message: err.to_string(),
            }),
        }
    }
}

#[cfg(feature = "http")]
fn content_length(response: &ureq::Response) -> Option<u64> {
    response
        .header("Content-Length")
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(feature = "http")]
impl Fetcher for HttpFetcher {
    fn probe(&self, locator: &Locator) -> Result<Option<u64>, FetchError> {
        let response = self.call(self.agent.head(self.url(locator)?), locator)?;
        Ok(content_length(&response))
    }

    fn fetch(
        &self,
        locator: &Locator,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Arc<[u8]>, FetchError> {
        let response = self.call(self.agent.get(self.url(locator)?), locator)?;
        let total = content_length(&response);
        debug!(%locator, ?total, "downloading asset");
        read_with_progress(response.into_reader(), total, locator, progress)
    }
}

/// Serves assets from an in-memory table, e.g. models compiled into the binary.
///
/// Unknown locators answer with a 404, and individual locators can be made to
/// fail with any status.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    assets: HashMap<String, Arc<[u8]>>,
    failures: HashMap<String, (u16, String)>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, locator: impl Into<Locator>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(locator, bytes);
        self
    }

    pub fn with_status(mut self, locator: impl Into<Locator>, status: u16, reason: &str) -> Self {
        self.failures
            .insert(locator.into().to_string(), (status, reason.to_string()));
        self
    }

    pub fn insert(&mut self, locator: impl Into<Locator>, bytes: impl Into<Vec<u8>>) {
        self.assets
            .insert(locator.into().to_string(), Arc::from(bytes.into()));
    }

    fn lookup(&self, locator: &Locator) -> Result<&Arc<[u8]>, FetchError> {
        let key = locator.to_string();
        if let Some((status, reason)) = self.failures.get(&key) {
            return Err(FetchError::Status {
                locator: key,
                status: *status,
                reason: reason.clone(),
            });
        }
        self.assets.get(&key).ok_or(FetchError::Status {
            locator: key,
            status: 404,
            reason: "Not Found".to_string(),
        })
    }
}

impl Fetcher for MemoryFetcher {
    fn probe(&self, locator: &Locator) -> Result<Option<u64>, FetchError> {
        self.lookup(locator).map(|bytes| Some(bytes.len() as u64))
    }

    fn fetch(
        &self,
        locator: &Locator,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Arc<[u8]>, FetchError> {
        let bytes = self.lookup(locator)?;
        let total = bytes.len() as u64;
        // Deliver in chunks so observers see the same progression as a real transport.
        let mut delivered = 0u64;
        for chunk in bytes.chunks(CHUNK_SIZE) {
            delivered += chunk.len() as u64;
            progress(delivered, Some(total));
        }
        Ok(Arc::clone(bytes))
    }
}

/// Dispatches to the filesystem or HTTP fetcher based on the locator.
#[derive(Debug, Clone, Default)]
pub struct RouterFetcher {
    file: FileFetcher,
    #[cfg(feature = "http")]
    http: HttpFetcher,
}

impl RouterFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn route(&self, locator: &Locator) -> Result<&dyn Fetcher, FetchError> {
        match locator {
            Locator::File(_) => Ok(&self.file),
            #[cfg(feature = "http")]
            Locator::Http(_) => Ok(&self.http),
            #[cfg(not(feature = "http"))]
            Locator::Http(_) => Err(FetchError::UnsupportedScheme {
                locator: locator.to_string(),
            }),
        }
    }
}

impl Fetcher for RouterFetcher {
    fn probe(&self, locator: &Locator) -> Result<Option<u64>, FetchError> {
        self.route(locator)?.probe(locator)
    }

    fn fetch(
        &self,
        locator: &Locator,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Arc<[u8]>, FetchError> {
        self.route(locator)?.fetch(locator, progress)
    }
}

/// Wraps a fetcher with an explicitly owned [`AssetCache`].
pub struct CachingFetcher<F> {
    inner: F,
    cache: Arc<AssetCache>,
}

impl<F: Fetcher> CachingFetcher<F> {
    pub fn new(inner: F, cache: Arc<AssetCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<AssetCache> {
        &self.cache
    }
}

impl<F: Fetcher> Fetcher for CachingFetcher<F> {
    fn probe(&self, locator: &Locator) -> Result<Option<u64>, FetchError> {
        match self.cache.get(&locator.to_string()) {
            Some(bytes) => Ok(Some(bytes.len() as u64)),
            None => self.inner.probe(locator),
        }
    }

    fn fetch(
        &self,
        locator: &Locator,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Arc<[u8]>, FetchError> {
        let key = locator.to_string();
        if let Some(bytes) = self.cache.get(&key) {
            trace!(%locator, "asset cache hit");
            let len = bytes.len() as u64;
            progress(len, Some(len));
            return Ok(bytes);
        }
        let bytes = self.inner.fetch(locator, progress)?;
        self.cache.insert(key, Arc::clone(&bytes));
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignore_progress() -> impl FnMut(u64, Option<u64>) {
        |_, _| {}
    }

    #[test]
    fn memory_fetcher_reports_missing_as_404() {
        let fetcher = MemoryFetcher::new();
        let err = fetcher
            .fetch(&Locator::parse("missing.glb"), &mut ignore_progress())
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn memory_fetcher_progress_reaches_total() {
        let fetcher = MemoryFetcher::new().with_asset("big.bin", vec![7u8; CHUNK_SIZE * 2 + 5]);
        let mut seen = Vec::new();
        let bytes = fetcher
            .fetch(&Locator::parse("big.bin"), &mut |received, total| {
                seen.push((received, total))
            })
            .unwrap();
        assert_eq!(bytes.len(), CHUNK_SIZE * 2 + 5);
        assert_eq!(seen.len(), 3);
        assert_eq!(seen.last(), Some(&(bytes.len() as u64, Some(bytes.len() as u64))));
    }

    #[test]
    fn configured_status_wins() {
        let fetcher = MemoryFetcher::new()
            .with_asset("car.glb", vec![1u8])
            .with_status("car.glb", 503, "Service Unavailable");
        let err = fetcher.probe(&Locator::parse("car.glb")).unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn file_fetcher_maps_not_found() {
        let err = FileFetcher
            .fetch(
                &Locator::parse("/definitely/not/here/model.glb"),
                &mut ignore_progress(),
            )
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[test]
    fn file_fetcher_reads_file() {
        let path = std::env::temp_dir().join(format!("showroom-fetch-{}.bin", std::process::id()));
        std::fs::write(&path, b"glTF-ish").unwrap();
        let locator = Locator::File(path.clone());
        assert_eq!(FileFetcher.probe(&locator).unwrap(), Some(8));
        let bytes = FileFetcher.fetch(&locator, &mut ignore_progress()).unwrap();
        assert_eq!(&bytes[..], b"glTF-ish");
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn caching_fetcher_serves_second_request_from_cache() {
        let cache = Arc::new(AssetCache::new());
        let fetcher = CachingFetcher::new(
            MemoryFetcher::new().with_asset("car.glb", vec![1u8, 2, 3]),
            Arc::clone(&cache),
        );
        let locator = Locator::parse("car.glb");
        fetcher.fetch(&locator, &mut ignore_progress()).unwrap();
        fetcher.fetch(&locator, &mut ignore_progress()).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }
}

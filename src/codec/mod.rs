//! Compressed buffer-view decoding.
//!
//! Decoders are looked up by glTF extension name. The loader hands each
//! compressed buffer view's extension object to the matching decoder and
//! gets plain bytes back, so parsing never needs to know which codec ran.

use std::collections::BTreeMap;
use std::sync::Arc;

use gltf_json::Value;
use thiserror::Error;

pub mod meshopt;

pub use meshopt::MeshoptDecoder;

/// Extensions that mark geometry as compressed. An asset requiring one of
/// these without a registered decoder cannot be loaded.
pub const COMPRESSION_EXTENSIONS: &[&str] = &[
    "EXT_meshopt_compression",
    "KHR_meshopt_compression",
    "KHR_draco_mesh_compression",
];

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no decoder available for {extension}")]
    Unsupported { extension: String },
    #[error("{extension}: invalid extension object: {detail}")]
    InvalidExtension { extension: String, detail: String },
    #[error("compressed source range {offset}..{end} exceeds buffer {buffer} ({len} bytes)")]
    SourceOutOfBounds {
        buffer: usize,
        offset: usize,
        end: usize,
        len: usize,
    },
    #[error("unsupported {what}: {value}")]
    UnsupportedParameter { what: &'static str, value: String },
    #[error("vertex decode error: {0}")]
    VertexDecode(String),
    #[error("index decode error: {0}")]
    IndexDecode(String),
    #[error("filter {filter} cannot be applied to stride {stride}")]
    FilterStride { filter: &'static str, stride: usize },
}

/// Decodes one compressed buffer view into its plain byte layout.
pub trait GeometryDecoder: Send + Sync {
    /// The glTF extension this decoder handles, e.g. `EXT_meshopt_compression`.
    fn extension(&self) -> &str;

    /// `extension` is the view's extension object; `buffers` are every buffer of
    /// the asset, already resolved. Returns exactly `byteLength` plain bytes.
    fn decode(&self, extension: &Value, buffers: &[Arc<[u8]>]) -> Result<Vec<u8>, CodecError>;
}

/// The set of decoders available to a loader, keyed by extension name.
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: BTreeMap<String, Arc<dyn GeometryDecoder>>,
}

impl Default for DecoderRegistry {
    /// Meshopt, under both its vendor and Khronos names.
    fn default() -> Self {
        Self::empty()
            .with(MeshoptDecoder::new("EXT_meshopt_compression"))
            .with(MeshoptDecoder::new("KHR_meshopt_compression"))
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.decoders.keys()).finish()
    }
}

impl DecoderRegistry {
    pub fn empty() -> Self {
        Self {
            decoders: BTreeMap::new(),
        }
    }

    pub fn with(mut self, decoder: impl GeometryDecoder + 'static) -> Self {
        self.register(Arc::new(decoder));
        self
    }

    pub fn register(&mut self, decoder: Arc<dyn GeometryDecoder>) {
        self.decoders.insert(decoder.extension().to_string(), decoder);
    }

    pub fn get(&self, extension: &str) -> Option<&dyn GeometryDecoder> {
        self.decoders.get(extension).map(|d| d.as_ref())
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.decoders.contains_key(extension)
    }

    /// Fail if the asset requires a compression extension nobody can decode.
    pub fn check_required<'a>(
        &self,
        required: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), CodecError> {
        for extension in required {
            if COMPRESSION_EXTENSIONS.contains(&extension) && !self.supports(extension) {
                return Err(CodecError::Unsupported {
                    extension: extension.to_string(),
                });
            }
        }
        Ok(())
    }
}

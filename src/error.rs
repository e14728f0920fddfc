use thiserror::Error;

use crate::asset::fetch::FetchError;
use crate::codec::CodecError;
use crate::optimize::LodError;

/// Structural problems with an asset, independent of compression.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid glTF container: {detail}")]
    Container { detail: String },
    #[error("invalid glTF JSON: {detail}")]
    Json { detail: String },
    #[error("{kind} index {index} out of range (count: {count})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        count: usize,
    },
    #[error("buffer {index} has no data: {reason}")]
    MissingBuffer { index: usize, reason: String },
    #[error("buffer {index} is {actual} bytes but declares {declared}")]
    BufferTooShort {
        index: usize,
        declared: usize,
        actual: usize,
    },
    #[error("buffer view {view} range {offset}..{end} exceeds its buffer ({len} bytes)")]
    ViewOutOfBounds {
        view: usize,
        offset: usize,
        end: usize,
        len: usize,
    },
    #[error("accessor {accessor} reads past the end of its buffer view ({needed} > {available} bytes)")]
    AccessorOutOfBounds {
        accessor: usize,
        needed: usize,
        available: usize,
    },
    #[error("accessor {accessor} has an unexpected layout: {detail}")]
    AccessorLayout { accessor: usize, detail: String },
    #[error("mesh {mesh} primitive {primitive} has no POSITION attribute")]
    MissingPositions { mesh: usize, primitive: usize },
    #[error("index {value} at position {position} exceeds vertex count {vertex_count}")]
    IndexExceedsVertices {
        position: usize,
        value: u32,
        vertex_count: usize,
    },
    #[error("node {node} appears more than once in the hierarchy")]
    NodeCycle { node: usize },
    #[error("malformed data URI: {detail}")]
    DataUri { detail: String },
    #[error("unsupported glTF feature: {0}")]
    Unsupported(String),
}

/// Every way a single load attempt can terminate without producing a scene.
///
/// Fetch, codec and parse failures keep their original cause so callers can
/// tell a missing file from a corrupt one.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to fetch asset")]
    Fetch(#[from] FetchError),
    #[error("failed to decode compressed geometry")]
    Codec(#[from] CodecError),
    #[error("failed to parse asset")]
    Parse(#[from] ParseError),
    #[error("failed to build detail levels")]
    Lod(#[from] LodError),
    #[error("load attempt {generation} was superseded")]
    Superseded { generation: u64 },
}

impl LoadError {
    /// Short, stable label for status displays and logs.
    pub fn label(&self) -> &'static str {
        match self {
            LoadError::Fetch(_) => "fetch",
            LoadError::Codec(_) => "codec",
            LoadError::Parse(_) => "parse",
            LoadError::Lod(_) => "lod",
            LoadError::Superseded { .. } => "superseded",
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, LoadError::Superseded { .. })
    }
}

/// Locating and fetching model assets, plus the explicit byte cache
pub mod asset;
/// Decoders for compressed glTF buffer views
pub mod codec;
/// Pipeline and viewer configuration
pub mod config;
/// Error definitions
pub mod error;
/// Writing scene graphs back out as GLB
pub mod export;
/// glTF parsing into a scene graph
pub mod loader;
/// Scene graph, geometry and material types
pub mod models;
/// Post-load passes: material classification, simplification, LOD and normalization
pub mod optimize;
/// The composed fetch -> decode -> classify -> LOD -> normalize pipeline
pub mod pipeline;
/// Headless viewer host: camera, lighting, picking and lifecycle
pub mod viewer;

pub use error::LoadError;
pub use pipeline::{LoadObserver, ModelPipeline, PreparedModel};

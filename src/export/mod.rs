pub mod gltf_export;

pub use gltf_export::{ExportError, write_glb};

pub mod classify;
pub mod lod;
pub mod normalize;
pub mod prepare;
pub mod simplify;

pub use classify::{ClassSummary, MaterialClass, MaterialClassifier, PresetClassifier, classify_scene};
pub use lod::{DetailLevel, LodContainer, LodError, LodSettings, build_lod};
pub use normalize::{Normalization, normalize};
pub use prepare::{prepare_culling, prepare_meshes};
pub use simplify::{MINIMUM_FLOOR, Simplifier, StrideDecimator, target_count};

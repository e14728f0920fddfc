pub mod geometry;
pub mod material;
pub mod scene;

pub use geometry::{Aabb, Geometry, Sphere};
pub use material::{Material, ShadingModel, Texture, TextureSlot};
pub use scene::{Mesh, Node, NodePath, ResourceCounts, SceneGraph, Transform};

//! The in-memory scene graph.
//!
//! A [`SceneGraph`] exclusively owns a tree of [`Node`]s. Geometry and
//! materials are reference counted so that cloning a graph (for LOD levels)
//! is cheap; passes that need to change either replace the `Arc` rather
//! than mutating through it.

use std::collections::HashSet;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use super::geometry::{Aabb, Geometry, Sphere};
use super::material::{Material, Texture};
use crate::optimize::classify::MaterialClass;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Apply a uniform scale followed by a translation on top of this transform.
    pub fn pre_scale_translate(&self, scale: f32, offset: Vec3) -> Transform {
        Transform {
            translation: self.translation * scale + offset,
            rotation: self.rotation,
            scale: self.scale * scale,
        }
    }
}

/// Renderable payload of a node.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub geometry: Arc<Geometry>,
    pub material: Arc<Material>,
    /// Set once the material classifier has rebound this mesh.
    pub class: Option<MaterialClass>,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub frustum_culled: bool,
    /// Local-space sphere used for culling, padded beyond the exact bounds.
    pub culling_sphere: Option<Sphere>,
}

impl Mesh {
    pub fn new(geometry: Arc<Geometry>, material: Arc<Material>) -> Self {
        Self {
            geometry,
            material,
            class: None,
            cast_shadow: true,
            receive_shadow: true,
            frustum_culled: true,
            culling_sphere: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Not guaranteed unique within a graph.
    pub name: String,
    pub transform: Transform,
    pub mesh: Option<Mesh>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }
}

/// Position of a node in the tree: child indices from the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath(pub Vec<usize>);

/// Count of distinct resources reachable from a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub geometries: usize,
    pub materials: usize,
    pub textures: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    pub root: Node,
}

impl SceneGraph {
    pub fn new(root: Node) -> Self {
        Self { root }
    }

    /// Visit every node depth-first with its world matrix.
    pub fn visit<'a>(&'a self, mut f: impl FnMut(&NodePath, &'a Node, &Mat4)) {
        fn walk<'a>(
            node: &'a Node,
            parent: &Mat4,
            path: &mut NodePath,
            f: &mut impl FnMut(&NodePath, &'a Node, &Mat4),
        ) {
            let world = *parent * node.transform.matrix();
            f(path, node, &world);
            for (i, child) in node.children.iter().enumerate() {
                path.0.push(i);
                walk(child, &world, path, f);
                path.0.pop();
            }
        }
        walk(&self.root, &Mat4::IDENTITY, &mut NodePath::default(), &mut f);
    }

    /// Visit every mesh mutably, in the same order as [`SceneGraph::visit`].
    pub fn visit_meshes_mut(&mut self, mut f: impl FnMut(&str, &mut Mesh, &Mat4)) {
        fn walk(node: &mut Node, parent: &Mat4, f: &mut impl FnMut(&str, &mut Mesh, &Mat4)) {
            let world = *parent * node.transform.matrix();
            if let Some(mesh) = node.mesh.as_mut() {
                f(&node.name, mesh, &world);
            }
            for child in &mut node.children {
                walk(child, &world, f);
            }
        }
        walk(&mut self.root, &Mat4::IDENTITY, &mut f);
    }

    pub fn node(&self, path: &NodePath) -> Option<&Node> {
        path.0
            .iter()
            .try_fold(&self.root, |node, &i| node.children.get(i))
    }

    /// Paths of every node carrying a mesh, depth-first.
    pub fn mesh_paths(&self) -> Vec<NodePath> {
        let mut paths = Vec::new();
        self.visit(|path, node, _| {
            if node.mesh.is_some() {
                paths.push(path.clone());
            }
        });
        paths
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.visit(|_, node, _| count += node.mesh.is_some() as usize);
        count
    }

    pub fn triangle_count(&self) -> usize {
        let mut count = 0;
        self.visit(|_, node, _| {
            if let Some(mesh) = &node.mesh {
                count += mesh.geometry.triangle_count();
            }
        });
        count
    }

    /// World-space bounds of every mesh vertex.
    pub fn bounds(&self) -> Option<Aabb> {
        let mut bounds: Option<Aabb> = None;
        self.visit(|_, node, world| {
            if let Some(b) = node
                .mesh
                .as_ref()
                .and_then(|mesh| mesh.geometry.transformed_bounds(world))
            {
                bounds = Some(bounds.map_or(b, |acc| acc.union(b)));
            }
        });
        bounds
    }

    pub fn resource_counts(&self) -> ResourceCounts {
        let mut geometries = HashSet::new();
        let mut materials = HashSet::new();
        let mut textures = HashSet::new();
        self.visit(|_, node, _| {
            if let Some(mesh) = &node.mesh {
                geometries.insert(Arc::as_ptr(&mesh.geometry));
                materials.insert(Arc::as_ptr(&mesh.material));
                textures.extend(mesh.material.textures().map(Arc::as_ptr));
            }
        });
        ResourceCounts {
            geometries: geometries.len(),
            materials: materials.len(),
            textures: textures.len(),
        }
    }

    /// Detach every node, returning how many distinct resources were released.
    pub fn dispose(self) -> ResourceCounts {
        self.resource_counts()
    }

    /// Distinct textures reachable from the graph.
    pub fn textures(&self) -> Vec<Arc<Texture>> {
        let mut seen = HashSet::new();
        let mut textures = Vec::new();
        self.visit(|_, node, _| {
            if let Some(mesh) = &node.mesh {
                for texture in mesh.material.textures() {
                    if seen.insert(Arc::as_ptr(texture)) {
                        textures.push(Arc::clone(texture));
                    }
                }
            }
        });
        textures
    }
}

//! Distance-switched detail levels.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::simplify::Simplifier;
use crate::config::PipelineConfig;
use crate::models::{Material, ResourceCounts, SceneGraph, ShadingModel};

#[derive(Debug, Error, PartialEq)]
pub enum LodError {
    #[error("LOD distances must be strictly increasing, got {distances:?}")]
    UnorderedDistances { distances: Vec<f32> },
    #[error("LOD distance {0} is not a finite, non-negative number")]
    InvalidDistance(f32),
}

#[derive(Debug, Clone)]
pub struct DetailLevel {
    pub distance: f32,
    pub graph: SceneGraph,
}

/// Detail levels sorted by ascending activation distance. Exactly one level
/// is active at a time once the container is non-empty.
#[derive(Debug, Clone, Default)]
pub struct LodContainer {
    levels: Vec<DetailLevel>,
    active: usize,
}

impl LodContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping levels sorted. Equal distances keep insertion order.
    pub fn add_level(&mut self, graph: SceneGraph, distance: f32) {
        let at = self.levels.partition_point(|l| l.distance <= distance);
        self.levels.insert(at, DetailLevel { distance, graph });
    }

    pub fn levels(&self) -> &[DetailLevel] {
        &self.levels
    }

    /// Graphs may be edited in place; distances may not.
    pub fn graphs_mut(&mut self) -> impl Iterator<Item = &mut SceneGraph> {
        self.levels.iter_mut().map(|level| &mut level.graph)
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> Option<&DetailLevel> {
        self.levels.get(self.active)
    }

    /// The furthest level whose distance does not exceed `distance`.
    pub fn select(&self, distance: f32) -> usize {
        let mut chosen = 0;
        for (i, level) in self.levels.iter().enumerate().skip(1) {
            if distance >= level.distance {
                chosen = i;
            } else {
                break;
            }
        }
        chosen
    }

    /// Activate the level for `distance`. Returns whether the level changed.
    pub fn update(&mut self, distance: f32) -> bool {
        let next = self.select(distance);
        let changed = next != self.active;
        self.active = next;
        changed
    }

    /// Distinct resources across every level.
    pub fn resource_counts(&self) -> ResourceCounts {
        let mut geometries = HashSet::new();
        let mut materials = HashSet::new();
        let mut textures = HashSet::new();
        for level in &self.levels {
            level.graph.visit(|_, node, _| {
                if let Some(mesh) = &node.mesh {
                    geometries.insert(Arc::as_ptr(&mesh.geometry));
                    materials.insert(Arc::as_ptr(&mesh.material));
                    textures.extend(mesh.material.textures().map(Arc::as_ptr));
                }
            });
        }
        ResourceCounts {
            geometries: geometries.len(),
            materials: materials.len(),
            textures: textures.len(),
        }
    }

    pub fn dispose(self) -> ResourceCounts {
        self.resource_counts()
    }
}

/// Thresholds and reductions for the three generated levels.
#[derive(Debug, Clone, PartialEq)]
pub struct LodSettings {
    pub distances: [f32; 3],
    pub medium_reduction: f32,
    pub low_reduction: f32,
}

impl Default for LodSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl LodSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            distances: config.lod_distances,
            medium_reduction: config.lod_reductions[0],
            low_reduction: config.lod_reductions[1],
        }
    }

    fn validate(&self) -> Result<(), LodError> {
        if let Some(&bad) = self.distances.iter().find(|d| !d.is_finite() || **d < 0.0) {
            return Err(LodError::InvalidDistance(bad));
        }
        if self.distances.windows(2).any(|w| w[0] >= w[1]) {
            return Err(LodError::UnorderedDistances {
                distances: self.distances.to_vec(),
            });
        }
        Ok(())
    }
}

const MEDIUM_SHININESS: f32 = 30.0;

fn downgrade_medium(material: &Material) -> Material {
    Material {
        name: material.name.clone(),
        shading: ShadingModel::Phong {
            shininess: MEDIUM_SHININESS,
        },
        base_color: material.base_color,
        base_color_map: material.base_color_map.clone(),
        transparent: material.transparent,
        opacity: material.opacity,
        ..Material::default()
    }
}

fn downgrade_low(material: &Material) -> Material {
    Material {
        name: material.name.clone(),
        shading: ShadingModel::Lambert,
        base_color: material.base_color,
        transparent: material.transparent,
        opacity: material.opacity,
        ..Material::default()
    }
}

fn derive_level(
    graph: &SceneGraph,
    reduction: f32,
    simplifier: &dyn Simplifier,
    downgrade: fn(&Material) -> Material,
    receive_shadow: bool,
) -> SceneGraph {
    let mut level = graph.clone();
    level.visit_meshes_mut(|_, mesh, _| {
        if let std::borrow::Cow::Owned(reduced) = simplifier.simplify(&mesh.geometry, reduction) {
            mesh.geometry = Arc::new(reduced);
        }
        mesh.material = Arc::new(downgrade(&mesh.material));
        mesh.cast_shadow = false;
        mesh.receive_shadow = mesh.receive_shadow && receive_shadow;
    });
    level
}

/// Full detail at the nearest distance, then a ~30% and a ~70% reduction
/// with progressively cheaper shading.
pub fn build_lod(
    graph: SceneGraph,
    settings: &LodSettings,
    simplifier: &dyn Simplifier,
) -> Result<LodContainer, LodError> {
    settings.validate()?;
    let [near, medium, far] = settings.distances;

    let medium_graph = derive_level(
        &graph,
        settings.medium_reduction,
        simplifier,
        downgrade_medium,
        true,
    );
    let low_graph = derive_level(&graph, settings.low_reduction, simplifier, downgrade_low, false);

    debug!(
        full = graph.triangle_count(),
        medium = medium_graph.triangle_count(),
        low = low_graph.triangle_count(),
        "built detail levels"
    );

    let mut container = LodContainer::new();
    container.add_level(graph, near);
    container.add_level(medium_graph, medium);
    container.add_level(low_graph, far);
    Ok(container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Geometry, Mesh, Node, Texture, TextureSlot};
    use crate::optimize::simplify::StrideDecimator;

    fn dense_graph() -> SceneGraph {
        let mut geometry = Geometry::default();
        for i in 0..500 {
            let x = i as f32 * 0.01;
            geometry
                .positions
                .extend([[x, 0.0, 0.0], [x + 0.01, 0.0, 0.0], [x, 0.01, 0.0]]);
        }
        geometry.compute_vertex_normals();
        let material = Material {
            name: "paint".to_string(),
            base_color_map: Some(TextureSlot::new(Arc::new(Texture::default()))),
            ..Material::default()
        };
        SceneGraph::new(
            Node::new("root")
                .with_child(Node::new("body").with_mesh(Mesh::new(Arc::new(geometry), Arc::new(material)))),
        )
    }

    #[test]
    fn three_levels_with_decreasing_detail() {
        let lod = build_lod(dense_graph(), &LodSettings::default(), &StrideDecimator::default()).unwrap();
        let levels = lod.levels();
        assert_eq!(levels.len(), 3);
        assert!(levels.windows(2).all(|w| w[0].distance < w[1].distance));

        let tris: Vec<_> = levels.iter().map(|l| l.graph.triangle_count()).collect();
        assert_eq!(tris[0], 500);
        assert!(tris[1] < tris[0] && tris[2] < tris[1]);

        let mesh_of = |i: usize| {
            let graph = &levels[i].graph;
            graph.node(&graph.mesh_paths()[0]).and_then(|n| n.mesh.clone()).unwrap()
        };
        let medium = mesh_of(1);
        assert_eq!(medium.material.shading, ShadingModel::Phong { shininess: 30.0 });
        assert!(medium.material.base_color_map.is_some());
        assert!(!medium.cast_shadow);

        let low = mesh_of(2);
        assert_eq!(low.material.shading, ShadingModel::Lambert);
        assert!(low.material.base_color_map.is_none());
        assert!(!low.cast_shadow && !low.receive_shadow);

        // The full level is untouched.
        assert_eq!(mesh_of(0).material.shading, ShadingModel::Standard);
    }

    #[test]
    fn selection_follows_distance() {
        let mut lod = build_lod(dense_graph(), &LodSettings::default(), &StrideDecimator::default()).unwrap();
        assert_eq!(lod.select(0.0), 0);
        assert_eq!(lod.select(9.9), 0);
        assert_eq!(lod.select(10.0), 1);
        assert_eq!(lod.select(29.0), 1);
        assert_eq!(lod.select(500.0), 2);

        assert!(!lod.update(3.0));
        assert!(lod.update(15.0));
        assert_eq!(lod.active_index(), 1);
        assert!(!lod.update(20.0));
    }

    #[test]
    fn rejects_bad_distances() {
        let settings = LodSettings {
            distances: [0.0, 30.0, 10.0],
            ..LodSettings::default()
        };
        assert!(matches!(
            build_lod(dense_graph(), &settings, &StrideDecimator::default()),
            Err(LodError::UnorderedDistances { .. })
        ));
        let settings = LodSettings {
            distances: [0.0, 10.0, 10.0],
            ..LodSettings::default()
        };
        assert!(build_lod(dense_graph(), &settings, &StrideDecimator::default()).is_err());
        let settings = LodSettings {
            distances: [f32::NAN, 10.0, 20.0],
            ..LodSettings::default()
        };
        assert!(matches!(
            build_lod(dense_graph(), &settings, &StrideDecimator::default()),
            Err(LodError::InvalidDistance(_))
        ));
    }

    #[test]
    fn add_level_keeps_order() {
        let mut lod = LodContainer::new();
        lod.add_level(SceneGraph::default(), 20.0);
        lod.add_level(SceneGraph::default(), 0.0);
        lod.add_level(SceneGraph::default(), 5.0);
        let distances: Vec<_> = lod.levels().iter().map(|l| l.distance).collect();
        assert_eq!(distances, vec![0.0, 5.0, 20.0]);
    }
}

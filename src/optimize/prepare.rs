//! Render-state preparation applied to every mesh after parsing.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{Material, SceneGraph};

const ENV_MAP_INTENSITY: f32 = 0.8;
const TEXTURE_ANISOTROPY: u8 = 4;

/// Shadow flags by world size, environment intensity and texture sampling.
/// Materials shared before this pass stay shared after it.
pub fn prepare_meshes(graph: &mut SceneGraph, shadow_threshold: f32) {
    let mut prepared: HashMap<*const Material, Arc<Material>> = HashMap::new();
    graph.visit_meshes_mut(|_, mesh, world| {
        mesh.receive_shadow = true;
        mesh.cast_shadow = mesh
            .geometry
            .transformed_bounds(world)
            .is_some_and(|b| b.max_extent() > shadow_threshold);

        let material = prepared
            .entry(Arc::as_ptr(&mesh.material))
            .or_insert_with(|| {
                let source = &mesh.material;
                Arc::new(Material {
                    env_map_intensity: ENV_MAP_INTENSITY,
                    base_color_map: source
                        .base_color_map
                        .as_ref()
                        .map(|slot| slot.with_anisotropy(TEXTURE_ANISOTROPY)),
                    normal_map: source
                        .normal_map
                        .as_ref()
                        .map(|slot| slot.with_anisotropy(TEXTURE_ANISOTROPY)),
                    ..Material::clone(source)
                })
            });
        mesh.material = Arc::clone(material);
    });
}

/// Give every mesh a local bounding sphere inflated by `padding`.
pub fn prepare_culling(graph: &mut SceneGraph, padding: f32) {
    graph.visit_meshes_mut(|_, mesh, _| {
        mesh.frustum_culled = true;
        mesh.culling_sphere = mesh.geometry.bounding_sphere().map(|mut sphere| {
            sphere.radius *= padding;
            sphere
        });
    });
}

//! Ray casting against scene meshes.

use glam::{Mat4, Vec3};

use crate::models::{NodePath, SceneGraph};
use crate::optimize::MaterialClass;

const PARALLEL_EPSILON: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length.
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Möller-Trumbore. Both faces count as hits.
    pub fn intersect_triangle(&self, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
        let edge1 = b - a;
        let edge2 = c - a;
        let p = self.direction.cross(edge2);
        let det = edge1.dot(p);
        if det.abs() < PARALLEL_EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        let s = self.origin - a;
        let u = s.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(edge1);
        let v = self.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = edge2.dot(q) * inv_det;
        (t > PARALLEL_EPSILON).then_some(t)
    }

    fn misses_sphere(&self, center: Vec3, radius: f32) -> bool {
        let to_center = center - self.origin;
        let along = to_center.dot(self.direction);
        let closest_sq = to_center.length_squared() - along * along;
        closest_sq > radius * radius || (along < 0.0 && to_center.length_squared() > radius * radius)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PickHit {
    pub path: NodePath,
    pub name: String,
    pub material: String,
    pub class: Option<MaterialClass>,
    pub distance: f32,
    pub point: Vec3,
}

/// Nearest mesh hit by `ray`, with the whole graph placed by `model`.
pub fn pick(graph: &SceneGraph, model: Mat4, ray: &Ray) -> Option<PickHit> {
    let mut best: Option<PickHit> = None;
    graph.visit(|path, node, world| {
        let Some(mesh) = &node.mesh else {
            return;
        };
        let to_world = model * *world;

        if let Some(sphere) = &mesh.culling_sphere {
            let (scale, _, _) = to_world.to_scale_rotation_translation();
            let radius = sphere.radius * scale.abs().max_element();
            if ray.misses_sphere(to_world.transform_point3(sphere.center), radius) {
                return;
            }
        }

        let positions = &mesh.geometry.positions;
        let vertex = |i: u32| {
            positions
                .get(i as usize)
                .map(|&p| to_world.transform_point3(Vec3::from(p)))
        };
        for [a, b, c] in mesh.geometry.triangles() {
            let (Some(a), Some(b), Some(c)) = (vertex(a), vertex(b), vertex(c)) else {
                continue;
            };
            let Some(t) = ray.intersect_triangle(a, b, c) else {
                continue;
            };
            if best.as_ref().is_some_and(|hit| hit.distance <= t) {
                continue;
            }
            best = Some(PickHit {
                path: path.clone(),
                name: node.name.clone(),
                material: mesh.material.name.clone(),
                class: mesh.class,
                distance: t,
                point: ray.at(t),
            });
        }
    });
    best
}

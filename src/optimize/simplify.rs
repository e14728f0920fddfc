//! Coarse geometry reduction for distant detail levels.

use std::borrow::Cow;

use crate::models::Geometry;

/// Smallest vertex count a simplified geometry is reduced to.
pub const MINIMUM_FLOOR: usize = 50;

/// `max(floor(vertex_count * (1 - reduction)), floor)`.
pub fn target_count(vertex_count: usize, reduction: f32, floor: usize) -> usize {
    let reduction = reduction.clamp(0.0, 1.0) as f64;
    let kept = (vertex_count as f64 * (1.0 - reduction)).floor() as usize;
    kept.max(floor)
}

/// Reduces geometry toward a target reduction ratio.
///
/// Implementations must return the input untouched when it is already at or
/// below the target size.
pub trait Simplifier: Send + Sync {
    fn simplify<'g>(&self, geometry: &'g Geometry, reduction: f32) -> Cow<'g, Geometry>;
}

/// Keeps whole triangles of the de-indexed geometry at evenly spaced
/// intervals of `vertex_count / target`. Not topology preserving; suitable
/// only for far detail levels.
#[derive(Debug, Clone, Copy)]
pub struct StrideDecimator {
    pub floor: usize,
}

impl Default for StrideDecimator {
    fn default() -> Self {
        Self {
            floor: MINIMUM_FLOOR,
        }
    }
}

impl Simplifier for StrideDecimator {
    fn simplify<'g>(&self, geometry: &'g Geometry, reduction: f32) -> Cow<'g, Geometry> {
        let flat = match geometry.indices {
            Some(_) => Cow::Owned(geometry.to_non_indexed()),
            None => Cow::Borrowed(geometry),
        };
        let vertex_count = flat.vertex_count();
        let target = target_count(vertex_count, reduction, self.floor);
        if vertex_count <= target {
            return Cow::Borrowed(geometry);
        }

        // ratio > 1 here, so the sampled triangle indices are distinct.
        let ratio = vertex_count as f64 / target as f64;
        let triangles = vertex_count / 3;
        let kept: Vec<usize> = (0usize..)
            .map(|k| (k as f64 * ratio) as usize)
            .take_while(|&t| t < triangles)
            .collect();

        let gather3 = |source: &[[f32; 3]]| -> Vec<[f32; 3]> {
            kept.iter()
                .flat_map(|&t| source[t * 3..t * 3 + 3].iter().copied())
                .collect()
        };
        let mut reduced = Geometry {
            positions: gather3(&flat.positions),
            normals: Vec::new(),
            uvs: if flat.uvs.is_empty() {
                Vec::new()
            } else {
                kept.iter()
                    .flat_map(|&t| flat.uvs[t * 3..t * 3 + 3].iter().copied())
                    .collect()
            },
            indices: None,
        };
        reduced.compute_vertex_normals();
        Cow::Owned(reduced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `n` disjoint triangles in a row.
    fn strip_of_triangles(n: usize) -> Geometry {
        let mut g = Geometry::default();
        for i in 0..n {
            let x = i as f32;
            g.positions.extend([[x, 0.0, 0.0], [x + 1.0, 0.0, 0.0], [x, 1.0, 0.0]]);
            g.uvs.extend([[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        }
        g.compute_vertex_normals();
        g
    }

    #[test]
    fn target_arithmetic() {
        assert_eq!(target_count(1000, 0.5, MINIMUM_FLOOR), 500);
        assert_eq!(target_count(1000, 0.999, MINIMUM_FLOOR), 50);
        assert_eq!(target_count(10, 0.0, MINIMUM_FLOOR), 50);
    }

    #[test]
    fn small_geometry_is_returned_unchanged() {
        let geometry = strip_of_triangles(10);
        for reduction in [0.0, 0.3, 0.7, 0.99] {
            let out = StrideDecimator::default().simplify(&geometry, reduction);
            assert!(matches!(out, Cow::Borrowed(_)));
            assert_eq!(*out, geometry);
        }

        // Indexed input at the floor stays indexed.
        let cube = Geometry::cuboid(glam::Vec3::ONE);
        let out = StrideDecimator::default().simplify(&cube, 0.9);
        assert!(out.indices.is_some());
    }

    #[test]
    fn decimation_keeps_whole_triangles() {
        let geometry = strip_of_triangles(400); // 1200 vertices
        let out = StrideDecimator::default().simplify(&geometry, 0.5);
        // target 600, ratio 2: every other triangle
        assert_eq!(out.vertex_count(), 600);
        assert_eq!(out.vertex_count() % 3, 0);
        assert_eq!(out.normals.len(), out.vertex_count());
        assert_eq!(out.uvs.len(), out.vertex_count());
        assert_eq!(out.positions[3], [2.0, 0.0, 0.0]);

        let far = StrideDecimator::default().simplify(&geometry, 0.7);
        assert!(far.vertex_count() < out.vertex_count());
    }

    #[test]
    fn indexed_input_is_deindexed_first() {
        let mut geometry = strip_of_triangles(100);
        let n = geometry.positions.len() as u32;
        geometry.indices = Some((0..n).collect());
        let out = StrideDecimator::default().simplify(&geometry, 0.5);
        assert!(out.indices.is_none());
        assert_eq!(out.vertex_count(), 150);
    }
}

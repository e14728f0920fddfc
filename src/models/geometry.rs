//! Vertex buffers and the bounds computed from them.

use glam::{Mat4, Vec3};
use itertools::Itertools;

use crate::error::ParseError;

/// Triangle geometry: per-vertex attributes plus an optional index list.
///
/// `normals` and `uvs` are either empty or the same length as `positions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Option<Vec<u32>>,
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        match &self.indices {
            Some(indices) => indices.len() / 3,
            None => self.positions.len() / 3,
        }
    }

    /// Every index must address an existing vertex.
    pub fn validate(&self) -> Result<(), ParseError> {
        let vertex_count = self.positions.len();
        if let Some(indices) = &self.indices {
            if let Some((position, &value)) = indices
                .iter()
                .find_position(|&&index| index as usize >= vertex_count)
            {
                return Err(ParseError::IndexExceedsVertices {
                    position,
                    value,
                    vertex_count,
                });
            }
        }
        Ok(())
    }

    /// Iterate complete triangles as vertex index triples.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        let direct = match &self.indices {
            Some(_) => 0,
            None => self.positions.len() / 3,
        };
        let indexed = self
            .indices
            .iter()
            .flat_map(|indices| indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]]));
        let sequential = (0..direct as u32).map(|t| [t * 3, t * 3 + 1, t * 3 + 2]);
        indexed.chain(sequential)
    }

    /// Expand an indexed geometry so every triangle owns its three vertices.
    pub fn to_non_indexed(&self) -> Geometry {
        let Some(indices) = &self.indices else {
            return self.clone();
        };
        let pick3 = |source: &[[f32; 3]]| -> Vec<[f32; 3]> {
            if source.is_empty() {
                Vec::new()
            } else {
                indices.iter().map(|&i| source[i as usize]).collect()
            }
        };
        let uvs = if self.uvs.is_empty() {
            Vec::new()
        } else {
            indices.iter().map(|&i| self.uvs[i as usize]).collect()
        };
        Geometry {
            positions: pick3(&self.positions),
            normals: pick3(&self.normals),
            uvs,
            indices: None,
        }
    }

    /// Recompute smooth vertex normals from face normals, area weighted.
    ///
    /// Vertices not referenced by any triangle keep their previous normal.
    pub fn compute_vertex_normals(&mut self) {
        let mut accumulated = vec![Vec3::ZERO; self.positions.len()];
        let mut referenced = vec![false; self.positions.len()];
        for [a, b, c] in self.triangles() {
            let (a, b, c) = (a as usize, b as usize, c as usize);
            let pa = Vec3::from(self.positions[a]);
            let pb = Vec3::from(self.positions[b]);
            let pc = Vec3::from(self.positions[c]);
            let face = (pc - pb).cross(pa - pb);
            for v in [a, b, c] {
                accumulated[v] += face;
                referenced[v] = true;
            }
        }

        let previous = std::mem::take(&mut self.normals);
        self.normals = accumulated
            .into_iter()
            .enumerate()
            .map(|(i, n)| {
                if !referenced[i] {
                    previous.get(i).copied().unwrap_or([0.0, 0.0, 0.0])
                } else {
                    n.normalize_or_zero().to_array()
                }
            })
            .collect();
    }

    /// Local-space bounds, or `None` for an empty geometry.
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.positions.iter().map(|&p| Vec3::from(p)))
    }

    /// Bounds of the geometry after applying `matrix` to every vertex.
    pub fn transformed_bounds(&self, matrix: &Mat4) -> Option<Aabb> {
        Aabb::from_points(
            self.positions
                .iter()
                .map(|&p| matrix.transform_point3(Vec3::from(p))),
        )
    }

    /// Sphere centred on the box centre enclosing every vertex.
    pub fn bounding_sphere(&self) -> Option<Sphere> {
        let center = self.bounds()?.center();
        let radius = self
            .positions
            .iter()
            .map(|&p| Vec3::from(p).distance_squared(center))
            .fold(0.0f32, f32::max)
            .sqrt();
        Some(Sphere { center, radius })
    }

    /// Axis-aligned box centred on the origin with flat-shaded faces.
    pub fn cuboid(size: Vec3) -> Geometry {
        let h = size * 0.5;
        // (normal, u axis, v axis) for each face
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let mut geometry = Geometry {
            indices: Some(Vec::with_capacity(36)),
            ..Default::default()
        };
        for (normal, u, v) in faces {
            let base = geometry.positions.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (normal + u * su + v * sv) * h;
                geometry.positions.push(p.to_array());
                geometry.normals.push(normal.to_array());
                geometry.uvs.push([(su + 1.0) * 0.5, (sv + 1.0) * 0.5]);
            }
            if let Some(indices) = geometry.indices.as_mut() {
                indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
            }
        }
        geometry
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Aabb> {
        points.into_iter().fold(None, |acc: Option<Aabb>, p| {
            Some(match acc {
                Some(b) => Aabb {
                    min: b.min.min(p),
                    max: b.max.max(p),
                },
                None => Aabb { min: p, max: p },
            })
        })
    }

    pub fn union(self, other: Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn max_extent(&self) -> f32 {
        self.size().max_element()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Geometry {
        Geometry {
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            normals: Vec::new(),
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            indices: Some(vec![0, 1, 2, 0, 2, 3]),
        }
    }

    #[test]
    fn validate_rejects_out_of_range_index() {
        let mut geometry = quad();
        assert!(geometry.validate().is_ok());
        geometry.indices = Some(vec![0, 1, 4]);
        match geometry.validate() {
            Err(ParseError::IndexExceedsVertices {
                position, value, ..
            }) => {
                assert_eq!(position, 2);
                assert_eq!(value, 4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_indexed_expansion() {
        let expanded = quad().to_non_indexed();
        assert_eq!(expanded.vertex_count(), 6);
        assert_eq!(expanded.uvs.len(), 6);
        assert!(expanded.indices.is_none());
        assert_eq!(expanded.positions[4], [1.0, 1.0, 0.0]);
        assert_eq!(expanded.triangle_count(), 2);
    }

    #[test]
    fn normals_face_counter_clockwise_side() {
        let mut geometry = quad();
        geometry.compute_vertex_normals();
        for n in &geometry.normals {
            assert!((Vec3::from(*n) - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn unreferenced_vertices_keep_normals() {
        let mut geometry = quad();
        geometry.normals = vec![[0.0, 1.0, 0.0]; 4];
        geometry.indices = Some(vec![0, 1, 2]);
        geometry.compute_vertex_normals();
        assert_eq!(geometry.normals[3], [0.0, 1.0, 0.0]);
        assert!((Vec3::from(geometry.normals[0]) - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn cuboid_bounds_match_size() {
        let cube = Geometry::cuboid(Vec3::new(2.0, 1.0, 4.0));
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert!(cube.validate().is_ok());
        let bounds = cube.bounds().unwrap();
        assert!((bounds.size() - Vec3::new(2.0, 1.0, 4.0)).length() < 1e-6);
        assert!(bounds.center().length() < 1e-6);
    }

    #[test]
    fn bounding_sphere_encloses_corners() {
        let sphere = quad().bounding_sphere().unwrap();
        assert!((sphere.center - Vec3::new(0.5, 0.5, 0.0)).length() < 1e-6);
        assert!((sphere.radius - 0.5f32.hypot(0.5)).abs() < 1e-6);
    }
}

//! Recentre and rescale a scene to a canonical viewing size.

use glam::Vec3;
use tracing::debug;

use crate::models::SceneGraph;

/// A uniform scale followed by a translation, applied on top of the root
/// transform so that every world-space point `p` becomes `p * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub scale: f32,
    pub offset: Vec3,
}

impl Normalization {
    pub fn apply(&self, graph: &mut SceneGraph) {
        graph.root.transform = graph.root.transform.pre_scale_translate(self.scale, self.offset);
    }
}

/// Centre the world bounds on the origin with the largest side equal to
/// `canonical_size`. Returns `None` (leaving the graph alone) for empty or
/// degenerate bounds.
pub fn normalize(graph: &mut SceneGraph, canonical_size: f32) -> Option<Normalization> {
    let bounds = graph.bounds()?;
    let extent = bounds.max_extent();
    if !(extent.is_finite() && extent > 0.0) {
        debug!(extent, "skipping normalization of degenerate bounds");
        return None;
    }
    let scale = canonical_size / extent;
    let normalization = Normalization {
        scale,
        offset: -bounds.center() * scale,
    };
    normalization.apply(graph);
    debug!(scale, offset = ?normalization.offset, "normalized scene");
    Some(normalization)
}

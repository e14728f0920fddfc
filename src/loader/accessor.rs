//! Typed reads out of glTF accessors.

use gltf_json as json;
use json::accessor::{ComponentType, Type};
use json::validation::Checked;

use crate::error::ParseError;

/// Resolved bytes for every buffer view, indexed like `root.buffer_views`.
pub type ViewBytes<'a> = [std::borrow::Cow<'a, [u8]>];

/// Upper bound on elements materialized for an accessor without a buffer view.
pub const MAX_ZERO_FILLED_ELEMENTS: usize = 1 << 24;

fn component_size(component: ComponentType) -> usize {
    match component {
        ComponentType::I8 | ComponentType::U8 => 1,
        ComponentType::I16 | ComponentType::U16 => 2,
        ComponentType::U32 | ComponentType::F32 => 4,
    }
}

fn component_count(ty: Type) -> usize {
    match ty {
        Type::Scalar => 1,
        Type::Vec2 => 2,
        Type::Vec3 => 3,
        Type::Vec4 | Type::Mat2 => 4,
        Type::Mat3 => 9,
        Type::Mat4 => 16,
    }
}

/// An accessor with its layout resolved and its byte range checked.
struct Layout<'a> {
    count: usize,
    components: usize,
    component: ComponentType,
    normalized: bool,
    stride: usize,
    /// Starts at the first element; `None` means the accessor is all zeros.
    bytes: Option<&'a [u8]>,
}

impl Layout<'_> {
    fn read_component(&self, element: usize, component: usize) -> f32 {
        let Some(bytes) = self.bytes else {
            return 0.0;
        };
        let size = component_size(self.component);
        let at = element * self.stride + component * size;
        let b = &bytes[at..at + size];
        match (self.component, self.normalized) {
            (ComponentType::F32, _) => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            (ComponentType::I8, false) => b[0] as i8 as f32,
            (ComponentType::I8, true) => (b[0] as i8 as f32 / 127.0).max(-1.0),
            (ComponentType::U8, false) => b[0] as f32,
            (ComponentType::U8, true) => b[0] as f32 / 255.0,
            (ComponentType::I16, false) => i16::from_le_bytes([b[0], b[1]]) as f32,
            (ComponentType::I16, true) => (i16::from_le_bytes([b[0], b[1]]) as f32 / 32767.0).max(-1.0),
            (ComponentType::U16, false) => u16::from_le_bytes([b[0], b[1]]) as f32,
            (ComponentType::U16, true) => u16::from_le_bytes([b[0], b[1]]) as f32 / 65535.0,
            (ComponentType::U32, _) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32,
        }
    }

    fn read_index(&self, element: usize) -> Option<u32> {
        let Some(bytes) = self.bytes else {
            return Some(0);
        };
        let at = element * self.stride;
        match self.component {
            ComponentType::U8 => Some(bytes[at] as u32),
            ComponentType::U16 => Some(u16::from_le_bytes([bytes[at], bytes[at + 1]]) as u32),
            ComponentType::U32 => Some(u32::from_le_bytes([
                bytes[at],
                bytes[at + 1],
                bytes[at + 2],
                bytes[at + 3],
            ])),
            _ => None,
        }
    }
}

fn layout<'a>(
    root: &json::Root,
    views: &'a ViewBytes<'_>,
    index: json::Index<json::Accessor>,
) -> Result<Layout<'a>, ParseError> {
    let accessor_index = index.value();
    let accessor = root
        .accessors
        .get(accessor_index)
        .ok_or(ParseError::IndexOutOfRange {
            kind: "accessor",
            index: accessor_index,
            count: root.accessors.len(),
        })?;
    let layout_error = |detail: &str| ParseError::AccessorLayout {
        accessor: accessor_index,
        detail: detail.to_string(),
    };

    if accessor.sparse.is_some() {
        return Err(ParseError::Unsupported(format!(
            "sparse accessor {accessor_index}"
        )));
    }
    let Checked::Valid(json::accessor::GenericComponentType(component)) = accessor.component_type
    else {
        return Err(layout_error("invalid component type"));
    };
    let Checked::Valid(ty) = accessor.type_ else {
        return Err(layout_error("invalid element type"));
    };

    let count = usize::try_from(accessor.count.0).unwrap_or(usize::MAX);
    let components = component_count(ty);
    let element_size = component_size(component) * components;

    let Some(view_index) = accessor.buffer_view else {
        if count > MAX_ZERO_FILLED_ELEMENTS {
            return Err(layout_error("zero-filled accessor is too large"));
        }
        return Ok(Layout {
            count,
            components,
            component,
            normalized: accessor.normalized,
            stride: element_size,
            bytes: None,
        });
    };

    let view = root
        .buffer_views
        .get(view_index.value())
        .ok_or(ParseError::IndexOutOfRange {
            kind: "buffer view",
            index: view_index.value(),
            count: root.buffer_views.len(),
        })?;
    let data = views
        .get(view_index.value())
        .ok_or(ParseError::IndexOutOfRange {
            kind: "buffer view",
            index: view_index.value(),
            count: views.len(),
        })?;

    let stride = view.byte_stride.map_or(element_size, |s| s.0);
    if stride < element_size {
        return Err(layout_error("byte stride is smaller than one element"));
    }
    let offset = accessor
        .byte_offset
        .map_or(Some(0), |o| usize::try_from(o.0).ok());
    let needed = offset
        .and_then(|offset| match count.checked_sub(1) {
            None => Some(offset),
            Some(last) => stride
                .checked_mul(last)
                .and_then(|span| span.checked_add(element_size))
                .and_then(|span| span.checked_add(offset)),
        })
        .unwrap_or(usize::MAX);
    if needed > data.len() {
        return Err(ParseError::AccessorOutOfBounds {
            accessor: accessor_index,
            needed,
            available: data.len(),
        });
    }

    Ok(Layout {
        count,
        components,
        component,
        normalized: accessor.normalized,
        stride,
        bytes: data.get(offset.unwrap_or(0)..),
    })
}

fn read_vectors<const N: usize>(
    root: &json::Root,
    views: &ViewBytes<'_>,
    index: json::Index<json::Accessor>,
) -> Result<Vec<[f32; N]>, ParseError> {
    let layout = layout(root, views, index)?;
    if layout.components != N {
        return Err(ParseError::AccessorLayout {
            accessor: index.value(),
            detail: format!("expected {N} components, found {}", layout.components),
        });
    }
    Ok((0..layout.count)
        .map(|element| std::array::from_fn(|c| layout.read_component(element, c)))
        .collect())
}

pub fn read_vec3(
    root: &json::Root,
    views: &ViewBytes<'_>,
    index: json::Index<json::Accessor>,
) -> Result<Vec<[f32; 3]>, ParseError> {
    read_vectors::<3>(root, views, index)
}

pub fn read_vec2(
    root: &json::Root,
    views: &ViewBytes<'_>,
    index: json::Index<json::Accessor>,
) -> Result<Vec<[f32; 2]>, ParseError> {
    read_vectors::<2>(root, views, index)
}

pub fn read_indices(
    root: &json::Root,
    views: &ViewBytes<'_>,
    index: json::Index<json::Accessor>,
) -> Result<Vec<u32>, ParseError> {
    let layout = layout(root, views, index)?;
    if layout.components != 1 {
        return Err(ParseError::AccessorLayout {
            accessor: index.value(),
            detail: "index accessor must be SCALAR".to_string(),
        });
    }
    (0..layout.count)
        .map(|element| {
            layout.read_index(element).ok_or(ParseError::AccessorLayout {
                accessor: index.value(),
                detail: "index accessor must be an unsigned integer type".to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn root_with(accessors: serde_json::Value, views: serde_json::Value) -> json::Root {
        let doc = serde_json::json!({
            "asset": { "version": "2.0" },
            "buffers": [{ "byteLength": 64 }],
            "bufferViews": views,
            "accessors": accessors,
        });
        json::Root::from_slice(doc.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn reads_strided_normalized_shorts() {
        let root = root_with(
            serde_json::json!([{
                "bufferView": 0, "componentType": 5122, "count": 2,
                "type": "VEC3", "normalized": true
            }]),
            serde_json::json!([{ "buffer": 0, "byteLength": 16, "byteStride": 8 }]),
        );
        let mut bytes = Vec::new();
        for v in [32767i16, 0, -32767, 0, 0, 32767, 0, 0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let views = [Cow::Owned(bytes)];
        let normals = read_vec3(&root, &views, json::Index::new(0)).unwrap();
        assert_eq!(normals, vec![[1.0, 0.0, -1.0], [0.0, 1.0, 0.0]]);
    }

    #[test]
    fn index_widths_and_bounds() {
        let root = root_with(
            serde_json::json!([
                { "bufferView": 0, "componentType": 5123, "count": 3, "type": "SCALAR" },
                { "bufferView": 0, "componentType": 5125, "count": 3, "type": "SCALAR" },
                { "bufferView": 0, "componentType": 5126, "count": 1, "type": "SCALAR" }
            ]),
            serde_json::json!([{ "buffer": 0, "byteLength": 6 }]),
        );
        let views = [Cow::Owned(vec![1u8, 0, 2, 0, 3, 0])];
        assert_eq!(read_indices(&root, &views, json::Index::new(0)).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            read_indices(&root, &views, json::Index::new(1)),
            Err(ParseError::AccessorOutOfBounds { needed: 12, available: 6, .. })
        ));
        assert!(matches!(
            read_indices(&root, &views, json::Index::new(2)),
            Err(ParseError::AccessorLayout { .. })
        ));
        assert!(matches!(
            read_indices(&root, &views, json::Index::new(9)),
            Err(ParseError::IndexOutOfRange { kind: "accessor", .. })
        ));
    }

    #[test]
    fn missing_view_reads_zeros() {
        let root = root_with(
            serde_json::json!([{ "componentType": 5126, "count": 2, "type": "VEC2" }]),
            serde_json::json!([]),
        );
        let views: [Cow<[u8]>; 0] = [];
        assert_eq!(
            read_vec2(&root, &views, json::Index::new(0)).unwrap(),
            vec![[0.0, 0.0]; 2]
        );
        assert!(read_vec3(&root, &views, json::Index::new(0)).is_err());
    }

    #[test]
    fn oversized_counts_and_offsets_are_rejected() {
        let root = root_with(
            serde_json::json!([
                { "bufferView": 0, "componentType": 5126, "count": 1537228672809129302u64, "type": "VEC3" },
                { "bufferView": 0, "byteOffset": u64::MAX, "componentType": 5126, "count": 1, "type": "VEC3" },
                { "componentType": 5126, "count": 1537228672809129302u64, "type": "VEC3" },
                { "componentType": 5126, "count": MAX_ZERO_FILLED_ELEMENTS + 1, "type": "VEC2" }
            ]),
            serde_json::json!([{ "buffer": 0, "byteLength": 12 }]),
        );
        let views = [Cow::Owned(vec![0u8; 12])];
        assert!(matches!(
            read_vec3(&root, &views, json::Index::new(0)),
            Err(ParseError::AccessorOutOfBounds { needed: usize::MAX, available: 12, .. })
        ));
        assert!(matches!(
            read_vec3(&root, &views, json::Index::new(1)),
            Err(ParseError::AccessorOutOfBounds { needed: usize::MAX, .. })
        ));
        assert!(matches!(
            read_vec3(&root, &views, json::Index::new(2)),
            Err(ParseError::AccessorLayout { accessor: 2, .. })
        ));
        assert!(matches!(
            read_vec2(&root, &views, json::Index::new(3)),
            Err(ParseError::AccessorLayout { accessor: 3, .. })
        ));
    }
}

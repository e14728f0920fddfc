//! `EXT_meshopt_compression` buffer views.
//!
//! The extension object names a byte range of a (usually different) buffer
//! holding the encoded stream, plus the element count, stride, mode and an
//! optional post-decode filter.

use std::sync::Arc;

use gltf_json::Value;
use serde::Deserialize;
use tracing::trace;

use super::{CodecError, GeometryDecoder};

/// Largest decoded view accepted from a single extension object.
const MAX_DECODED_BYTES: usize = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Attributes,
    Triangles,
    Indices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Filter {
    #[default]
    None,
    Octahedral,
    Quaternion,
    Exponential,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeshoptView {
    buffer: usize,
    #[serde(default)]
    byte_offset: usize,
    byte_length: usize,
    byte_stride: usize,
    count: usize,
    mode: Mode,
    #[serde(default)]
    filter: Filter,
}

#[derive(Debug, Clone)]
pub struct MeshoptDecoder {
    extension: String,
}

impl MeshoptDecoder {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }
}

impl GeometryDecoder for MeshoptDecoder {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn decode(&self, extension: &Value, buffers: &[Arc<[u8]>]) -> Result<Vec<u8>, CodecError> {
        let view = MeshoptView::deserialize(extension).map_err(|e| {
            CodecError::InvalidExtension {
                extension: self.extension.clone(),
                detail: e.to_string(),
            }
        })?;

        let buffer = buffers.get(view.buffer).ok_or_else(|| CodecError::InvalidExtension {
            extension: self.extension.clone(),
            detail: format!("buffer {} does not exist", view.buffer),
        })?;
        let end = view.byte_offset.saturating_add(view.byte_length);
        let source = buffer
            .get(view.byte_offset..end)
            .ok_or(CodecError::SourceOutOfBounds {
                buffer: view.buffer,
                offset: view.byte_offset,
                end,
                len: buffer.len(),
            })?;

        trace!(
            mode = ?view.mode,
            filter = ?view.filter,
            count = view.count,
            stride = view.byte_stride,
            "decoding meshopt view"
        );

        match view.mode {
            Mode::Attributes => {
                let mut decoded = decode_vertex_buffer_dynamic(view.count, view.byte_stride, source)?;
                apply_filter(view.filter, &mut decoded, view.byte_stride)?;
                Ok(decoded)
            }
            Mode::Triangles => decode_triangles(view.count, view.byte_stride, source),
            Mode::Indices => Err(CodecError::UnsupportedParameter {
                what: "meshopt mode",
                value: "INDICES".to_string(),
            }),
        }
    }
}

/// Decode a meshoptimizer-encoded vertex buffer with a runtime-known stride.
///
/// meshopt_rs requires `size_of::<Vertex>() == stride`, but our stride is only known at
/// runtime. We dispatch to a monomorphized call for each supported stride value.
fn decode_vertex_buffer_dynamic(
    count: usize,
    stride: usize,
    encoded: &[u8],
) -> Result<Vec<u8>, CodecError> {
    if stride == 0 || stride > 256 || stride % 4 != 0 {
        return Err(CodecError::UnsupportedParameter {
            what: "vertex stride",
            value: stride.to_string(),
        });
    }

    let total_bytes = count
        .checked_mul(stride)
        .filter(|&total| total <= MAX_DECODED_BYTES)
        .ok_or_else(|| CodecError::UnsupportedParameter {
            what: "vertex count",
            value: count.to_string(),
        })?;
    let mut output = vec![0u8; total_bytes];

    macro_rules! decode_with_stride {
        ($stride:literal, $count:expr, $encoded:expr, $output:expr) => {{
            #[repr(C, align(4))]
            #[derive(Copy, Clone)]
            struct Vertex([u8; $stride]);
            // Safety: output buffer has exactly count * stride bytes, and Vertex has size = stride.
            // The decode function reads/writes through the slice as raw bytes internally.
            let vertex_slice: &mut [Vertex] = unsafe {
                std::slice::from_raw_parts_mut($output.as_mut_ptr() as *mut Vertex, $count)
            };
            meshopt_rs::vertex::buffer::decode_vertex_buffer(vertex_slice, $encoded)
                .map_err(|e| CodecError::VertexDecode(format!("{e:?}")))?;
        }};
    }

    match stride {
        4 => decode_with_stride!(4, count, encoded, output),
        8 => decode_with_stride!(8, count, encoded, output),
        12 => decode_with_stride!(12, count, encoded, output),
        16 => decode_with_stride!(16, count, encoded, output),
        20 => decode_with_stride!(20, count, encoded, output),
        24 => decode_with_stride!(24, count, encoded, output),
        28 => decode_with_stride!(28, count, encoded, output),
        32 => decode_with_stride!(32, count, encoded, output),
        36 => decode_with_stride!(36, count, encoded, output),
        40 => decode_with_stride!(40, count, encoded, output),
        44 => decode_with_stride!(44, count, encoded, output),
        48 => decode_with_stride!(48, count, encoded, output),
        52 => decode_with_stride!(52, count, encoded, output),
        56 => decode_with_stride!(56, count, encoded, output),
        60 => decode_with_stride!(60, count, encoded, output),
        64 => decode_with_stride!(64, count, encoded, output),
        _ => {
            return Err(CodecError::UnsupportedParameter {
                what: "vertex stride",
                value: stride.to_string(),
            });
        }
    }

    Ok(output)
}

/// Decode a TRIANGLES stream and lay it out at the view's index width.
fn decode_triangles(count: usize, stride: usize, encoded: &[u8]) -> Result<Vec<u8>, CodecError> {
    if count % 3 != 0 {
        return Err(CodecError::IndexDecode(format!(
            "index count {count} is not a multiple of 3"
        )));
    }
    if count.saturating_mul(4) > MAX_DECODED_BYTES {
        return Err(CodecError::UnsupportedParameter {
            what: "index count",
            value: count.to_string(),
        });
    }
    let mut output = vec![0u32; count];
    meshopt_rs::index::buffer::decode_index_buffer(&mut output, encoded)
        .map_err(|e| CodecError::IndexDecode(format!("{e:?}")))?;
    narrow_indices(&output, stride)
}

fn narrow_indices(indices: &[u32], stride: usize) -> Result<Vec<u8>, CodecError> {
    match stride {
        2 => indices
            .iter()
            .map(|&i| {
                u16::try_from(i)
                    .map(u16::to_le_bytes)
                    .map_err(|_| CodecError::IndexDecode(format!("index {i} does not fit 16 bits")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|v| v.concat()),
        4 => Ok(indices.iter().flat_map(|i| i.to_le_bytes()).collect()),
        other => Err(CodecError::UnsupportedParameter {
            what: "index size",
            value: other.to_string(),
        }),
    }
}

fn apply_filter(filter: Filter, data: &mut [u8], stride: usize) -> Result<(), CodecError> {
    match filter {
        Filter::None => Ok(()),
        Filter::Octahedral => match stride {
            4 => {
                for v in data.chunks_exact_mut(4) {
                    let decoded = decode_octahedral(
                        [v[0] as i8 as f32, v[1] as i8 as f32, v[2] as i8 as f32],
                        127.0,
                    );
                    for (dst, value) in v.iter_mut().zip(decoded) {
                        *dst = value as i8 as u8;
                    }
                }
                Ok(())
            }
            8 => {
                for v in data.chunks_exact_mut(8) {
                    let read = |i: usize| i16::from_le_bytes([v[i * 2], v[i * 2 + 1]]) as f32;
                    let decoded = decode_octahedral([read(0), read(1), read(2)], 32767.0);
                    for (i, value) in decoded.into_iter().enumerate() {
                        v[i * 2..i * 2 + 2].copy_from_slice(&(value as i16).to_le_bytes());
                    }
                }
                Ok(())
            }
            _ => Err(CodecError::FilterStride {
                filter: "OCTAHEDRAL",
                stride,
            }),
        },
        Filter::Exponential => {
            if stride % 4 != 0 {
                return Err(CodecError::FilterStride {
                    filter: "EXPONENTIAL",
                    stride,
                });
            }
            for word in data.chunks_exact_mut(4) {
                let raw = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                word.copy_from_slice(&decode_exponential(raw).to_le_bytes());
            }
            Ok(())
        }
        Filter::Quaternion => Err(CodecError::UnsupportedParameter {
            what: "meshopt filter",
            value: "QUATERNION".to_string(),
        }),
    }
}

/// Reconstruct a unit vector from octahedral `(x, y)` with `z` holding the
/// encoded one. Returns the rounded integer components at the same scale.
fn decode_octahedral([x, y, one]: [f32; 3], max: f32) -> [i32; 3] {
    let mut x = x;
    let mut y = y;
    let z = one - x.abs() - y.abs();
    let t = z.min(0.0);
    x += if x >= 0.0 { t } else { -t };
    y += if y >= 0.0 { t } else { -t };

    let len = (x * x + y * y + z * z).sqrt();
    let s = if len > 0.0 { max / len } else { 0.0 };
    let round = |v: f32| (v * s + if v >= 0.0 { 0.5 } else { -0.5 }) as i32;
    [round(x), round(y), round(z)]
}

/// 8-bit signed exponent, 24-bit signed mantissa.
fn decode_exponential(raw: u32) -> f32 {
    let exponent = (raw as i32) >> 24;
    let mantissa = ((raw as i32) << 8) >> 8;
    mantissa as f32 * 2f32.powi(exponent)
}

/// Encoders matching the decoder above, for building compressed fixtures.
#[cfg(test)]
pub(crate) mod fixtures {
    pub fn encode_positions(positions: &[[f32; 3]]) -> Vec<u8> {
        let bound = meshopt_rs::vertex::buffer::encode_vertex_buffer_bound(positions.len(), 12);
        let mut encoded = vec![0u8; bound];
        let written: Option<usize> =
            meshopt_rs::vertex::buffer::encode_vertex_buffer(&mut encoded, positions, meshopt_rs::vertex::VertexEncodingVersion::V0).into();
        encoded.truncate(written.unwrap());
        encoded
    }

    pub fn encode_triangles(indices: &[u32], vertex_count: usize) -> Vec<u8> {
        let bound = meshopt_rs::index::buffer::encode_index_buffer_bound(indices.len(), vertex_count);
        let mut encoded = vec![0u8; bound];
        let written: Option<usize> =
            meshopt_rs::index::buffer::encode_index_buffer(&mut encoded, indices, meshopt_rs::index::IndexEncodingVersion::V0).into();
        encoded.truncate(written.unwrap());
        encoded
    }
}

//! Export a scene graph to GLB.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;

use gltf_json as json;
use json::validation::Checked::Valid;
use json::validation::USize64;
use rootcause::Report;
use thiserror::Error;

use crate::models::{Geometry, Material, Mesh, Node, SceneGraph, Texture};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("scene contains no meshes")]
    Empty,
    #[error("geometry of node {node} is invalid")]
    InvalidGeometry { node: String },
    #[error("failed to serialize glTF JSON: {0}")]
    Serialize(String),
    #[error("failed to write GLB: {0}")]
    Io(String),
}

/// Writes `scene` as a single-buffer GLB: one glTF node per scene node, with
/// geometry, materials and textures written once however often they are shared.
pub fn write_glb(scene: &SceneGraph, writer: impl Write) -> Result<(), Report<ExportError>> {
    if scene.mesh_count() == 0 {
        return Err(Report::new(ExportError::Empty));
    }

    let mut builder = GlbBuilder::default();
    builder.root.asset = json::Asset {
        version: "2.0".to_string(),
        generator: Some(concat!("showroom ", env!("CARGO_PKG_VERSION")).to_string()),
        ..Default::default()
    };

    let root_node = builder.add_node(&scene.root)?;
    let scene_index = builder.root.push(json::Scene {
        nodes: vec![root_node],
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });
    builder.root.scene = Some(scene_index);

    let GlbBuilder {
        mut root,
        mut bin_data,
        ..
    } = builder;

    pad_to_4(&mut bin_data);
    if !bin_data.is_empty() {
        let buffer = root.push(json::Buffer {
            byte_length: USize64::from(bin_data.len()),
            uri: None,
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        for bv in root.buffer_views.iter_mut() {
            bv.buffer = buffer;
        }
    }

    let json_string = json::serialize::to_string(&root)
        .map_err(|e| Report::new(ExportError::Serialize(e.to_string())))?;

    let glb = gltf::binary::Glb {
        header: gltf::binary::Header {
            magic: *b"glTF",
            version: 2,
            length: 0, // to_writer computes this
        },
        json: Cow::Owned(json_string.into_bytes()),
        bin: if bin_data.is_empty() {
            None
        } else {
            Some(Cow::Owned(bin_data))
        },
    };

    glb.to_writer(writer)
        .map_err(|e| Report::new(ExportError::Io(e.to_string())))?;

    Ok(())
}

#[derive(Default)]
struct GlbBuilder {
    root: json::Root,
    bin_data: Vec<u8>,
    meshes: HashMap<(*const Geometry, *const Material), json::Index<json::Mesh>>,
    materials: HashMap<*const Material, json::Index<json::Material>>,
    textures: HashMap<*const Texture, json::Index<json::Texture>>,
}

impl GlbBuilder {
    /// Children are written before their parent so their indices are known.
    fn add_node(&mut self, node: &Node) -> Result<json::Index<json::Node>, Report<ExportError>> {
        let children = node
            .children
            .iter()
            .map(|child| self.add_node(child))
            .collect::<Result<Vec<_>, _>>()?;

        let mesh = node
            .mesh
            .as_ref()
            .map(|mesh| self.add_mesh(&node.name, mesh))
            .transpose()?;

        let t = &node.transform;
        Ok(self.root.push(json::Node {
            name: Some(node.name.clone()),
            mesh,
            children: if children.is_empty() { None } else { Some(children) },
            translation: Some(t.translation.to_array()),
            rotation: Some(json::scene::UnitQuaternion(t.rotation.to_array())),
            scale: Some(t.scale.to_array()),
            ..Default::default()
        }))
    }

    fn add_mesh(&mut self, node: &str, mesh: &Mesh) -> Result<json::Index<json::Mesh>, Report<ExportError>> {
        let key = (Arc::as_ptr(&mesh.geometry), Arc::as_ptr(&mesh.material));
        if let Some(index) = self.meshes.get(&key) {
            return Ok(*index);
        }

        let geometry = &mesh.geometry;
        if geometry.validate().is_err() || geometry.positions.is_empty() {
            return Err(Report::new(ExportError::InvalidGeometry {
                node: node.to_string(),
            }));
        }

        let mut attributes = BTreeMap::new();

        let (min, max) = bounding_coords(&geometry.positions);
        let positions = self.push_floats(
            geometry.positions.iter().flatten().copied(),
            geometry.positions.len(),
            json::accessor::Type::Vec3,
            Some((min, max)),
        );
        attributes.insert(Valid(json::mesh::Semantic::Positions), positions);

        if geometry.normals.len() == geometry.positions.len() {
            let normals = self.push_floats(
                geometry.normals.iter().flatten().copied(),
                geometry.normals.len(),
                json::accessor::Type::Vec3,
                None,
            );
            attributes.insert(Valid(json::mesh::Semantic::Normals), normals);
        }
        if geometry.uvs.len() == geometry.positions.len() {
            let uvs = self.push_floats(
                geometry.uvs.iter().flatten().copied(),
                geometry.uvs.len(),
                json::accessor::Type::Vec2,
                None,
            );
            attributes.insert(Valid(json::mesh::Semantic::TexCoords(0)), uvs);
        }

        let indices = geometry.indices.as_ref().map(|indices| self.push_indices(indices));
        let material = self.add_material(&mesh.material);

        let index = self.root.push(json::Mesh {
            primitives: vec![json::mesh::Primitive {
                attributes,
                indices,
                material: Some(material),
                mode: Valid(json::mesh::Mode::Triangles),
                targets: None,
                extensions: Default::default(),
                extras: Default::default(),
            }],
            weights: None,
            name: Some(node.to_string()),
            extensions: Default::default(),
            extras: Default::default(),
        });
        self.meshes.insert(key, index);
        Ok(index)
    }

    fn push_view(
        &mut self,
        bytes: impl IntoIterator<Item = u8>,
        target: json::buffer::Target,
    ) -> json::Index<json::buffer::View> {
        let byte_offset = self.bin_data.len();
        self.bin_data.extend(bytes);
        let byte_length = self.bin_data.len() - byte_offset;
        pad_to_4(&mut self.bin_data);

        self.root.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: USize64::from(byte_length),
            byte_offset: Some(USize64::from(byte_offset)),
            byte_stride: None,
            target: Some(Valid(target)),
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        })
    }

    fn push_floats(
        &mut self,
        values: impl Iterator<Item = f32>,
        count: usize,
        type_: json::accessor::Type,
        bounds: Option<([f32; 3], [f32; 3])>,
    ) -> json::Index<json::Accessor> {
        let bv = self.push_view(
            values.flat_map(f32::to_le_bytes),
            json::buffer::Target::ArrayBuffer,
        );
        self.root.push(json::Accessor {
            buffer_view: Some(bv),
            byte_offset: Some(USize64(0)),
            count: USize64::from(count),
            component_type: Valid(json::accessor::GenericComponentType(
                json::accessor::ComponentType::F32,
            )),
            type_: Valid(type_),
            min: bounds.map(|(min, _)| json::Value::from(min.to_vec())),
            max: bounds.map(|(_, max)| json::Value::from(max.to_vec())),
            name: None,
            normalized: false,
            sparse: None,
            extensions: Default::default(),
            extras: Default::default(),
        })
    }

    fn push_indices(&mut self, indices: &[u32]) -> json::Index<json::Accessor> {
        let bv = self.push_view(
            indices.iter().flat_map(|i| i.to_le_bytes()),
            json::buffer::Target::ElementArrayBuffer,
        );
        self.root.push(json::Accessor {
            buffer_view: Some(bv),
            byte_offset: Some(USize64(0)),
            count: USize64::from(indices.len()),
            component_type: Valid(json::accessor::GenericComponentType(
                json::accessor::ComponentType::U32,
            )),
            type_: Valid(json::accessor::Type::Scalar),
            min: None,
            max: None,
            name: None,
            normalized: false,
            sparse: None,
            extensions: Default::default(),
            extras: Default::default(),
        })
    }

    fn add_material(&mut self, material: &Arc<Material>) -> json::Index<json::Material> {
        if let Some(index) = self.materials.get(&Arc::as_ptr(material)) {
            return *index;
        }

        let [r, g, b] = material.base_color;
        let emissive = material
            .emissive
            .map(|c| (c * material.emissive_intensity).clamp(0.0, 1.0));
        let base_color_texture = material
            .base_color_map
            .as_ref()
            .and_then(|slot| self.add_texture(&slot.texture))
            .map(|index| json::texture::Info {
                index,
                tex_coord: 0,
                extensions: Default::default(),
                extras: Default::default(),
            });

        let index = self.root.push(json::Material {
            name: Some(material.name.clone()),
            alpha_mode: Valid(if material.transparent {
                json::material::AlphaMode::Blend
            } else {
                json::material::AlphaMode::Opaque
            }),
            pbr_metallic_roughness: json::material::PbrMetallicRoughness {
                base_color_factor: json::material::PbrBaseColorFactor([r, g, b, material.opacity]),
                metallic_factor: json::material::StrengthFactor(material.metalness),
                roughness_factor: json::material::StrengthFactor(material.roughness),
                base_color_texture,
                ..Default::default()
            },
            emissive_factor: json::material::EmissiveFactor(emissive),
            ..Default::default()
        });
        self.materials.insert(Arc::as_ptr(material), index);
        index
    }

    /// Only textures with an external URI can be referenced.
    fn add_texture(&mut self, texture: &Arc<Texture>) -> Option<json::Index<json::Texture>> {
        if let Some(index) = self.textures.get(&Arc::as_ptr(texture)) {
            return Some(*index);
        }
        let uri = texture.uri.clone()?;

        let image = self.root.push(json::Image {
            buffer_view: None,
            mime_type: texture.mime_type.clone().map(json::image::MimeType),
            uri: Some(uri),
            name: texture.name.clone(),
            extensions: Default::default(),
            extras: Default::default(),
        });
        let index = self.root.push(json::Texture {
            source: image,
            sampler: None,
            name: texture.name.clone(),
            extensions: Default::default(),
            extras: Default::default(),
        });
        self.textures.insert(Arc::as_ptr(texture), index);
        Some(index)
    }
}

fn pad_to_4(data: &mut Vec<u8>) {
    while data.len() % 4 != 0 {
        data.push(0);
    }
}

fn bounding_coords(points: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for p in points {
        for i in 0..3 {
            min[i] = f32::min(min[i], p[i]);
            max[i] = f32::max(max[i], p[i]);
        }
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TextureSlot;
    use glam::Vec3;

    #[test]
    fn shared_resources_written_once() {
        let texture = Arc::new(Texture {
            uri: Some("paint.png".to_string()),
            mime_type: Some("image/png".to_string()),
            ..Default::default()
        });
        let mesh = Mesh::new(
            Arc::new(Geometry::cuboid(Vec3::ONE)),
            Arc::new(Material {
                name: "paint".to_string(),
                base_color_map: Some(TextureSlot::new(texture)),
                ..Material::default()
            }),
        );
        let graph = SceneGraph::new(
            Node::new("root")
                .with_child(Node::new("a").with_mesh(mesh.clone()))
                .with_child(Node::new("b").with_mesh(mesh)),
        );

        let mut out = Vec::new();
        write_glb(&graph, &mut out).unwrap();
        assert_eq!(&out[..4], b"glTF");

        let glb = gltf::binary::Glb::from_slice(&out).unwrap();
        let root = json::Root::from_slice(&glb.json).unwrap();
        assert_eq!(root.nodes.len(), 3);
        assert_eq!(root.meshes.len(), 1);
        assert_eq!(root.materials.len(), 1);
        assert_eq!(root.images.len(), 1);
        assert_eq!(root.images[0].uri.as_deref(), Some("paint.png"));
        assert_eq!(glb.bin.map(|b| b.len() % 4), Some(0));
    }

    #[test]
    fn empty_scene_is_rejected() {
        let err = write_glb(&SceneGraph::new(Node::new("root")), Vec::new()).unwrap_err();
        assert!(err.to_string().contains("no meshes"));
    }
}

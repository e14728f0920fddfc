//! glTF 2.0 (`.gltf` and `.glb`) into a [`SceneGraph`].
//!
//! Parsing works directly on the `gltf-json` document rather than the
//! validated `gltf::Document` so that compressed buffer views can be swapped
//! for their decoded bytes before any accessor is read, and so malformed
//! indices surface as [`ParseError`]s instead of panics.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use gltf_json as json;
use json::validation::Checked;
use tracing::{debug, warn};

use crate::asset::{Fetcher, Locator};
use crate::codec::{COMPRESSION_EXTENSIONS, DecoderRegistry};
use crate::error::{LoadError, ParseError};
use crate::models::{Geometry, Material, Mesh, Node, NodePath, SceneGraph, Texture, TextureSlot, Transform};

pub mod accessor;
pub mod uri;

const GLB_MAGIC: &[u8; 4] = b"glTF";

/// A parsed asset: the graph plus the path of every node carrying a mesh.
#[derive(Debug, Clone)]
pub struct LoadedScene {
    pub graph: SceneGraph,
    pub meshes: Vec<NodePath>,
}

/// Builds scene graphs from asset bytes. Sidecar buffers are fetched
/// relative to the asset's own locator.
pub struct SceneLoader<'a> {
    fetcher: &'a dyn Fetcher,
    decoders: &'a DecoderRegistry,
}

impl<'a> SceneLoader<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, decoders: &'a DecoderRegistry) -> Self {
        Self { fetcher, decoders }
    }

    pub fn load(&self, bytes: &[u8], base: &Locator) -> Result<LoadedScene, LoadError> {
        let (json_bytes, bin) = split_container(bytes)?;
        let root = json::Root::from_slice(&json_bytes).map_err(|e| ParseError::Json {
            detail: e.to_string(),
        })?;

        self.decoders
            .check_required(root.extensions_required.iter().map(String::as_str))?;

        let buffers = self.resolve_buffers(&root, bin.as_deref(), base)?;
        let views = self.resolve_views(&root, &buffers)?;

        let mut builder = GraphBuilder::new(&root, &views);
        let graph = builder.build()?;
        let meshes = graph.mesh_paths();

        debug!(
            %base,
            nodes = root.nodes.len(),
            meshes = meshes.len(),
            triangles = graph.triangle_count(),
            "parsed glTF"
        );
        Ok(LoadedScene { graph, meshes })
    }

    fn resolve_buffers(
        &self,
        root: &json::Root,
        bin: Option<&[u8]>,
        base: &Locator,
    ) -> Result<Vec<Arc<[u8]>>, LoadError> {
        let mut resolved = Vec::with_capacity(root.buffers.len());
        for (index, buffer) in root.buffers.iter().enumerate() {
            let declared = buffer.byte_length.0 as usize;
            let fallback = is_fallback_buffer(buffer);

            let data: Arc<[u8]> = match buffer.uri.as_deref() {
                None if fallback => Arc::from(Vec::new()),
                None => match bin {
                    Some(bin) => Arc::from(bin),
                    None => {
                        return Err(ParseError::MissingBuffer {
                            index,
                            reason: "no uri and no GLB binary chunk".to_string(),
                        }
                        .into());
                    }
                },
                Some(uri) if uri::is_data_uri(uri) => Arc::from(uri::decode_data_uri(uri)?),
                Some(uri) => {
                    let locator = base.join(uri);
                    debug!(%locator, "fetching sidecar buffer");
                    self.fetcher.fetch(&locator, &mut |_, _| {})?
                }
            };

            if !fallback && data.len() < declared {
                return Err(ParseError::BufferTooShort {
                    index,
                    declared,
                    actual: data.len(),
                }
                .into());
            }
            resolved.push(data);
        }
        Ok(resolved)
    }

    fn resolve_views<'b>(
        &self,
        root: &json::Root,
        buffers: &'b [Arc<[u8]>],
    ) -> Result<Vec<Cow<'b, [u8]>>, LoadError> {
        let mut views = Vec::with_capacity(root.buffer_views.len());
        for (index, view) in root.buffer_views.iter().enumerate() {
            let compressed = view.extensions.as_ref().and_then(|ext| {
                ext.others.iter().find(|(name, _)| {
                    COMPRESSION_EXTENSIONS.contains(&name.as_str()) && self.decoders.supports(name)
                })
            });

            if let Some((name, extension)) = compressed {
                if let Some(decoder) = self.decoders.get(name) {
                    let decoded = decoder.decode(extension, buffers)?;
                    views.push(Cow::Owned(decoded));
                    continue;
                }
            }

            let buffer_index = view.buffer.value();
            let buffer = buffers.get(buffer_index).ok_or(ParseError::IndexOutOfRange {
                kind: "buffer",
                index: buffer_index,
                count: buffers.len(),
            })?;
            let offset = view
                .byte_offset
                .map_or(0, |o| usize::try_from(o.0).unwrap_or(usize::MAX));
            let end = usize::try_from(view.byte_length.0)
                .ok()
                .and_then(|length| offset.checked_add(length))
                .unwrap_or(usize::MAX);
            let slice = buffer.get(offset..end).ok_or(ParseError::ViewOutOfBounds {
                view: index,
                offset,
                end,
                len: buffer.len(),
            })?;
            views.push(Cow::Borrowed(slice));
        }
        Ok(views)
    }
}

/// JSON text and optional binary chunk.
fn split_container(bytes: &[u8]) -> Result<(Cow<'_, [u8]>, Option<Cow<'_, [u8]>>), ParseError> {
    if bytes.starts_with(GLB_MAGIC) {
        let glb = gltf::binary::Glb::from_slice(bytes).map_err(|e| ParseError::Container {
            detail: e.to_string(),
        })?;
        Ok((glb.json, glb.bin))
    } else {
        Ok((Cow::Borrowed(bytes), None))
    }
}

/// Meshopt assets may declare a buffer with no data whose views all decode
/// from a compressed sibling.
fn is_fallback_buffer(buffer: &json::Buffer) -> bool {
    buffer.extensions.as_ref().is_some_and(|ext| {
        ["EXT_meshopt_compression", "KHR_meshopt_compression"]
            .iter()
            .filter_map(|name| ext.others.get(*name))
            .any(|value| value.get("fallback").and_then(json::Value::as_bool) == Some(true))
    })
}

struct GraphBuilder<'r, 'v> {
    root: &'r json::Root,
    views: &'r [Cow<'v, [u8]>],
    materials: HashMap<usize, Arc<Material>>,
    textures: HashMap<usize, Arc<Texture>>,
    geometries: HashMap<(usize, usize), Arc<Geometry>>,
    default_material: Arc<Material>,
    visited: Vec<bool>,
}

impl<'r, 'v> GraphBuilder<'r, 'v> {
    fn new(root: &'r json::Root, views: &'r [Cow<'v, [u8]>]) -> Self {
        Self {
            root,
            views,
            materials: HashMap::new(),
            textures: HashMap::new(),
            geometries: HashMap::new(),
            default_material: Arc::new(Material::default()),
            visited: vec![false; root.nodes.len()],
        }
    }

    fn build(&mut self) -> Result<SceneGraph, ParseError> {
        let (name, roots) = self.scene_roots()?;
        let mut scene_root = Node::new(name);
        for index in roots {
            scene_root.children.push(self.node(index)?);
        }
        Ok(SceneGraph::new(scene_root))
    }

    /// The default scene, else the first scene, else every parentless node.
    fn scene_roots(&self) -> Result<(String, Vec<usize>), ParseError> {
        let scene_index = self.root.scene.map(|s| s.value()).or_else(|| {
            if self.root.scenes.is_empty() {
                None
            } else {
                Some(0)
            }
        });

        match scene_index {
            Some(index) => {
                let scene = self.root.scenes.get(index).ok_or(ParseError::IndexOutOfRange {
                    kind: "scene",
                    index,
                    count: self.root.scenes.len(),
                })?;
                Ok((
                    scene.name.clone().unwrap_or_else(|| "Scene".to_string()),
                    scene.nodes.iter().map(|n| n.value()).collect(),
                ))
            }
            None => {
                let mut is_child = vec![false; self.root.nodes.len()];
                for node in &self.root.nodes {
                    for child in node.children.iter().flatten() {
                        if let Some(flag) = is_child.get_mut(child.value()) {
                            *flag = true;
                        }
                    }
                }
                let roots = (0..self.root.nodes.len()).filter(|&i| !is_child[i]).collect();
                Ok(("Scene".to_string(), roots))
            }
        }
    }

    fn node(&mut self, index: usize) -> Result<Node, ParseError> {
        let root = self.root;
        let source = root.nodes.get(index).ok_or(ParseError::IndexOutOfRange {
            kind: "node",
            index,
            count: root.nodes.len(),
        })?;
        if std::mem::replace(&mut self.visited[index], true) {
            return Err(ParseError::NodeCycle { node: index });
        }

        let mesh_name = source
            .mesh
            .and_then(|m| root.meshes.get(m.value()))
            .and_then(|m| m.name.clone());
        let name = source
            .name
            .clone()
            .or(mesh_name)
            .unwrap_or_else(|| format!("node_{index}"));
        let mut node = Node::new(name).with_transform(node_transform(source));

        if let Some(mesh_index) = source.mesh {
            let mut meshes = self.meshes(mesh_index.value())?.into_iter();
            node.mesh = meshes.next().map(|(_, mesh)| mesh);
            for (primitive, mesh) in meshes {
                node.children
                    .push(Node::new(format!("{}.{primitive}", node.name)).with_mesh(mesh));
            }
        }

        for child in source.children.iter().flatten() {
            node.children.push(self.node(child.value())?);
        }
        Ok(node)
    }

    /// One mesh per renderable primitive, tagged with its primitive index.
    fn meshes(&mut self, mesh_index: usize) -> Result<Vec<(usize, Mesh)>, ParseError> {
        let root = self.root;
        let mesh = root.meshes.get(mesh_index).ok_or(ParseError::IndexOutOfRange {
            kind: "mesh",
            index: mesh_index,
            count: root.meshes.len(),
        })?;

        let mut out = Vec::with_capacity(mesh.primitives.len());
        for (primitive_index, primitive) in mesh.primitives.iter().enumerate() {
            let Some(geometry) = self.geometry(mesh_index, primitive_index, primitive)? else {
                continue;
            };
            let material = match primitive.material {
                Some(index) => self.material(index.value())?,
                None => Arc::clone(&self.default_material),
            };
            out.push((primitive_index, Mesh::new(geometry, material)));
        }
        Ok(out)
    }

    fn geometry(
        &mut self,
        mesh: usize,
        primitive_index: usize,
        primitive: &json::mesh::Primitive,
    ) -> Result<Option<Arc<Geometry>>, ParseError> {
        if let Some(cached) = self.geometries.get(&(mesh, primitive_index)) {
            return Ok(Some(Arc::clone(cached)));
        }

        let mode = match primitive.mode {
            Checked::Valid(mode) => mode,
            Checked::Invalid => {
                return Err(ParseError::Unsupported(format!(
                    "mesh {mesh} primitive {primitive_index} has an invalid mode"
                )));
            }
        };
        if !matches!(
            mode,
            json::mesh::Mode::Triangles
                | json::mesh::Mode::TriangleStrip
                | json::mesh::Mode::TriangleFan
        ) {
            warn!(mesh, primitive = primitive_index, ?mode, "skipping non-triangle primitive");
            return Ok(None);
        }

        let attribute = |semantic: json::mesh::Semantic| {
            primitive
                .attributes
                .iter()
                .find(|(s, _)| matches!(s, Checked::Valid(found) if *found == semantic))
                .map(|(_, accessor)| *accessor)
        };

        let positions = attribute(json::mesh::Semantic::Positions).ok_or(
            ParseError::MissingPositions {
                mesh,
                primitive: primitive_index,
            },
        )?;
        let positions = accessor::read_vec3(self.root, self.views, positions)?;
        let vertex_count = positions.len();

        let mut normals = match attribute(json::mesh::Semantic::Normals) {
            Some(index) => accessor::read_vec3(self.root, self.views, index)?,
            None => Vec::new(),
        };
        if !normals.is_empty() && normals.len() != vertex_count {
            warn!(mesh, primitive = primitive_index, "normal count mismatch, recomputing");
            normals.clear();
        }
        let mut uvs = match attribute(json::mesh::Semantic::TexCoords(0)) {
            Some(index) => accessor::read_vec2(self.root, self.views, index)?,
            None => Vec::new(),
        };
        if !uvs.is_empty() && uvs.len() != vertex_count {
            warn!(mesh, primitive = primitive_index, "uv count mismatch, dropping");
            uvs.clear();
        }

        let indices = primitive
            .indices
            .map(|index| accessor::read_indices(self.root, self.views, index))
            .transpose()?;

        let mut geometry = Geometry {
            positions,
            normals,
            uvs,
            indices: triangulate(mode, indices, vertex_count),
        };
        geometry.validate()?;
        if geometry.normals.is_empty() {
            geometry.compute_vertex_normals();
        }

        let geometry = Arc::new(geometry);
        self.geometries
            .insert((mesh, primitive_index), Arc::clone(&geometry));
        Ok(Some(geometry))
    }

    fn material(&mut self, index: usize) -> Result<Arc<Material>, ParseError> {
        if let Some(material) = self.materials.get(&index) {
            return Ok(Arc::clone(material));
        }
        let root = self.root;
        let source = root.materials.get(index).ok_or(ParseError::IndexOutOfRange {
            kind: "material",
            index,
            count: root.materials.len(),
        })?;

        let pbr = &source.pbr_metallic_roughness;
        let [r, g, b, a] = pbr.base_color_factor.0;
        let base_color_map = pbr
            .base_color_texture
            .as_ref()
            .map(|info| self.texture(info.index.value()))
            .transpose()?
            .map(TextureSlot::new);
        let normal_map = source
            .normal_texture
            .as_ref()
            .map(|info| self.texture(info.index.value()))
            .transpose()?
            .map(TextureSlot::new);

        let material = Arc::new(Material {
            name: source.name.clone().unwrap_or_default(),
            base_color: [r, g, b],
            metalness: pbr.metallic_factor.0,
            roughness: pbr.roughness_factor.0,
            transparent: matches!(
                source.alpha_mode,
                Checked::Valid(json::material::AlphaMode::Blend)
            ),
            opacity: a,
            emissive: source.emissive_factor.0,
            base_color_map,
            normal_map,
            ..Material::default()
        });
        self.materials.insert(index, Arc::clone(&material));
        Ok(material)
    }

    fn texture(&mut self, index: usize) -> Result<Arc<Texture>, ParseError> {
        if let Some(texture) = self.textures.get(&index) {
            return Ok(Arc::clone(texture));
        }
        let root = self.root;
        let source = root.textures.get(index).ok_or(ParseError::IndexOutOfRange {
            kind: "texture",
            index,
            count: root.textures.len(),
        })?;
        let image_index = source.source.value();
        let image = root.images.get(image_index).ok_or(ParseError::IndexOutOfRange {
            kind: "image",
            index: image_index,
            count: root.images.len(),
        })?;

        let texture = Arc::new(Texture {
            name: source.name.clone().or_else(|| image.name.clone()),
            // Embedded data URIs are not useful as identifiers.
            uri: image.uri.clone().filter(|u| !uri::is_data_uri(u)),
            mime_type: image.mime_type.as_ref().map(|m| m.0.clone()),
        });
        self.textures.insert(index, Arc::clone(&texture));
        Ok(texture)
    }
}

fn node_transform(node: &json::Node) -> Transform {
    if let Some(matrix) = node.matrix {
        return Transform::from_matrix(Mat4::from_cols_array(&matrix));
    }
    Transform {
        translation: node.translation.map_or(Vec3::ZERO, Vec3::from),
        rotation: node
            .rotation
            .map_or(Quat::IDENTITY, |q| Quat::from_array(q.0).normalize()),
        scale: node.scale.map_or(Vec3::ONE, Vec3::from),
    }
}

/// Convert strips and fans into triangle lists.
fn triangulate(mode: json::mesh::Mode, indices: Option<Vec<u32>>, vertex_count: usize) -> Option<Vec<u32>> {
    let source = || -> Vec<u32> {
        match &indices {
            Some(indices) => indices.clone(),
            None => (0..vertex_count as u32).collect(),
        }
    };
    match mode {
        json::mesh::Mode::TriangleStrip => {
            let strip = source();
            Some(
                (0..strip.len().saturating_sub(2))
                    .flat_map(|i| {
                        if i % 2 == 0 {
                            [strip[i], strip[i + 1], strip[i + 2]]
                        } else {
                            [strip[i], strip[i + 2], strip[i + 1]]
                        }
                    })
                    .collect(),
            )
        }
        json::mesh::Mode::TriangleFan => {
            let fan = source();
            Some(
                (0..fan.len().saturating_sub(2))
                    .flat_map(|i| [fan[i + 1], fan[i + 2], fan[0]])
                    .collect(),
            )
        }
        _ => indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::MemoryFetcher;
    use crate::codec::{CodecError, GeometryDecoder};
    use crate::export::write_glb;

    fn quad_gltf(extra: serde_json::Value) -> serde_json::Value {
        let mut doc = serde_json::json!({
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "name": "CarBody_01", "mesh": 0, "children": [1] },
                      { "name": "Wheel_FL", "mesh": 0, "translation": [1.0, 0.0, 0.0] }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }] }],
            "materials": [{ "name": "paint", "pbrMetallicRoughness": { "baseColorFactor": [0.5, 0.5, 0.5, 1.0] } }],
            "buffers": [{ "uri": "quad.bin", "byteLength": 60 }],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 48 },
                { "buffer": 0, "byteOffset": 48, "byteLength": 12 }
            ],
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 4, "type": "VEC3" },
                { "bufferView": 1, "componentType": 5123, "count": 6, "type": "SCALAR" }
            ]
        });
        if let (Some(doc), Some(extra)) = (doc.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                doc.insert(k.clone(), v.clone());
            }
        }
        doc
    }

    fn quad_bin() -> Vec<u8> {
        let mut bin = Vec::new();
        for p in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in p {
                bin.extend_from_slice(&c.to_le_bytes());
            }
        }
        for i in [0u16, 1, 2, 0, 2, 3] {
            bin.extend_from_slice(&i.to_le_bytes());
        }
        bin
    }

    fn load(doc: &serde_json::Value, fetcher: &MemoryFetcher) -> Result<LoadedScene, LoadError> {
        let decoders = DecoderRegistry::default();
        SceneLoader::new(fetcher, &decoders)
            .load(doc.to_string().as_bytes(), &Locator::parse("models/quad.gltf"))
    }

    #[test]
    fn gltf_with_sidecar_buffer() {
        let fetcher = MemoryFetcher::new().with_asset("models/quad.bin", quad_bin());
        let loaded = load(&quad_gltf(serde_json::json!({})), &fetcher).unwrap();

        assert_eq!(loaded.meshes.len(), 2);
        let body = loaded.graph.node(&loaded.meshes[0]).unwrap();
        assert_eq!(body.name, "CarBody_01");
        let mesh = body.mesh.as_ref().unwrap();
        assert_eq!(mesh.geometry.triangle_count(), 2);
        // Missing normals are recomputed: the quad faces +Z.
        assert!(mesh.geometry.normals.iter().all(|n| (n[2] - 1.0).abs() < 1e-5));
        assert_eq!(mesh.material.name, "paint");

        // Both nodes reference mesh 0, so the geometry is shared after parsing.
        let wheel = loaded.graph.node(&loaded.meshes[1]).unwrap();
        assert!(Arc::ptr_eq(&mesh.geometry, &wheel.mesh.as_ref().unwrap().geometry));
        assert_eq!(wheel.transform.translation, Vec3::X);
    }

    #[test]
    fn missing_sidecar_is_a_fetch_error() {
        let err = load(&quad_gltf(serde_json::json!({})), &MemoryFetcher::new()).unwrap_err();
        assert!(matches!(err, LoadError::Fetch(ref e) if e.status() == Some(404)));
    }

    #[test]
    fn structural_errors() {
        let fetcher = MemoryFetcher::new().with_asset("models/quad.bin", quad_bin());

        let short = quad_gltf(serde_json::json!({ "buffers": [{ "uri": "quad.bin", "byteLength": 100 }] }));
        assert!(matches!(
            load(&short, &fetcher),
            Err(LoadError::Parse(ParseError::BufferTooShort { declared: 100, actual: 60, .. }))
        ));

        let cyclic = quad_gltf(serde_json::json!({
            "nodes": [{ "name": "a", "children": [1] }, { "name": "b", "children": [0] }]
        }));
        assert!(matches!(
            load(&cyclic, &fetcher),
            Err(LoadError::Parse(ParseError::NodeCycle { node: 0 }))
        ));

        let bad_index = quad_gltf(serde_json::json!({
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" },
                { "bufferView": 1, "componentType": 5123, "count": 6, "type": "SCALAR" }
            ]
        }));
        assert!(matches!(
            load(&bad_index, &fetcher),
            Err(LoadError::Parse(ParseError::IndexExceedsVertices { value: 3, vertex_count: 3, .. }))
        ));

        let decoders = DecoderRegistry::default();
        let garbage = SceneLoader::new(&fetcher, &decoders).load(b"{ not json", &Locator::parse("x.gltf"));
        assert!(matches!(garbage, Err(LoadError::Parse(ParseError::Json { .. }))));
        let truncated = SceneLoader::new(&fetcher, &decoders).load(b"glTF\x02\0\0\0", &Locator::parse("x.glb"));
        assert!(matches!(truncated, Err(LoadError::Parse(ParseError::Container { .. }))));
    }

    #[test]
    fn required_draco_is_a_codec_error() {
        let fetcher = MemoryFetcher::new().with_asset("models/quad.bin", quad_bin());
        let doc = quad_gltf(serde_json::json!({
            "extensionsUsed": ["KHR_draco_mesh_compression"],
            "extensionsRequired": ["KHR_draco_mesh_compression"]
        }));
        assert!(matches!(
            load(&doc, &fetcher),
            Err(LoadError::Codec(CodecError::Unsupported { .. }))
        ));
    }

    /// Copies the referenced range through unchanged.
    struct PassthroughDecoder;

    impl GeometryDecoder for PassthroughDecoder {
        fn extension(&self) -> &str {
            "EXT_meshopt_compression"
        }

        fn decode(&self, extension: &json::Value, buffers: &[Arc<[u8]>]) -> Result<Vec<u8>, CodecError> {
            let field = |name: &str| extension.get(name).and_then(json::Value::as_u64).unwrap_or(0) as usize;
            let buffer = &buffers[field("buffer")];
            let offset = field("byteOffset");
            Ok(buffer[offset..offset + field("byteLength")].to_vec())
        }
    }

    #[test]
    fn compressed_views_go_through_the_registry() {
        let fetcher = MemoryFetcher::new().with_asset("models/quad.bin", quad_bin());
        let doc = quad_gltf(serde_json::json!({
            "extensionsUsed": ["EXT_meshopt_compression"],
            "extensionsRequired": ["EXT_meshopt_compression"],
            "buffers": [
                { "uri": "quad.bin", "byteLength": 60 },
                { "byteLength": 60, "extensions": { "EXT_meshopt_compression": { "fallback": true } } }
            ],
            "bufferViews": [
                { "buffer": 1, "byteOffset": 0, "byteLength": 48,
                  "extensions": { "EXT_meshopt_compression": { "buffer": 0, "byteOffset": 0, "byteLength": 48 } } },
                { "buffer": 1, "byteOffset": 48, "byteLength": 12,
                  "extensions": { "EXT_meshopt_compression": { "buffer": 0, "byteOffset": 48, "byteLength": 12 } } }
            ]
        }));

        let decoders = DecoderRegistry::empty().with(PassthroughDecoder);
        let loaded = SceneLoader::new(&fetcher, &decoders)
            .load(doc.to_string().as_bytes(), &Locator::parse("models/quad.gltf"))
            .unwrap();
        assert_eq!(loaded.graph.triangle_count(), 4);

        // Without a decoder the fallback buffer is empty and the asset is refused up front.
        let err = SceneLoader::new(&fetcher, &DecoderRegistry::empty())
            .load(doc.to_string().as_bytes(), &Locator::parse("models/quad.gltf"))
            .unwrap_err();
        assert!(matches!(err, LoadError::Codec(CodecError::Unsupported { .. })));
    }

    #[test]
    fn meshopt_compressed_quad_loads_losslessly() {
        use crate::codec::meshopt::fixtures;

        let positions = [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]];
        let vertices = fixtures::encode_positions(&positions);
        let triangles = fixtures::encode_triangles(&[0, 1, 2, 0, 2, 3], positions.len());
        let compressed = [vertices.clone(), triangles.clone()].concat();

        let fetcher = MemoryFetcher::new().with_asset("models/quad.bin", compressed.clone());
        let doc = quad_gltf(serde_json::json!({
            "extensionsUsed": ["EXT_meshopt_compression"],
            "extensionsRequired": ["EXT_meshopt_compression"],
            "buffers": [
                { "uri": "quad.bin", "byteLength": compressed.len() },
                { "byteLength": 60, "extensions": { "EXT_meshopt_compression": { "fallback": true } } }
            ],
            "bufferViews": [
                { "buffer": 1, "byteOffset": 0, "byteLength": 48,
                  "extensions": { "EXT_meshopt_compression": {
                      "buffer": 0, "byteOffset": 0, "byteLength": vertices.len(),
                      "byteStride": 12, "count": 4, "mode": "ATTRIBUTES" } } },
                { "buffer": 1, "byteOffset": 48, "byteLength": 12,
                  "extensions": { "EXT_meshopt_compression": {
                      "buffer": 0, "byteOffset": vertices.len(), "byteLength": triangles.len(),
                      "byteStride": 2, "count": 6, "mode": "TRIANGLES" } } }
            ]
        }));

        let loaded = load(&doc, &fetcher).unwrap();
        assert_eq!(loaded.graph.triangle_count(), 4);
        let body = loaded.graph.node(&loaded.meshes[0]).unwrap();
        let geometry = &body.mesh.as_ref().unwrap().geometry;
        assert_eq!(geometry.positions, positions.to_vec());
        assert_eq!(geometry.indices, Some(vec![0, 1, 2, 0, 2, 3]));
    }

    #[test]
    fn overflowing_sizes_are_rejected() {
        let fetcher = MemoryFetcher::new().with_asset("models/quad.bin", quad_bin());

        let huge_count = quad_gltf(serde_json::json!({
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 1537228672809129302u64, "type": "VEC3" },
                { "bufferView": 1, "componentType": 5123, "count": 6, "type": "SCALAR" }
            ]
        }));
        assert!(matches!(
            load(&huge_count, &fetcher),
            Err(LoadError::Parse(ParseError::AccessorOutOfBounds { accessor: 0, needed: usize::MAX, .. }))
        ));

        let wrapping_view = quad_gltf(serde_json::json!({
            "bufferViews": [
                { "buffer": 0, "byteOffset": u64::MAX, "byteLength": 48 },
                { "buffer": 0, "byteOffset": 48, "byteLength": 12 }
            ]
        }));
        assert!(matches!(
            load(&wrapping_view, &fetcher),
            Err(LoadError::Parse(ParseError::ViewOutOfBounds { view: 0, end: usize::MAX, .. }))
        ));

        let zero_filled = quad_gltf(serde_json::json!({
            "accessors": [
                { "componentType": 5126, "count": 1537228672809129302u64, "type": "VEC3" },
                { "bufferView": 1, "componentType": 5123, "count": 6, "type": "SCALAR" }
            ]
        }));
        assert!(matches!(
            load(&zero_filled, &fetcher),
            Err(LoadError::Parse(ParseError::AccessorLayout { accessor: 0, .. }))
        ));
    }

    #[test]
    fn glb_round_trip_keeps_hierarchy() {
        let mesh = Mesh::new(
            Arc::new(Geometry::cuboid(Vec3::ONE)),
            Arc::new(Material {
                name: "Headlamp".to_string(),
                ..Material::default()
            }),
        );
        let graph = SceneGraph::new(
            Node::new("Scene").with_child(
                Node::new("Car")
                    .with_transform(Transform {
                        translation: Vec3::new(0.0, 2.0, 0.0),
                        ..Transform::IDENTITY
                    })
                    .with_child(Node::new("Headlamp_L").with_mesh(mesh)),
            ),
        );
        let mut glb = Vec::new();
        write_glb(&graph, &mut glb).unwrap();

        let decoders = DecoderRegistry::default();
        let loaded = SceneLoader::new(&MemoryFetcher::new(), &decoders)
            .load(&glb, &Locator::parse("car.glb"))
            .unwrap();
        assert_eq!(loaded.meshes.len(), 1);
        let lamp = loaded.graph.node(&loaded.meshes[0]).unwrap();
        assert_eq!(lamp.name, "Headlamp_L");
        assert_eq!(lamp.mesh.as_ref().unwrap().geometry.triangle_count(), 12);
        assert_eq!(lamp.mesh.as_ref().unwrap().material.name, "Headlamp");

        let bounds = loaded.graph.bounds().unwrap();
        assert!((bounds.center() - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn strips_and_fans_become_lists() {
        let strip = triangulate(json::mesh::Mode::TriangleStrip, None, 4).unwrap();
        assert_eq!(strip, vec![0, 1, 2, 1, 3, 2]);
        let fan = triangulate(json::mesh::Mode::TriangleFan, Some(vec![0, 1, 2, 3]), 4).unwrap();
        assert_eq!(fan, vec![1, 2, 0, 2, 3, 0]);
        assert_eq!(triangulate(json::mesh::Mode::Triangles, None, 3), None);
    }
}

//! Name-based material classification.
//!
//! Each mesh is matched against an ordered keyword table using both its node
//! name and its material name. The first class with any matching keyword
//! wins; nothing matching yields [`MaterialClass::Default`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::models::material::hex_to_linear;
use crate::models::{Material, SceneGraph, ShadingModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialClass {
    Body,
    Glass,
    Chrome,
    Interior,
    Tire,
    Headlight,
    Default,
}

impl MaterialClass {
    pub const ALL: [MaterialClass; 7] = [
        MaterialClass::Body,
        MaterialClass::Glass,
        MaterialClass::Chrome,
        MaterialClass::Interior,
        MaterialClass::Tire,
        MaterialClass::Headlight,
        MaterialClass::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialClass::Body => "body",
            MaterialClass::Glass => "glass",
            MaterialClass::Chrome => "chrome",
            MaterialClass::Interior => "interior",
            MaterialClass::Tire => "tire",
            MaterialClass::Headlight => "headlight",
            MaterialClass::Default => "default",
        }
    }
}

impl fmt::Display for MaterialClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword rules in precedence order.
pub const RULES: &[(MaterialClass, &[&str])] = &[
    (MaterialClass::Body, &["body", "car", "chassis", "paint"]),
    (MaterialClass::Glass, &["glass", "window", "windshield"]),
    (MaterialClass::Chrome, &["chrome", "metal", "steel"]),
    (MaterialClass::Interior, &["interior", "seat", "dash"]),
    (MaterialClass::Tire, &["tire", "wheel", "rubber"]),
    (MaterialClass::Headlight, &["light", "lamp"]),
];

/// Classify by node and material name. Total: every input yields a class.
pub fn classify(node_name: &str, material_name: &str) -> MaterialClass {
    let node_name = node_name.to_lowercase();
    let material_name = material_name.to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|k| node_name.contains(k) || material_name.contains(k))
        })
        .map_or(MaterialClass::Default, |(class, _)| *class)
}

/// Rebinds mesh materials to per-class presets.
pub trait MaterialClassifier: Send + Sync {
    fn classify(&self, node_name: &str, material: &Material) -> MaterialClass;

    /// Build the replacement material. Always returns a fresh instance.
    fn rebind(&self, class: MaterialClass, original: &Material) -> Material;
}

/// The keyword table plus the showroom presets.
#[derive(Debug, Clone)]
pub struct PresetClassifier {
    paint: [f32; 3],
    headlight_intensity: f32,
}

impl Default for PresetClassifier {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

const GLASS_TINT: [f32; 3] = [0.014_444, 0.021_219, 0.051_269];
const CHROME: [f32; 3] = [0.791_298, 0.791_298, 0.791_298];
const INTERIOR: [f32; 3] = [0.014_444, 0.014_444, 0.014_444];
const TIRE: [f32; 3] = [0.005_182, 0.005_182, 0.005_182];
const FALLBACK_GREY: [f32; 3] = [0.080_220, 0.080_220, 0.080_220];
const WARM_WHITE: [f32; 3] = [1.0, 1.0, 0.745_404];

impl PresetClassifier {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            paint: hex_to_linear(&config.body_paint).unwrap_or([0.686, 0.010, 0.038]),
            headlight_intensity: config.headlight_intensity.clamp(0.5, 1.0),
        }
    }
}

impl MaterialClassifier for PresetClassifier {
    fn classify(&self, node_name: &str, material: &Material) -> MaterialClass {
        classify(node_name, &material.name)
    }

    fn rebind(&self, class: MaterialClass, original: &Material) -> Material {
        let base = Material {
            name: original.name.clone(),
            shading: ShadingModel::Standard,
            base_color_map: original.base_color_map.as_ref().map(|m| m.with_anisotropy(16)),
            normal_map: original.normal_map.clone(),
            env_map_intensity: original.env_map_intensity,
            ..Material::default()
        };
        match class {
            MaterialClass::Body => Material {
                base_color: self.paint,
                metalness: 0.9,
                roughness: 0.15,
                env_map_intensity: 2.0,
                ..base
            },
            MaterialClass::Glass => Material {
                base_color: GLASS_TINT,
                metalness: 0.8,
                roughness: 0.1,
                transparent: true,
                opacity: 0.7,
                env_map_intensity: 1.5,
                ..base
            },
            MaterialClass::Chrome => Material {
                base_color: CHROME,
                metalness: 1.0,
                roughness: 0.03,
                env_map_intensity: 3.0,
                ..base
            },
            MaterialClass::Interior => Material {
                base_color: INTERIOR,
                metalness: 0.1,
                roughness: 0.8,
                ..base
            },
            MaterialClass::Tire => Material {
                base_color: TIRE,
                metalness: 0.0,
                roughness: 1.0,
                ..base
            },
            MaterialClass::Headlight => Material {
                base_color: [1.0, 1.0, 1.0],
                metalness: 0.8,
                roughness: 0.1,
                emissive: WARM_WHITE,
                emissive_intensity: self.headlight_intensity,
                ..base
            },
            MaterialClass::Default => Material {
                base_color: if original.name.is_empty() && original.base_color == [1.0; 3] {
                    FALLBACK_GREY
                } else {
                    original.base_color
                },
                metalness: 0.7,
                roughness: 0.2,
                ..base
            },
        }
    }
}

/// Per-class mesh counts from one classification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassSummary {
    pub counts: std::collections::BTreeMap<MaterialClass, usize>,
}

impl ClassSummary {
    pub fn get(&self, class: MaterialClass) -> usize {
        self.counts.get(&class).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Classify every mesh and give it its own freshly built material.
pub fn classify_scene(graph: &mut SceneGraph, classifier: &dyn MaterialClassifier) -> ClassSummary {
    let mut summary = ClassSummary::default();
    graph.visit_meshes_mut(|name, mesh, _| {
        let class = classifier.classify(name, &mesh.material);
        mesh.material = Arc::new(classifier.rebind(class, &mesh.material));
        mesh.class = Some(class);
        *summary.counts.entry(class).or_default() += 1;
    });
    debug!(counts = ?summary.counts, "classified materials");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Geometry, Mesh, Node, Texture, TextureSlot};
    use glam::Vec3;

    #[test]
    fn showroom_part_names() {
        let classes: Vec<_> = ["CarBody_01", "Windshield_Front", "Wheel_FL", "Headlamp_L"]
            .iter()
            .map(|name| classify(name, ""))
            .collect();
        assert_eq!(
            classes,
            vec![
                MaterialClass::Body,
                MaterialClass::Glass,
                MaterialClass::Tire,
                MaterialClass::Headlight
            ]
        );
    }

    #[test]
    fn first_match_wins() {
        assert_eq!(classify("chrome_light", ""), MaterialClass::Chrome);
        assert_eq!(classify("seat", "Paint"), MaterialClass::Body);
        assert_eq!(classify("Part_07", "RUBBER"), MaterialClass::Tire);
    }

    #[test]
    fn classification_is_total() {
        for name in ["", "   ", "ÄÖÜ ß", "车身", "🚗", "MiXeD_CaSe_SeAt", "\0"] {
            let class = classify(name, name);
            assert!(MaterialClass::ALL.contains(&class));
        }
        assert_eq!(classify("", ""), MaterialClass::Default);
    }

    #[test]
    fn materials_are_exclusive_after_classification() {
        let shared = Arc::new(Material {
            name: "body_paint".to_string(),
            base_color_map: Some(TextureSlot::new(Arc::new(Texture::default()))),
            ..Material::default()
        });
        let geometry = Arc::new(Geometry::cuboid(Vec3::ONE));
        let mut graph = SceneGraph::new(
            Node::new("root")
                .with_child(Node::new("door_l").with_mesh(Mesh::new(geometry.clone(), shared.clone())))
                .with_child(Node::new("door_r").with_mesh(Mesh::new(geometry.clone(), shared.clone())))
                .with_child(Node::new("hood").with_mesh(Mesh::new(geometry, shared.clone()))),
        );

        let summary = classify_scene(&mut graph, &PresetClassifier::default());
        assert_eq!(summary.get(MaterialClass::Body), 3);
        assert_eq!(summary.total(), 3);

        let mut materials = Vec::new();
        graph.visit(|_, node, _| materials.extend(node.mesh.as_ref().map(|m| m.material.clone())));
        for (i, a) in materials.iter().enumerate() {
            assert!(!Arc::ptr_eq(a, &shared));
            for b in &materials[i + 1..] {
                assert!(!Arc::ptr_eq(a, b));
            }
        }

        // Texture images are carried over by reference, sampler upgraded.
        let original = shared.base_color_map.as_ref().unwrap();
        let rebound = materials[0].base_color_map.as_ref().unwrap();
        assert!(Arc::ptr_eq(&original.texture, &rebound.texture));
        assert_eq!(rebound.anisotropy, 16);
    }

    #[test]
    fn presets() {
        let classifier = PresetClassifier::default();
        let original = Material::default();

        let glass = classifier.rebind(MaterialClass::Glass, &original);
        assert!(glass.transparent);
        assert_eq!(glass.opacity, 0.7);

        let chrome = classifier.rebind(MaterialClass::Chrome, &original);
        assert_eq!((chrome.metalness, chrome.roughness), (1.0, 0.03));

        let lamp = classifier.rebind(MaterialClass::Headlight, &original);
        assert!(lamp.is_emissive());
        assert!((0.5..=1.0).contains(&lamp.emissive_intensity));

        let tinted = Material {
            name: "trim".to_string(),
            base_color: [0.2, 0.3, 0.4],
            ..Material::default()
        };
        let fallback = classifier.rebind(MaterialClass::Default, &tinted);
        assert_eq!(fallback.env_map_intensity, tinted.env_map_intensity);
        assert_eq!(fallback.base_color, [0.2, 0.3, 0.4]);
        assert_eq!((fallback.metalness, fallback.roughness), (0.7, 0.2));
        assert!(!fallback.is_emissive());
    }

    #[test]
    fn prepared_sampling_and_environment_survive_rebinding() {
        let prepared = Material {
            env_map_intensity: 0.8,
            base_color_map: Some(TextureSlot::new(Arc::new(Texture::default())).with_anisotropy(4)),
            normal_map: Some(TextureSlot::new(Arc::new(Texture::default())).with_anisotropy(4)),
            ..Material::default()
        };
        let classifier = PresetClassifier::default();

        let tire = classifier.rebind(MaterialClass::Tire, &prepared);
        assert_eq!(tire.env_map_intensity, 0.8);
        assert_eq!(tire.base_color_map.as_ref().unwrap().anisotropy, 16);
        assert_eq!(tire.normal_map.as_ref().unwrap().anisotropy, 4);

        let body = classifier.rebind(MaterialClass::Body, &prepared);
        assert_eq!(body.env_map_intensity, 2.0);
    }
}

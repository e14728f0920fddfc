use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Tuning for the load pipeline. Every field has a default, so a config file
/// only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Largest side of the scene after normalization.
    pub canonical_size: f32,
    pub minimum_vertex_floor: usize,
    pub build_lods: bool,
    pub lod_distances: [f32; 3],
    /// Reductions for the medium and low levels.
    pub lod_reductions: [f32; 2],
    /// `#rrggbb`
    pub body_paint: String,
    pub headlight_intensity: f32,
    /// Meshes whose world-space extent exceeds this cast shadows.
    pub shadow_size_threshold: f32,
    pub culling_padding: f32,
    /// Probe the asset before fetching it.
    pub probe: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            canonical_size: 2.0,
            minimum_vertex_floor: crate::optimize::MINIMUM_FLOOR,
            build_lods: true,
            lod_distances: [0.0, 10.0, 30.0],
            lod_reductions: [0.3, 0.7],
            body_paint: "#d81937".to_string(),
            headlight_intensity: 0.5,
            shadow_size_threshold: 0.5,
            culling_padding: 1.1,
            probe: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerConfig {
    pub camera_position: [f32; 3],
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub auto_rotate: bool,
    pub auto_rotate_speed: f32,
    pub damping: f32,
    /// Radians per second.
    pub idle_spin: f32,
    pub idle_spin_hovered: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            camera_position: [3.5, 1.8, 3.5],
            fov: 35.0,
            near: 0.1,
            far: 100.0,
            min_polar_angle: PI / 6.0,
            max_polar_angle: PI / 1.8,
            min_distance: 1.8,
            max_distance: 8.0,
            auto_rotate: false,
            auto_rotate_speed: 0.5,
            damping: 0.1,
            idle_spin: 0.01,
            idle_spin_hovered: 0.005,
        }
    }
}

/// Both sections of a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub viewer: ViewerConfig,
}

impl Config {
    pub fn from_json(path: &Path, text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &text)
    }
}

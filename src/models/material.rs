use std::sync::Arc;

/// A texture image referenced by one or more materials. Pixel data is left to
/// the renderer; this only records where the image lives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Texture {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub mime_type: Option<String>,
}

/// A material's use of a texture: the shared image plus per-material sampler state.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureSlot {
    pub texture: Arc<Texture>,
    pub anisotropy: u8,
}

impl TextureSlot {
    pub fn new(texture: Arc<Texture>) -> Self {
        Self {
            texture,
            anisotropy: 1,
        }
    }

    /// Same image, different sampler settings.
    pub fn with_anisotropy(&self, anisotropy: u8) -> Self {
        Self {
            texture: Arc::clone(&self.texture),
            anisotropy,
        }
    }
}

/// Lighting model, from most to least expensive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShadingModel {
    Standard,
    Phong { shininess: f32 },
    Lambert,
}

impl ShadingModel {
    pub fn label(&self) -> &'static str {
        match self {
            ShadingModel::Standard => "standard",
            ShadingModel::Phong { .. } => "phong",
            ShadingModel::Lambert => "lambert",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub shading: ShadingModel,
    /// Linear RGB.
    pub base_color: [f32; 3],
    pub metalness: f32,
    pub roughness: f32,
    pub transparent: bool,
    pub opacity: f32,
    pub emissive: [f32; 3],
    pub emissive_intensity: f32,
    pub env_map_intensity: f32,
    pub base_color_map: Option<TextureSlot>,
    pub normal_map: Option<TextureSlot>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            shading: ShadingModel::Standard,
            base_color: [1.0, 1.0, 1.0],
            metalness: 1.0,
            roughness: 1.0,
            transparent: false,
            opacity: 1.0,
            emissive: [0.0, 0.0, 0.0],
            emissive_intensity: 1.0,
            env_map_intensity: 1.0,
            base_color_map: None,
            normal_map: None,
        }
    }
}

impl Material {
    /// Every distinct texture image this material references.
    pub fn textures(&self) -> impl Iterator<Item = &Arc<Texture>> {
        self.base_color_map
            .iter()
            .chain(self.normal_map.iter())
            .map(|slot| &slot.texture)
    }

    pub fn is_emissive(&self) -> bool {
        self.emissive_intensity > 0.0 && self.emissive.iter().any(|&c| c > 0.0)
    }
}

/// Parse `#rrggbb` into linear RGB.
pub fn hex_to_linear(hex: &str) -> Option<[f32; 3]> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| -> Option<f32> {
        let value = u8::from_str_radix(&digits[range], 16).ok()?;
        Some(srgb_to_linear(value as f32 / 255.0))
    };
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

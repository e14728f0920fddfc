use glam::Vec3;

#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    pub name: &'static str,
    pub position: Vec3,
    /// sRGB, 0..1.
    pub color: [f32; 3],
    pub intensity: f32,
    /// Cone half-angle in radians.
    pub angle: f32,
    pub penumbra: f32,
    /// Zero means unlimited range.
    pub distance: f32,
    pub cast_shadow: bool,
    pub shadow_map_size: u32,
    pub shadow_bias: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: [f32; 3],
    pub intensity: f32,
}

/// Studio three-point lighting plus a dim ambient term.
#[derive(Debug, Clone, PartialEq)]
pub struct LightRig {
    pub key: SpotLight,
    pub fill: SpotLight,
    pub rim: SpotLight,
    pub ambient: AmbientLight,
}

const KEY_ORIGIN: Vec3 = Vec3::new(5.0, 5.0, 0.0);
/// Radians of sway per second of elapsed time.
const KEY_SWAY_RATE: f32 = 0.1;
const KEY_SWAY_AMPLITUDE: f32 = 0.2;

impl Default for LightRig {
    fn default() -> Self {
        Self::studio()
    }
}

impl LightRig {
    pub fn studio() -> Self {
        Self {
            key: SpotLight {
                name: "key",
                position: KEY_ORIGIN,
                color: [1.0, 1.0, 1.0],
                intensity: 1.0,
                angle: 0.5,
                penumbra: 0.8,
                distance: 20.0,
                cast_shadow: true,
                shadow_map_size: 1024,
                shadow_bias: -0.0001,
            },
            fill: SpotLight {
                name: "fill",
                position: Vec3::new(-5.0, 3.0, 0.0),
                // #a0c0ff
                color: [160.0 / 255.0, 192.0 / 255.0, 1.0],
                intensity: 0.5,
                angle: 0.7,
                penumbra: 0.5,
                distance: 0.0,
                cast_shadow: false,
                shadow_map_size: 0,
                shadow_bias: 0.0,
            },
            rim: SpotLight {
                name: "rim",
                position: Vec3::new(0.0, 5.0, -5.0),
                // #ffe0b0
                color: [1.0, 224.0 / 255.0, 176.0 / 255.0],
                intensity: 0.7,
                angle: 0.5,
                penumbra: 0.5,
                distance: 0.0,
                cast_shadow: false,
                shadow_map_size: 0,
                shadow_bias: 0.0,
            },
            ambient: AmbientLight {
                color: [1.0, 1.0, 1.0],
                intensity: 0.1,
            },
        }
    }

    pub fn spots(&self) -> [&SpotLight; 3] {
        [&self.key, &self.fill, &self.rim]
    }

    /// Sway the key light on a small circle around its origin.
    pub fn animate(&mut self, elapsed: f32) {
        let (sin, cos) = (elapsed * KEY_SWAY_RATE).sin_cos();
        self.key.position.x = KEY_ORIGIN.x + sin * KEY_SWAY_AMPLITUDE;
        self.key.position.z = KEY_ORIGIN.z + cos * KEY_SWAY_AMPLITUDE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_key_light_casts_shadows() {
        let rig = LightRig::studio();
        let casters: Vec<_> = rig.spots().iter().filter(|l| l.cast_shadow).map(|l| l.name).collect();
        assert_eq!(casters, vec!["key"]);
        assert_eq!(rig.ambient.intensity, 0.1);
    }

    #[test]
    fn key_light_sways_near_origin() {
        let mut rig = LightRig::studio();
        for step in 0..200 {
            rig.animate(step as f32 * 0.5);
            let offset = rig.key.position - KEY_ORIGIN;
            assert!((offset.length() - KEY_SWAY_AMPLITUDE).abs() < 1e-4);
            assert_eq!(offset.y, 0.0);
        }
        assert_eq!(rig.fill, LightRig::studio().fill);
    }
}

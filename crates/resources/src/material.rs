//! Material descriptions.

use glam::{Vec3, Vec4};

/// How a material's alpha channel is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AlphaMode {
    /// Alpha is ignored.
    #[default]
    Opaque,
    /// Fragments below `alpha_cutoff` are discarded.
    Mask,
    /// Alpha-blended over what is already drawn.
    Blend,
}

impl AlphaMode {
    /// Numeric code the shader compares against.
    pub fn shader_code(self) -> u32 {
        match self {
            AlphaMode::Opaque => 0,
            AlphaMode::Mask => 1,
            AlphaMode::Blend => 2,
        }
    }
}

/// Texture slots of a material. Each entry indexes the model's texture list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialTextures {
    pub base_color: Option<usize>,
    pub metallic_roughness: Option<usize>,
    pub normal: Option<usize>,
    pub occlusion: Option<usize>,
    pub emissive: Option<usize>,
}

impl MaterialTextures {
    /// Every referenced texture index, in slot order.
    pub fn referenced(&self) -> impl Iterator<Item = usize> {
        [
            self.base_color,
            self.metallic_roughness,
            self.normal,
            self.occlusion,
            self.emissive,
        ]
        .into_iter()
        .flatten()
    }
}

/// Metallic-roughness material factors and texture references.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialData {
    pub name: String,
    pub base_color_factor: Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub emissive_factor: Vec3,
    pub normal_scale: f32,
    pub occlusion_strength: f32,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub textures: MaterialTextures,
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            name: String::from("default"),
            base_color_factor: Vec4::ONE,
            metallic_factor: 0.0,
            roughness_factor: 0.5,
            emissive_factor: Vec3::ZERO,
            normal_scale: 1.0,
            occlusion_strength: 1.0,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            textures: MaterialTextures::default(),
        }
    }
}

impl MaterialData {
    #[inline]
    pub fn is_blended(&self) -> bool {
        self.alpha_mode == AlphaMode::Blend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_material_is_opaque_white() {
        let material = MaterialData::default();
        assert_eq!(material.base_color_factor, Vec4::ONE);
        assert_eq!(material.alpha_mode, AlphaMode::Opaque);
        assert!(!material.is_blended());
        assert_eq!(material.textures.referenced().count(), 0);
    }

    #[test]
    fn test_referenced_textures_in_slot_order() {
        let textures = MaterialTextures {
            base_color: Some(2),
            normal: Some(0),
            emissive: Some(1),
            ..Default::default()
        };
        assert_eq!(textures.referenced().collect::<Vec<_>>(), vec![2, 0, 1]);
    }

    #[test]
    fn test_alpha_mode_codes() {
        assert_eq!(AlphaMode::Opaque.shader_code(), 0);
        assert_eq!(AlphaMode::Mask.shader_code(), 1);
        assert_eq!(AlphaMode::Blend.shader_code(), 2);
    }
}

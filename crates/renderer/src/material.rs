//! Material descriptor sets and fallback textures.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use lantern_resources::{Filter, MaterialData, MaterialTextures, SamplerData, WrapMode};
use lantern_rhi::buffer::{Buffer, BufferUsage};
use lantern_rhi::command::CommandPool;
use lantern_rhi::descriptor::{DescriptorAllocation, DescriptorPool, DescriptorWriter};
use lantern_rhi::device::Device;
use lantern_rhi::texture::{SamplerInfo, Texture};
use lantern_rhi::{RhiError, RhiResult};

use crate::registry::{MATERIAL_TEXTURE_SLOTS, sampler_binding, texture_binding};
use crate::ubo::MaterialUbo;

/// Texture slots in binding order.
pub fn texture_slots(textures: &MaterialTextures) -> [Option<usize>; MATERIAL_TEXTURE_SLOTS] {
    [
        textures.base_color,
        textures.metallic_roughness,
        textures.normal,
        textures.occlusion,
        textures.emissive,
    ]
}

/// Which fallback fills an empty slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    White,
    Black,
    FlatNormal,
}

/// Fallback for each slot, in binding order.
pub const SLOT_FALLBACKS: [Fallback; MATERIAL_TEXTURE_SLOTS] = [
    Fallback::White,
    Fallback::White,
    Fallback::FlatNormal,
    Fallback::White,
    Fallback::Black,
];

/// Converts importer sampler parameters to the RHI form.
pub fn sampler_info(data: &SamplerData) -> SamplerInfo {
    fn filter(filter: Filter) -> vk::Filter {
        match filter {
            Filter::Nearest => vk::Filter::NEAREST,
            Filter::Linear => vk::Filter::LINEAR,
        }
    }
    fn address(wrap: WrapMode) -> vk::SamplerAddressMode {
        match wrap {
            WrapMode::Repeat => vk::SamplerAddressMode::REPEAT,
            WrapMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            WrapMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        }
    }

    SamplerInfo {
        mag_filter: filter(data.mag_filter),
        min_filter: filter(data.min_filter),
        address_u: address(data.wrap_u),
        address_v: address(data.wrap_v),
    }
}

/// 1x1 textures bound to material slots the model leaves empty.
pub struct FallbackTextures {
    white: Texture,
    black: Texture,
    flat_normal: Texture,
}

impl FallbackTextures {
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let white = Texture::solid(device.clone(), pool, [255, 255, 255, 255])?;
        let black = Texture::solid(device.clone(), pool, [0, 0, 0, 255])?;
        let flat_normal = Texture::solid(device, pool, [128, 128, 255, 255])?;
        debug!("Created fallback textures");
        Ok(Self {
            white,
            black,
            flat_normal,
        })
    }

    pub fn get(&self, fallback: Fallback) -> &Texture {
        match fallback {
            Fallback::White => &self.white,
            Fallback::Black => &self.black,
            Fallback::FlatNormal => &self.flat_normal,
        }
    }
}

/// Uniform buffers and descriptor sets of a model's materials.
///
/// Set `i` belongs to material `i`; when some primitive has no material an
/// extra default material is appended.
pub struct MaterialSets {
    uniforms: Vec<Buffer>,
    materials: Vec<MaterialData>,
    sets: DescriptorAllocation,
}

impl MaterialSets {
    /// Creates one set per material and writes its uniform and textures.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidScene`] if a material references a texture the
    /// model does not have; buffer and allocation failures otherwise.
    pub fn new(
        device: &Arc<Device>,
        pool: &Arc<DescriptorPool>,
        layout: vk::DescriptorSetLayout,
        mut materials: Vec<MaterialData>,
        needs_default: bool,
        textures: &[Texture],
        fallback: &FallbackTextures,
    ) -> RhiResult<Self> {
        if needs_default {
            materials.push(MaterialData::default());
        }

        let layouts = vec![layout; materials.len()];
        let sets = DescriptorPool::allocate(pool, &layouts)?;

        let mut uniforms = Vec::with_capacity(materials.len());
        let mut writer = DescriptorWriter::new();
        for (material, &set) in materials.iter().zip(sets.sets()) {
            let uniform = Buffer::new(
                device.clone(),
                BufferUsage::Uniform,
                MaterialUbo::SIZE as vk::DeviceSize,
            )?;
            uniform.write_pod(&MaterialUbo::from_material(material))?;
            writer = writer.uniform_buffer(set, 0, uniform.handle(), uniform.size());

            for (slot, texture) in texture_slots(&material.textures).into_iter().enumerate() {
                let texture = match texture {
                    Some(index) => textures.get(index).ok_or_else(|| {
                        RhiError::InvalidScene(format!(
                            "material '{}' references missing texture {}",
                            material.name, index
                        ))
                    })?,
                    None => fallback.get(SLOT_FALLBACKS[slot]),
                };
                writer = writer
                    .sampled_image(set, texture_binding(slot), texture.view())
                    .sampler(set, sampler_binding(slot), texture.sampler());
            }
            uniforms.push(uniform);
        }

        debug!(
            "Writing {} descriptor(s) for {} material set(s)",
            writer.len(),
            materials.len()
        );
        writer.submit(device);

        Ok(Self {
            uniforms,
            materials,
            sets,
        })
    }

    /// Index of the set a primitive with `material` binds.
    pub fn set_index(&self, material: Option<usize>) -> usize {
        material.unwrap_or(self.materials.len().saturating_sub(1))
    }

    #[inline]
    pub fn set(&self, index: usize) -> Option<vk::DescriptorSet> {
        self.sets.sets().get(index).copied()
    }

    #[inline]
    pub fn material(&self, index: usize) -> Option<&MaterialData> {
        self.materials.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.uniforms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.uniforms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_order_matches_bindings() {
        let textures = MaterialTextures {
            base_color: Some(0),
            metallic_roughness: Some(1),
            normal: Some(2),
            occlusion: Some(3),
            emissive: Some(4),
        };
        assert_eq!(
            texture_slots(&textures),
            [Some(0), Some(1), Some(2), Some(3), Some(4)]
        );
    }

    #[test]
    fn test_fallbacks_per_slot() {
        assert_eq!(SLOT_FALLBACKS[0], Fallback::White);
        assert_eq!(SLOT_FALLBACKS[2], Fallback::FlatNormal);
        assert_eq!(SLOT_FALLBACKS[4], Fallback::Black);
    }

    #[test]
    fn test_sampler_info_conversion() {
        let info = sampler_info(&SamplerData {
            mag_filter: Filter::Nearest,
            min_filter: Filter::Linear,
            wrap_u: WrapMode::ClampToEdge,
            wrap_v: WrapMode::MirroredRepeat,
        });
        assert_eq!(info.mag_filter, vk::Filter::NEAREST);
        assert_eq!(info.min_filter, vk::Filter::LINEAR);
        assert_eq!(info.address_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.address_v, vk::SamplerAddressMode::MIRRORED_REPEAT);
    }
}

//! Sampled 2D textures.
//!
//! [`Texture::from_rgba8`] uploads tightly packed RGBA8 pixels through a
//! staging buffer, transitions the image to `SHADER_READ_ONLY_OPTIMAL` and
//! creates a sampler from [`SamplerInfo`].

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc, layout_barrier};

/// Texel format of uploaded textures.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Sampler filtering and addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerInfo {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_u: vk::SamplerAddressMode,
    pub address_v: vk::SamplerAddressMode,
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_u: vk::SamplerAddressMode::REPEAT,
            address_v: vk::SamplerAddressMode::REPEAT,
        }
    }
}

/// Byte length of a `width` x `height` RGBA8 image.
pub fn rgba8_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

/// Image, view and sampler ready for descriptor binding.
pub struct Texture {
    image: Image,
    sampler: vk::Sampler,
    device: Arc<Device>,
}

impl Texture {
    pub fn from_rgba8(
        device: Arc<Device>,
        pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
        sampler_info: SamplerInfo,
    ) -> RhiResult<Self> {
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidResource(format!(
                "Texture dimensions must be greater than 0, got {width}x{height}"
            )));
        }
        if pixels.len() != rgba8_len(width, height) {
            return Err(RhiError::InvalidResource(format!(
                "Texture {}x{} expects {} bytes, got {}",
                width,
                height,
                rgba8_len(width, height),
                pixels.len()
            )));
        }

        let extent = vk::Extent2D { width, height };
        let image = Image::new(
            device.clone(),
            ImageDesc {
                extent,
                format: TEXTURE_FORMAT,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::COLOR,
            },
            "texture",
        )?;

        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        };

        pool.one_shot(|cmd| {
            let (src, dst, to_transfer) = layout_barrier(
                image.handle(),
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            cmd.pipeline_barrier(src, dst, &[to_transfer]);

            cmd.copy_buffer_to_image(staging.handle(), image.handle(), &[region]);

            let (src, dst, to_shader) = layout_barrier(
                image.handle(),
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
            cmd.pipeline_barrier(src, dst, &[to_shader]);
        })?;

        let sampler = create_sampler(&device, &sampler_info)?;

        debug!("Created {}x{} texture", width, height);

        Ok(Self {
            image,
            sampler,
            device,
        })
    }

    /// 1x1 texture of a single color.
    pub fn solid(device: Arc<Device>, pool: &CommandPool, rgba: [u8; 4]) -> RhiResult<Self> {
        Self::from_rgba8(device, pool, 1, 1, &rgba, SamplerInfo::default())
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
    }
}

fn create_sampler(device: &Device, info: &SamplerInfo) -> RhiResult<vk::Sampler> {
    let anisotropy = device.sampler_anisotropy();
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(info.mag_filter)
        .min_filter(info.min_filter)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(info.address_u)
        .address_mode_v(info.address_v)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .mip_lod_bias(0.0)
        .anisotropy_enable(anisotropy.is_some())
        .max_anisotropy(anisotropy.unwrap_or(1.0))
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .min_lod(0.0)
        .max_lod(0.0)
        .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
        .unnormalized_coordinates(false);

    Ok(unsafe { device.handle().create_sampler(&create_info, None)? })
}

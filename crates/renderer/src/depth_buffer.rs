//! Depth attachment owned alongside the swapchain.
//!
//! The render pass moves the image from `UNDEFINED` to
//! `DEPTH_STENCIL_ATTACHMENT_OPTIMAL` and clears it every frame, so no
//! explicit barrier is recorded here. The buffer is rebuilt whenever the
//! swapchain is.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lantern_rhi::device::Device;
//! use lantern_rhi::vk;
//! use lantern_renderer::depth_buffer::{DepthBuffer, DEFAULT_DEPTH_FORMAT};
//!
//! # fn example(device: Arc<Device>) -> lantern_rhi::RhiResult<()> {
//! let extent = vk::Extent2D { width: 1920, height: 1080 };
//! let depth = DepthBuffer::new(device, extent, DEFAULT_DEPTH_FORMAT)?;
//! assert_eq!(depth.extent(), extent);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use lantern_rhi::device::Device;
use lantern_rhi::image::{Image, ImageDesc};
use lantern_rhi::{RhiError, RhiResult};

/// Default depth format (32-bit float, no stencil).
pub const DEFAULT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Whether `format` has a depth component.
pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Aspect flags a view of `format` must use.
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

/// Device-local depth image and view.
pub struct DepthBuffer {
    image: Image,
}

impl DepthBuffer {
    /// Creates a depth buffer covering `extent`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidResource`] for a non-depth format or an
    /// empty extent, and propagates image, allocation or view failures.
    pub fn new(device: Arc<Device>, extent: vk::Extent2D, format: vk::Format) -> RhiResult<Self> {
        if !is_depth_format(format) {
            return Err(RhiError::InvalidResource(format!(
                "{format:?} is not a depth format"
            )));
        }

        let image = Image::new(
            device,
            ImageDesc {
                extent,
                format,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                aspect: depth_aspect(format),
            },
            "depth_buffer",
        )?;

        info!(
            "Created depth buffer: {}x{} ({:?})",
            extent.width, extent.height, format
        );

        Ok(Self { image })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        let extent = self.image.extent();
        debug!("Destroying depth buffer {}x{}", extent.width, extent.height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format_is_depth() {
        assert!(is_depth_format(DEFAULT_DEPTH_FORMAT));
        assert_eq!(
            depth_aspect(DEFAULT_DEPTH_FORMAT),
            vk::ImageAspectFlags::DEPTH
        );
    }

    #[test]
    fn test_color_formats_rejected() {
        assert!(!is_depth_format(vk::Format::B8G8R8A8_UNORM));
        assert!(!is_depth_format(vk::Format::R8G8B8A8_UNORM));
    }

    #[test]
    fn test_stencil_formats_include_stencil_aspect() {
        let aspect = depth_aspect(vk::Format::D24_UNORM_S8_UINT);
        assert!(aspect.contains(vk::ImageAspectFlags::DEPTH));
        assert!(aspect.contains(vk::ImageAspectFlags::STENCIL));
    }
}

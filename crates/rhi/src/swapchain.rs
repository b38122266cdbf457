//! Swapchain management.
//!
//! [`Swapchain`] owns the presentable images, one view per image and,
//! once bound, one framebuffer per image. It is never resized in place:
//! the renderer drops it and builds a new one when the surface goes stale.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use lantern_rhi::{device::Device, instance::Instance, render_pass::RenderPass, surface::Surface};
//! # fn demo(instance: &Instance, device: Arc<Device>, surface: &Surface, render_pass: &RenderPass)
//! #     -> lantern_rhi::RhiResult<()> {
//! use lantern_rhi::swapchain::Swapchain;
//!
//! let mut swapchain = Swapchain::new(instance, device, surface, (1280, 720))?;
//! swapchain.create_framebuffers(render_pass, None)?;
//! assert!(swapchain.is_consistent());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::RhiError;
use crate::framebuffer::{Framebuffer, attachment_sets};
use crate::instance::Instance;
use crate::render_pass::{RenderPass, RenderPassGeneration};
use crate::surface::Surface;

/// Format chosen when the surface declares no preference.
pub const DEFAULT_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support for an adapter and surface.
    ///
    /// # Errors
    ///
    /// Fails if any query fails or if the format or present-mode list is
    /// empty; the adapter is then unusable with this surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        let details = Self {
            capabilities,
            formats,
            present_modes,
        };
        details.ensure_adequate()?;

        debug!(
            "Swapchain support: {} formats, {} present modes, image count {}..{}",
            details.formats.len(),
            details.present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(details)
    }

    /// At least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// Everything a swapchain for `drawable_size` would be created with.
    pub fn plan(&self, drawable_size: (u32, u32)) -> SwapchainPlan {
        SwapchainPlan {
            surface_format: choose_surface_format(&self.formats),
            present_mode: choose_present_mode(&self.present_modes),
            extent: choose_extent(&self.capabilities, drawable_size.0, drawable_size.1),
            image_count: determine_image_count(&self.capabilities),
        }
    }

    fn ensure_adequate(&self) -> Result<(), RhiError> {
        if self.formats.is_empty() {
            return Err(RhiError::SwapchainError("surface reports no formats".into()));
        }
        if self.present_modes.is_empty() {
            return Err(RhiError::SwapchainError(
                "surface reports no present modes".into(),
            ));
        }
        Ok(())
    }
}

/// Vulkan swapchain wrapper.
///
/// `images`, `image_views` and (once bound) `framebuffers` always have the
/// same length.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<Framebuffer>,
    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a swapchain for `surface`.
    ///
    /// # Arguments
    ///
    /// * `instance` - The instance the surface belongs to
    /// * `device` - A presenting logical device
    /// * `surface` - The window surface
    /// * `drawable_size` - Window size in pixels, used when the surface
    ///   leaves the extent up to the application
    ///
    /// # Errors
    ///
    /// Returns an error if the surface queries fail, the surface is
    /// inadequate, or swapchain / image view creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: &Surface,
        drawable_size: (u32, u32),
    ) -> Result<Self, RhiError> {
        if !device.is_presenting() {
            return Err(RhiError::SwapchainError(
                "device was created without swapchain support".into(),
            ));
        }

        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface.handle(), surface.loader())?;

        let SwapchainPlan {
            surface_format,
            present_mode,
            extent,
            image_count,
        } = support.plan(drawable_size);

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            image_count
        );

        let queue_families = device.queue_families();
        let family_indices: Vec<u32> = queue_families.unique_families();
        let (sharing_mode, shared_families) = if family_indices.len() > 1 {
            debug!("Using CONCURRENT sharing across families {:?}", family_indices);
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| RhiError::SwapchainError(format!("create_swapchain: {e}")))?
        };

        // From here on Drop cleans up whatever was created.
        let mut this = Self {
            device,
            swapchain_loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            format: surface_format.format,
            color_space: surface_format.color_space,
            extent,
            present_mode,
        };

        this.images = unsafe { this.swapchain_loader.get_swapchain_images(swapchain)? };
        this.create_image_views()?;
        info!("Swapchain created with {} images", this.images.len());

        Ok(this)
    }

    /// Builds one framebuffer per image view for `render_pass`.
    ///
    /// Any framebuffers from a previous render pass are destroyed first.
    /// Must be called again whenever the render pass is recreated.
    pub fn create_framebuffers(
        &mut self,
        render_pass: &RenderPass,
        depth_view: Option<vk::ImageView>,
    ) -> Result<(), RhiError> {
        self.destroy_framebuffers();

        let mut framebuffers = Vec::with_capacity(self.image_views.len());
        for attachments in attachment_sets(&self.image_views, depth_view) {
            framebuffers.push(Framebuffer::new(
                self.device.clone(),
                render_pass,
                &attachments,
                self.extent,
            )?);
        }
        self.framebuffers = framebuffers;

        debug!(
            "Created {} framebuffer(s) for render pass generation {}",
            self.framebuffers.len(),
            render_pass.generation().value()
        );
        Ok(())
    }

    /// Releases the framebuffers, keeping images and views.
    pub fn destroy_framebuffers(&mut self) {
        if !self.framebuffers.is_empty() {
            debug!("Destroying {} framebuffer(s)", self.framebuffers.len());
        }
        self.framebuffers.clear();
    }

    /// Image, view and framebuffer counts agree.
    pub fn is_consistent(&self) -> bool {
        chain_is_consistent(
            self.images.len(),
            self.image_views.len(),
            self.framebuffers.len(),
        )
    }

    /// Whether every framebuffer was built against `generation`.
    pub fn is_bound_to(&self, generation: RenderPassGeneration) -> bool {
        !self.framebuffers.is_empty()
            && self
                .framebuffers
                .iter()
                .all(|fb| fb.generation() == generation)
    }

    /// Acquires the next image, waiting indefinitely.
    ///
    /// Returns `(image_index, suboptimal)`; errors are returned raw so the
    /// caller can classify them.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Queues `image_index` for presentation after `wait_semaphore`.
    ///
    /// Returns `true` when the swapchain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Framebuffer for `image_index`, if bound.
    #[inline]
    pub fn framebuffer(&self, image_index: u32) -> Option<&Framebuffer> {
        self.framebuffers.get(image_index as usize)
    }

    fn create_image_views(&mut self) -> Result<(), RhiError> {
        self.image_views.reserve(self.images.len());

        for (i, &image) in self.images.iter().enumerate() {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );

            let view = unsafe {
                self.device
                    .handle()
                    .create_image_view(&create_info, None)
                    .map_err(|e| {
                        RhiError::SwapchainError(format!("image view {i}: {e}"))
                    })?
            };
            self.image_views.push(view);
        }

        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // Framebuffers, then views, then the swapchain object.
        self.destroy_framebuffers();

        for &view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(view, None);
            }
        }
        self.image_views.clear();

        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// `images == views == framebuffers`, with an unbound chain allowed to have
/// no framebuffers yet.
pub fn chain_is_consistent(images: usize, views: usize, framebuffers: usize) -> bool {
    images == views && (framebuffers == 0 || framebuffers == images)
}

/// Parameters chosen from a surface's support details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

/// Chooses the surface format.
///
/// - A single `UNDEFINED` entry means the surface has no preference:
///   [`DEFAULT_SURFACE_FORMAT`] is used.
/// - Otherwise `B8G8R8A8_UNORM` + `SRGB_NONLINEAR` is preferred.
/// - Otherwise the first reported format is used.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if let [only] = formats
        && only.format == vk::Format::UNDEFINED
    {
        debug!("Surface has no preferred format, using B8G8R8A8_UNORM");
        return DEFAULT_SURFACE_FORMAT;
    }

    if let Some(&format) = formats.iter().find(|f| {
        f.format == DEFAULT_SURFACE_FORMAT.format
            && f.color_space == DEFAULT_SURFACE_FORMAT.color_space
    }) {
        return format;
    }

    match formats.first() {
        Some(&first) => {
            warn!("Using first available surface format: {:?}", first.format);
            first
        }
        None => DEFAULT_SURFACE_FORMAT,
    }
}

/// Chooses the present mode: MAILBOX, then IMMEDIATE, then FIFO.
///
/// FIFO is always available, so it is the fallback.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| present_modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Chooses the swapchain extent.
///
/// Uses the surface's current extent when defined; otherwise clamps the
/// drawable size to the surface's min/max image extent.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// `min_image_count + 1`, clamped to the maximum (0 means unbounded).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn support(current_extent: vk::Extent2D) -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                current_extent,
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                ..Default::default()
            },
            formats: vec![
                format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    #[test]
    fn test_unchanged_surface_plans_identical_swapchain() {
        let undefined = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        for current in [undefined, vk::Extent2D { width: 800, height: 600 }] {
            let details = support(current);
            let first = details.plan((1280, 720));
            let second = details.clone().plan((1280, 720));
            assert_eq!(first, second);
        }

        let plan = support(undefined).plan((1280, 720));
        assert_eq!(plan.surface_format, DEFAULT_SURFACE_FORMAT);
        assert_eq!(plan.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(plan.extent, vk::Extent2D { width: 1280, height: 720 });
        assert_eq!(plan.image_count, 3);
    }

    #[test]
    fn test_undefined_format_uses_default() {
        let formats = [format(
            vk::Format::UNDEFINED,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_prefers_bgra_unorm_srgb_nonlinear() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_UNORM
        );
    }

    #[test]
    fn test_falls_back_to_first_format() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(
                vk::Format::B8G8R8A8_UNORM,
                vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            ),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn test_present_mode_priority() {
        use vk::PresentModeKHR as Mode;

        assert_eq!(choose_present_mode(&[Mode::FIFO, Mode::MAILBOX]), Mode::MAILBOX);
        assert_eq!(choose_present_mode(&[Mode::FIFO]), Mode::FIFO);
        assert_eq!(
            choose_present_mode(&[Mode::FIFO, Mode::IMMEDIATE]),
            Mode::IMMEDIATE
        );
        assert_eq!(
            choose_present_mode(&[Mode::IMMEDIATE, Mode::MAILBOX, Mode::FIFO]),
            Mode::MAILBOX
        );
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 50);
        assert_eq!((extent.width, extent.height), (2000, 100));

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_image_count() {
        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unbounded), 3);

        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);
    }

    #[test]
    fn test_support_details_adequacy() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());
        assert!(adequate.ensure_adequate().is_ok());

        let no_modes = SwapchainSupportDetails {
            present_modes: vec![],
            ..adequate.clone()
        };
        assert!(!no_modes.is_adequate());
        assert!(matches!(
            no_modes.ensure_adequate(),
            Err(RhiError::SwapchainError(_))
        ));
    }

    #[test]
    fn test_chain_consistency() {
        assert!(chain_is_consistent(3, 3, 0));
        assert!(chain_is_consistent(3, 3, 3));
        assert!(!chain_is_consistent(3, 3, 2));
        assert!(!chain_is_consistent(3, 2, 0));
    }
}

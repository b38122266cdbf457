//! Render pass creation.
//!
//! Every draw in a frame happens inside one [`RenderPass`] with a single
//! subpass: one color attachment that ends in a presentable layout, plus
//! an optional depth attachment.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiError;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Identifies one render pass instance.
///
/// Objects built against a render pass record its generation; a mismatch
/// with the live render pass means they are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPassGeneration(u64);

impl RenderPassGeneration {
    /// Allocates a generation never handed out before in this process.
    pub fn next() -> Self {
        Self(NEXT_GENERATION.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value, for logging.
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Attachment layout of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassDesc {
    /// Swapchain color format
    pub color_format: vk::Format,
    /// Depth format, `None` for color only
    pub depth_format: Option<vk::Format>,
}

impl RenderPassDesc {
    /// Number of attachments a compatible framebuffer must provide.
    pub fn attachment_count(&self) -> usize {
        1 + usize::from(self.depth_format.is_some())
    }

    fn attachments(&self) -> Vec<vk::AttachmentDescription> {
        let mut attachments = vec![
            vk::AttachmentDescription::default()
                .format(self.color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        ];

        if let Some(depth_format) = self.depth_format {
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(depth_format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            );
        }

        attachments
    }

    fn stage_mask(&self) -> vk::PipelineStageFlags {
        let mut stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        if self.depth_format.is_some() {
            stages |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        }
        stages
    }

    fn access_mask(&self) -> vk::AccessFlags {
        let mut access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
        if self.depth_format.is_some() {
            access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        }
        access
    }
}

/// Render pass wrapper with RAII cleanup.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    desc: RenderPassDesc,
    generation: RenderPassGeneration,
}

impl RenderPass {
    /// Creates the forward render pass.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::RenderPassError`] if the driver rejects it.
    pub fn new(device: Arc<Device>, desc: RenderPassDesc) -> Result<Self, RhiError> {
        let attachments = desc.attachments();

        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let depth_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if desc.depth_format.is_some() {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }
        let subpasses = [subpass];

        // Wait for the acquire semaphore's stage before writing attachments.
        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(desc.stage_mask())
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(desc.stage_mask())
            .dst_access_mask(desc.access_mask())];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe {
            device
                .handle()
                .create_render_pass(&create_info, None)
                .map_err(|e| RhiError::RenderPassError(format!("create_render_pass: {e}")))?
        };

        let generation = RenderPassGeneration::next();
        info!(
            "Render pass created (generation {}, color {:?}, depth {:?})",
            generation.value(),
            desc.color_format,
            desc.depth_format
        );

        Ok(Self {
            device,
            render_pass,
            desc,
            generation,
        })
    }

    /// Raw render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }

    #[inline]
    pub fn generation(&self) -> RenderPassGeneration {
        self.generation
    }

    #[inline]
    pub fn has_depth(&self) -> bool {
        self.desc.depth_format.is_some()
    }

    /// Clear values matching the attachment order.
    pub fn clear_values(&self, color: [f32; 4]) -> Vec<vk::ClearValue> {
        clear_values(&self.desc, color)
    }
}

/// Color clear, then depth 1.0 / stencil 0 when a depth attachment exists.
pub fn clear_values(desc: &RenderPassDesc, color: [f32; 4]) -> Vec<vk::ClearValue> {
    let mut values = vec![vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    }];
    if desc.depth_format.is_some() {
        values.push(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        });
    }
    values
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!(
            "Render pass destroyed (generation {})",
            self.generation.value()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generations_are_unique_and_increasing() {
        let a = RenderPassGeneration::next();
        let b = RenderPassGeneration::next();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_color_only_layout() {
        let desc = RenderPassDesc {
            color_format: vk::Format::B8G8R8A8_UNORM,
            depth_format: None,
        };
        let attachments = desc.attachments();
        assert_eq!(desc.attachment_count(), 1);
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachments[0].store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(clear_values(&desc, [0.0; 4]).len(), 1);
    }

    #[test]
    fn test_depth_layout_and_clear() {
        let desc = RenderPassDesc {
            color_format: vk::Format::B8G8R8A8_UNORM,
            depth_format: Some(vk::Format::D32_SFLOAT),
        };
        assert_eq!(desc.attachment_count(), 2);
        assert!(
            desc.stage_mask()
                .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
        );

        let values = clear_values(&desc, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(values.len(), 2);
        let depth = unsafe { values[1].depth_stencil };
        assert_eq!(depth.depth, 1.0);
        assert_eq!(depth.stencil, 0);
    }
}

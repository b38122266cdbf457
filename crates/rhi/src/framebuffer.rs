//! Framebuffers binding swapchain views to a render pass.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::RhiError;
use crate::render_pass::{RenderPass, RenderPassGeneration};

/// Framebuffer wrapper with RAII cleanup.
///
/// Only valid for the render pass whose generation it records.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
    generation: RenderPassGeneration,
}

impl Framebuffer {
    /// Creates a framebuffer over `attachments` in render pass attachment order.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self, RhiError> {
        if attachments.len() != render_pass.desc().attachment_count() {
            return Err(RhiError::RenderPassError(format!(
                "framebuffer has {} attachment(s), render pass expects {}",
                attachments.len(),
                render_pass.desc().attachment_count()
            )));
        }

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .handle()
                .create_framebuffer(&create_info, None)
                .map_err(|e| RhiError::RenderPassError(format!("create_framebuffer: {e}")))?
        };

        Ok(Self {
            device,
            framebuffer,
            generation: render_pass.generation(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Generation of the render pass this framebuffer was created against.
    #[inline]
    pub fn generation(&self) -> RenderPassGeneration {
        self.generation
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Attachment lists for one framebuffer per color view.
///
/// The shared depth view, when present, follows each color view.
pub fn attachment_sets(
    color_views: &[vk::ImageView],
    depth_view: Option<vk::ImageView>,
) -> Vec<Vec<vk::ImageView>> {
    color_views
        .iter()
        .map(|&color| {
            let mut set = vec![color];
            set.extend(depth_view);
            set
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn view(raw: u64) -> vk::ImageView {
        vk::ImageView::from_raw(raw)
    }

    #[test]
    fn test_one_set_per_color_view() {
        let colors = [view(1), view(2), view(3)];
        let sets = attachment_sets(&colors, None);
        assert_eq!(sets.len(), colors.len());
        assert!(sets.iter().all(|set| set.len() == 1));
    }

    #[test]
    fn test_depth_view_shared() {
        let colors = [view(1), view(2)];
        let sets = attachment_sets(&colors, Some(view(9)));
        assert_eq!(sets, vec![vec![view(1), view(9)], vec![view(2), view(9)]]);
    }
}

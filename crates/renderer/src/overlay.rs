//! Injection point for UI drawn on top of the scene.

use ash::vk;

use lantern_rhi::command::CommandBuffer;
use lantern_rhi::render_pass::{RenderPass, RenderPassGeneration};
use lantern_rhi::RhiResult;

/// Draws inside the frame's render pass after every scene model.
///
/// An overlay that builds pipelines must build them in
/// [`on_render_pass_created`](Overlay::on_render_pass_created) and release
/// them in [`on_render_pass_destroyed`](Overlay::on_render_pass_destroyed);
/// the renderer calls both around every swapchain rebuild.
pub trait Overlay {
    /// Called once the render pass exists, at registration and after each
    /// rebuild.
    fn on_render_pass_created(&mut self, render_pass: &RenderPass) -> RhiResult<()> {
        let _ = render_pass;
        Ok(())
    }

    /// Called before the render pass is destroyed.
    fn on_render_pass_destroyed(&mut self) {}

    /// Records draw commands. `cmd` is recording and the render pass is
    /// open; the overlay must not end either.
    fn record(&mut self, cmd: &CommandBuffer, extent: vk::Extent2D);
}

/// Keeps an overlay in step with the render pass it was built for.
pub(crate) struct OverlaySlot {
    overlay: Box<dyn Overlay>,
    generation: Option<RenderPassGeneration>,
}

impl OverlaySlot {
    pub(crate) fn new(overlay: Box<dyn Overlay>) -> Self {
        Self {
            overlay,
            generation: None,
        }
    }

    pub(crate) fn attach(&mut self, render_pass: &RenderPass) -> RhiResult<()> {
        self.overlay.on_render_pass_created(render_pass)?;
        self.generation = Some(render_pass.generation());
        Ok(())
    }

    pub(crate) fn detach(&mut self) {
        if self.generation.take().is_some() {
            self.overlay.on_render_pass_destroyed();
        }
    }

    /// Records only when attached to the render pass being recorded.
    pub(crate) fn record(
        &mut self,
        generation: RenderPassGeneration,
        cmd: &CommandBuffer,
        extent: vk::Extent2D,
    ) {
        if self.generation == Some(generation) {
            self.overlay.record(cmd, extent);
        }
    }
}

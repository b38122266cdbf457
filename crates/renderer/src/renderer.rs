//! The renderer: device context, swapchain chain, scenes and the frame loop.
//!
//! [`Renderer`] pairs a [`FrameDriver`] with the GPU resources it drives.
//! Swapchain-dependent resources are created and released strictly in
//! [`REBUILD_ORDER`]; shutdown follows [`TEARDOWN_ORDER`].
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use lantern_rhi::surface::WindowSource;
//! # fn demo(window: Arc<dyn WindowSource>) -> lantern_rhi::RhiResult<()> {
//! use lantern_core::RendererConfig;
//! use lantern_renderer::Renderer;
//! use lantern_resources::procedural::textured_cube;
//! use lantern_scene::Camera;
//!
//! let mut renderer = Renderer::new(&RendererConfig::default(), window)?;
//! let scene = renderer.add_scene(textured_cube())?;
//! renderer.set_active_scene(scene)?;
//! renderer.draw(&Camera::new())?;
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, trace, warn};

use lantern_core::RendererConfig;
use lantern_resources::SceneGraph;
use lantern_rhi::command::CommandBuffer;
use lantern_rhi::context::DeviceContext;
use lantern_rhi::device::Device;
use lantern_rhi::render_pass::{RenderPass, RenderPassDesc};
use lantern_rhi::surface::WindowSource;
use lantern_rhi::swapchain::Swapchain;
use lantern_rhi::sync::FrameSync;
use lantern_rhi::{RhiError, RhiResult};
use lantern_scene::Camera;

use crate::depth_buffer::{DEFAULT_DEPTH_FORMAT, DepthBuffer};
use crate::frame::{
    AcquireOutcome, FrameDriver, FrameState, FrameStats, FrameStatus, FrameTarget,
    PresentOutcome, RebuildOutcome, classify_acquire, classify_present, escalate,
    unrecoverable,
};
use crate::lifetime::{REBUILD_ORDER, ResourceKind, TEARDOWN_ORDER};
use crate::material::FallbackTextures;
use crate::model::UploadContext;
use crate::overlay::{Overlay, OverlaySlot};
use crate::registry::PipelineRegistry;
use crate::scene::{Scene, SceneId};
use crate::ubo::ModelUbo;

fn missing(what: &str) -> RhiError {
    RhiError::SwapchainError(format!("{what} has not been built"))
}

/// Everything [`FrameDriver`] drives.
///
/// Swapchain-dependent resources are `Option`s so the rebuild protocol can
/// release them one kind at a time; long-lived ones are `ManuallyDrop` and
/// released only by `Drop`.
struct FrameResources {
    config: RendererConfig,
    window: Arc<dyn WindowSource>,
    camera: Camera,
    active_scene: Option<SceneId>,

    command_buffers: Vec<CommandBuffer>,
    overlay: Option<OverlaySlot>,
    render_pass: Option<RenderPass>,
    depth: Option<DepthBuffer>,
    swapchain: Option<Swapchain>,

    scenes: Vec<Scene>,
    fallback: ManuallyDrop<FallbackTextures>,
    registry: ManuallyDrop<PipelineRegistry>,
    sync: ManuallyDrop<FrameSync>,
    context: ManuallyDrop<DeviceContext>,
}

impl FrameResources {
    /// Creates the long-lived resources on top of `context`. The swapchain
    /// chain is left unbuilt.
    fn new(
        config: &RendererConfig,
        window: Arc<dyn WindowSource>,
        context: DeviceContext,
    ) -> RhiResult<Self> {
        let device = context.device().clone();
        let sync = FrameSync::new(device.clone())?;
        let registry = PipelineRegistry::new(device.clone(), &config.shader_path, config.depth_test)?;
        let fallback = FallbackTextures::new(device, context.command_pool())?;

        Ok(Self {
            config: config.clone(),
            window,
            camera: Camera::new(),
            active_scene: None,
            command_buffers: Vec::new(),
            overlay: None,
            render_pass: None,
            depth: None,
            swapchain: None,
            scenes: Vec::new(),
            fallback: ManuallyDrop::new(fallback),
            registry: ManuallyDrop::new(registry),
            sync: ManuallyDrop::new(sync),
            context: ManuallyDrop::new(context),
        })
    }

    fn device(&self) -> &Arc<Device> {
        self.context.device()
    }

    fn swapchain(&self) -> RhiResult<&Swapchain> {
        self.swapchain.as_ref().ok_or_else(|| missing("swapchain"))
    }

    fn is_drawable(size: (u32, u32)) -> bool {
        size.0 > 0 && size.1 > 0
    }

    /// Creates the whole swapchain-dependent chain, leaves first.
    fn create_chain(&mut self, drawable: (u32, u32)) -> RhiResult<()> {
        for &kind in REBUILD_ORDER.iter().rev() {
            self.create(kind, drawable)?;
        }
        Ok(())
    }

    fn create(&mut self, kind: ResourceKind, drawable: (u32, u32)) -> RhiResult<()> {
        trace!("Creating {}", kind);
        let device = self.context.device().clone();
        match kind {
            ResourceKind::Swapchain => {
                let surface = self.context.surface().ok_or_else(|| {
                    RhiError::SurfaceCreationFailed("device context has no surface".into())
                })?;
                self.swapchain = Some(Swapchain::new(
                    self.context.instance(),
                    device,
                    surface,
                    drawable,
                )?);
            }
            ResourceKind::DepthBuffer => {
                if self.config.depth_test {
                    let extent = self.swapchain()?.extent();
                    self.depth = Some(DepthBuffer::new(device, extent, DEFAULT_DEPTH_FORMAT)?);
                }
            }
            ResourceKind::RenderPass => {
                let desc = RenderPassDesc {
                    color_format: self.swapchain()?.format(),
                    depth_format: self.depth.as_ref().map(DepthBuffer::format),
                };
                self.render_pass = Some(RenderPass::new(device, desc)?);
            }
            ResourceKind::Framebuffers => {
                let depth_view = self.depth.as_ref().map(DepthBuffer::view);
                let render_pass = self.render_pass.as_ref().ok_or_else(|| missing("render pass"))?;
                let swapchain = self.swapchain.as_mut().ok_or_else(|| missing("swapchain"))?;
                swapchain.create_framebuffers(render_pass, depth_view)?;
                if !swapchain.is_consistent() || !swapchain.is_bound_to(render_pass.generation()) {
                    return Err(RhiError::SwapchainError(
                        "framebuffers do not match the swapchain images".into(),
                    ));
                }
            }
            ResourceKind::Pipelines => {
                // Scenes rebuild their pipelines lazily when next drawn.
                debug!("Pipelines will be rebuilt on demand");
            }
            ResourceKind::Overlay => {
                if let (Some(overlay), Some(render_pass)) = (&mut self.overlay, &self.render_pass) {
                    overlay.attach(render_pass)?;
                }
            }
            ResourceKind::CommandBuffers => {
                let count = self.swapchain()?.image_count() as u32;
                self.command_buffers = self.context.command_pool().allocate_command_buffers(count)?;
            }
            other => warn!("{} is only created at startup", other),
        }
        Ok(())
    }

    fn release(&mut self, kind: ResourceKind) {
        trace!("Releasing {}", kind);
        match kind {
            ResourceKind::CommandBuffers => {
                self.context
                    .command_pool()
                    .free_command_buffers(&self.command_buffers);
                self.command_buffers.clear();
            }
            ResourceKind::Overlay => {
                if let Some(overlay) = &mut self.overlay {
                    overlay.detach();
                }
            }
            ResourceKind::Pipelines => {
                for scene in &mut self.scenes {
                    scene.release_pipelines();
                }
            }
            ResourceKind::Framebuffers => {
                if let Some(swapchain) = &mut self.swapchain {
                    swapchain.destroy_framebuffers();
                }
            }
            ResourceKind::RenderPass => self.render_pass = None,
            ResourceKind::DepthBuffer => self.depth = None,
            ResourceKind::Swapchain => self.swapchain = None,
            ResourceKind::Scenes => {
                self.active_scene = None;
                self.scenes.clear();
            }
            other => warn!("{} is only released at shutdown", other),
        }
    }

    fn active_scene_mut(&mut self) -> Option<&mut Scene> {
        self.active_scene.and_then(|id| self.scenes.get_mut(id.0))
    }
}

impl FrameTarget for FrameResources {
    fn frame_count(&self) -> usize {
        self.command_buffers.len()
    }

    fn prepare(&mut self) -> RhiResult<()> {
        let extent = self.swapchain()?.extent();
        let Some(id) = self.active_scene else {
            return Ok(());
        };
        let render_pass = self.render_pass.as_ref().ok_or_else(|| missing("render pass"))?;
        let scene = self
            .scenes
            .get_mut(id.0)
            .ok_or_else(|| RhiError::InvalidScene(format!("{id} is not registered")))?;

        if !scene.is_ready_for(render_pass.generation()) {
            let ctx = UploadContext {
                device: self.context.device(),
                command_pool: self.context.command_pool(),
                descriptor_pool: self.context.descriptor_pool(),
                registry: &self.registry,
                fallback: &self.fallback,
            };
            scene.prepare(&ctx, render_pass)?;
        }

        let matrices = self.camera.matrices(extent.width, extent.height);
        scene.write_uniforms(&ModelUbo::from(matrices))
    }

    fn acquire(&mut self) -> RhiResult<AcquireOutcome> {
        let swapchain = self.swapchain()?;
        classify_acquire(swapchain.acquire_next_image(self.sync.image_available()))
    }

    fn record(&mut self, frame_index: usize, image_index: u32) -> RhiResult<()> {
        let swapchain = self.swapchain.as_ref().ok_or_else(|| missing("swapchain"))?;
        let render_pass = self.render_pass.as_ref().ok_or_else(|| missing("render pass"))?;
        let cmd = self.command_buffers.get(frame_index).ok_or_else(|| {
            RhiError::InvalidResource(format!("no command buffer for frame {frame_index}"))
        })?;
        let framebuffer = swapchain
            .framebuffer(image_index)
            .ok_or_else(|| missing("framebuffer"))?;
        if framebuffer.generation() != render_pass.generation() {
            return Err(RhiError::RenderPassError(format!(
                "framebuffer {} was built for render pass generation {}, current is {}",
                image_index,
                framebuffer.generation().value(),
                render_pass.generation().value()
            )));
        }

        let extent = swapchain.extent();
        cmd.begin().map_err(|e| escalate("command buffer begin", e))?;
        cmd.begin_render_pass(
            render_pass.handle(),
            framebuffer.handle(),
            extent,
            &render_pass.clear_values(self.config.clear_color),
        );
        cmd.set_viewport(extent);
        cmd.set_scissor(extent);

        if let Some(scene) = self.active_scene.and_then(|id| self.scenes.get(id.0)) {
            let draws = scene.record(cmd, self.registry.pipeline_layout().handle())?;
            trace!("Recorded {} draw(s) into frame {}", draws, frame_index);
        }
        if let Some(overlay) = &mut self.overlay {
            overlay.record(render_pass.generation(), cmd, extent);
        }

        cmd.end_render_pass();
        cmd.end().map_err(|e| escalate("command buffer end", e))
    }

    fn submit(&mut self, frame_index: usize) -> RhiResult<()> {
        let cmd = self.command_buffers.get(frame_index).ok_or_else(|| {
            RhiError::InvalidResource(format!("no command buffer for frame {frame_index}"))
        })?;

        let wait_semaphores = [self.sync.image_available()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.sync.render_finished()];
        let command_buffers = [cmd.handle()];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device()
                .submit_graphics(std::slice::from_ref(&submit_info), vk::Fence::null())
        }
        .map_err(|result| unrecoverable("queue submit", result))
    }

    fn present(&mut self, image_index: u32) -> RhiResult<PresentOutcome> {
        let device = self.device();
        let result = self.swapchain()?.present(
            device.present_queue(),
            image_index,
            self.sync.render_finished(),
        );
        let outcome = classify_present(result)?;

        // At most one frame in flight.
        device
            .wait_present_idle()
            .map_err(|e| escalate("present queue idle", e))?;
        Ok(outcome)
    }

    fn rebuild(&mut self) -> RhiResult<RebuildOutcome> {
        let drawable = self.window.drawable_size();
        if !Self::is_drawable(drawable) {
            return Ok(RebuildOutcome::Deferred);
        }

        self.device()
            .wait_idle()
            .map_err(|e| escalate("device idle", e))?;

        let previous = self
            .swapchain
            .as_ref()
            .map(|swapchain| (swapchain.extent(), swapchain.format()));

        for kind in REBUILD_ORDER {
            self.release(kind);
        }
        self.create_chain(drawable)?;

        let swapchain = self.swapchain()?;
        let current = (swapchain.extent(), swapchain.format());
        if previous == Some(current) {
            debug!("Swapchain rebuilt with unchanged extent and format");
        }
        info!(
            "Swapchain rebuilt: {}x{} {:?}, {} image(s)",
            current.0.width,
            current.0.height,
            current.1,
            swapchain.image_count()
        );
        Ok(RebuildOutcome::Rebuilt)
    }
}

impl Drop for FrameResources {
    fn drop(&mut self) {
        if let Err(e) = self.device().wait_idle() {
            tracing::error!("Failed to wait for device idle during renderer drop: {}", e);
        }

        for kind in TEARDOWN_ORDER {
            match kind {
                ResourceKind::FallbackTextures => unsafe { ManuallyDrop::drop(&mut self.fallback) },
                ResourceKind::PipelineLayouts => unsafe { ManuallyDrop::drop(&mut self.registry) },
                ResourceKind::FrameSync => unsafe { ManuallyDrop::drop(&mut self.sync) },
                ResourceKind::DeviceContext => unsafe { ManuallyDrop::drop(&mut self.context) },
                ResourceKind::Overlay => {
                    self.release(ResourceKind::Overlay);
                    self.overlay = None;
                }
                other => self.release(other),
            }
        }

        info!("Renderer destroyed");
    }
}

/// Owns every GPU resource and runs frames.
pub struct Renderer {
    driver: FrameDriver,
    resources: FrameResources,
}

impl Renderer {
    /// Connects to the GPU and builds the swapchain chain for `window`.
    ///
    /// The window is kept alive at least as long as the surface.
    ///
    /// # Errors
    ///
    /// Any startup failure: adapter selection, surface, device, shader
    /// compilation, layouts, swapchain, depth buffer, render pass or
    /// framebuffers. Partially built resources are released before
    /// returning.
    pub fn new(config: &RendererConfig, window: Arc<dyn WindowSource>) -> RhiResult<Self> {
        let context = DeviceContext::new(config, window.as_ref())?;
        let mut resources = FrameResources::new(config, window, context)?;

        let mut driver = FrameDriver::new();
        let drawable = resources.window.drawable_size();
        if FrameResources::is_drawable(drawable) {
            resources.create_chain(drawable)?;
        } else {
            debug!("Window has no drawable area yet, deferring swapchain creation");
            driver.mark_stale();
        }

        info!(
            "Renderer initialized on '{}' ({} swapchain image(s))",
            resources.context.adapter().device_name(),
            resources.command_buffers.len()
        );

        Ok(Self { driver, resources })
    }

    /// Registers a scene. GPU resources are created the first time it is
    /// drawn.
    pub fn add_scene(&mut self, graph: SceneGraph) -> RhiResult<SceneId> {
        let scene = Scene::from_graph(graph)?;
        let id = SceneId(self.resources.scenes.len());
        info!("Added {} '{}'", id, scene.name());
        self.resources.scenes.push(scene);
        Ok(id)
    }

    /// Selects what [`draw`](Self::draw) renders.
    pub fn set_active_scene(&mut self, id: SceneId) -> RhiResult<()> {
        if id.0 >= self.resources.scenes.len() {
            return Err(RhiError::InvalidScene(format!("{id} is not registered")));
        }
        if self.resources.active_scene != Some(id) {
            debug!("Active scene switched to {}", id);
        }
        self.resources.active_scene = Some(id);
        Ok(())
    }

    #[inline]
    pub fn active_scene(&self) -> Option<SceneId> {
        self.resources.active_scene
    }

    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.resources.scenes.get(id.0)
    }

    pub fn scene_mut(&mut self, id: SceneId) -> Option<&mut Scene> {
        self.resources.scenes.get_mut(id.0)
    }

    pub fn active_scene_mut(&mut self) -> Option<&mut Scene> {
        self.resources.active_scene_mut()
    }

    /// Installs `overlay`, replacing any previous one.
    pub fn set_overlay(&mut self, overlay: Box<dyn Overlay>) -> RhiResult<()> {
        if let Some(mut previous) = self.resources.overlay.take() {
            self.resources
                .device()
                .wait_idle()
                .map_err(|e| escalate("device idle", e))?;
            previous.detach();
        }

        let mut slot = OverlaySlot::new(overlay);
        if let Some(render_pass) = &self.resources.render_pass {
            slot.attach(render_pass)?;
        }
        self.resources.overlay = Some(slot);
        Ok(())
    }

    /// Notes a new drawable size. The rebuild happens on the next draw.
    pub fn resize(&mut self, width: u32, height: u32) {
        let unchanged = self.extent().is_some_and(|extent| {
            extent.width == width && extent.height == height
        });
        if !unchanged {
            debug!("Resize to {}x{} requested", width, height);
            self.driver.mark_stale();
        }
    }

    /// Draws one frame of the active scene from `camera`.
    ///
    /// # Errors
    ///
    /// [`RhiError::Unrecoverable`] for device results outside the
    /// recoverable set; rebuild failures are returned as the startup error
    /// they would have been. Either way the frame loop should stop.
    pub fn draw(&mut self, camera: &Camera) -> RhiResult<FrameStatus> {
        self.resources.camera.clone_from(camera);
        self.driver.draw(&mut self.resources)
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.driver.stats()
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.driver.state()
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.resources.swapchain.as_ref().map(Swapchain::extent)
    }

    pub fn adapter_name(&self) -> &str {
        self.resources.context.adapter().device_name()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::path::PathBuf;
    use std::rc::Rc;

    use lantern_resources::procedural::textured_cube;
    use raw_window_handle::{
        DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
    };

    use super::*;

    /// Window stand-in with no handles and no drawable area.
    struct Offscreen;

    impl HasDisplayHandle for Offscreen {
        fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
            Err(HandleError::Unavailable)
        }
    }

    impl HasWindowHandle for Offscreen {
        fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
            Err(HandleError::Unavailable)
        }
    }

    impl WindowSource for Offscreen {
        fn drawable_size(&self) -> (u32, u32) {
            (0, 0)
        }
    }

    fn headless_resources() -> Option<FrameResources> {
        let config = RendererConfig {
            enable_validation: false,
            shader_path: PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("../../shaders/model.wgsl"),
            ..Default::default()
        };
        let context = match DeviceContext::headless(&config) {
            Ok(context) => context,
            Err(RhiError::LoadingError(_) | RhiError::NoSuitableAdapter) => {
                eprintln!("no Vulkan device available, skipping");
                return None;
            }
            Err(e) => panic!("headless context failed: {e}"),
        };
        Some(FrameResources::new(&config, Arc::new(Offscreen), context).expect("frame resources"))
    }

    fn offscreen_pass(device: &Arc<Device>) -> RenderPass {
        let desc = RenderPassDesc {
            color_format: vk::Format::R8G8B8A8_UNORM,
            depth_format: Some(DEFAULT_DEPTH_FORMAT),
        };
        RenderPass::new(device.clone(), desc).expect("render pass")
    }

    fn prepare_all(resources: &mut FrameResources, render_pass: &RenderPass) {
        let ctx = UploadContext {
            device: resources.context.device(),
            command_pool: resources.context.command_pool(),
            descriptor_pool: resources.context.descriptor_pool(),
            registry: &resources.registry,
            fallback: &resources.fallback,
        };
        for scene in &mut resources.scenes {
            scene.prepare(&ctx, render_pass).expect("prepare");
        }
    }

    /// Overlay owning a device handle, noting whether the context was
    /// still alive when it was dropped.
    struct DeviceOverlay {
        device: Arc<Device>,
        context_alive: Rc<Cell<Option<bool>>>,
    }

    impl Overlay for DeviceOverlay {
        fn record(&mut self, _cmd: &CommandBuffer, _extent: vk::Extent2D) {}
    }

    impl Drop for DeviceOverlay {
        fn drop(&mut self) {
            self.context_alive
                .set(Some(Arc::strong_count(&self.device) > 1));
        }
    }

    #[test]
    fn test_overlay_dropped_before_device_context() {
        let Some(mut resources) = headless_resources() else {
            return;
        };
        let context_alive = Rc::new(Cell::new(None));
        resources.overlay = Some(OverlaySlot::new(Box::new(DeviceOverlay {
            device: resources.device().clone(),
            context_alive: context_alive.clone(),
        })));

        drop(resources);
        assert_eq!(context_alive.get(), Some(true));
    }

    #[test]
    fn test_pipeline_release_covers_every_scene() {
        let Some(mut resources) = headless_resources() else {
            return;
        };
        for _ in 0..2 {
            resources
                .scenes
                .push(Scene::from_graph(textured_cube()).expect("scene"));
        }

        let first = offscreen_pass(resources.device());
        prepare_all(&mut resources, &first);
        assert!(resources.scenes.iter().all(|s| s.is_ready_for(first.generation())));

        resources.release(ResourceKind::Pipelines);
        drop(first);
        let second = offscreen_pass(resources.device());
        assert!(resources.scenes.iter().all(|s| !s.is_ready_for(second.generation())));

        prepare_all(&mut resources, &second);
        assert!(resources.scenes.iter().all(|s| s.is_ready_for(second.generation())));
        drop(second);
    }
}

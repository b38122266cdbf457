//! Release ordering for every GPU resource the renderer owns.
//!
//! Each [`ResourceKind`] lists the kinds it depends on. A resource must be
//! released before anything it depends on and created after it.
//! [`TEARDOWN_ORDER`] is the full shutdown sequence; [`REBUILD_ORDER`] is
//! the swapchain-dependent prefix that is torn down and recreated when the
//! surface goes stale. Creation walks the same sequences in reverse.

use std::fmt;

/// A class of GPU resource owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// One primary command buffer per swapchain image.
    CommandBuffers,
    /// Resources an overlay built against the render pass.
    Overlay,
    /// Per-model graphics pipelines.
    Pipelines,
    /// One framebuffer per swapchain image.
    Framebuffers,
    RenderPass,
    DepthBuffer,
    /// Swapchain object together with its image views.
    Swapchain,
    /// Vertex, index and uniform buffers, textures and descriptor sets of
    /// every loaded scene.
    Scenes,
    /// White, black and flat-normal textures for empty material slots.
    FallbackTextures,
    /// Descriptor set layouts, the pipeline layout and cached shader words.
    PipelineLayouts,
    /// Image-available and render-finished semaphores.
    FrameSync,
    /// Instance, surface, device, command pool and descriptor pool.
    DeviceContext,
}

impl ResourceKind {
    /// Every kind, in declaration order.
    pub const ALL: [ResourceKind; 12] = [
        ResourceKind::CommandBuffers,
        ResourceKind::Overlay,
        ResourceKind::Pipelines,
        ResourceKind::Framebuffers,
        ResourceKind::RenderPass,
        ResourceKind::DepthBuffer,
        ResourceKind::Swapchain,
        ResourceKind::Scenes,
        ResourceKind::FallbackTextures,
        ResourceKind::PipelineLayouts,
        ResourceKind::FrameSync,
        ResourceKind::DeviceContext,
    ];

    /// Kinds that must stay alive while this one exists.
    pub fn dependencies(self) -> &'static [ResourceKind] {
        use ResourceKind::*;
        match self {
            // Recorded buffers reference framebuffers, pipelines and scene
            // buffers until they are freed.
            CommandBuffers => &[Framebuffers, Pipelines, Overlay, Scenes, DeviceContext],
            Overlay => &[RenderPass, DeviceContext],
            Pipelines => &[RenderPass, PipelineLayouts, DeviceContext],
            Framebuffers => &[Swapchain, DepthBuffer, RenderPass],
            RenderPass => &[DeviceContext],
            DepthBuffer => &[DeviceContext],
            Swapchain => &[DeviceContext],
            // Material descriptor sets point at the fallback textures.
            Scenes => &[FallbackTextures, PipelineLayouts, DeviceContext],
            FallbackTextures => &[DeviceContext],
            PipelineLayouts => &[DeviceContext],
            FrameSync => &[DeviceContext],
            DeviceContext => &[],
        }
    }

    /// Whether this kind (directly or transitively) depends on `other`.
    pub fn depends_on(self, other: ResourceKind) -> bool {
        self.dependencies()
            .iter()
            .any(|&dep| dep == other || dep.depends_on(other))
    }

    /// Whether this kind is recreated with the swapchain.
    pub fn is_swapchain_dependent(self) -> bool {
        REBUILD_ORDER.contains(&self)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::CommandBuffers => "command buffers",
            ResourceKind::Overlay => "overlay",
            ResourceKind::Pipelines => "pipelines",
            ResourceKind::Framebuffers => "framebuffers",
            ResourceKind::RenderPass => "render pass",
            ResourceKind::DepthBuffer => "depth buffer",
            ResourceKind::Swapchain => "swapchain",
            ResourceKind::Scenes => "scenes",
            ResourceKind::FallbackTextures => "fallback textures",
            ResourceKind::PipelineLayouts => "pipeline layouts",
            ResourceKind::FrameSync => "frame sync",
            ResourceKind::DeviceContext => "device context",
        };
        f.write_str(name)
    }
}

/// Shutdown release order.
pub const TEARDOWN_ORDER: [ResourceKind; 12] = [
    ResourceKind::CommandBuffers,
    ResourceKind::Overlay,
    ResourceKind::Pipelines,
    ResourceKind::Framebuffers,
    ResourceKind::RenderPass,
    ResourceKind::DepthBuffer,
    ResourceKind::Swapchain,
    ResourceKind::Scenes,
    ResourceKind::FallbackTextures,
    ResourceKind::PipelineLayouts,
    ResourceKind::FrameSync,
    ResourceKind::DeviceContext,
];

/// Release order when the surface goes stale. Recreation runs it backwards.
pub const REBUILD_ORDER: [ResourceKind; 7] = [
    ResourceKind::CommandBuffers,
    ResourceKind::Overlay,
    ResourceKind::Pipelines,
    ResourceKind::Framebuffers,
    ResourceKind::RenderPass,
    ResourceKind::DepthBuffer,
    ResourceKind::Swapchain,
];

/// Whether `order` releases every kind before the kinds it depends on.
///
/// Returns the first offending `(released, dependency)` pair otherwise.
pub fn check_release_order(order: &[ResourceKind]) -> Result<(), (ResourceKind, ResourceKind)> {
    for (i, &kind) in order.iter().enumerate() {
        for &dep in kind.dependencies() {
            if order[..i].contains(&dep) {
                return Err((kind, dep));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[ResourceKind], kind: ResourceKind) -> usize {
        order
            .iter()
            .position(|&k| k == kind)
            .unwrap_or_else(|| panic!("{kind} missing from order"))
    }

    #[test]
    fn test_teardown_covers_every_kind_once() {
        for kind in ResourceKind::ALL {
            let count = TEARDOWN_ORDER.iter().filter(|&&k| k == kind).count();
            assert_eq!(count, 1, "{kind} appears {count} times");
        }
    }

    #[test]
    fn test_teardown_respects_dependencies() {
        assert_eq!(check_release_order(&TEARDOWN_ORDER), Ok(()));
    }

    #[test]
    fn test_rebuild_respects_dependencies() {
        assert_eq!(check_release_order(&REBUILD_ORDER), Ok(()));
    }

    #[test]
    fn test_device_context_released_last() {
        assert_eq!(TEARDOWN_ORDER.last(), Some(&ResourceKind::DeviceContext));
        for kind in ResourceKind::ALL {
            if kind != ResourceKind::DeviceContext {
                assert!(kind.depends_on(ResourceKind::DeviceContext), "{kind}");
            }
        }
    }

    #[test]
    fn test_rebuild_is_prefix_of_teardown() {
        assert_eq!(&TEARDOWN_ORDER[..REBUILD_ORDER.len()], &REBUILD_ORDER[..]);
    }

    #[test]
    fn test_rebuild_contains_everything_built_on_the_chain() {
        for kind in ResourceKind::ALL {
            let built_on_chain = kind.depends_on(ResourceKind::Swapchain)
                || kind.depends_on(ResourceKind::RenderPass)
                || kind.depends_on(ResourceKind::DepthBuffer);
            if built_on_chain {
                assert!(kind.is_swapchain_dependent(), "{kind} survives a rebuild");
            }
        }
    }

    #[test]
    fn test_swapchain_internal_order() {
        let framebuffers = position(&REBUILD_ORDER, ResourceKind::Framebuffers);
        let depth = position(&REBUILD_ORDER, ResourceKind::DepthBuffer);
        let swapchain = position(&REBUILD_ORDER, ResourceKind::Swapchain);
        assert!(framebuffers < depth && depth < swapchain);
    }

    #[test]
    fn test_pipelines_released_before_render_pass() {
        assert!(
            position(&REBUILD_ORDER, ResourceKind::Pipelines)
                < position(&REBUILD_ORDER, ResourceKind::RenderPass)
        );
        assert!(
            position(&REBUILD_ORDER, ResourceKind::Framebuffers)
                < position(&REBUILD_ORDER, ResourceKind::RenderPass)
        );
    }

    #[test]
    fn test_bad_order_is_reported() {
        let order = [ResourceKind::RenderPass, ResourceKind::Pipelines];
        assert_eq!(
            check_release_order(&order),
            Err((ResourceKind::Pipelines, ResourceKind::RenderPass))
        );
    }
}

//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// Errors raised by the Vulkan layer.
///
/// Startup failures (adapter, surface, device, swapchain, render pass,
/// pipeline) are returned to the caller and abort initialization.
/// [`RhiError::Unrecoverable`] marks a per-frame device result that has no
/// recovery path; callers must stop the frame loop when they see it.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No adapter satisfies the queue, extension and surface requirements
    #[error("No suitable adapter found")]
    NoSuitableAdapter,

    /// The window could not be bound to a Vulkan surface
    #[error("Surface creation failed: {0}")]
    SurfaceCreationFailed(String),

    /// A required instance extension, device extension or layer is missing
    #[error("Extension unsupported: {0}")]
    ExtensionUnsupported(String),

    /// Shader compilation or loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Render pass or framebuffer creation error
    #[error("Render pass error: {0}")]
    RenderPassError(String),

    /// Pipeline layout or pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Buffer or texture misuse (zero size, out-of-range write, unmapped memory)
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Scene data cannot be turned into GPU resources
    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    /// A device result outside the recoverable set during steady-state rendering
    #[error("Unrecoverable device result during {operation}: {result}")]
    Unrecoverable {
        operation: &'static str,
        result: vk::Result,
    },
}

impl RhiError {
    /// Whether this error must terminate the frame loop.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, RhiError::Unrecoverable { .. })
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecoverable_display() {
        let err = RhiError::Unrecoverable {
            operation: "queue submit",
            result: vk::Result::ERROR_DEVICE_LOST,
        };
        assert!(err.is_unrecoverable());
        assert!(err.to_string().contains("queue submit"));
        assert!(!RhiError::NoSuitableAdapter.is_unrecoverable());
    }
}

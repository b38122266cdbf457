//! Renderer configuration.
//!
//! Everything the renderer used to read from process-wide toggles is
//! carried here and handed to the device layer at construction time.

use std::path::PathBuf;

use crate::{Error, Result};

/// Fixed per-type capacities of the long-lived descriptor pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorCapacity {
    /// Maximum number of descriptor sets allocated at once
    pub max_sets: u32,
    /// Uniform buffer descriptors (model and material parameter blocks)
    pub uniform_buffers: u32,
    /// Sampled image descriptors (material textures)
    pub sampled_images: u32,
    /// Sampler descriptors (one per material texture)
    pub samplers: u32,
}

impl Default for DescriptorCapacity {
    fn default() -> Self {
        Self {
            max_sets: 1024,
            uniform_buffers: 2048,
            sampled_images: 4096,
            samplers: 4096,
        }
    }
}

/// Options consumed by the device, swapchain and frame layers.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Application name reported to the driver
    pub app_name: String,
    /// Enable Khronos validation and the debug messenger
    pub enable_validation: bool,
    /// Attach a depth buffer to the render pass
    pub depth_test: bool,
    /// RGBA clear color for the color attachment
    pub clear_color: [f32; 4],
    /// Descriptor pool sizing
    pub descriptor_capacity: DescriptorCapacity,
    /// WGSL source for the model pipeline
    pub shader_path: PathBuf,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "lantern".to_string(),
            enable_validation: cfg!(debug_assertions),
            depth_test: true,
            clear_color: [0.02, 0.02, 0.03, 1.0],
            descriptor_capacity: DescriptorCapacity::default(),
            shader_path: PathBuf::from("shaders/model.wgsl"),
        }
    }
}

impl RendererConfig {
    /// Reject values the device layer cannot honour.
    pub fn validate(&self) -> Result<()> {
        let capacity = &self.descriptor_capacity;
        if capacity.max_sets == 0 {
            return Err(Error::Config("descriptor pool needs at least one set".into()));
        }
        if capacity.sampled_images != capacity.samplers {
            return Err(Error::Config(format!(
                "each material texture needs a sampler: {} images vs {} samplers",
                capacity.sampled_images, capacity.samplers
            )));
        }
        if self.clear_color.iter().any(|c| !c.is_finite()) {
            return Err(Error::Config("clear color must be finite".into()));
        }
        Ok(())
    }
}

/// Initial window parameters.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "lantern".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_follows_build_profile() {
        let config = RendererConfig::default();
        assert_eq!(config.enable_validation, cfg!(debug_assertions));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_pool() {
        let mut config = RendererConfig::default();
        config.descriptor_capacity.max_sets = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_unpaired_samplers() {
        let mut config = RendererConfig::default();
        config.descriptor_capacity.samplers = 1;
        assert!(config.validate().is_err());
    }
}

//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate wraps `ash` in owning types. It handles:
//! - Instance, surface, adapter and device creation
//! - Swapchain, render pass and framebuffer management
//! - Command buffer recording and synchronization primitives
//! - Buffers, images, textures and descriptor sets
//! - Shader compilation and graphics pipeline creation

mod error;

pub mod buffer;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod framebuffer;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;

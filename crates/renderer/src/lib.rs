//! Frame lifecycle for lantern.
//!
//! This crate owns everything between a device context and a presented
//! image:
//! - The frame state machine and its recovery policy ([`frame`])
//! - The order resources are created and released in ([`lifetime`])
//! - Pipelines and their layouts ([`registry`])
//! - Scenes uploaded to the GPU ([`scene`], [`model`], [`material`])
//! - The [`Renderer`] that ties them together

pub mod depth_buffer;
pub mod frame;
pub mod lifetime;
pub mod material;
pub mod model;
pub mod overlay;
pub mod registry;
pub mod renderer;
pub mod scene;
pub mod ubo;

pub use frame::{FrameDriver, FrameState, FrameStats, FrameStatus, FrameTarget};
pub use lifetime::ResourceKind;
pub use overlay::Overlay;
pub use renderer::Renderer;
pub use scene::{Scene, SceneId};

//! Foundation crate shared by every lantern layer.
//!
//! - [`Error`] / [`Result`] for window and configuration failures
//! - [`init_logging`] to install the `tracing` subscriber
//! - [`RendererConfig`] replacing process-wide toggles
//! - [`FrameTimer`] for frame pacing statistics

mod config;
mod error;
mod logging;
mod timer;

pub use config::{DescriptorCapacity, RendererConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FrameTimer, FrameTiming};

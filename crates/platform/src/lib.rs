//! Platform layer for lantern.
//!
//! Wraps a winit window so the renderer can bind a Vulkan surface to it and
//! query its drawable size.

mod window;

pub use window::Window;

// Re-export winit types that users might need
pub use winit::event::{ElementState, KeyEvent, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
pub use winit::keyboard::{KeyCode, PhysicalKey};

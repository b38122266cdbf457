//! Window surface binding.
//!
//! The window layer only needs to implement [`WindowSource`]; this crate
//! never depends on a particular windowing library.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};

use crate::error::RhiError;
use crate::instance::Instance;

/// Something that can be presented to: raw handles plus the current
/// drawable size in physical pixels.
pub trait WindowSource: HasDisplayHandle + HasWindowHandle {
    /// Current drawable size in pixels. `(0, 0)` while minimised.
    fn drawable_size(&self) -> (u32, u32);
}

/// RAII wrapper for a Vulkan surface.
///
/// The owning [`Instance`] must outlive this value.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Binds `window` to a new Vulkan surface.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SurfaceCreationFailed`] when the window handles are
    /// unavailable or the driver rejects them.
    pub fn new(instance: &Instance, window: &dyn WindowSource) -> Result<Self, RhiError> {
        if !instance.supports_surfaces() {
            return Err(RhiError::SurfaceCreationFailed(
                "instance was created without surface extensions".into(),
            ));
        }

        let display = window
            .display_handle()
            .map_err(|e| RhiError::SurfaceCreationFailed(format!("display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| RhiError::SurfaceCreationFailed(format!("window handle: {e}")))?;

        // SAFETY: handles come from a live window; the surface is destroyed in Drop.
        let handle = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.handle(),
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| RhiError::SurfaceCreationFailed(e.to_string()))?
        };

        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        info!("Vulkan surface created");

        Ok(Self { handle, loader })
    }

    /// Raw surface handle.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Surface extension loader used for capability queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
        debug!("Vulkan surface destroyed");
    }
}

//! The device context: one live connection to a GPU.
//!
//! [`DeviceContext`] bundles the instance, the optional window surface, the
//! selected adapter, the logical device and the two long-lived pools. It is
//! created once at startup and must be dropped after every other GPU
//! resource.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use lantern_core::RendererConfig;
use tracing::info;

use crate::command::CommandPool;
use crate::descriptor::DescriptorPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, select_physical_device};
use crate::surface::{Surface, WindowSource};

/// Instance, surface, adapter, device and shared pools.
///
/// Fields are released pools first, then the device, the surface and
/// finally the instance.
pub struct DeviceContext {
    command_pool: ManuallyDrop<CommandPool>,
    descriptor_pool: ManuallyDrop<Arc<DescriptorPool>>,
    device: ManuallyDrop<Arc<Device>>,
    adapter: PhysicalDeviceInfo,
    surface: ManuallyDrop<Option<Surface>>,
    instance: ManuallyDrop<Instance>,
}

impl DeviceContext {
    /// Creates a presenting context for `window`.
    ///
    /// # Errors
    ///
    /// - [`RhiError::LoadingError`] if the Vulkan loader is missing
    /// - [`RhiError::ExtensionUnsupported`] for missing instance or device extensions
    /// - [`RhiError::SurfaceCreationFailed`] if the window cannot be bound
    /// - [`RhiError::NoSuitableAdapter`] if no adapter can render and present
    pub fn new(config: &RendererConfig, window: &dyn WindowSource) -> RhiResult<Self> {
        let display = window
            .display_handle()
            .map_err(|e| RhiError::SurfaceCreationFailed(format!("display handle: {e}")))?
            .as_raw();

        let instance = Instance::new(config, Some(display))?;
        let surface = Surface::new(&instance, window)?;
        Self::assemble(config, instance, Some(surface))
    }

    /// Creates a context without a surface.
    ///
    /// The graphics queue stands in for the presentation queue. Used for
    /// uploads and readback without a window.
    pub fn headless(config: &RendererConfig) -> RhiResult<Self> {
        let instance = Instance::new(config, None)?;
        Self::assemble(config, instance, None)
    }

    fn assemble(
        config: &RendererConfig,
        instance: Instance,
        surface: Option<Surface>,
    ) -> RhiResult<Self> {
        let adapter = select_physical_device(&instance, surface.as_ref())?;
        let device = Device::new(&instance, &adapter, surface.is_some())?;

        let graphics_family = adapter
            .queue_families
            .graphics_family
            .ok_or(RhiError::NoSuitableAdapter)?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let descriptor_pool = Arc::new(DescriptorPool::new(
            device.clone(),
            &config.descriptor_capacity,
        )?);

        info!(
            "Device context ready on '{}' ({})",
            adapter.device_name(),
            if surface.is_some() { "presenting" } else { "headless" }
        );

        Ok(Self {
            command_pool: ManuallyDrop::new(command_pool),
            descriptor_pool: ManuallyDrop::new(descriptor_pool),
            device: ManuallyDrop::new(device),
            adapter,
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
        })
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The window surface, `None` for headless contexts.
    #[inline]
    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    #[inline]
    pub fn adapter(&self) -> &PhysicalDeviceInfo {
        &self.adapter
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    #[inline]
    pub fn descriptor_pool(&self) -> &Arc<DescriptorPool> {
        &self.descriptor_pool
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle during shutdown: {}", e);
        }

        unsafe {
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.descriptor_pool);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }
        info!("Device context destroyed");
    }
}

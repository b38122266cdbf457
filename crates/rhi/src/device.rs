//! Vulkan logical device and queue management.
//!
//! [`Device`] owns the logical device, the graphics and present queues and
//! the `gpu-allocator` instance. It is shared through `Arc` by every
//! resource wrapper, which guarantees the device outlives them.

use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::RhiError;
use crate::instance::{Instance, first_missing};
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

const PRESENTING_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];
const HEADLESS_EXTENSIONS: &[&CStr] = &[];

/// Device extensions required for the given mode.
pub fn required_device_extensions(presenting: bool) -> &'static [&'static CStr] {
    if presenting {
        PRESENTING_EXTENSIONS
    } else {
        HEADLESS_EXTENSIONS
    }
}

/// Builds one queue create info per distinct family.
pub fn queue_create_infos<'a>(
    families: &QueueFamilyIndices,
    priorities: &'a [f32],
) -> Vec<vk::DeviceQueueCreateInfo<'a>> {
    families
        .unique_families()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(priorities)
        })
        .collect()
}

/// Vulkan logical device wrapper.
///
/// The allocator is protected by a `Mutex`; everything else is immutable
/// after construction.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    /// Dropped explicitly before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
    presenting: bool,
    max_sampler_anisotropy: Option<f32>,
}

impl Device {
    /// Creates the logical device for `adapter`.
    ///
    /// One queue is requested per distinct family: a single queue when
    /// graphics and presentation share a family, two otherwise.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance
    /// * `adapter` - The adapter picked by
    ///   [`select_physical_device`](crate::physical_device::select_physical_device)
    /// * `presenting` - Whether swapchain support is required
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A required extension is missing ([`RhiError::ExtensionUnsupported`])
    /// - Device creation fails
    /// - Allocator initialization fails
    pub fn new(
        instance: &Instance,
        adapter: &PhysicalDeviceInfo,
        presenting: bool,
    ) -> Result<Arc<Self>, RhiError> {
        let queue_families = adapter.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::NoSuitableAdapter);
        };

        let extensions = required_device_extensions(presenting);
        let available = unsafe {
            instance
                .handle()
                .enumerate_device_extension_properties(adapter.device)?
        };
        let available: Vec<&CStr> = available
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
            .collect();
        if let Some(missing) = first_missing(extensions, &available) {
            return Err(RhiError::ExtensionUnsupported(
                missing.to_string_lossy().into_owned(),
            ));
        }

        let queue_priorities = [1.0f32];
        let queue_infos = queue_create_infos(&queue_families, &queue_priorities);
        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_infos.len(),
            queue_families.unique_families()
        );

        let anisotropy_supported = adapter.features.sampler_anisotropy == vk::TRUE;
        let features =
            vk::PhysicalDeviceFeatures::default().sampler_anisotropy(anisotropy_supported);
        let max_sampler_anisotropy = anisotropy_supported
            .then_some(adapter.properties.limits.max_sampler_anisotropy.min(16.0));

        let extension_names: Vec<*const std::ffi::c_char> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(adapter.device, &create_info, None)?
        };

        info!(
            "Logical device created on '{}' with {} extension(s)",
            adapter.device_name(),
            extensions.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: adapter.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        debug!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: adapter.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            queue_families,
            presenting,
            max_sampler_anisotropy,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue handle.
    ///
    /// Same as the graphics queue when the families are shared or headless.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Whether the device was created with swapchain support.
    #[inline]
    pub fn is_presenting(&self) -> bool {
        self.presenting
    }

    /// Anisotropy limit for samplers, or `None` when the feature is off.
    #[inline]
    pub fn sampler_anisotropy(&self) -> Option<f32> {
        self.max_sampler_anisotropy
    }

    /// Locks the GPU memory allocator.
    ///
    /// A poisoned lock is recovered: the allocator holds no invariant that a
    /// panicking holder could have broken half-way.
    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Blocks until all queues are idle.
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Blocks until the presentation queue is idle.
    pub fn wait_present_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.queue_wait_idle(self.present_queue)? };
        Ok(())
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Safety
    ///
    /// The command buffers must be fully recorded and every referenced
    /// semaphore and fence must be in a state the submission allows.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> Result<(), vk::Result> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // Allocator memory blocks are freed through the device handle.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// ash::Device is Send + Sync, queues are plain handles and the allocator is
// behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(graphics: u32, present: u32) -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics_family: Some(graphics),
            present_family: Some(present),
        }
    }

    #[test]
    fn test_required_extensions() {
        assert_eq!(required_device_extensions(true), &[ash::khr::swapchain::NAME]);
        assert!(required_device_extensions(false).is_empty());
    }

    #[test]
    fn test_two_families_request_two_queues() {
        let priorities = [1.0];
        let infos = queue_create_infos(&indices(0, 1), &priorities);
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].queue_family_index, 0);
        assert_eq!(infos[1].queue_family_index, 1);
        assert!(infos.iter().all(|info| info.queue_count == 1));
    }

    #[test]
    fn test_shared_family_requests_one_queue() {
        let priorities = [1.0];
        let infos = queue_create_infos(&indices(2, 2), &priorities);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].queue_family_index, 2);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}

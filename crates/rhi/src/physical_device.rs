//! Physical adapter selection.
//!
//! Adapters are visited in enumeration order and the first one that
//! satisfies every requirement is chosen:
//!
//! 1. All required device extensions are exposed
//! 2. A graphics-capable queue family exists
//! 3. A presentation-capable queue family exists (skipped when headless)
//! 4. The surface reports at least one format and one present mode
//!
//! # Example
//!
//! ```no_run
//! use lantern_core::RendererConfig;
//! use lantern_rhi::instance::Instance;
//! use lantern_rhi::physical_device::select_physical_device;
//!
//! let instance = Instance::new(&RendererConfig::default(), None).expect("instance");
//! let adapter = select_physical_device(&instance, None).expect("No suitable adapter");
//! println!("Selected GPU: {}", adapter.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::required_device_extensions;
use crate::error::RhiError;
use crate::instance::{Instance, first_missing};
use crate::surface::Surface;
use crate::swapchain::SwapchainSupportDetails;

/// Queue family indices used by the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to the surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both a graphics and a present family were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Whether graphics and presentation share one family.
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.is_complete() && self.graphics_family == self.present_family
    }

    /// Distinct family indices, one entry per queue to create.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }
}

/// Picks graphics and present families from a device's family list.
///
/// A single family supporting both is preferred. Otherwise the first
/// graphics family and the first present family are used separately.
pub fn select_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let present = supports_present(i);

        if graphics && present {
            return QueueFamilyIndices {
                graphics_family: Some(i),
                present_family: Some(i),
            };
        }
        if graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }
        if present && indices.present_family.is_none() {
            indices.present_family = Some(i);
        }
    }

    indices
}

/// Information about the selected adapter.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Queue family indices for graphics and presentation.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Why an adapter was passed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A required device extension is not exposed
    MissingExtension(String),
    /// No graphics or no present family
    MissingQueueFamilies,
    /// Surface formats or present modes came back empty
    InadequateSurface,
}

/// Maps the rejection list of a failed selection to the reported error.
///
/// Missing extensions are only blamed when they are the reason every
/// adapter was turned down.
pub fn selection_error(rejections: &[Rejection]) -> RhiError {
    let mut missing = rejections.iter().map(|r| match r {
        Rejection::MissingExtension(name) => Some(name),
        _ => None,
    });

    match missing.next() {
        Some(Some(first)) if missing.all(|m| m.is_some()) => {
            RhiError::ExtensionUnsupported(first.clone())
        }
        _ => RhiError::NoSuitableAdapter,
    }
}

/// Selects the first adapter that can render (and present to `surface`).
///
/// # Errors
///
/// - [`RhiError::NoSuitableAdapter`] if no adapter qualifies
/// - [`RhiError::ExtensionUnsupported`] if every adapter lacked a required extension
pub fn select_physical_device(
    instance: &Instance,
    surface: Option<&Surface>,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.handle().enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableAdapter);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut rejections = Vec::with_capacity(devices.len());
    for device in devices {
        match check_device_suitability(instance.handle(), device, surface)? {
            Ok(info) => {
                info!(
                    "Selected GPU: '{}' ({}), graphics family {:?}, present family {:?}",
                    info.device_name(),
                    info.device_type_name(),
                    info.queue_families.graphics_family,
                    info.queue_families.present_family
                );
                return Ok(info);
            }
            Err(rejection) => rejections.push(rejection),
        }
    }

    warn!("No suitable GPU found: {:?}", rejections);
    Err(selection_error(&rejections))
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: Option<&Surface>,
) -> Result<Result<PhysicalDeviceInfo, Rejection>, RhiError> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    let available = unsafe { instance.enumerate_device_extension_properties(device)? };
    let available: Vec<&CStr> = available
        .iter()
        .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
        .collect();
    if let Some(missing) = first_missing(required_device_extensions(surface.is_some()), &available)
    {
        let missing = missing.to_string_lossy().into_owned();
        debug!("GPU '{}' skipped: missing extension {}", device_name, missing);
        return Ok(Err(Rejection::MissingExtension(missing)));
    }

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let queue_families = match surface {
        Some(surface) => select_queue_families(&families, |i| unsafe {
            surface
                .loader()
                .get_physical_device_surface_support(device, i, surface.handle())
                .unwrap_or(false)
        }),
        // Headless: presentation never happens, so the graphics family stands in.
        None => select_queue_families(&families, |i| {
            families[i as usize]
                .queue_flags
                .contains(vk::QueueFlags::GRAPHICS)
        }),
    };

    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing queue families (graphics={}, present={})",
            device_name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return Ok(Err(Rejection::MissingQueueFamilies));
    }

    if let Some(surface) = surface {
        let adequate = SwapchainSupportDetails::query(device, surface.handle(), surface.loader())
            .is_ok();
        if !adequate {
            debug!("GPU '{}' skipped: no surface formats or present modes", device_name);
            return Ok(Err(Rejection::InadequateSurface));
        }
    }

    Ok(Ok(PhysicalDeviceInfo {
        device,
        properties,
        features,
        queue_families,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        assert!(indices.unique_families().is_empty());
    }

    #[test]
    fn test_separate_graphics_and_present_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = select_queue_families(&families, |i| i == 1);

        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
        assert!(!indices.is_shared());
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_shared_family_yields_one_queue() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = select_queue_families(&families, |_| true);

        assert!(indices.is_shared());
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn test_prefers_family_supporting_both() {
        // Family 0 graphics only, 1 present only, 2 both.
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let indices = select_queue_families(&families, |i| i >= 1);

        assert_eq!(indices.graphics_family, Some(2));
        assert_eq!(indices.present_family, Some(2));
    }

    #[test]
    fn test_skips_empty_families() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        let indices = select_queue_families(&families, |_| true);

        assert_eq!(indices.graphics_family, Some(1));
    }

    #[test]
    fn test_missing_present_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = select_queue_families(&families, |_| false);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_selection_error_classification() {
        assert!(matches!(selection_error(&[]), RhiError::NoSuitableAdapter));

        let only_extensions = [
            Rejection::MissingExtension("VK_KHR_swapchain".into()),
            Rejection::MissingExtension("VK_KHR_swapchain".into()),
        ];
        assert!(matches!(
            selection_error(&only_extensions),
            RhiError::ExtensionUnsupported(name) if name == "VK_KHR_swapchain"
        ));

        let mixed = [
            Rejection::MissingExtension("VK_KHR_swapchain".into()),
            Rejection::MissingQueueFamilies,
        ];
        assert!(matches!(selection_error(&mixed), RhiError::NoSuitableAdapter));
    }
}

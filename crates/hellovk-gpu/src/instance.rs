//! Vulkan instance creation, validation and physical device selection.

use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{c_void, CStr, CString};

/// Lowest Vulkan version a device must report.
pub const MIN_API_VERSION: (u32, u32) = (1, 1);

/// Instance extensions needed for presenting to a window on this platform.
pub fn required_instance_extensions() -> Vec<&'static CStr> {
    vec![
        ash::khr::surface::NAME,
        #[cfg(target_os = "windows")]
        ash::khr::win32_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::xlib_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::wayland_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::ext::metal_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_enumeration::NAME,
    ]
}

/// Validation layers enabled when validation is requested.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Create a Vulkan instance.
///
/// With validation on, the Khronos validation layer (if installed) and the
/// debug-utils extension are enabled.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"hellovk")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_1);

    let mut extensions = required_instance_extensions();
    let mut layers = Vec::new();

    if enable_validation {
        let available_layers = entry.enumerate_instance_layer_properties()?;
        for layer in validation_layers() {
            let found = available_layers
                .iter()
                .any(|props| props.layer_name_as_c_str().is_ok_and(|name| name == layer));
            if found {
                layers.push(layer);
            } else {
                tracing::warn!("Validation layer {layer:?} not available");
            }
        }
        extensions.push(ash::ext::debug_utils::NAME);
    }

    let extension_names: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();
    let layer_names: Vec<*const i8> = layers.iter().map(|l| l.as_ptr()).collect();

    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = entry.create_instance(&create_info, None)?;

    Ok(instance)
}

/// Debug-utils messenger forwarding validation output to `tracing`.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Install the messenger.
    ///
    /// # Safety
    /// The instance must have been created with the debug-utils extension.
    pub unsafe fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = loader.create_debug_utils_messenger(&create_info, None)?;

        Ok(Self { loader, messenger })
    }

    /// Remove the messenger.
    ///
    /// # Safety
    /// Must be called before the instance is destroyed.
    pub unsafe fn destroy(&self) {
        self.loader
            .destroy_debug_utils_messenger(self.messenger, None);
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let message = (*data)
        .message_as_c_str()
        .map_or_else(|| "<no message>".into(), CStr::to_string_lossy);

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", "[{types:?}] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", "[{types:?}] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::debug!(target: "vulkan", "[{types:?}] {message}");
    } else {
        tracing::trace!(target: "vulkan", "[{types:?}] {message}");
    }

    vk::FALSE
}

/// Whether `api_version` is at least [`MIN_API_VERSION`].
pub fn meets_min_api_version(api_version: u32) -> bool {
    let version = (
        vk::api_version_major(api_version),
        vk::api_version_minor(api_version),
    );
    version >= MIN_API_VERSION
}

/// Select the best physical device.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice> {
    let devices = instance.enumerate_physical_devices()?;

    devices
        .into_iter()
        .filter_map(|device| {
            let properties = instance.get_physical_device_properties(device);
            score_device(properties.device_type, properties.api_version).map(|s| (s, device))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, device)| device)
        .ok_or(GpuError::NoSuitableDevice)
}

/// Score a device by type; `None` when it does not meet the version floor.
pub fn score_device(device_type: vk::PhysicalDeviceType, api_version: u32) -> Option<u32> {
    if !meets_min_api_version(api_version) {
        return None;
    }

    let score = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 1,
    };
    Some(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_floor() {
        assert!(meets_min_api_version(vk::API_VERSION_1_1));
        assert!(meets_min_api_version(vk::API_VERSION_1_3));
        assert!(!meets_min_api_version(vk::API_VERSION_1_0));
    }

    #[test]
    fn discrete_beats_integrated() {
        let discrete = score_device(vk::PhysicalDeviceType::DISCRETE_GPU, vk::API_VERSION_1_2);
        let integrated =
            score_device(vk::PhysicalDeviceType::INTEGRATED_GPU, vk::API_VERSION_1_2);
        let cpu = score_device(vk::PhysicalDeviceType::CPU, vk::API_VERSION_1_2);
        assert!(discrete > integrated);
        assert!(integrated > cpu);
        assert!(cpu.is_some());
    }

    #[test]
    fn old_devices_rejected() {
        assert_eq!(
            score_device(vk::PhysicalDeviceType::DISCRETE_GPU, vk::API_VERSION_1_0),
            None
        );
    }

    #[test]
    fn validation_adds_no_platform_requirement() {
        let extensions = required_instance_extensions();
        assert!(extensions.contains(&ash::khr::surface::NAME));
        assert!(!extensions.contains(&ash::ext::debug_utils::NAME));
    }
}

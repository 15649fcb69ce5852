use crate::VALIDATION_ENABLED;
use anyhow::anyhow;
use log::{debug, error, info, warn};
use raw_window_handle::HasWindowHandle;
use std::ffi::{c_void, CStr};
use vulkanalia::loader::{LibloadingLoader, LIBRARY};
use vulkanalia::vk::{EntryV1_0, ExtDebugUtilsExtension, HasBuilder};
use vulkanalia::window::get_required_instance_extensions;
use vulkanalia::{vk, Entry, Instance, Version};

/// The Khronos validation layer, enabled when `VALIDATION_ENABLED` is set.
pub const VALIDATION_LAYER: vk::ExtensionName =
    vk::ExtensionName::from_bytes(b"VK_LAYER_KHRONOS_validation");

/// Loads the Vulkan loader library of the system and resolves the global entry points.
pub fn create_vulkan_entry() -> Result<Entry, anyhow::Error> {
    let loader = unsafe { LibloadingLoader::new(LIBRARY) }
        .map_err(|e| anyhow!("Failed to load the Vulkan library: {}", e))?;

    unsafe { Entry::new(loader) }.map_err(|e| anyhow!("Failed to load Vulkan entry points: {}", e))
}

/// Checks to ensure the validation layer is supported.
pub fn check_validation_layer_support(entry: &Entry) -> Result<bool, anyhow::Error> {
    let layers = unsafe {
        entry
            .enumerate_instance_layer_properties()
            .map_err(|e| anyhow!(e))?
    };

    Ok(layers.iter().any(|l| l.layer_name == VALIDATION_LAYER))
}

pub extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    type_: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut c_void,
) -> vk::Bool32 {
    let message = unsafe { CStr::from_ptr((*callback_data).message) }.to_string_lossy();

    if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        error!("({:?}) {}", type_, message);
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        warn!("({:?}) {}", type_, message);
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        info!("({:?}) {}", type_, message);
    } else {
        debug!("({:?}) {}", type_, message);
    }

    vk::FALSE
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXTBuilder<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
        )
        .user_callback(Some(debug_callback))
}

/// Creates a new Vulkan instance with the extensions the window system needs to present to
/// `window`, plus debug utils when validation is enabled.
pub fn create_instance(
    window: &dyn HasWindowHandle,
    entry: &Entry,
) -> Result<Instance, anyhow::Error> {
    if VALIDATION_ENABLED && !check_validation_layer_support(entry)? {
        return Err(anyhow!("Requested validation layer is not supported!"));
    }

    let application_info = vk::ApplicationInfo::builder()
        .application_name(b"VULKAN-GUIDE\0")
        .application_version(Version::new(0, 1, 1).into())
        .engine_name(b"VULKAN-GUIDE-ENGINE\0")
        .engine_version(Version::new(0, 1, 1).into())
        .api_version(Version::new(1, 3, 0).into());

    let mut extensions = get_required_instance_extensions(window)
        .iter()
        .map(|e| e.as_ptr())
        .collect::<Vec<_>>();

    if VALIDATION_ENABLED {
        extensions.push(vk::EXT_DEBUG_UTILS_EXTENSION.name.as_ptr());
    }

    let layers = if VALIDATION_ENABLED {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    // Chained so that instance creation and destruction are covered by the callback too.
    let mut instance_debug_info = debug_messenger_info();

    let mut instance_create_info = vk::InstanceCreateInfo::builder()
        .application_info(&application_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);

    if VALIDATION_ENABLED {
        instance_create_info = instance_create_info.push_next(&mut instance_debug_info);
    }

    let instance = unsafe {
        entry
            .create_instance(&instance_create_info, None)
            .map_err(|e| anyhow!(e))?
    };

    info!("Created Vulkan instance ({} extensions).", extensions.len());
    Ok(instance)
}

/// Installs the debug messenger on `instance`. Returns `None` when validation is disabled.
pub fn create_debug_messenger(
    instance: &Instance,
) -> Result<Option<vk::DebugUtilsMessengerEXT>, anyhow::Error> {
    if !VALIDATION_ENABLED {
        return Ok(None);
    }

    let messenger = unsafe {
        instance
            .create_debug_utils_messenger_ext(&debug_messenger_info(), None)
            .map_err(|e| anyhow!(e))?
    };

    debug!("Installed debug messenger.");
    Ok(Some(messenger))
}

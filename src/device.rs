use crate::REQUIRED_EXTENSIONS;
use anyhow::anyhow;
use log::{debug, info};
use vulkanalia::vk::{DeviceV1_0, HasBuilder, InstanceV1_0};
use vulkanalia::{vk, Device, Instance};

/// The physical device chosen for rendering and the queue family used for all submissions.
#[derive(Debug, Clone, Copy)]
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub graphics_family: u32,
}

/// Returns the index of the first queue family that supports graphics work.
pub fn find_graphics_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32)
}

/// A device is usable only if it is a discrete GPU with the required extensions and a
/// graphics-capable queue family. Returns that family.
pub fn suitable_graphics_family(
    device_type: vk::PhysicalDeviceType,
    families: &[vk::QueueFamilyProperties],
    extensions_supported: bool,
) -> Option<u32> {
    if device_type != vk::PhysicalDeviceType::DISCRETE_GPU || !extensions_supported {
        return None;
    }

    find_graphics_family(families)
}

/// Queries the physical device for support for the required device extensions.
///
/// https://docs.vulkan.org/tutorial/latest/03_Drawing_a_triangle/01_Presentation/01_Swap_chain.html
fn check_device_extension_support(
    instance: &Instance,
    device: vk::PhysicalDevice,
) -> Result<bool, anyhow::Error> {
    let extension_properties = unsafe {
        instance
            .enumerate_device_extension_properties(device, None)
            .map_err(|e| anyhow!(e))?
            .iter()
            .map(|e| e.extension_name)
            .collect::<Vec<_>>()
    };

    Ok(REQUIRED_EXTENSIONS
        .iter()
        .all(|ext| extension_properties.contains(ext)))
}

/// Selects the first discrete GPU exposing a graphics queue family.
///
/// https://docs.vulkan.org/tutorial/latest/03_Drawing_a_triangle/00_Setup/03_Physical_devices_and_queue_families.html
pub fn pick_physical_device(instance: &Instance) -> Result<SelectedDevice, anyhow::Error> {
    let devices = unsafe {
        instance
            .enumerate_physical_devices()
            .map_err(|e| anyhow!(e))?
    };

    for physical_device in devices {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let extensions_supported = check_device_extension_support(instance, physical_device)?;

        match suitable_graphics_family(properties.device_type, &families, extensions_supported) {
            Some(graphics_family) => {
                info!("Selected physical device (`{}`).", properties.device_name);
                return Ok(SelectedDevice {
                    physical_device,
                    graphics_family,
                });
            }
            None => debug!(
                "Skipping physical device (`{}`, {:?}).",
                properties.device_name, properties.device_type
            ),
        }
    }

    Err(anyhow!("No discrete GPU with a graphics queue family found!"))
}

/// Creates a logical device with a single graphics queue and returns it with that queue.
///
/// https://docs.vulkan.org/tutorial/latest/03_Drawing_a_triangle/00_Setup/04_Logical_device_and_queues.html
pub fn create_logical_device(
    instance: &Instance,
    selected: &SelectedDevice,
) -> Result<(Device, vk::Queue), anyhow::Error> {
    let queue_priorities = [1.0f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::builder()
        .queue_family_index(selected.graphics_family)
        .queue_priorities(&queue_priorities)];

    let required_extensions = REQUIRED_EXTENSIONS
        .iter()
        .map(|e| e.as_ptr())
        .collect::<Vec<_>>();

    let features = vk::PhysicalDeviceFeatures::builder();

    let device_create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&required_extensions)
        .enabled_features(&features);

    let device = unsafe {
        instance
            .create_device(selected.physical_device, &device_create_info, None)
            .map_err(|e| anyhow!(e))?
    };

    let graphics_queue = unsafe { device.get_device_queue(selected.graphics_family, 0) };

    info!("Created logical device.");
    Ok((device, graphics_queue))
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
    fn first_graphics_family_wins() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];

        assert_eq!(find_graphics_family(&families), Some(1));
    }

    #[test]
    fn only_discrete_gpus_are_suitable() {
        let families = [family(vk::QueueFlags::GRAPHICS)];

        assert_eq!(
            suitable_graphics_family(vk::PhysicalDeviceType::DISCRETE_GPU, &families, true),
            Some(0)
        );
        assert_eq!(
            suitable_graphics_family(vk::PhysicalDeviceType::INTEGRATED_GPU, &families, true),
            None
        );
        assert_eq!(
            suitable_graphics_family(vk::PhysicalDeviceType::CPU, &families, true),
            None
        );
    }

    #[test]
    fn missing_graphics_family_or_extensions_is_unsuitable() {
        let compute_only = [family(vk::QueueFlags::COMPUTE)];
        let graphics = [family(vk::QueueFlags::GRAPHICS)];

        assert_eq!(
            suitable_graphics_family(vk::PhysicalDeviceType::DISCRETE_GPU, &compute_only, true),
            None
        );
        assert_eq!(
            suitable_graphics_family(vk::PhysicalDeviceType::DISCRETE_GPU, &graphics, false),
            None
        );
    }
}

use crate::platform::WindowSize;
use anyhow::anyhow;
use log::info;
use vulkanalia::vk::{DeviceV1_0, Handle, HasBuilder, KhrSurfaceExtension, KhrSwapchainExtension};
use vulkanalia::{vk, Device, Instance};

/// Specifies the number of layers each image in a swap chain should consist of. This is always 1,
/// unless developing a stereoscopic 3D application.
const IMAGE_LAYERS_COUNT: u32 = 1;

/// What a surface supports on a given physical device.
#[derive(Debug)]
pub struct SwapChainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapChainSupportDetails {
    /// Creates a new `SwapChainSupportDetails` utilizing an instance, physical device, and
    /// surface to query.
    pub fn query_new(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self, anyhow::Error> {
        let capabilities = unsafe {
            instance
                .get_physical_device_surface_capabilities_khr(device, surface)
                .map_err(|e| anyhow!(e))?
        };

        let formats = unsafe {
            instance
                .get_physical_device_surface_formats_khr(device, surface)
                .map_err(|e| anyhow!(e))?
        };

        let present_modes = unsafe {
            instance
                .get_physical_device_surface_present_modes_khr(device, surface)
                .map_err(|e| anyhow!(e))?
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Prefers an 8-bit sRGB format, otherwise takes whatever the surface lists first.
    pub fn choose_surface_format(&self) -> Option<vk::SurfaceFormatKHR> {
        self.formats
            .iter()
            .find(|f| {
                matches!(f.format, vk::Format::B8G8R8A8_SRGB | vk::Format::R8G8B8A8_SRGB)
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| self.formats.first())
            .copied()
    }

    /// Chooses the present mode for the swap chain. Prefers MAILBOX,
    /// but will return FIFO if that is not available.
    pub fn choose_present_mode(&self) -> vk::PresentModeKHR {
        if self.present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
            vk::PresentModeKHR::MAILBOX
        } else {
            vk::PresentModeKHR::FIFO
        }
    }

    /// Chooses the resolution of the swap chain images.
    ///
    /// When the surface reports a fixed current extent it has to be used. A current extent of
    /// `u32::MAX` (the Wayland case) means the swapchain decides, so the target size is clamped
    /// to the supported range.
    pub fn choose_swap_extent(&self, target: WindowSize) -> vk::Extent2D {
        let capabilities = &self.capabilities;

        if capabilities.current_extent.width != u32::MAX {
            return capabilities.current_extent;
        }

        vk::Extent2D {
            width: target.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: target.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }

    /// One more than the minimum, capped at the maximum when the surface has one.
    pub fn select_image_count(&self) -> u32 {
        let desired = self.capabilities.min_image_count + 1;

        if self.capabilities.max_image_count > 0 {
            desired.min(self.capabilities.max_image_count)
        } else {
            desired
        }
    }
}

/// The swapchain and everything sized by it.
///
/// `images`, `image_views` and `framebuffers` always describe the same swapchain and have the
/// same length once framebuffers have been built.
#[derive(Debug, Default)]
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    /// The size this swapchain was requested for.
    pub target: WindowSize,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl Swapchain {
    /// Creates a swap chain for `surface` sized for `target`, and one view per image.
    ///
    /// https://docs.vulkan.org/tutorial/latest/03_Drawing_a_triangle/01_Presentation/01_Swap_chain.html
    pub fn create(
        instance: &Instance,
        device: &Device,
        physical_device: vk::PhysicalDevice,
        graphics_family: u32,
        surface: vk::SurfaceKHR,
        target: WindowSize,
    ) -> Result<Self, anyhow::Error> {
        // Presentation happens on the graphics queue, so that family has to support the surface.
        let present_supported = unsafe {
            instance
                .get_physical_device_surface_support_khr(physical_device, graphics_family, surface)
                .map_err(|e| anyhow!(e))?
        };
        if !present_supported {
            return Err(anyhow!(
                "Graphics queue family {} cannot present to the window surface.",
                graphics_family
            ));
        }

        let support = SwapChainSupportDetails::query_new(instance, physical_device, surface)?;

        let surface_format = support
            .choose_surface_format()
            .ok_or(anyhow!("Unable to select a surface format for the swap chain."))?;
        let present_mode = support.choose_present_mode();
        let extent = support.choose_swap_extent(target);
        let image_count = support.select_image_count();

        let swap_chain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(IMAGE_LAYERS_COUNT)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let handle = unsafe {
            device
                .create_swapchain_khr(&swap_chain_create_info, None)
                .map_err(|e| anyhow!(e))?
        };

        let images = unsafe {
            device
                .get_swapchain_images_khr(handle)
                .map_err(|e| anyhow!(e))?
        };

        let mut swapchain = Self {
            handle,
            format: surface_format.format,
            extent,
            target,
            images,
            image_views: Vec::new(),
            framebuffers: Vec::new(),
        };
        swapchain.create_image_views(device)?;

        info!(
            "Created swapchain ({}x{}, {} images, {:?}).",
            extent.width,
            extent.height,
            swapchain.images.len(),
            present_mode
        );

        Ok(swapchain)
    }

    fn create_image_views(&mut self, device: &Device) -> Result<(), anyhow::Error> {
        self.image_views = Vec::with_capacity(self.images.len());

        for image in &self.images {
            let components = vk::ComponentMapping::builder()
                .r(vk::ComponentSwizzle::IDENTITY)
                .g(vk::ComponentSwizzle::IDENTITY)
                .b(vk::ComponentSwizzle::IDENTITY)
                .a(vk::ComponentSwizzle::IDENTITY);

            let subresource_range = vk::ImageSubresourceRange::builder()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(IMAGE_LAYERS_COUNT);

            let create_info = vk::ImageViewCreateInfo::builder()
                .image(*image)
                .view_type(vk::ImageViewType::_2D)
                .format(self.format)
                .components(components)
                .subresource_range(subresource_range);

            let image_view = unsafe {
                device
                    .create_image_view(&create_info, None)
                    .map_err(|e| anyhow!(e))?
            };

            self.image_views.push(image_view);
        }

        Ok(())
    }

    /// Builds one framebuffer per image view, compatible with `render_pass`.
    pub fn create_framebuffers(
        &mut self,
        device: &Device,
        render_pass: vk::RenderPass,
    ) -> Result<(), anyhow::Error> {
        self.framebuffers = Vec::with_capacity(self.image_views.len());

        for view in &self.image_views {
            let attachments = [*view];
            let create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            let framebuffer = unsafe {
                device
                    .create_framebuffer(&create_info, None)
                    .map_err(|e| anyhow!(e))?
            };

            self.framebuffers.push(framebuffer);
        }

        Ok(())
    }

    pub unsafe fn destroy_framebuffers(&mut self, device: &Device) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { device.destroy_framebuffer(framebuffer, None) };
        }
    }

    /// Destroys framebuffers, views and the swapchain itself. The images belong to the
    /// swapchain and go with it.
    pub unsafe fn destroy(&mut self, device: &Device) {
        unsafe {
            self.destroy_framebuffers(device);

            for view in self.image_views.drain(..) {
                device.destroy_image_view(view, None);
            }

            if !self.handle.is_null() {
                device.destroy_swapchain_khr(self.handle, None);
            }
        }

        self.handle = vk::SwapchainKHR::null();
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn support(capabilities: vk::SurfaceCapabilitiesKHR) -> SwapChainSupportDetails {
        SwapChainSupportDetails {
            capabilities,
            formats: Vec::new(),
            present_modes: Vec::new(),
        }
    }

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn srgb_format_is_preferred() {
        let mut details = support(vk::SurfaceCapabilitiesKHR::default());
        details.formats = vec![
            format(vk::Format::B8G8R8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
        ];

        assert_eq!(
            details.choose_surface_format().map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
    }

    #[test]
    fn first_format_is_the_fallback() {
        let mut details = support(vk::SurfaceCapabilitiesKHR::default());
        assert_eq!(details.choose_surface_format(), None);

        details.formats = vec![format(vk::Format::A2B10G10R10_UNORM_PACK32)];
        assert_eq!(
            details.choose_surface_format().map(|f| f.format),
            Some(vk::Format::A2B10G10R10_UNORM_PACK32)
        );
    }

    #[test]
    fn mailbox_is_preferred_over_fifo() {
        let mut details = support(vk::SurfaceCapabilitiesKHR::default());
        details.present_modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(details.choose_present_mode(), vk::PresentModeKHR::MAILBOX);

        details.present_modes = vec![vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(details.choose_present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn fixed_current_extent_wins() {
        let details = support(vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 640, height: 480 },
            ..Default::default()
        });

        let extent = details.choose_swap_extent(WindowSize::new(1024, 768));
        assert_eq!((extent.width, extent.height), (640, 480));
    }

    #[test]
    fn undefined_extent_clamps_target() {
        let details = support(vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 1920, height: 1080 },
            ..Default::default()
        });

        let extent = details.choose_swap_extent(WindowSize::new(1024, 768));
        assert_eq!((extent.width, extent.height), (1024, 768));

        let extent = details.choose_swap_extent(WindowSize::new(4000, 3000));
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn image_count_respects_bounds() {
        let unbounded = support(vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        });
        assert_eq!(unbounded.select_image_count(), 3);

        let bounded = support(vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        });
        assert_eq!(bounded.select_image_count(), 2);
    }
}

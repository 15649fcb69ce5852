use crate::device::{create_logical_device, pick_physical_device};
use crate::error::{FrameOp, GraphicsError, SetupStep, StepContext};
use crate::frame::{Acquire, FrameBackend, Present};
use crate::init::{create_debug_messenger, create_instance, create_vulkan_entry};
use crate::pipeline::{create_graphics_pipeline, create_render_pass};
use crate::platform::{PlatformWindow, WindowSize};
use crate::swapchain::Swapchain;
use crate::{FRAGMENT_SHADER_PATH, MAX_FRAMES_IN_FLIGHT, VERTEX_SHADER_PATH};
use anyhow::anyhow;
use log::{debug, error, info, warn};
use std::path::Path;
use vulkanalia::vk::{
    DeviceV1_0, ExtDebugUtilsExtension, Handle, HasBuilder, InstanceV1_0, KhrSurfaceExtension,
    KhrSwapchainExtension,
};
use vulkanalia::window::create_surface;
use vulkanalia::{vk, Device, Entry, Instance};

/// The color every frame is cleared to before drawing.
const CLEAR_COLOR: [f32; 4] = [0.01, 0.01, 0.033, 1.0];

/// The synchronization primitives owned by one frame slot.
#[derive(Debug, Clone, Copy)]
pub struct FrameSync {
    /// Signaled by the presentation engine when the acquired image can be rendered to.
    pub image_available: vk::Semaphore,
    /// Signaled by the graphics queue when rendering into the image has finished.
    pub render_finished: vk::Semaphore,
    /// Signaled when the slot's submission has completed on the GPU. Created signaled.
    pub in_flight: vk::Fence,
}

/// For each swapchain image, the slot fence of the last submission that rendered to it.
///
/// The fences are borrowed from `FrameSync`, never owned or destroyed here.
#[derive(Debug, Default)]
pub struct ImageOwners {
    owners: Vec<vk::Fence>,
}

impl ImageOwners {
    pub fn new(images: usize) -> Self {
        Self { owners: vec![vk::Fence::null(); images] }
    }

    /// Hands `image` to `fence`. Returns the fence of a different slot that still owns the
    /// image, which has to be waited on before the image is rendered to again.
    pub fn claim(&mut self, image: u32, fence: vk::Fence) -> Option<vk::Fence> {
        let previous = std::mem::replace(&mut self.owners[image as usize], fence);
        (!previous.is_null() && previous != fence).then_some(previous)
    }

    /// Forgets every owner and resizes for a rebuilt image set.
    pub fn reset(&mut self, images: usize) {
        self.owners.clear();
        self.owners.resize(images, vk::Fence::null());
    }

    pub fn image_count(&self) -> usize {
        self.owners.len()
    }
}

/// Owns every native handle needed to render to a window.
///
/// Built once by `new`, driven by `FrameLoop` through the `FrameBackend` impl, and torn down by
/// `destroy`. An error during `new` leaks whatever was already created.
pub struct GraphicsContext {
    _entry: Entry,
    instance: Instance,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    physical_device: vk::PhysicalDevice,
    graphics_family: u32,
    device: Device,
    graphics_queue: vk::Queue,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    surface: vk::SurfaceKHR,
    swapchain: Swapchain,
    render_pass: vk::RenderPass,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    frames: Vec<FrameSync>,
    images_in_flight: ImageOwners,
}

impl GraphicsContext {
    /// Runs the setup chain against `window`, sizing the swapchain for `target`.
    ///
    /// Steps run strictly in order and the first failure is returned tagged with its step.
    pub fn new<W: PlatformWindow>(window: &W, target: WindowSize) -> Result<Self, GraphicsError> {
        let entry = create_vulkan_entry().step(SetupStep::CreateInstance)?;
        let instance = create_instance(window, &entry).step(SetupStep::CreateInstance)?;
        let debug_messenger =
            create_debug_messenger(&instance).step(SetupStep::InstallDebugMessenger)?;

        let selected = pick_physical_device(&instance).step(SetupStep::PickPhysicalDevice)?;
        let (device, graphics_queue) =
            create_logical_device(&instance, &selected).step(SetupStep::CreateLogicalDevice)?;

        let (command_pool, command_buffers) =
            create_command_pool(&device, selected.graphics_family, MAX_FRAMES_IN_FLIGHT)
                .step(SetupStep::CreateCommandPool)?;

        let surface = unsafe { create_surface(&instance, window, window) }
            .map_err(|e| anyhow!(e))
            .step(SetupStep::CreateSurface)?;
        info!("Created window surface.");

        let mut swapchain = Swapchain::create(
            &instance,
            &device,
            selected.physical_device,
            selected.graphics_family,
            surface,
            target,
        )
        .step(SetupStep::CreateSwapchain)?;

        let render_pass =
            create_render_pass(&device, swapchain.format).step(SetupStep::CreateRenderPass)?;

        let (pipeline_layout, pipeline) = create_graphics_pipeline(
            &device,
            render_pass,
            swapchain.extent,
            Path::new(VERTEX_SHADER_PATH),
            Path::new(FRAGMENT_SHADER_PATH),
        )
        .step(SetupStep::CreateGraphicsPipeline)?;

        swapchain
            .create_framebuffers(&device, render_pass)
            .step(SetupStep::CreateFramebuffers)?;

        let frames =
            create_sync_objects(&device, MAX_FRAMES_IN_FLIGHT).step(SetupStep::CreateSyncObjects)?;
        let images_in_flight = ImageOwners::new(swapchain.images.len());

        info!("Graphics context initialized.");

        Ok(Self {
            _entry: entry,
            instance,
            debug_messenger,
            physical_device: selected.physical_device,
            graphics_family: selected.graphics_family,
            device,
            graphics_queue,
            command_pool,
            command_buffers,
            surface,
            swapchain,
            render_pass,
            pipeline_layout,
            pipeline,
            frames,
            images_in_flight,
        })
    }

    fn rebuild_swapchain(&mut self, target: WindowSize) -> Result<(), anyhow::Error> {
        // Coarse, but nothing in flight may still reference the old images.
        unsafe { self.device.device_wait_idle() }.map_err(|e| anyhow!(e))?;

        let mut old = std::mem::take(&mut self.swapchain);
        let old_format = old.format;
        unsafe { old.destroy(&self.device) };
        self.images_in_flight.reset(0);

        let mut swapchain = Swapchain::create(
            &self.instance,
            &self.device,
            self.physical_device,
            self.graphics_family,
            self.surface,
            target,
        )?;

        if swapchain.format != old_format {
            // The render pass and pipeline were built for the old format.
            warn!(
                "Swapchain format changed from {:?} to {:?} on recreation.",
                old_format, swapchain.format
            );
        }

        swapchain.create_framebuffers(&self.device, self.render_pass)?;

        self.images_in_flight.reset(swapchain.images.len());
        self.swapchain = swapchain;

        Ok(())
    }

    /// Waits for the device to go idle, then destroys every handle in reverse creation order.
    pub fn destroy(mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle before cleanup: {}", e);
            }

            for frame in &self.frames {
                self.device.destroy_fence(frame.in_flight, None);
                self.device.destroy_semaphore(frame.render_finished, None);
                self.device.destroy_semaphore(frame.image_available, None);
            }

            self.swapchain.destroy_framebuffers(&self.device);
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.destroy_render_pass(self.render_pass, None);
            self.swapchain.destroy(&self.device);

            self.instance.destroy_surface_khr(self.surface, None);

            // Frees the command buffers allocated from it as well.
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);

            if let Some(messenger) = self.debug_messenger.take() {
                self.instance.destroy_debug_utils_messenger_ext(messenger, None);
            }

            self.instance.destroy_instance(None);
        }

        info!("Graphics context destroyed.");
    }
}

impl FrameBackend for GraphicsContext {
    fn realized_size(&self) -> WindowSize {
        self.swapchain.target
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<(), GraphicsError> {
        let fence = self.frames[slot].in_flight;

        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }
            .map_err(GraphicsError::frame(FrameOp::WaitFence))?;

        Ok(())
    }

    fn recreate_swapchain(&mut self, size: WindowSize) -> Result<(), GraphicsError> {
        self.rebuild_swapchain(size).step(SetupStep::RecreateSwapchain)?;

        debug!(
            "Swapchain recreated for {}x{} ({} images).",
            size.width,
            size.height,
            self.images_in_flight.image_count()
        );
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<Acquire, GraphicsError> {
        let result = unsafe {
            self.device.acquire_next_image_khr(
                self.swapchain.handle,
                u64::MAX,
                self.frames[slot].image_available,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image, code)) => Ok(Acquire::Ready {
                image,
                suboptimal: code == vk::SuccessCode::SUBOPTIMAL_KHR,
            }),
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => Ok(Acquire::OutOfDate),
            Err(code) => Err(GraphicsError::frame(FrameOp::AcquireImage)(code)),
        }
    }

    fn claim_image(&mut self, slot: usize, image: u32) -> Result<(), GraphicsError> {
        let in_flight = self.frames[slot].in_flight;

        if let Some(previous) = self.images_in_flight.claim(image, in_flight) {
            unsafe { self.device.wait_for_fences(&[previous], true, u64::MAX) }
                .map_err(GraphicsError::frame(FrameOp::WaitFence))?;
        }

        unsafe { self.device.reset_fences(&[in_flight]) }
            .map_err(GraphicsError::frame(FrameOp::ResetFence))
    }

    fn record(&mut self, slot: usize, image: u32) -> Result<(), GraphicsError> {
        let command_buffer = self.command_buffers[slot];
        let framebuffer = self.swapchain.framebuffers[image as usize];
        let extent = self.swapchain.extent;

        let render_area = vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(extent);

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: CLEAR_COLOR },
        }];

        let viewport = vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);

        let scissor = vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(extent);

        let begin_info = vk::CommandBufferBeginInfo::builder();
        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(GraphicsError::frame(FrameOp::Record))?;
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(GraphicsError::frame(FrameOp::Record))?;

            self.device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            self.device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(command_buffer, 0, &[scissor]);
            self.device.cmd_draw(command_buffer, 3, 1, 0, 0);
            self.device.cmd_end_render_pass(command_buffer);

            self.device
                .end_command_buffer(command_buffer)
                .map_err(GraphicsError::frame(FrameOp::Record))?;
        }

        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<(), GraphicsError> {
        let frame = self.frames[slot];

        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[slot]];
        let signal_semaphores = [frame.render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], frame.in_flight)
        }
        .map_err(GraphicsError::frame(FrameOp::Submit))
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<Present, GraphicsError> {
        let wait_semaphores = [self.frames[slot].render_finished];
        let swapchains = [self.swapchain.handle];
        let image_indices = [image];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.device.queue_present_khr(self.graphics_queue, &present_info) };

        match result {
            Ok(vk::SuccessCode::SUBOPTIMAL_KHR) | Err(vk::ErrorCode::OUT_OF_DATE_KHR) => {
                Ok(Present::Stale)
            }
            Ok(_) => Ok(Present::Done),
            Err(code) => Err(GraphicsError::frame(FrameOp::Present)(code)),
        }
    }
}

/// Creates a resettable command pool on the graphics family and one primary command buffer per
/// frame slot.
fn create_command_pool(
    device: &Device,
    graphics_family: u32,
    count: usize,
) -> Result<(vk::CommandPool, Vec<vk::CommandBuffer>), anyhow::Error> {
    let pool_info = vk::CommandPoolCreateInfo::builder()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(graphics_family);

    let command_pool = unsafe {
        device
            .create_command_pool(&pool_info, None)
            .map_err(|e| anyhow!(e))?
    };

    let allocate_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count as u32);

    let command_buffers = unsafe {
        device
            .allocate_command_buffers(&allocate_info)
            .map_err(|e| anyhow!(e))?
    };

    info!("Created command pool with {} command buffers.", command_buffers.len());
    Ok((command_pool, command_buffers))
}

fn create_sync_objects(device: &Device, count: usize) -> Result<Vec<FrameSync>, anyhow::Error> {
    let semaphore_info = vk::SemaphoreCreateInfo::builder();
    let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        let frame = unsafe {
            FrameSync {
                image_available: device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(|e| anyhow!(e))?,
                render_finished: device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(|e| anyhow!(e))?,
                in_flight: device.create_fence(&fence_info, None).map_err(|e| anyhow!(e))?,
            }
        };

        frames.push(frame);
    }

    debug!("Created sync objects for {} frame slots.", count);
    Ok(frames)
}

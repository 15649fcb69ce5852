use std::fmt;
use thiserror::Error;
use vulkanalia::vk;

/// The ordered steps of graphics context setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    CreateInstance,
    InstallDebugMessenger,
    PickPhysicalDevice,
    CreateLogicalDevice,
    CreateCommandPool,
    CreateSurface,
    CreateSwapchain,
    CreateRenderPass,
    CreateGraphicsPipeline,
    CreateFramebuffers,
    CreateSyncObjects,
    RecreateSwapchain,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupStep::CreateInstance => "instance creation",
            SetupStep::InstallDebugMessenger => "debug messenger installation",
            SetupStep::PickPhysicalDevice => "physical device selection",
            SetupStep::CreateLogicalDevice => "logical device creation",
            SetupStep::CreateCommandPool => "command pool creation",
            SetupStep::CreateSurface => "surface creation",
            SetupStep::CreateSwapchain => "swapchain creation",
            SetupStep::CreateRenderPass => "render pass creation",
            SetupStep::CreateGraphicsPipeline => "graphics pipeline creation",
            SetupStep::CreateFramebuffers => "framebuffer creation",
            SetupStep::CreateSyncObjects => "sync object creation",
            SetupStep::RecreateSwapchain => "swapchain recreation",
        };

        f.write_str(name)
    }
}

/// The native operations performed while executing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOp {
    WaitFence,
    AcquireImage,
    ResetFence,
    Record,
    Submit,
    Present,
}

impl fmt::Display for FrameOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameOp::WaitFence => "fence wait",
            FrameOp::AcquireImage => "image acquisition",
            FrameOp::ResetFence => "fence reset",
            FrameOp::Record => "command recording",
            FrameOp::Submit => "queue submission",
            FrameOp::Present => "presentation",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum GraphicsError {
    /// A setup (or rebuild) step failed; nothing after it was attempted.
    #[error("{step} failed: {source:#}")]
    Setup {
        step: SetupStep,
        #[source]
        source: anyhow::Error,
    },

    /// A per-frame native call returned an error code.
    #[error("{op} failed: {code}")]
    Frame { op: FrameOp, code: vk::ErrorCode },
}

impl GraphicsError {
    pub fn frame(op: FrameOp) -> impl FnOnce(vk::ErrorCode) -> Self {
        move |code| GraphicsError::Frame { op, code }
    }

    /// Whether the render loop has to stop.
    ///
    /// Once the slot fence has been reset (recording onwards), or the device or surface is lost,
    /// no later frame can make progress. Any other frame failure only costs the current frame.
    pub fn is_fatal(&self) -> bool {
        match self {
            GraphicsError::Setup { .. } => true,
            GraphicsError::Frame {
                code: vk::ErrorCode::DEVICE_LOST | vk::ErrorCode::SURFACE_LOST_KHR,
                ..
            } => true,
            GraphicsError::Frame { op, .. } => {
                matches!(op, FrameOp::ResetFence | FrameOp::Record | FrameOp::Submit)
            }
        }
    }
}

/// Tags a step's error with the step it came from.
pub trait StepContext<T> {
    fn step(self, step: SetupStep) -> Result<T, GraphicsError>;
}

impl<T> StepContext<T> for anyhow::Result<T> {
    fn step(self, step: SetupStep) -> Result<T, GraphicsError> {
        self.map_err(|source| GraphicsError::Setup { step, source })
    }
}

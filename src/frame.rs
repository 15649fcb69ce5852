use crate::error::GraphicsError;
use crate::platform::WindowSize;
use log::{debug, warn};

/// Result of asking the swapchain for the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// An image was acquired. A suboptimal image can still be rendered to and presented.
    Ready { image: u32, suboptimal: bool },
    /// The surface no longer matches the swapchain, nothing was acquired.
    OutOfDate,
}

/// Result of presenting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Present {
    Done,
    /// Presented (or dropped) against a swapchain that is out of date or suboptimal.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    Skipped,
}

/// The native operations one frame is built from.
///
/// `slot` is always in `0..frames_in_flight`; `image` is always an index returned by the
/// preceding `acquire_image` of the same frame.
pub trait FrameBackend {
    /// The size the current swapchain was built for.
    fn realized_size(&self) -> WindowSize;

    /// Blocks until the slot's previous submission has completed.
    fn wait_for_slot(&mut self, slot: usize) -> Result<(), GraphicsError>;

    /// Drains the device and rebuilds every swapchain-dependent resource for `size`.
    fn recreate_swapchain(&mut self, size: WindowSize) -> Result<(), GraphicsError>;

    fn acquire_image(&mut self, slot: usize) -> Result<Acquire, GraphicsError>;

    /// Waits for any earlier frame still using `image`, hands the image to this slot, and resets
    /// the slot's fence so the coming submission can signal it.
    fn claim_image(&mut self, slot: usize, image: u32) -> Result<(), GraphicsError>;

    fn record(&mut self, slot: usize, image: u32) -> Result<(), GraphicsError>;

    fn submit(&mut self, slot: usize) -> Result<(), GraphicsError>;

    fn present(&mut self, slot: usize, image: u32) -> Result<Present, GraphicsError>;
}

/// Drives frames through the slots of a fixed ring, one `draw_frame` per loop iteration.
#[derive(Debug)]
pub struct FrameLoop {
    frames_in_flight: usize,
    slot: usize,
    submitted: u64,
}

impl FrameLoop {
    pub fn new(frames_in_flight: usize) -> Self {
        debug_assert!(frames_in_flight > 0, "at least one frame slot is required");

        Self {
            frames_in_flight,
            slot: 0,
            submitted: 0,
        }
    }

    pub fn current_slot(&self) -> usize {
        self.slot
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Renders and presents one frame targeting `target`.
    ///
    /// The slot only advances once the frame has been submitted, so a skipped or failed frame is
    /// retried on the same slot.
    pub fn draw_frame<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        target: WindowSize,
    ) -> Result<FrameStatus, GraphicsError> {
        let slot = self.slot;

        backend.wait_for_slot(slot)?;

        if backend.realized_size() != target {
            debug!(
                "Target size {}x{} differs from swapchain, recreating",
                target.width, target.height
            );
            backend.recreate_swapchain(target)?;
        }

        let image = match backend.acquire_image(slot)? {
            Acquire::Ready { image, suboptimal } => {
                if suboptimal {
                    debug!("Acquired suboptimal image {}", image);
                }
                image
            }
            Acquire::OutOfDate => {
                backend.recreate_swapchain(target)?;

                match backend.acquire_image(slot)? {
                    Acquire::Ready { image, .. } => image,
                    Acquire::OutOfDate => {
                        warn!("Swapchain still out of date after recreation, skipping frame");
                        return Ok(FrameStatus::Skipped);
                    }
                }
            }
        };

        backend.claim_image(slot, image)?;
        backend.record(slot, image)?;
        backend.submit(slot)?;

        self.slot = (self.slot + 1) % self.frames_in_flight;
        self.submitted += 1;

        if backend.present(slot, image)? == Present::Stale {
            backend.recreate_swapchain(target)?;
        }

        Ok(FrameStatus::Presented)
    }
}

pub mod wayland;

use crate::events::{EventBus, EventCode, EventContext};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Window dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Decoded backend notifications, buffered until they can be fired on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    Resized(WindowSize),
    CloseRequested,
}

impl WindowEvent {
    /// Fires this event on `bus` and returns whether a listener handled it.
    pub fn fire(self, bus: &mut EventBus, sender: &str) -> bool {
        match self {
            WindowEvent::Resized(size) => bus.fire(
                EventCode::RESIZED,
                sender,
                EventContext::Size { width: size.width, height: size.height },
            ),
            WindowEvent::CloseRequested => {
                bus.fire(EventCode::APPLICATION_QUIT, sender, EventContext::Empty)
            }
        }
    }
}

/// Suppresses compositor size hints that are zero-sized or repeat the last known size.
#[derive(Debug, Clone, Copy)]
pub struct ResizeFilter {
    last: WindowSize,
}

impl ResizeFilter {
    pub fn new(initial: WindowSize) -> Self {
        Self { last: initial }
    }

    pub fn last(&self) -> WindowSize {
        self.last
    }

    /// Returns the new size if it should be reported.
    pub fn observe(&mut self, width: i32, height: i32) -> Option<WindowSize> {
        if width <= 0 || height <= 0 {
            return None;
        }

        let size = WindowSize::new(width as u32, height as u32);
        if size == self.last {
            return None;
        }

        self.last = size;
        Some(size)
    }
}

/// The capability set every windowing backend provides.
///
/// The raw handle supertraits let the graphics context build a presentable surface from any
/// implementation.
pub trait PlatformWindow: HasWindowHandle + HasDisplayHandle {
    /// Connects to the windowing system and blocks until the window is ready to be drawn to.
    fn create(title: &str, x: u32, y: u32, width: u32, height: u32) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Releases the window and its connection. Any surface created from this window must
    /// already be destroyed.
    fn destroy(self);

    fn show(&mut self) -> anyhow::Result<()>;

    fn hide(&mut self) -> anyhow::Result<()>;

    /// Blocks until at least one backend event has been dispatched, then fires the decoded
    /// events on `bus` in arrival order.
    fn pump_messages(&mut self, bus: &mut EventBus) -> anyhow::Result<()>;

    /// The last size reported by (or requested from) the windowing system.
    fn size(&self) -> WindowSize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn zero_dimensions_are_ignored() {
        let mut filter = ResizeFilter::new(WindowSize::new(800, 600));
        assert_eq!(filter.observe(0, 480), None);
        assert_eq!(filter.observe(640, 0), None);
        assert_eq!(filter.observe(0, 0), None);
        assert_eq!(filter.last(), WindowSize::new(800, 600));
    }

    #[test]
    fn unchanged_size_is_ignored() {
        let mut filter = ResizeFilter::new(WindowSize::new(800, 600));
        assert_eq!(filter.observe(800, 600), None);
    }

    #[test]
    fn new_size_is_reported_once() {
        let mut filter = ResizeFilter::new(WindowSize::new(800, 600));
        assert_eq!(filter.observe(1024, 768), Some(WindowSize::new(1024, 768)));
        assert_eq!(filter.observe(1024, 768), None);
        assert_eq!(filter.observe(800, 600), Some(WindowSize::new(800, 600)));
    }

    #[test]
    fn resize_event_carries_size_payload() {
        let pending = Rc::new(Cell::new(WindowSize::new(800, 600)));
        let mut bus = EventBus::new();

        let target = pending.clone();
        bus.register(EventCode::RESIZED, move |_, _, data| match *data {
            EventContext::Size { width, height } => {
                target.set(WindowSize::new(width, height));
                true
            }
            EventContext::Empty => false,
        });

        assert!(WindowEvent::Resized(WindowSize::new(1024, 768)).fire(&mut bus, "test"));
        assert_eq!(pending.get(), WindowSize::new(1024, 768));
        assert!(!WindowEvent::CloseRequested.fire(&mut bus, "test"));
    }
}

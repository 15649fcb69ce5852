mod device;
mod engine;
mod error;
mod events;
mod frame;
mod init;
mod pipeline;
mod platform;
mod shaders;
mod swapchain;

use crate::engine::GraphicsContext;
use crate::events::{EventBus, EventCode, EventContext};
use crate::frame::{FrameBackend, FrameLoop, FrameStatus};
use crate::platform::wayland::WaylandWindow;
use crate::platform::{PlatformWindow, WindowSize};
use log::{debug, error, info, warn};
use std::cell::Cell;
use std::rc::Rc;
use vulkanalia::vk;

pub const VALIDATION_ENABLED: bool = cfg!(debug_assertions);
pub const REQUIRED_EXTENSIONS: [vk::ExtensionName; 1] = [vk::KHR_SWAPCHAIN_EXTENSION.name];

/// How many frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
const _: () = assert!(MAX_FRAMES_IN_FLIGHT > 0);

pub const WINDOW_TITLE: &str = "VULKAN-GUIDE";
pub const WINDOW_WIDTH: u32 = 800;
pub const WINDOW_HEIGHT: u32 = 600;

pub const VERTEX_SHADER_PATH: &str = "shaders/basic.vert.spv";
pub const FRAGMENT_SHADER_PATH: &str = "shaders/basic.frag.spv";

/// Stores a resize payload into `pending`. Returns whether the event carried a usable size.
fn apply_resize(pending: &Cell<WindowSize>, data: &EventContext) -> bool {
    let EventContext::Size { width, height } = *data else {
        return false;
    };

    if width == 0 || height == 0 {
        return false;
    }

    let size = WindowSize::new(width, height);
    if pending.get() != size {
        debug!("Pending resize to {}x{}", width, height);
        pending.set(size);
    }

    true
}

fn register_listeners(
    bus: &mut EventBus,
    running: &Rc<Cell<bool>>,
    pending: &Rc<Cell<WindowSize>>,
) {
    let running = running.clone();
    bus.register(EventCode::APPLICATION_QUIT, move |_, sender, _| {
        info!("Quit requested by {}.", sender);
        running.set(false);
        true
    });

    let pending = pending.clone();
    bus.register(EventCode::RESIZED, move |_, _, data| apply_resize(&pending, data));
}

fn run<W: PlatformWindow, B: FrameBackend>(
    window: &mut W,
    bus: &mut EventBus,
    backend: &mut B,
    running: &Cell<bool>,
    pending: &Cell<WindowSize>,
) -> anyhow::Result<()> {
    let mut frames = FrameLoop::new(MAX_FRAMES_IN_FLIGHT);

    while running.get() {
        window.pump_messages(bus)?;

        if !running.get() {
            break;
        }

        match frames.draw_frame(backend, pending.get()) {
            Ok(FrameStatus::Presented) => {}
            Ok(FrameStatus::Skipped) => {
                debug!("Frame on slot {} skipped, swapchain out of date.", frames.current_slot())
            }
            Err(e) if e.is_fatal() => {
                error!("Stopping render loop: {}", e);
                return Err(e.into());
            }
            Err(e) => warn!("Frame skipped: {}", e),
        }
    }

    info!("Render loop finished after {} frames.", frames.submitted());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let default_filter = if VALIDATION_ENABLED { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let running = Rc::new(Cell::new(true));
    let pending = Rc::new(Cell::new(WindowSize::new(WINDOW_WIDTH, WINDOW_HEIGHT)));

    let mut bus = EventBus::new();
    register_listeners(&mut bus, &running, &pending);

    let mut window = WaylandWindow::create(WINDOW_TITLE, 0, 0, WINDOW_WIDTH, WINDOW_HEIGHT)?;
    pending.set(window.size());

    let mut context = match GraphicsContext::new(&window, pending.get()) {
        Ok(context) => context,
        Err(e) => {
            error!("Failed to initialize graphics: {}", e);
            window.destroy();
            return Err(e.into());
        }
    };

    let result = window
        .show()
        .and_then(|_| run(&mut window, &mut bus, &mut context, &running, &pending));

    // The surface has to go before the window it was created from.
    context.destroy();
    window.destroy();

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FrameOp, GraphicsError};
    use crate::frame::{Acquire, Present};
    use crate::platform::WindowEvent;
    use raw_window_handle::{
        DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
    };
    use std::collections::VecDeque;

    /// Fires scripted events, one per pump, and requests a close after `close_after` pumps.
    #[derive(Default)]
    struct StubWindow {
        pumps: usize,
        close_after: usize,
        script: VecDeque<WindowEvent>,
    }

    impl HasWindowHandle for StubWindow {
        fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
            Err(HandleError::Unavailable)
        }
    }

    impl HasDisplayHandle for StubWindow {
        fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
            Err(HandleError::Unavailable)
        }
    }

    impl PlatformWindow for StubWindow {
        fn create(_: &str, _: u32, _: u32, _: u32, _: u32) -> anyhow::Result<Self> {
            Ok(Self::default())
        }

        fn destroy(self) {}

        fn show(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn hide(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn pump_messages(&mut self, bus: &mut EventBus) -> anyhow::Result<()> {
            self.pumps += 1;
            if self.pumps > self.close_after {
                WindowEvent::CloseRequested.fire(bus, "stub");
            } else if let Some(event) = self.script.pop_front() {
                event.fire(bus, "stub");
            }
            Ok(())
        }

        fn size(&self) -> WindowSize {
            WindowSize::new(WINDOW_WIDTH, WINDOW_HEIGHT)
        }
    }

    /// Always acquires image 0 unless a scripted result is queued.
    struct ScriptedBackend {
        realized: WindowSize,
        acquire: VecDeque<Result<Acquire, GraphicsError>>,
        present: VecDeque<Result<Present, GraphicsError>>,
        recreated: Vec<WindowSize>,
        submits: usize,
    }

    impl ScriptedBackend {
        fn new() -> Self {
            Self {
                realized: WindowSize::new(WINDOW_WIDTH, WINDOW_HEIGHT),
                acquire: VecDeque::new(),
                present: VecDeque::new(),
                recreated: Vec::new(),
                submits: 0,
            }
        }
    }

    impl FrameBackend for ScriptedBackend {
        fn realized_size(&self) -> WindowSize {
            self.realized
        }

        fn wait_for_slot(&mut self, _: usize) -> Result<(), GraphicsError> {
            Ok(())
        }

        fn recreate_swapchain(&mut self, size: WindowSize) -> Result<(), GraphicsError> {
            self.realized = size;
            self.recreated.push(size);
            Ok(())
        }

        fn acquire_image(&mut self, _: usize) -> Result<Acquire, GraphicsError> {
            self.acquire
                .pop_front()
                .unwrap_or(Ok(Acquire::Ready { image: 0, suboptimal: false }))
        }

        fn claim_image(&mut self, _: usize, _: u32) -> Result<(), GraphicsError> {
            Ok(())
        }

        fn record(&mut self, _: usize, _: u32) -> Result<(), GraphicsError> {
            Ok(())
        }

        fn submit(&mut self, _: usize) -> Result<(), GraphicsError> {
            self.submits += 1;
            Ok(())
        }

        fn present(&mut self, _: usize, _: u32) -> Result<Present, GraphicsError> {
            self.present.pop_front().unwrap_or(Ok(Present::Done))
        }
    }

    fn loop_state() -> (EventBus, Rc<Cell<bool>>, Rc<Cell<WindowSize>>) {
        let running = Rc::new(Cell::new(true));
        let pending = Rc::new(Cell::new(WindowSize::new(WINDOW_WIDTH, WINDOW_HEIGHT)));
        let mut bus = EventBus::new();
        register_listeners(&mut bus, &running, &pending);
        (bus, running, pending)
    }

    #[test]
    fn non_fatal_frame_errors_skip_and_keep_looping() {
        let (mut bus, running, pending) = loop_state();
        let mut window = StubWindow { close_after: 4, ..Default::default() };
        let mut backend = ScriptedBackend::new();
        backend.acquire.push_back(Err(GraphicsError::frame(FrameOp::AcquireImage)(
            vk::ErrorCode::OUT_OF_HOST_MEMORY,
        )));
        backend.present.push_back(Err(GraphicsError::frame(FrameOp::Present)(
            vk::ErrorCode::OUT_OF_HOST_MEMORY,
        )));

        run(&mut window, &mut bus, &mut backend, &running, &pending).unwrap();

        assert_eq!(window.pumps, 5);
        assert_eq!(backend.submits, 3);
        assert!(!running.get());
    }

    #[test]
    fn fatal_frame_error_stops_the_loop() {
        let (mut bus, running, pending) = loop_state();
        let mut window = StubWindow { close_after: 10, ..Default::default() };
        let mut backend = ScriptedBackend::new();
        backend.acquire.push_back(Err(GraphicsError::frame(FrameOp::AcquireImage)(
            vk::ErrorCode::DEVICE_LOST,
        )));

        let error = run(&mut window, &mut bus, &mut backend, &running, &pending).unwrap_err();

        assert!(matches!(
            error.downcast_ref::<GraphicsError>(),
            Some(GraphicsError::Frame {
                op: FrameOp::AcquireImage,
                code: vk::ErrorCode::DEVICE_LOST,
            })
        ));
        assert_eq!(window.pumps, 1);
        assert_eq!(backend.submits, 0);
        assert!(running.get());
    }

    #[test]
    fn quit_event_ends_the_loop_before_drawing() {
        let (mut bus, running, pending) = loop_state();
        let mut window = StubWindow::default();
        let mut backend = ScriptedBackend::new();

        run(&mut window, &mut bus, &mut backend, &running, &pending).unwrap();

        assert_eq!(window.pumps, 1);
        assert_eq!(backend.submits, 0);
    }

    #[test]
    fn resize_event_recreates_the_swapchain_once() {
        let (mut bus, running, pending) = loop_state();
        let resized = WindowSize::new(1024, 768);
        let mut window = StubWindow {
            close_after: 3,
            script: VecDeque::from([WindowEvent::Resized(resized)]),
            ..Default::default()
        };
        let mut backend = ScriptedBackend::new();

        run(&mut window, &mut bus, &mut backend, &running, &pending).unwrap();

        assert_eq!(backend.recreated, vec![resized]);
        assert_eq!(backend.submits, 3);
    }

    #[test]
    fn resize_listener_stores_payload() {
        let pending = Cell::new(WindowSize::new(800, 600));

        assert!(apply_resize(&pending, &EventContext::Size { width: 1024, height: 768 }));
        assert_eq!(pending.get(), WindowSize::new(1024, 768));
    }

    #[test]
    fn resize_listener_ignores_zero_and_empty_payloads() {
        let pending = Cell::new(WindowSize::new(800, 600));

        assert!(!apply_resize(&pending, &EventContext::Size { width: 0, height: 480 }));
        assert!(!apply_resize(&pending, &EventContext::Empty));
        assert_eq!(pending.get(), WindowSize::new(800, 600));
    }

    #[test]
    fn quit_and_resize_reach_the_loop_state() {
        let running = Rc::new(Cell::new(true));
        let pending = Rc::new(Cell::new(WindowSize::new(800, 600)));
        let mut bus = EventBus::new();
        register_listeners(&mut bus, &running, &pending);

        assert!(bus.fire(
            EventCode::RESIZED,
            "test",
            EventContext::Size { width: 1280, height: 720 }
        ));
        assert_eq!(pending.get(), WindowSize::new(1280, 720));
        assert!(running.get());

        assert!(bus.fire(EventCode::APPLICATION_QUIT, "test", EventContext::Empty));
        assert!(!running.get());
    }
}

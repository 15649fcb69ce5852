use crate::events::EventBus;
use crate::platform::{PlatformWindow, ResizeFilter, WindowEvent, WindowSize};
use anyhow::Context;
use log::{debug, info, warn};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle,
    RawWindowHandle, WaylandDisplayHandle, WaylandWindowHandle, WindowHandle,
};
use std::ffi::c_void;
use std::ptr::NonNull;
use wayland_client::globals::{registry_queue_init, GlobalListContents};
use wayland_client::protocol::{wl_compositor, wl_registry, wl_surface};
use wayland_client::{delegate_noop, Connection, Dispatch, EventQueue, Proxy, QueueHandle};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};

/// Name passed as the sender of every event this backend fires.
const SENDER: &str = "wayland";

/// State mutated by the compositor callbacks during a dispatch.
struct WaylandState {
    configured: bool,
    resize: ResizeFilter,
    pending: Vec<WindowEvent>,
}

/// A single xdg-shell toplevel window.
pub struct WaylandWindow {
    connection: Connection,
    queue: EventQueue<WaylandState>,
    state: WaylandState,
    wm_base: xdg_wm_base::XdgWmBase,
    surface: wl_surface::WlSurface,
    xdg_surface: xdg_surface::XdgSurface,
    toplevel: xdg_toplevel::XdgToplevel,
}

impl PlatformWindow for WaylandWindow {
    /// The position is ignored: Wayland compositors place toplevels themselves.
    fn create(title: &str, _x: u32, _y: u32, width: u32, height: u32) -> anyhow::Result<Self> {
        let connection = Connection::connect_to_env()
            .context("Failed to connect to the Wayland display")?;

        // Performs the initial registry roundtrip.
        let (globals, mut queue) = registry_queue_init::<WaylandState>(&connection)
            .context("Failed to query the Wayland registry")?;
        let qh = queue.handle();

        let compositor = globals
            .bind::<wl_compositor::WlCompositor, _, _>(&qh, 1..=4, ())
            .context("Compositor does not expose wl_compositor")?;
        let wm_base = globals
            .bind::<xdg_wm_base::XdgWmBase, _, _>(&qh, 1..=5, ())
            .context("Compositor does not expose xdg_wm_base")?;

        let surface = compositor.create_surface(&qh, ());
        let xdg_surface = wm_base.get_xdg_surface(&surface, &qh, ());
        let toplevel = xdg_surface.get_toplevel(&qh, ());
        toplevel.set_title(title.to_owned());
        surface.commit();

        let mut state = WaylandState {
            configured: false,
            resize: ResizeFilter::new(WindowSize::new(width, height)),
            pending: Vec::new(),
        };

        // The surface may not be drawn to before its first configure has been acknowledged.
        while !state.configured {
            queue
                .blocking_dispatch(&mut state)
                .context("Wayland dispatch failed while waiting for the first configure")?;
        }

        info!("Linux Wayland state initialized!");

        Ok(Self {
            connection,
            queue,
            state,
            wm_base,
            surface,
            xdg_surface,
            toplevel,
        })
    }

    fn destroy(self) {
        self.toplevel.destroy();
        self.xdg_surface.destroy();
        self.surface.destroy();
        self.wm_base.destroy();

        if let Err(e) = self.connection.flush() {
            warn!("Failed to flush Wayland connection on shutdown: {}", e);
        }

        debug!("Wayland window destroyed.");
    }

    fn show(&mut self) -> anyhow::Result<()> {
        self.toplevel.set_maximized();
        self.connection.flush()?;
        Ok(())
    }

    fn hide(&mut self) -> anyhow::Result<()> {
        self.toplevel.set_minimized();
        self.connection.flush()?;
        Ok(())
    }

    fn pump_messages(&mut self, bus: &mut EventBus) -> anyhow::Result<()> {
        self.queue
            .blocking_dispatch(&mut self.state)
            .context("Wayland dispatch failed")?;

        for event in std::mem::take(&mut self.state.pending) {
            event.fire(bus, SENDER);
        }

        Ok(())
    }

    fn size(&self) -> WindowSize {
        self.state.resize.last()
    }
}

impl HasWindowHandle for WaylandWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        let surface = NonNull::new(self.surface.id().as_ptr() as *mut c_void)
            .ok_or(HandleError::Unavailable)?;
        let raw = RawWindowHandle::Wayland(WaylandWindowHandle::new(surface));

        // The proxy stays alive for as long as `self` is borrowed.
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

impl HasDisplayHandle for WaylandWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        let display = NonNull::new(self.connection.backend().display_ptr() as *mut c_void)
            .ok_or(HandleError::Unavailable)?;
        let raw = RawDisplayHandle::Wayland(WaylandDisplayHandle::new(display));

        Ok(unsafe { DisplayHandle::borrow_raw(raw) })
    }
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for WaylandState {
    fn event(
        _: &mut Self,
        _: &wl_registry::WlRegistry,
        _: wl_registry::Event,
        _: &GlobalListContents,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for WaylandState {
    fn event(
        _: &mut Self,
        wm_base: &xdg_wm_base::XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<xdg_surface::XdgSurface, ()> for WaylandState {
    fn event(
        state: &mut Self,
        xdg_surface: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            xdg_surface.ack_configure(serial);
            state.configured = true;
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _: &xdg_toplevel::XdgToplevel,
        event: xdg_toplevel::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                if let Some(size) = state.resize.observe(width, height) {
                    debug!("Compositor resized toplevel to {}x{}", size.width, size.height);
                    state.pending.push(WindowEvent::Resized(size));
                }
            }
            xdg_toplevel::Event::Close => {
                state.pending.push(WindowEvent::CloseRequested);
            }
            _ => {}
        }
    }
}

delegate_noop!(WaylandState: wl_compositor::WlCompositor);
delegate_noop!(WaylandState: ignore wl_surface::WlSurface);

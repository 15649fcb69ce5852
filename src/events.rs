use log::trace;
use std::collections::HashMap;

/// A small integer identifying a kind of event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventCode(pub u16);

impl EventCode {
    /// Fired when the platform asks the application to shut down.
    pub const APPLICATION_QUIT: EventCode = EventCode(0x01);

    /// Fired when the window's drawable area changes. Carries `EventContext::Size`.
    pub const RESIZED: EventCode = EventCode(0x02);
}

/// The payload handed to listeners alongside an event code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventContext {
    #[default]
    Empty,
    Size { width: u32, height: u32 },
}

/// A listener returns `true` to claim the event, which stops further dispatch.
type Listener = Box<dyn FnMut(EventCode, &str, &EventContext) -> bool>;

/// Synchronous, single-threaded registry mapping event codes to listeners.
///
/// Listeners are invoked in registration order from inside `fire`, on the caller's thread.
/// There is no way to unregister a listener; the whole registry is dropped together with
/// whatever owns it.
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<EventCode, Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `listener` to the list for `code`.
    pub fn register<F>(&mut self, code: EventCode, listener: F)
    where
        F: FnMut(EventCode, &str, &EventContext) -> bool + 'static,
    {
        self.listeners.entry(code).or_default().push(Box::new(listener));
    }

    /// Dispatches an event. Returns `true` as soon as one listener claims it, `false` if no
    /// listener is registered for `code` or none of them claimed it.
    pub fn fire(&mut self, code: EventCode, sender: &str, data: EventContext) -> bool {
        let Some(listeners) = self.listeners.get_mut(&code) else {
            trace!("No listeners for event {:?} from {}", code, sender);
            return false;
        };

        for listener in listeners.iter_mut() {
            if listener(code, sender, &data) {
                trace!("Event {:?} from {} handled", code, sender);
                return true;
            }
        }

        false
    }
}

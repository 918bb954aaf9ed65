//! Platform boundary
//!
//! The session core never talks to a display server directly. Everything it
//! needs from the outside world goes through the collaborator traits in this
//! module, and everything it hears back arrives as a [`PlatformEvent`].
//!
//! Delivery is gated by the subscription table ([`Listeners`]): each registry
//! entry installs its subscriptions when it is created and removes them in its
//! destroy handler. An event whose subscription is not installed never reaches
//! a handler.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{trace, warn};

use crate::config::KeymapNames;
use crate::error::{PlatformError, StartupError};
use crate::event::{
    ClientId, DeviceId, KeyEvent, Modifiers, OutputConfiguration, OutputId, OutputMode,
    PlatformEvent, SceneNodeId, SeatCapabilities, SetSelectionRequest, SurfaceId, ToplevelId,
};

/// Object an event is emitted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Backend,
    Shell,
    Seat,
    Cursor,
    Output(OutputId),
    Keyboard(DeviceId),
    /// The surface underlying a toplevel
    Surface(ToplevelId),
    /// The xdg toplevel role object
    Toplevel(ToplevelId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    NewOutput,
    NewInput,
    NewToplevel,
    NewPopup,
    RequestSetCursor,
    RequestSetSelection,
    Motion,
    MotionAbsolute,
    Button,
    Axis,
    Frame,
    RequestState,
    Modifiers,
    Key,
    Map,
    Unmap,
    Commit,
    Destroy,
}

/// An installed subscription.
///
/// Not `Clone`: handing it back to [`Listeners::unsubscribe`] consumes it, so a
/// subscription can be removed at most once.
#[must_use = "a subscription must be kept and removed when its owner is destroyed"]
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    source: Source,
    signal: Signal,
    serial: u64,
}

impl Subscription {
    pub fn source(&self) -> Source {
        self.source
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }
}

/// The subscription table.
///
/// One registration per `(source, signal)` pair, as the platform fires each
/// signal through a single listener.
#[derive(Debug, Default)]
pub struct Listeners {
    installed: HashMap<(Source, Signal), u64>,
    next_serial: u64,
    dropped: u64,
}

impl Listeners {
    pub fn subscribe(&mut self, source: Source, signal: Signal) -> Subscription {
        self.next_serial += 1;
        let serial = self.next_serial;
        if self.installed.insert((source, signal), serial).is_some() {
            warn!(?source, ?signal, "Replacing existing subscription");
        }
        Subscription {
            source,
            signal,
            serial,
        }
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) {
        let key = (subscription.source, subscription.signal);
        match self.installed.get(&key) {
            Some(&serial) if serial == subscription.serial => {
                self.installed.remove(&key);
            }
            _ => warn!(
                source = ?subscription.source,
                signal = ?subscription.signal,
                "Removing a subscription that is no longer installed"
            ),
        }
    }

    pub fn is_subscribed(&self, source: Source, signal: Signal) -> bool {
        self.installed.contains_key(&(source, signal))
    }

    /// Installed subscriptions on one source
    pub fn count_for(&self, source: Source) -> usize {
        self.installed.keys().filter(|(s, _)| *s == source).count()
    }

    pub fn len(&self) -> usize {
        self.installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }

    /// Events that arrived with no subscription installed
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub(crate) fn record_dropped(&mut self, source: Source, signal: Signal) {
        self.dropped += 1;
        trace!(?source, ?signal, "Dropping event without subscription");
    }
}

/// Process-lifetime platform resources, released at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Resource {
    Seat,
    Cursor,
    OutputLayout,
    Allocator,
    Renderer,
    Backend,
    Display,
}

impl Resource {
    /// Release order: each resource goes before the ones it depends on.
    pub const TEARDOWN_ORDER: [Resource; 7] = [
        Resource::Seat,
        Resource::Cursor,
        Resource::OutputLayout,
        Resource::Allocator,
        Resource::Renderer,
        Resource::Backend,
        Resource::Display,
    ];
}

/// Display, listening socket and event source.
pub trait Display {
    /// Create the listening socket. `None` picks the first free `wayland-N`.
    ///
    /// Returns the socket name.
    fn add_socket(&mut self, name: Option<&str>) -> Result<String, StartupError>;

    /// Make the socket discoverable by clients (`WAYLAND_DISPLAY`).
    fn publish_socket(&mut self, name: &str);

    fn start_backend(&mut self) -> Result<(), StartupError>;

    /// Block until the next event is available.
    ///
    /// `None` means the display is gone and no event will ever arrive again.
    fn next_event(&mut self) -> Option<PlatformEvent>;

    fn release(&mut self, resource: Resource);
}

/// Outputs and the output layout
pub trait Outputs {
    /// Bind the output to the shared renderer and allocator.
    fn output_init_render(&mut self, output: OutputId);

    fn output_preferred_mode(&self, output: OutputId) -> Option<OutputMode>;

    /// Atomically apply a configuration. Returns false if it was rejected.
    fn output_commit(&mut self, output: OutputId, configuration: &OutputConfiguration) -> bool;

    /// Place the output automatically and return its layout position.
    fn layout_add_auto(&mut self, output: OutputId) -> (i32, i32);

    fn layout_remove(&mut self, output: OutputId);
}

/// Scene graph
pub trait Scene {
    /// Create the scene output for `output` and attach it to the scene's
    /// layout mapping.
    fn scene_output_create(&mut self, output: OutputId);

    fn scene_output_destroy(&mut self, output: OutputId);

    /// Render pending scene changes. Returns false if nothing was committed.
    fn scene_output_commit(&mut self, output: OutputId) -> bool;

    /// Send frame-done to every surface shown on `output`.
    fn scene_output_frame_done(&mut self, output: OutputId, now: Duration);

    /// Create the subtree for a toplevel as a child of the scene root.
    fn scene_tree_create(&mut self, toplevel: ToplevelId) -> SceneNodeId;

    fn scene_node_raise_to_top(&mut self, node: SceneNodeId);

    /// Children of the scene root, bottom to top
    fn scene_stacking_order(&self) -> Vec<SceneNodeId>;
}

/// Seat, keyboards and the keymap
pub trait Seat {
    type Keymap;

    fn keymap_compile(&mut self, names: &KeymapNames) -> Result<Self::Keymap, PlatformError>;

    fn keyboard_set_keymap(&mut self, keyboard: DeviceId, keymap: &Self::Keymap);

    fn keyboard_set_repeat_info(&mut self, keyboard: DeviceId, rate: i32, delay: i32);

    fn seat_set_capabilities(&mut self, capabilities: SeatCapabilities);

    /// Make `keyboard` the seat's active keyboard. `None` detaches.
    fn seat_set_keyboard(&mut self, keyboard: Option<DeviceId>);

    fn seat_notify_modifiers(&mut self, modifiers: Modifiers);

    fn seat_notify_key(&mut self, event: &KeyEvent);

    /// Give keyboard focus to the toplevel's surface. The enter carries the
    /// active keyboard's held keys and modifiers.
    fn seat_keyboard_enter(&mut self, toplevel: ToplevelId);

    fn seat_keyboard_clear_focus(&mut self);

    fn seat_pointer_clear_focus(&mut self);

    fn seat_pointer_frame(&mut self);

    fn seat_pointer_focus_client(&self) -> Option<ClientId>;

    fn seat_set_selection(&mut self, request: &SetSelectionRequest);
}

/// xdg-shell
pub trait Shell {
    /// Whether the toplevel has not been sent its initial configure yet
    fn toplevel_initial_commit(&self, toplevel: ToplevelId) -> bool;

    /// Schedule a configure. A zero size lets the client choose.
    fn toplevel_schedule_configure(&mut self, toplevel: ToplevelId, width: i32, height: i32);

    fn toplevel_set_activated(&mut self, toplevel: ToplevelId, activated: bool);
}

/// The shared cursor
pub trait Cursor {
    fn cursor_attach_pointer(&mut self, device: DeviceId);

    /// Show the named xcursor theme image.
    fn cursor_set_xcursor(&mut self, theme: &str, size: u32);

    fn cursor_move(&mut self, device: DeviceId, dx: f64, dy: f64);

    /// Warp to normalized layout coordinates
    fn cursor_warp_absolute(&mut self, device: DeviceId, x: f64, y: f64);

    /// Show a client surface as the cursor. `None` hides it.
    fn cursor_set_surface(&mut self, surface: Option<SurfaceId>, hotspot: (i32, i32));
}

/// Everything the session core needs from a platform
pub trait Platform: Display + Outputs + Scene + Seat + Shell + Cursor {}

impl<T: Display + Outputs + Scene + Seat + Shell + Cursor> Platform for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let mut listeners = Listeners::default();
        let frame = listeners.subscribe(Source::Output(OutputId(1)), Signal::Frame);
        let destroy = listeners.subscribe(Source::Output(OutputId(1)), Signal::Destroy);
        assert_eq!(listeners.count_for(Source::Output(OutputId(1))), 2);

        listeners.unsubscribe(frame);
        assert!(!listeners.is_subscribed(Source::Output(OutputId(1)), Signal::Frame));
        assert!(listeners.is_subscribed(Source::Output(OutputId(1)), Signal::Destroy));

        listeners.unsubscribe(destroy);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_stale_subscription_does_not_remove_replacement() {
        let mut listeners = Listeners::default();
        let source = Source::Keyboard(DeviceId(4));
        let stale = listeners.subscribe(source, Signal::Key);
        let fresh = listeners.subscribe(source, Signal::Key);

        listeners.unsubscribe(stale);
        assert!(listeners.is_subscribed(source, Signal::Key));

        listeners.unsubscribe(fresh);
        assert!(!listeners.is_subscribed(source, Signal::Key));
    }

    #[test]
    fn test_dropped_events_are_counted() {
        let mut listeners = Listeners::default();
        listeners.record_dropped(Source::Cursor, Signal::Frame);
        listeners.record_dropped(Source::Cursor, Signal::Motion);
        assert_eq!(listeners.dropped(), 2);
    }

    #[test]
    fn test_teardown_order_starts_with_seat_and_ends_with_display() {
        assert_eq!(Resource::TEARDOWN_ORDER.first(), Some(&Resource::Seat));
        assert_eq!(Resource::TEARDOWN_ORDER.last(), Some(&Resource::Display));
    }
}

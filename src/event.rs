//! Events delivered by the platform to the session core.
//!
//! Every notification the core reacts to is one variant of [`PlatformEvent`].
//! Platforms enqueue events in the order they happen and the session dispatches
//! them strictly one at a time, so the core can be driven by synthetic events
//! with no real display server present.

use bitflags::bitflags;
use serde::Serialize;
use smithay::input::keyboard::xkb::Keysym;

use crate::platform::{Signal, Source};

macro_rules! handle_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle_id!(
    /// Platform handle of a connected output. Owned by the platform.
    OutputId
);
handle_id!(
    /// Platform handle of an input device.
    DeviceId
);
handle_id!(
    /// Platform handle of an xdg toplevel and its underlying surface.
    ToplevelId
);
handle_id!(
    /// Platform handle of an xdg popup.
    PopupId
);
handle_id!(
    /// A node in the platform's scene graph.
    SceneNodeId
);
handle_id!(
    /// A connected Wayland client.
    ClientId
);
handle_id!(
    /// A client surface that is not a toplevel (e.g. a cursor image).
    SurfaceId
);
handle_id!(
    /// A client data source offered for the selection.
    DataSourceId
);

/// A display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputMode {
    pub width: i32,
    pub height: i32,
    /// Refresh rate in mHz
    pub refresh: i32,
}

/// Output state to be committed atomically.
///
/// `None` fields are left untouched by the commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputConfiguration {
    pub enabled: Option<bool>,
    pub mode: Option<OutputMode>,
    pub scale: Option<f64>,
}

impl OutputConfiguration {
    /// A configuration that turns the output on and leaves everything else as-is.
    pub fn enable() -> Self {
        Self {
            enabled: Some(true),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    Keyboard,
    Pointer,
    Touch,
    TabletTool,
    TabletPad,
    Switch,
}

/// A newly attached input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub id: DeviceId,
    pub name: String,
    pub kind: DeviceKind,
}

bitflags! {
    /// Keyboard modifier bits, in XKB modifier index order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        const CAPS = 1 << 1;
        const CTRL = 1 << 2;
        const ALT = 1 << 3;
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        const LOGO = 1 << 6;
        const MOD5 = 1 << 7;
    }
}

bitflags! {
    /// Input capabilities advertised on the seat
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SeatCapabilities: u32 {
        const POINTER = 1 << 0;
        const KEYBOARD = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyState {
    Released,
    Pressed,
}

/// A raw key event as reported by the device.
///
/// The platform resolves `modifiers` and `symbols` against the keyboard
/// state the moment it queues the event, so shortcuts match what the user
/// actually pressed even when the queue is drained later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub time_msec: u32,
    /// Platform keycode, opaque to the core
    pub keycode: u32,
    pub state: KeyState,
    /// Effective modifiers before this key changed them
    pub modifiers: Modifiers,
    /// Symbols the keycode produced under `modifiers`
    pub symbols: Vec<Keysym>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Released,
    Pressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrientation {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// Relative motion in layout coordinates
    Motion {
        device: DeviceId,
        time_msec: u32,
        dx: f64,
        dy: f64,
    },
    /// Absolute motion, `x` and `y` normalized to `0.0..=1.0`
    MotionAbsolute {
        device: DeviceId,
        time_msec: u32,
        x: f64,
        y: f64,
    },
    Button {
        device: DeviceId,
        time_msec: u32,
        button: u32,
        state: ButtonState,
    },
    Axis {
        device: DeviceId,
        time_msec: u32,
        orientation: AxisOrientation,
        delta: f64,
    },
    Frame,
}

/// A client asking to change the cursor image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCursorRequest {
    pub client: ClientId,
    /// `None` hides the cursor
    pub surface: Option<SurfaceId>,
    pub hotspot: (i32, i32),
}

/// A client asking to set the clipboard selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetSelectionRequest {
    /// `None` clears the selection
    pub source: Option<DataSourceId>,
    pub serial: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Frame,
    RequestState(OutputConfiguration),
    Destroy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyboardEvent {
    /// Effective modifiers after a change
    Modifiers(Modifiers),
    Key(KeyEvent),
    Destroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatEvent {
    RequestSetCursor(SetCursorRequest),
    RequestSetSelection(SetSelectionRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Map,
    Unmap,
    Commit,
}

/// Everything the platform can tell the session core
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    /// Backend found a new output
    NewOutput { output: OutputId, name: String },
    /// Backend found a new input device
    NewInput(InputDevice),
    /// The display went away (e.g. the host window was closed)
    DisplayLost,
    Output(OutputId, OutputEvent),
    Keyboard(DeviceId, KeyboardEvent),
    Pointer(PointerEvent),
    Seat(SeatEvent),
    NewToplevel(ToplevelId),
    NewPopup(PopupId),
    /// Event on the surface underlying a toplevel
    Surface(ToplevelId, SurfaceEvent),
    ToplevelDestroyed(ToplevelId),
}

impl PlatformEvent {
    /// The subscription this event is delivered through.
    ///
    /// `None` for events that are not subscription-based.
    pub fn route(&self) -> Option<(Source, Signal)> {
        let route = match self {
            PlatformEvent::NewOutput { .. } => (Source::Backend, Signal::NewOutput),
            PlatformEvent::NewInput(_) => (Source::Backend, Signal::NewInput),
            PlatformEvent::DisplayLost => return None,
            PlatformEvent::Output(id, event) => {
                let signal = match event {
                    OutputEvent::Frame => Signal::Frame,
                    OutputEvent::RequestState(_) => Signal::RequestState,
                    OutputEvent::Destroy => Signal::Destroy,
                };
                (Source::Output(*id), signal)
            }
            PlatformEvent::Keyboard(id, event) => {
                let signal = match event {
                    KeyboardEvent::Modifiers(_) => Signal::Modifiers,
                    KeyboardEvent::Key(_) => Signal::Key,
                    KeyboardEvent::Destroy => Signal::Destroy,
                };
                (Source::Keyboard(*id), signal)
            }
            PlatformEvent::Pointer(event) => {
                let signal = match event {
                    PointerEvent::Motion { .. } => Signal::Motion,
                    PointerEvent::MotionAbsolute { .. } => Signal::MotionAbsolute,
                    PointerEvent::Button { .. } => Signal::Button,
                    PointerEvent::Axis { .. } => Signal::Axis,
                    PointerEvent::Frame => Signal::Frame,
                };
                (Source::Cursor, signal)
            }
            PlatformEvent::Seat(SeatEvent::RequestSetCursor(_)) => {
                (Source::Seat, Signal::RequestSetCursor)
            }
            PlatformEvent::Seat(SeatEvent::RequestSetSelection(_)) => {
                (Source::Seat, Signal::RequestSetSelection)
            }
            PlatformEvent::NewToplevel(_) => (Source::Shell, Signal::NewToplevel),
            PlatformEvent::NewPopup(_) => (Source::Shell, Signal::NewPopup),
            PlatformEvent::Surface(id, event) => {
                let signal = match event {
                    SurfaceEvent::Map => Signal::Map,
                    SurfaceEvent::Unmap => Signal::Unmap,
                    SurfaceEvent::Commit => Signal::Commit,
                };
                (Source::Surface(*id), signal)
            }
            PlatformEvent::ToplevelDestroyed(id) => (Source::Toplevel(*id), Signal::Destroy),
        };
        Some(route)
    }
}

//! Cursor tracker
//!
//! Pointer devices feed one shared cursor. The xcursor theme is applied
//! lazily: on the first motion, or right before the first pointer frame goes
//! out to a client, whichever comes first.

use serde::Serialize;
use tracing::{debug, trace};

use crate::event::{
    AxisOrientation, ButtonState, DeviceId, InputDevice, PointerEvent, SetCursorRequest,
    SetSelectionRequest,
};
use crate::platform::{Cursor, Platform};
use crate::Session;

#[derive(Debug, Clone, Serialize)]
pub struct CursorState {
    pub theme: String,
    pub size: u32,
    themed: bool,
    pointers: Vec<DeviceId>,
}

impl CursorState {
    pub fn new(theme: impl Into<String>, size: u32) -> Self {
        Self {
            theme: theme.into(),
            size,
            themed: false,
            pointers: Vec::new(),
        }
    }

    /// Whether the theme image has been applied
    pub fn is_themed(&self) -> bool {
        self.themed
    }

    /// Pointer devices attached to the cursor
    pub fn pointers(&self) -> &[DeviceId] {
        &self.pointers
    }

    /// Apply the theme image unless that already happened.
    fn ensure_themed(&mut self, cursor: &mut impl Cursor) {
        if self.themed {
            return;
        }
        debug!("Applying cursor theme {} ({}px)", self.theme, self.size);
        cursor.cursor_set_xcursor(&self.theme, self.size);
        self.themed = true;
    }
}

impl Session {
    pub(crate) fn attach_pointer<P: Platform>(&mut self, platform: &mut P, device: InputDevice) {
        debug!("Attaching pointer {} ({}) to cursor", device.name, device.id);
        platform.cursor_attach_pointer(device.id);
        if !self.cursor.pointers.contains(&device.id) {
            self.cursor.pointers.push(device.id);
        }
    }

    pub(crate) fn on_pointer_event<P: Platform>(&mut self, platform: &mut P, event: PointerEvent) {
        match event {
            PointerEvent::Motion { device, dx, dy, .. } => {
                self.cursor.ensure_themed(platform);
                platform.cursor_move(device, dx, dy);
                platform.seat_pointer_clear_focus();
            }
            PointerEvent::MotionAbsolute { device, x, y, .. } => {
                self.cursor.ensure_themed(platform);
                platform.cursor_warp_absolute(device, x, y);
                platform.seat_pointer_clear_focus();
            }
            PointerEvent::Button { button, state, .. } => {
                let pressed = state == ButtonState::Pressed;
                debug!(button, pressed, "Pointer button");
            }
            PointerEvent::Axis {
                orientation, delta, ..
            } => {
                let vertical = orientation == AxisOrientation::Vertical;
                trace!(vertical, delta, "Pointer axis");
            }
            PointerEvent::Frame => {
                self.cursor.ensure_themed(platform);
                platform.seat_pointer_frame();
            }
        }
    }

    pub(crate) fn on_request_set_cursor<P: Platform>(
        &mut self,
        platform: &mut P,
        request: SetCursorRequest,
    ) {
        if platform.seat_pointer_focus_client() != Some(request.client) {
            trace!(
                "Ignoring cursor request from client {} without pointer focus",
                request.client
            );
            return;
        }
        platform.cursor_set_surface(request.surface, request.hotspot);
    }

    pub(crate) fn on_request_set_selection<P: Platform>(
        &mut self,
        platform: &mut P,
        request: SetSelectionRequest,
    ) {
        debug!(serial = request.serial, "Setting selection");
        platform.seat_set_selection(&request);
    }
}

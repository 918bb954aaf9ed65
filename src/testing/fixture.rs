//! Test fixture for integration testing
//!
//! The Fixture runs a real [`Session`] on top of the headless platform. Helper
//! methods inject platform events and dispatch them immediately, the way the
//! event loop would.

use tracing::info;

use crate::backend::headless::{Call, HeadlessPlatform};
use crate::event::{
    ClientId, DeviceId, DeviceKind, KeyState, OutputId, OutputMode, SurfaceId, ToplevelId,
};
use crate::{Config, Session};

use super::client::ClientManager;

/// Test fixture for integration testing
///
/// Provides a session wired to a headless platform, with:
/// - Virtual outputs, keyboards and pointers
/// - Simulated clients owning toplevels
/// - A recorded log of every platform call
pub struct Fixture {
    session: Session,
    platform: HeadlessPlatform,
    clients: ClientManager,
}

impl Fixture {
    /// Create a new test fixture with the default configuration.
    ///
    /// The fixture starts with no outputs - use `add_output` to create virtual displays.
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let mut platform = HeadlessPlatform::new();
        let session = Session::initialize(config, &mut platform)?;

        info!("Test fixture initialized with headless platform");

        Ok(Self {
            session,
            platform,
            clients: ClientManager::new(),
        })
    }

    /// Deliver queued platform events until the queue is empty or the
    /// session stops running.
    pub fn dispatch(&mut self) {
        while self.session.is_running() {
            let Some(event) = self.platform.pop_event() else {
                break;
            };
            self.session.dispatch(&mut self.platform, event);
        }
    }

    /// Run the session loop. Returns once terminated; an exhausted event
    /// queue counts as display loss.
    pub fn run(&mut self) {
        self.session.run(&mut self.platform);
    }

    pub fn shutdown(&mut self) {
        self.session.shutdown(&mut self.platform);
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// Get mutable access to the session
    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Get immutable access to the session
    pub fn session_ref(&self) -> &Session {
        &self.session
    }

    pub fn platform(&mut self) -> &mut HeadlessPlatform {
        &mut self.platform
    }

    pub fn platform_ref(&self) -> &HeadlessPlatform {
        &self.platform
    }

    // Outputs

    /// Add a virtual output with the given name and preferred size
    pub fn add_output(&mut self, name: &str, width: i32, height: i32) -> OutputId {
        let mode = OutputMode {
            width,
            height,
            refresh: 60_000,
        };
        let id = self.platform.connect_output(name, Some(mode));
        self.dispatch();
        id
    }

    /// Add a virtual output that reports no preferred mode
    pub fn add_output_without_mode(&mut self, name: &str) -> OutputId {
        let id = self.platform.connect_output(name, None);
        self.dispatch();
        id
    }

    pub fn remove_output(&mut self, output: OutputId) {
        self.platform.disconnect_output(output);
        self.dispatch();
    }

    /// Signal a frame on an output
    pub fn frame(&mut self, output: OutputId) {
        self.platform.output_frame(output);
        self.dispatch();
    }

    pub fn output_count(&self) -> usize {
        self.session.outputs.len()
    }

    /// Get frame-done count for a specific output
    pub fn frames_done(&self, output: OutputId) -> usize {
        self.platform.frames_done(output)
    }

    // Input devices

    pub fn add_keyboard(&mut self, name: &str) -> DeviceId {
        let id = self.platform.attach_device(name, DeviceKind::Keyboard);
        self.dispatch();
        id
    }

    pub fn remove_keyboard(&mut self, keyboard: DeviceId) {
        self.platform.detach_keyboard(keyboard);
        self.dispatch();
    }

    pub fn add_pointer(&mut self, name: &str) -> DeviceId {
        let id = self.platform.attach_device(name, DeviceKind::Pointer);
        self.dispatch();
        id
    }

    pub fn press(&mut self, keyboard: DeviceId, keycode: u32) {
        self.platform.key(keyboard, keycode, KeyState::Pressed);
        self.dispatch();
    }

    pub fn release(&mut self, keyboard: DeviceId, keycode: u32) {
        self.platform.key(keyboard, keycode, KeyState::Released);
        self.dispatch();
    }

    /// Press and release a key
    pub fn tap(&mut self, keyboard: DeviceId, keycode: u32) {
        self.press(keyboard, keycode);
        self.release(keyboard, keycode);
    }

    pub fn pointer_motion(&mut self, pointer: DeviceId, dx: f64, dy: f64) {
        self.platform.pointer_motion(pointer, dx, dy);
        self.dispatch();
    }

    pub fn pointer_frame(&mut self) {
        self.platform.pointer_frame();
        self.dispatch();
    }

    // Clients and toplevels

    pub fn add_client(&mut self) -> ClientId {
        self.clients.add_client()
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    /// Create a surface the client can use as its cursor image
    pub fn add_cursor_surface(&mut self, client: ClientId) -> Option<SurfaceId> {
        self.clients.add_cursor_surface(client)
    }

    /// Create a toplevel and perform its initial commit
    pub fn create_toplevel(&mut self, client: ClientId) -> ToplevelId {
        let id = self.platform.create_toplevel(client);
        self.clients.add_toplevel(client, id);
        self.platform.commit(id);
        self.dispatch();
        id
    }

    pub fn commit(&mut self, toplevel: ToplevelId) {
        self.platform.commit(toplevel);
        self.dispatch();
    }

    pub fn map_toplevel(&mut self, toplevel: ToplevelId) {
        self.platform.map(toplevel);
        self.dispatch();
    }

    pub fn unmap_toplevel(&mut self, toplevel: ToplevelId) {
        self.platform.unmap(toplevel);
        self.dispatch();
    }

    /// Unmap (if mapped) and destroy a toplevel, as a closing client does
    pub fn close_toplevel(&mut self, toplevel: ToplevelId) {
        let mapped = self
            .session
            .toplevels
            .get(toplevel)
            .is_some_and(|entry| entry.is_mapped());
        if mapped {
            self.platform.unmap(toplevel);
        }
        self.platform.destroy_toplevel(toplevel);
        self.clients.forget_toplevel(toplevel);
        self.dispatch();
    }

    /// Create, configure and map a toplevel
    pub fn open_window(&mut self, client: ClientId) -> ToplevelId {
        let id = self.create_toplevel(client);
        self.map_toplevel(id);
        id
    }

    /// Seat's focused toplevel
    pub fn focused_toplevel(&self) -> Option<ToplevelId> {
        self.session.seat.focused_toplevel
    }

    /// Toplevel holding keyboard focus on the platform side
    pub fn keyboard_focus(&self) -> Option<ToplevelId> {
        self.platform.keyboard_focus()
    }

    /// Top-most mapped toplevel in scene order
    pub fn top_toplevel(&self) -> Option<ToplevelId> {
        self.platform
            .stack()
            .iter()
            .rev()
            .filter_map(|node| self.session.toplevels.toplevel_for_node(*node))
            .find(|id| {
                self.session
                    .toplevels
                    .get(*id)
                    .is_some_and(|entry| entry.is_mapped())
            })
    }

    // Recorded calls

    pub fn call_log(&self) -> String {
        self.platform.call_log()
    }

    /// Drop recorded calls so far
    pub fn clear_calls(&mut self) -> Vec<Call> {
        self.platform.take_calls()
    }
}

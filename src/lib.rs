//! Kestrel - minimal Wayland compositor
//!
//! Session core library. The [`Session`] owns the output, keyboard and
//! toplevel registries, the seat state and the subscription table, and reacts
//! to [`PlatformEvent`]s one at a time. Everything that touches a real display
//! server sits behind the traits in [`platform`].
pub mod backend;
pub mod config;
pub mod cursor;
pub mod error;
pub mod event;
pub mod keyboard;
pub mod output;
pub mod platform;
pub mod testing;
pub mod toplevel;
pub mod tracy;
pub mod utils;

pub use config::Config;
pub use error::{PlatformError, StartupError};
pub use event::PlatformEvent;
pub use platform::Platform;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cursor::CursorState;
use crate::event::{
    DeviceId, KeyboardEvent, OutputEvent, SeatEvent, SurfaceEvent, ToplevelId,
};
use crate::keyboard::KeyboardRegistry;
use crate::output::OutputRegistry;
use crate::platform::{Listeners, Resource, Signal, Source, Subscription};
use crate::toplevel::{ToplevelRegistry, ToplevelState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Running,
    /// `terminate()` was called, the loop exits after the current handler
    Terminating,
    ShutDown,
}

/// Who gets keyboard input
#[derive(Debug, Default, Clone, Serialize)]
pub struct SeatState {
    /// Keyboard that produced the last modifiers or key event
    pub current_keyboard: Option<DeviceId>,
    pub focused_toplevel: Option<ToplevelId>,
}

/// Subscriptions the session holds for its whole lifetime.
const SESSION_SUBSCRIPTIONS: [(Source, Signal); 11] = [
    (Source::Backend, Signal::NewOutput),
    (Source::Backend, Signal::NewInput),
    (Source::Shell, Signal::NewToplevel),
    (Source::Shell, Signal::NewPopup),
    (Source::Seat, Signal::RequestSetCursor),
    (Source::Seat, Signal::RequestSetSelection),
    (Source::Cursor, Signal::Motion),
    (Source::Cursor, Signal::MotionAbsolute),
    (Source::Cursor, Signal::Button),
    (Source::Cursor, Signal::Axis),
    (Source::Cursor, Signal::Frame),
];

pub struct Session {
    pub config: Config,
    socket_name: String,
    run_state: RunState,
    pub listeners: Listeners,
    session_subscriptions: Vec<Subscription>,
    pub outputs: OutputRegistry,
    pub keyboards: KeyboardRegistry,
    pub toplevels: ToplevelRegistry,
    pub cursor: CursorState,
    pub seat: SeatState,
}

impl Session {
    fn new(config: Config) -> Self {
        let cursor = CursorState::new(config.cursor_theme.clone(), config.cursor_size);
        Self {
            config,
            socket_name: String::new(),
            run_state: RunState::Running,
            listeners: Listeners::default(),
            session_subscriptions: Vec::new(),
            outputs: OutputRegistry::default(),
            keyboards: KeyboardRegistry::default(),
            toplevels: ToplevelRegistry::default(),
            cursor,
            seat: SeatState::default(),
        }
    }

    /// Bring the platform up and wire the session into it.
    ///
    /// On failure everything acquired so far is released before the error is
    /// returned.
    pub fn initialize<P: Platform>(config: Config, platform: &mut P) -> Result<Self, StartupError> {
        let mut session = Self::new(config);

        for (source, signal) in SESSION_SUBSCRIPTIONS {
            let subscription = session.listeners.subscribe(source, signal);
            session.session_subscriptions.push(subscription);
        }

        let socket_name = match platform.add_socket(session.config.socket_name.as_deref()) {
            Ok(name) => name,
            Err(err) => {
                error!("{err}");
                session.shutdown(platform);
                return Err(err);
            }
        };
        info!("Listening on Wayland socket: {socket_name}");
        platform.publish_socket(&socket_name);
        session.socket_name = socket_name;

        if let Err(err) = platform.start_backend() {
            error!("{err}");
            session.shutdown(platform);
            return Err(err);
        }

        info!("Session initialized");
        Ok(session)
    }

    pub fn socket_name(&self) -> &str {
        &self.socket_name
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    /// Dispatch platform events until terminated or the display goes away.
    pub fn run<P: Platform>(&mut self, platform: &mut P) {
        info!("Running session on {}", self.socket_name);
        while self.is_running() {
            match platform.next_event() {
                Some(event) => self.dispatch(platform, event),
                None => {
                    info!("Display lost, terminating session");
                    self.terminate();
                }
            }
        }
        info!("Session loop exited");
    }

    /// Stop the loop once the current handler returns.
    pub fn terminate(&mut self) {
        if self.run_state == RunState::Running {
            debug!("Terminating session");
            self.run_state = RunState::Terminating;
        }
    }

    /// Deliver one event to its handler.
    ///
    /// Events whose subscription is not installed are dropped.
    pub fn dispatch<P: Platform>(&mut self, platform: &mut P, event: PlatformEvent) {
        tracy_span!("Session::dispatch");

        if let Some((source, signal)) = event.route() {
            if !self.listeners.is_subscribed(source, signal) {
                self.listeners.record_dropped(source, signal);
                return;
            }
        }

        match event {
            PlatformEvent::NewOutput { output, name } => self.on_new_output(platform, output, name),
            PlatformEvent::NewInput(device) => self.on_new_input(platform, device),
            PlatformEvent::DisplayLost => {
                info!("Display lost, terminating session");
                self.terminate();
            }
            PlatformEvent::Output(output, OutputEvent::Frame) => {
                self.on_output_frame(platform, output)
            }
            PlatformEvent::Output(output, OutputEvent::RequestState(configuration)) => {
                self.on_output_request_state(platform, output, configuration)
            }
            PlatformEvent::Output(output, OutputEvent::Destroy) => {
                self.on_output_destroy(platform, output)
            }
            PlatformEvent::Keyboard(keyboard, KeyboardEvent::Modifiers(modifiers)) => {
                self.on_keyboard_modifiers(platform, keyboard, modifiers)
            }
            PlatformEvent::Keyboard(keyboard, KeyboardEvent::Key(key)) => {
                self.on_keyboard_key(platform, keyboard, key)
            }
            PlatformEvent::Keyboard(keyboard, KeyboardEvent::Destroy) => {
                self.on_keyboard_destroy(platform, keyboard)
            }
            PlatformEvent::Pointer(pointer) => self.on_pointer_event(platform, pointer),
            PlatformEvent::Seat(SeatEvent::RequestSetCursor(request)) => {
                self.on_request_set_cursor(platform, request)
            }
            PlatformEvent::Seat(SeatEvent::RequestSetSelection(request)) => {
                self.on_request_set_selection(platform, request)
            }
            PlatformEvent::NewToplevel(toplevel) => self.on_new_toplevel(platform, toplevel),
            PlatformEvent::NewPopup(popup) => self.on_new_popup(popup),
            PlatformEvent::Surface(toplevel, SurfaceEvent::Map) => {
                self.on_toplevel_map(platform, toplevel)
            }
            PlatformEvent::Surface(toplevel, SurfaceEvent::Unmap) => {
                self.on_toplevel_unmap(platform, toplevel)
            }
            PlatformEvent::Surface(toplevel, SurfaceEvent::Commit) => {
                self.on_toplevel_commit(platform, toplevel)
            }
            PlatformEvent::ToplevelDestroyed(toplevel) => {
                self.on_toplevel_destroy(platform, toplevel)
            }
        }
    }

    /// Remove every subscription and release platform resources in teardown
    /// order. Calling it again does nothing.
    pub fn shutdown<P: Platform>(&mut self, platform: &mut P) {
        if self.run_state == RunState::ShutDown {
            return;
        }
        info!("Shutting down session");

        match serde_json::to_string(&self.snapshot(platform)) {
            Ok(json) => debug!("Final session state: {json}"),
            Err(err) => warn!("Failed to serialize session state: {err}"),
        }

        let mut subscriptions = std::mem::take(&mut self.session_subscriptions);
        subscriptions.extend(self.toplevels.drain().flat_map(|entry| entry.into_subscriptions()));
        subscriptions.extend(self.keyboards.drain().flat_map(|entry| entry.into_subscriptions()));
        subscriptions.extend(self.outputs.drain().flat_map(|entry| entry.into_subscriptions()));
        for subscription in subscriptions {
            self.listeners.unsubscribe(subscription);
        }
        self.seat = SeatState::default();

        for resource in Resource::TEARDOWN_ORDER {
            debug!("Releasing {resource:?}");
            platform.release(resource);
        }

        self.run_state = RunState::ShutDown;
        info!("Session shut down");
    }

    /// Summary of the session state
    pub fn snapshot<P: Platform>(&self, platform: &P) -> SessionSnapshot {
        SessionSnapshot {
            socket: self.socket_name.clone(),
            state: self.run_state,
            outputs: self.outputs.iter().map(|entry| entry.name.clone()).collect(),
            keyboards: self.keyboards.ids().map(|id| id.0).collect(),
            toplevels: self
                .toplevels
                .iter()
                .map(|entry| ToplevelSummary {
                    id: entry.id.0,
                    state: entry.state,
                })
                .collect(),
            current_keyboard: self.seat.current_keyboard.map(|id| id.0),
            focused_toplevel: self.seat.focused_toplevel.map(|id| id.0),
            stacking: platform
                .scene_stacking_order()
                .into_iter()
                .filter_map(|node| self.toplevels.toplevel_for_node(node))
                .map(|id| id.0)
                .collect(),
            cursor_themed: self.cursor.is_themed(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToplevelSummary {
    pub id: u64,
    pub state: ToplevelState,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub socket: String,
    pub state: RunState,
    pub outputs: Vec<String>,
    pub keyboards: Vec<u64>,
    pub toplevels: Vec<ToplevelSummary>,
    pub current_keyboard: Option<u64>,
    pub focused_toplevel: Option<u64>,
    /// Toplevel ids, bottom to top
    pub stacking: Vec<u64>,
    pub cursor_themed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessPlatform;

    #[test]
    fn test_session_subscriptions_installed_on_initialize() {
        let mut platform = HeadlessPlatform::new();
        let session = Session::initialize(Config::default(), &mut platform).unwrap();
        assert_eq!(session.listeners.len(), SESSION_SUBSCRIPTIONS.len());
        assert!(session.is_running());
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let mut platform = HeadlessPlatform::new();
        let mut session = Session::initialize(Config::default(), &mut platform).unwrap();
        session.terminate();
        session.terminate();
        assert_eq!(session.run_state(), RunState::Terminating);
    }

    #[test]
    fn test_shutdown_clears_subscriptions() {
        let mut platform = HeadlessPlatform::new();
        let mut session = Session::initialize(Config::default(), &mut platform).unwrap();
        session.shutdown(&mut platform);
        assert!(session.listeners.is_empty());
        assert_eq!(session.run_state(), RunState::ShutDown);
    }
}

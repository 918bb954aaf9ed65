//! Headless platform for testing
//!
//! An in-memory platform that never touches a display server. It records
//! every call the session makes, simulates just enough state (output layout,
//! scene stack, seat focus, cursor image) to answer the session's queries, and
//! lets tests inject platform events.
//!
//! # Design Invariants
//!
//! 1. **No hardware access**: nothing here opens a socket, a GPU or a window.
//!
//! 2. **Deterministic**: ids are allocated sequentially and timestamps are not
//!    recorded, so call logs can be snapshotted.
//!
//! 3. **Platform-side ordering**: injected events are queued and only reach
//!    the session when it pulls them, exactly like a real event loop.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bitflags::Flags;
use indexmap::IndexMap;
use smithay::input::keyboard::xkb::{keysyms, Keysym};
use tracing::debug;

use crate::config::KeymapNames;
use crate::error::{PlatformError, StartupError};
use crate::event::{
    AxisOrientation, ButtonState, ClientId, DataSourceId, DeviceId, DeviceKind, InputDevice,
    KeyEvent, KeyState, KeyboardEvent, Modifiers, OutputConfiguration, OutputEvent, OutputId,
    OutputMode, PlatformEvent, PointerEvent, PopupId, SceneNodeId, SeatCapabilities, SeatEvent,
    SetCursorRequest, SetSelectionRequest, SurfaceEvent, SurfaceId, ToplevelId,
};
use crate::platform::{Cursor, Display, Outputs, Resource, Scene, Seat, Shell};

/// Linux evdev keycodes understood by the headless keymap
pub mod keycodes {
    pub const KEY_ESC: u32 = 1;
    pub const KEY_Q: u32 = 16;
    pub const KEY_W: u32 = 17;
    pub const KEY_E: u32 = 18;
    pub const KEY_ENTER: u32 = 28;
    pub const KEY_LEFTCTRL: u32 = 29;
    pub const KEY_A: u32 = 30;
    pub const KEY_LEFTSHIFT: u32 = 42;
    pub const KEY_LEFTALT: u32 = 56;
    pub const KEY_LEFTMETA: u32 = 125;
}

/// Symbol for `keycode` with no modifiers applied
fn base_keysym(keycode: u32) -> Option<u32> {
    let sym = match keycode {
        keycodes::KEY_ESC => keysyms::KEY_Escape,
        keycodes::KEY_Q => keysyms::KEY_q,
        keycodes::KEY_W => keysyms::KEY_w,
        keycodes::KEY_E => keysyms::KEY_e,
        keycodes::KEY_ENTER => keysyms::KEY_Return,
        keycodes::KEY_LEFTCTRL => keysyms::KEY_Control_L,
        keycodes::KEY_A => keysyms::KEY_a,
        keycodes::KEY_LEFTSHIFT => keysyms::KEY_Shift_L,
        keycodes::KEY_LEFTALT => keysyms::KEY_Alt_L,
        keycodes::KEY_LEFTMETA => keysyms::KEY_Super_L,
        _ => return None,
    };
    Some(sym)
}

fn modifier_for(keycode: u32) -> Option<Modifiers> {
    match keycode {
        keycodes::KEY_LEFTSHIFT => Some(Modifiers::SHIFT),
        keycodes::KEY_LEFTCTRL => Some(Modifiers::CTRL),
        keycodes::KEY_LEFTALT => Some(Modifiers::ALT),
        keycodes::KEY_LEFTMETA => Some(Modifiers::LOGO),
        _ => None,
    }
}

/// `SHIFT+ALT` style rendering, `none` when empty
fn flag_names<F: Flags>(flags: F) -> String {
    let names: Vec<&str> = flags.iter_names().map(|(name, _)| name).collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join("+")
    }
}

/// A platform call made by the session
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    AddSocket(String),
    PublishSocket(String),
    StartBackend,
    Release(Resource),
    OutputInitRender(OutputId),
    OutputCommit(OutputId, OutputConfiguration),
    LayoutAdd(OutputId),
    LayoutRemove(OutputId),
    SceneOutputCreate(OutputId),
    SceneOutputDestroy(OutputId),
    SceneOutputCommit(OutputId),
    FrameDone(OutputId),
    SceneTreeCreate(ToplevelId, SceneNodeId),
    RaiseToTop(SceneNodeId),
    KeymapCompile,
    SetKeymap(DeviceId),
    SetRepeatInfo {
        keyboard: DeviceId,
        rate: i32,
        delay: i32,
    },
    SetCapabilities(SeatCapabilities),
    SetKeyboard(Option<DeviceId>),
    NotifyModifiers(Modifiers),
    NotifyKey(KeyEvent),
    KeyboardEnter {
        toplevel: ToplevelId,
        pressed: Vec<u32>,
        modifiers: Modifiers,
    },
    KeyboardClearFocus,
    PointerClearFocus,
    PointerFrame,
    SetSelection(SetSelectionRequest),
    ScheduleConfigure {
        toplevel: ToplevelId,
        width: i32,
        height: i32,
    },
    SetActivated {
        toplevel: ToplevelId,
        activated: bool,
    },
    CursorAttachPointer(DeviceId),
    CursorSetXcursor {
        theme: String,
        size: u32,
    },
    CursorMove {
        device: DeviceId,
        dx: f64,
        dy: f64,
    },
    CursorWarp {
        device: DeviceId,
        x: f64,
        y: f64,
    },
    CursorSetSurface {
        surface: Option<SurfaceId>,
        hotspot: (i32, i32),
    },
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Call::AddSocket(name) => write!(f, "add_socket {name}"),
            Call::PublishSocket(name) => write!(f, "publish_socket {name}"),
            Call::StartBackend => write!(f, "start_backend"),
            Call::Release(resource) => write!(f, "release {resource:?}"),
            Call::OutputInitRender(output) => write!(f, "output_init_render {output}"),
            Call::OutputCommit(output, configuration) => {
                write!(f, "output_commit {output}")?;
                if let Some(enabled) = configuration.enabled {
                    write!(f, " enabled={enabled}")?;
                }
                if let Some(mode) = configuration.mode {
                    write!(f, " mode={}x{}@{}", mode.width, mode.height, mode.refresh)?;
                }
                if let Some(scale) = configuration.scale {
                    write!(f, " scale={scale}")?;
                }
                Ok(())
            }
            Call::LayoutAdd(output) => write!(f, "layout_add {output}"),
            Call::LayoutRemove(output) => write!(f, "layout_remove {output}"),
            Call::SceneOutputCreate(output) => write!(f, "scene_output_create {output}"),
            Call::SceneOutputDestroy(output) => write!(f, "scene_output_destroy {output}"),
            Call::SceneOutputCommit(output) => write!(f, "scene_output_commit {output}"),
            Call::FrameDone(output) => write!(f, "frame_done {output}"),
            Call::SceneTreeCreate(toplevel, node) => {
                write!(f, "scene_tree_create {toplevel} -> node {node}")
            }
            Call::RaiseToTop(node) => write!(f, "raise_to_top node {node}"),
            Call::KeymapCompile => write!(f, "keymap_compile"),
            Call::SetKeymap(keyboard) => write!(f, "set_keymap {keyboard}"),
            Call::SetRepeatInfo {
                keyboard,
                rate,
                delay,
            } => write!(f, "set_repeat_info {keyboard} rate={rate} delay={delay}"),
            Call::SetCapabilities(capabilities) => {
                write!(f, "set_capabilities {}", flag_names(*capabilities))
            }
            Call::SetKeyboard(Some(keyboard)) => write!(f, "set_keyboard {keyboard}"),
            Call::SetKeyboard(None) => write!(f, "set_keyboard none"),
            Call::NotifyModifiers(modifiers) => {
                write!(f, "notify_modifiers {}", flag_names(*modifiers))
            }
            Call::NotifyKey(event) => {
                write!(f, "notify_key {} {:?}", event.keycode, event.state)
            }
            Call::KeyboardEnter {
                toplevel,
                pressed,
                modifiers,
            } => write!(
                f,
                "keyboard_enter {toplevel} pressed={pressed:?} modifiers={}",
                flag_names(*modifiers)
            ),
            Call::KeyboardClearFocus => write!(f, "keyboard_clear_focus"),
            Call::PointerClearFocus => write!(f, "pointer_clear_focus"),
            Call::PointerFrame => write!(f, "pointer_frame"),
            Call::SetSelection(request) => match request.source {
                Some(source) => write!(f, "set_selection {source}"),
                None => write!(f, "set_selection none"),
            },
            Call::ScheduleConfigure {
                toplevel,
                width,
                height,
            } => write!(f, "schedule_configure {toplevel} {width}x{height}"),
            Call::SetActivated {
                toplevel,
                activated,
            } => write!(f, "set_activated {toplevel} {activated}"),
            Call::CursorAttachPointer(device) => write!(f, "cursor_attach_pointer {device}"),
            Call::CursorSetXcursor { theme, size } => write!(f, "cursor_set_xcursor {theme} {size}"),
            Call::CursorMove { device, dx, dy } => write!(f, "cursor_move {device} {dx} {dy}"),
            Call::CursorWarp { device, x, y } => write!(f, "cursor_warp {device} {x} {y}"),
            Call::CursorSetSurface {
                surface: Some(surface),
                hotspot,
            } => write!(f, "cursor_set_surface {surface} {hotspot:?}"),
            Call::CursorSetSurface { surface: None, .. } => write!(f, "cursor_set_surface none"),
        }
    }
}

/// A virtual output
#[derive(Debug, Clone)]
pub struct VirtualOutput {
    pub name: String,
    pub preferred_mode: Option<OutputMode>,
    pub enabled: bool,
    pub mode: Option<OutputMode>,
    pub scale: f64,
    /// Position in the layout, `None` while not in it
    pub position: Option<(i32, i32)>,
    pub has_scene_output: bool,
    /// Count of frame-done notifications sent (for assertions)
    pub frames_done: usize,
    /// Reject every commit on this output
    pub reject_commits: bool,
}

#[derive(Debug, Default, Clone)]
struct VirtualKeyboard {
    modifiers: Modifiers,
    pressed: Vec<u32>,
}

/// A virtual xdg toplevel
#[derive(Debug, Clone)]
pub struct VirtualToplevel {
    pub client: ClientId,
    pub node: Option<SceneNodeId>,
    /// Initial configure sent
    pub configured: bool,
    pub activated: bool,
}

/// What the cursor currently shows
#[derive(Debug, Clone, PartialEq)]
pub enum CursorImage {
    Hidden,
    Theme { name: String, size: u32 },
    Surface { surface: SurfaceId, hotspot: (i32, i32) },
}

/// Headless platform state
#[derive(Debug, Default)]
pub struct HeadlessPlatform {
    calls: Vec<Call>,
    events: VecDeque<PlatformEvent>,
    outputs: IndexMap<OutputId, VirtualOutput>,
    keyboards: IndexMap<DeviceId, VirtualKeyboard>,
    toplevels: IndexMap<ToplevelId, VirtualToplevel>,
    /// Scene root children, bottom to top
    stack: Vec<SceneNodeId>,
    active_keyboard: Option<DeviceId>,
    keyboard_focus: Option<ToplevelId>,
    pointer_focus: Option<ClientId>,
    cursor_position: (f64, f64),
    cursor_image: Option<CursorImage>,
    capabilities: SeatCapabilities,
    selection: Option<DataSourceId>,
    socket: Option<String>,
    released: Vec<Resource>,
    next_id: u64,
    /// Event timestamps, in milliseconds
    clock: u32,
    /// Make `add_socket` fail
    pub fail_socket: bool,
    /// Make `start_backend` fail
    pub fail_backend: bool,
    /// Make keymap compilation fail
    pub fail_keymap: bool,
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn tick(&mut self) -> u32 {
        self.clock += 1;
        self.clock
    }

    fn record(&mut self, call: Call) {
        debug!("headless: {call}");
        self.calls.push(call);
    }

    // Event injection

    pub fn push_event(&mut self, event: PlatformEvent) {
        self.events.push_back(event);
    }

    pub fn pop_event(&mut self) -> Option<PlatformEvent> {
        self.events.pop_front()
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Plug in an output
    pub fn connect_output(&mut self, name: &str, preferred_mode: Option<OutputMode>) -> OutputId {
        let id = OutputId(self.next_id());
        self.outputs.insert(
            id,
            VirtualOutput {
                name: name.to_string(),
                preferred_mode,
                enabled: false,
                mode: None,
                scale: 1.0,
                position: None,
                has_scene_output: false,
                frames_done: 0,
                reject_commits: false,
            },
        );
        self.push_event(PlatformEvent::NewOutput {
            output: id,
            name: name.to_string(),
        });
        id
    }

    pub fn disconnect_output(&mut self, output: OutputId) {
        self.push_event(PlatformEvent::Output(output, OutputEvent::Destroy));
    }

    pub fn output_frame(&mut self, output: OutputId) {
        self.push_event(PlatformEvent::Output(output, OutputEvent::Frame));
    }

    pub fn request_output_state(&mut self, output: OutputId, configuration: OutputConfiguration) {
        self.push_event(PlatformEvent::Output(
            output,
            OutputEvent::RequestState(configuration),
        ));
    }

    pub fn attach_device(&mut self, name: &str, kind: DeviceKind) -> DeviceId {
        let id = DeviceId(self.next_id());
        if kind == DeviceKind::Keyboard {
            self.keyboards.insert(id, VirtualKeyboard::default());
        }
        self.push_event(PlatformEvent::NewInput(InputDevice {
            id,
            name: name.to_string(),
            kind,
        }));
        id
    }

    pub fn detach_keyboard(&mut self, keyboard: DeviceId) {
        self.keyboards.shift_remove(&keyboard);
        self.push_event(PlatformEvent::Keyboard(keyboard, KeyboardEvent::Destroy));
    }

    /// Symbols the keycode produces in the keyboard's current state
    pub fn keyboard_symbols(&self, keyboard: DeviceId, keycode: u32) -> Vec<Keysym> {
        let Some(base) = base_keysym(keycode) else {
            return Vec::new();
        };
        let shifted = self.keyboard_modifiers(keyboard).contains(Modifiers::SHIFT);
        let sym = if shifted && (keysyms::KEY_a..=keysyms::KEY_z).contains(&base) {
            base - keysyms::KEY_a + keysyms::KEY_A
        } else {
            base
        };
        vec![Keysym::new(sym)]
    }

    /// Modifiers currently held on the keyboard
    pub fn keyboard_modifiers(&self, keyboard: DeviceId) -> Modifiers {
        self.keyboards
            .get(&keyboard)
            .map(|k| k.modifiers)
            .unwrap_or_default()
    }

    /// Press or release a key. Modifier keys update the keyboard's modifier
    /// state and emit a modifiers event after the key.
    pub fn key(&mut self, keyboard: DeviceId, keycode: u32, state: KeyState) {
        let time_msec = self.tick();
        let modifier = modifier_for(keycode);
        let event = KeyEvent {
            time_msec,
            keycode,
            state,
            modifiers: self.keyboard_modifiers(keyboard),
            symbols: self.keyboard_symbols(keyboard, keycode),
        };
        if let Some(virtual_keyboard) = self.keyboards.get_mut(&keyboard) {
            match state {
                KeyState::Pressed => {
                    if !virtual_keyboard.pressed.contains(&keycode) {
                        virtual_keyboard.pressed.push(keycode);
                    }
                    if let Some(modifier) = modifier {
                        virtual_keyboard.modifiers.insert(modifier);
                    }
                }
                KeyState::Released => {
                    virtual_keyboard.pressed.retain(|code| *code != keycode);
                    if let Some(modifier) = modifier {
                        virtual_keyboard.modifiers.remove(modifier);
                    }
                }
            }
        }
        self.push_event(PlatformEvent::Keyboard(keyboard, KeyboardEvent::Key(event)));
        if modifier.is_some() {
            let modifiers = self.keyboard_modifiers(keyboard);
            self.push_event(PlatformEvent::Keyboard(
                keyboard,
                KeyboardEvent::Modifiers(modifiers),
            ));
        }
    }

    pub fn create_toplevel(&mut self, client: ClientId) -> ToplevelId {
        let id = ToplevelId(self.next_id());
        self.toplevels.insert(
            id,
            VirtualToplevel {
                client,
                node: None,
                configured: false,
                activated: false,
            },
        );
        self.push_event(PlatformEvent::NewToplevel(id));
        id
    }

    pub fn commit(&mut self, toplevel: ToplevelId) {
        self.push_event(PlatformEvent::Surface(toplevel, SurfaceEvent::Commit));
    }

    pub fn map(&mut self, toplevel: ToplevelId) {
        self.push_event(PlatformEvent::Surface(toplevel, SurfaceEvent::Map));
    }

    pub fn unmap(&mut self, toplevel: ToplevelId) {
        self.push_event(PlatformEvent::Surface(toplevel, SurfaceEvent::Unmap));
    }

    /// Destroy a toplevel. Its scene subtree goes away with it.
    pub fn destroy_toplevel(&mut self, toplevel: ToplevelId) {
        if let Some(virtual_toplevel) = self.toplevels.shift_remove(&toplevel) {
            if let Some(node) = virtual_toplevel.node {
                self.stack.retain(|n| *n != node);
            }
        }
        if self.keyboard_focus == Some(toplevel) {
            self.keyboard_focus = None;
        }
        self.push_event(PlatformEvent::ToplevelDestroyed(toplevel));
    }

    pub fn new_popup(&mut self) {
        let id = PopupId(self.next_id());
        self.push_event(PlatformEvent::NewPopup(id));
    }

    pub fn pointer_motion(&mut self, device: DeviceId, dx: f64, dy: f64) {
        let time_msec = self.tick();
        self.push_event(PlatformEvent::Pointer(PointerEvent::Motion {
            device,
            time_msec,
            dx,
            dy,
        }));
    }

    pub fn pointer_motion_absolute(&mut self, device: DeviceId, x: f64, y: f64) {
        let time_msec = self.tick();
        self.push_event(PlatformEvent::Pointer(PointerEvent::MotionAbsolute {
            device,
            time_msec,
            x,
            y,
        }));
    }

    pub fn pointer_button(&mut self, device: DeviceId, button: u32, state: ButtonState) {
        let time_msec = self.tick();
        self.push_event(PlatformEvent::Pointer(PointerEvent::Button {
            device,
            time_msec,
            button,
            state,
        }));
    }

    pub fn pointer_axis(&mut self, device: DeviceId, delta: f64) {
        let time_msec = self.tick();
        self.push_event(PlatformEvent::Pointer(PointerEvent::Axis {
            device,
            time_msec,
            orientation: AxisOrientation::Vertical,
            delta,
        }));
    }

    pub fn pointer_frame(&mut self) {
        self.push_event(PlatformEvent::Pointer(PointerEvent::Frame));
    }

    pub fn request_set_cursor(
        &mut self,
        client: ClientId,
        surface: Option<SurfaceId>,
        hotspot: (i32, i32),
    ) {
        self.push_event(PlatformEvent::Seat(SeatEvent::RequestSetCursor(
            SetCursorRequest {
                client,
                surface,
                hotspot,
            },
        )));
    }

    pub fn request_set_selection(&mut self, source: Option<DataSourceId>) {
        let serial = self.tick();
        self.push_event(PlatformEvent::Seat(SeatEvent::RequestSetSelection(
            SetSelectionRequest { source, serial },
        )));
    }

    /// Give pointer focus to a client, as pointer hit-testing would.
    pub fn set_pointer_focus(&mut self, client: Option<ClientId>) {
        self.pointer_focus = client;
    }

    pub fn display_lost(&mut self) {
        self.push_event(PlatformEvent::DisplayLost);
    }

    // Inspection

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    /// Recorded calls, one per line
    pub fn call_log(&self) -> String {
        self.calls
            .iter()
            .map(|call| call.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn output(&self, output: OutputId) -> Option<&VirtualOutput> {
        self.outputs.get(&output)
    }

    pub fn output_mut(&mut self, output: OutputId) -> Option<&mut VirtualOutput> {
        self.outputs.get_mut(&output)
    }

    /// Get frame-done count for an output (for test assertions)
    pub fn frames_done(&self, output: OutputId) -> usize {
        self.outputs.get(&output).map(|o| o.frames_done).unwrap_or(0)
    }

    pub fn toplevel(&self, toplevel: ToplevelId) -> Option<&VirtualToplevel> {
        self.toplevels.get(&toplevel)
    }

    pub fn stack(&self) -> &[SceneNodeId] {
        &self.stack
    }

    pub fn keyboard_focus(&self) -> Option<ToplevelId> {
        self.keyboard_focus
    }

    pub fn active_keyboard(&self) -> Option<DeviceId> {
        self.active_keyboard
    }

    pub fn capabilities(&self) -> SeatCapabilities {
        self.capabilities
    }

    pub fn cursor_image(&self) -> Option<&CursorImage> {
        self.cursor_image.as_ref()
    }

    pub fn cursor_position(&self) -> (f64, f64) {
        self.cursor_position
    }

    pub fn selection(&self) -> Option<DataSourceId> {
        self.selection
    }

    pub fn socket(&self) -> Option<&str> {
        self.socket.as_deref()
    }

    pub fn released(&self) -> &[Resource] {
        &self.released
    }

    fn layout_size(&self) -> (i32, i32) {
        self.outputs
            .values()
            .filter_map(|o| Some((o.position?, o.mode?)))
            .fold((0, 0), |(w, h), ((x, y), mode)| {
                (w.max(x + mode.width), h.max(y + mode.height))
            })
    }
}

impl Display for HeadlessPlatform {
    fn add_socket(&mut self, name: Option<&str>) -> Result<String, StartupError> {
        if self.fail_socket {
            return Err(StartupError::Socket("address already in use".to_string()));
        }
        let name = name.unwrap_or("wayland-1").to_string();
        self.record(Call::AddSocket(name.clone()));
        Ok(name)
    }

    fn publish_socket(&mut self, name: &str) {
        self.record(Call::PublishSocket(name.to_string()));
        self.socket = Some(name.to_string());
    }

    fn start_backend(&mut self) -> Result<(), StartupError> {
        if self.fail_backend {
            return Err(StartupError::Backend("no outputs available".to_string()));
        }
        self.record(Call::StartBackend);
        Ok(())
    }

    fn next_event(&mut self) -> Option<PlatformEvent> {
        self.pop_event()
    }

    fn release(&mut self, resource: Resource) {
        self.record(Call::Release(resource));
        self.released.push(resource);
    }
}

impl Outputs for HeadlessPlatform {
    fn output_init_render(&mut self, output: OutputId) {
        self.record(Call::OutputInitRender(output));
    }

    fn output_preferred_mode(&self, output: OutputId) -> Option<OutputMode> {
        self.outputs.get(&output).and_then(|o| o.preferred_mode)
    }

    fn output_commit(&mut self, output: OutputId, configuration: &OutputConfiguration) -> bool {
        self.record(Call::OutputCommit(output, configuration.clone()));
        let Some(virtual_output) = self.outputs.get_mut(&output) else {
            return false;
        };
        if virtual_output.reject_commits {
            return false;
        }
        if let Some(enabled) = configuration.enabled {
            virtual_output.enabled = enabled;
        }
        if let Some(mode) = configuration.mode {
            virtual_output.mode = Some(mode);
        }
        if let Some(scale) = configuration.scale {
            virtual_output.scale = scale;
        }
        true
    }

    fn layout_add_auto(&mut self, output: OutputId) -> (i32, i32) {
        self.record(Call::LayoutAdd(output));
        let (width, _) = self.layout_size();
        let position = (width, 0);
        if let Some(virtual_output) = self.outputs.get_mut(&output) {
            virtual_output.position = Some(position);
        }
        position
    }

    fn layout_remove(&mut self, output: OutputId) {
        self.record(Call::LayoutRemove(output));
        if let Some(virtual_output) = self.outputs.get_mut(&output) {
            virtual_output.position = None;
        }
    }
}

impl Scene for HeadlessPlatform {
    fn scene_output_create(&mut self, output: OutputId) {
        self.record(Call::SceneOutputCreate(output));
        if let Some(virtual_output) = self.outputs.get_mut(&output) {
            virtual_output.has_scene_output = true;
        }
    }

    fn scene_output_destroy(&mut self, output: OutputId) {
        self.record(Call::SceneOutputDestroy(output));
        if let Some(virtual_output) = self.outputs.get_mut(&output) {
            virtual_output.has_scene_output = false;
        }
    }

    fn scene_output_commit(&mut self, output: OutputId) -> bool {
        self.record(Call::SceneOutputCommit(output));
        self.outputs
            .get(&output)
            .is_some_and(|o| o.has_scene_output)
    }

    fn scene_output_frame_done(&mut self, output: OutputId, _now: Duration) {
        self.record(Call::FrameDone(output));
        if let Some(virtual_output) = self.outputs.get_mut(&output) {
            virtual_output.frames_done += 1;
        }
    }

    fn scene_tree_create(&mut self, toplevel: ToplevelId) -> SceneNodeId {
        let node = SceneNodeId(self.next_id());
        self.record(Call::SceneTreeCreate(toplevel, node));
        self.stack.push(node);
        if let Some(virtual_toplevel) = self.toplevels.get_mut(&toplevel) {
            virtual_toplevel.node = Some(node);
        }
        node
    }

    fn scene_node_raise_to_top(&mut self, node: SceneNodeId) {
        self.record(Call::RaiseToTop(node));
        if let Some(index) = self.stack.iter().position(|n| *n == node) {
            let node = self.stack.remove(index);
            self.stack.push(node);
        }
    }

    fn scene_stacking_order(&self) -> Vec<SceneNodeId> {
        self.stack.clone()
    }
}

impl Seat for HeadlessPlatform {
    type Keymap = KeymapNames;

    fn keymap_compile(&mut self, names: &KeymapNames) -> Result<KeymapNames, PlatformError> {
        self.record(Call::KeymapCompile);
        if self.fail_keymap {
            return Err(PlatformError::Keymap(format!(
                "unknown layout {:?}",
                names.layout
            )));
        }
        Ok(names.clone())
    }

    fn keyboard_set_keymap(&mut self, keyboard: DeviceId, _keymap: &KeymapNames) {
        self.record(Call::SetKeymap(keyboard));
    }

    fn keyboard_set_repeat_info(&mut self, keyboard: DeviceId, rate: i32, delay: i32) {
        self.record(Call::SetRepeatInfo {
            keyboard,
            rate,
            delay,
        });
    }

    fn seat_set_capabilities(&mut self, capabilities: SeatCapabilities) {
        self.record(Call::SetCapabilities(capabilities));
        self.capabilities = capabilities;
    }

    fn seat_set_keyboard(&mut self, keyboard: Option<DeviceId>) {
        self.record(Call::SetKeyboard(keyboard));
        self.active_keyboard = keyboard;
    }

    fn seat_notify_modifiers(&mut self, modifiers: Modifiers) {
        self.record(Call::NotifyModifiers(modifiers));
    }

    fn seat_notify_key(&mut self, event: &KeyEvent) {
        self.record(Call::NotifyKey(event.clone()));
    }

    fn seat_keyboard_enter(&mut self, toplevel: ToplevelId) {
        let state = self
            .active_keyboard
            .and_then(|id| self.keyboards.get(&id))
            .cloned()
            .unwrap_or_default();
        self.record(Call::KeyboardEnter {
            toplevel,
            pressed: state.pressed,
            modifiers: state.modifiers,
        });
        self.keyboard_focus = Some(toplevel);
    }

    fn seat_keyboard_clear_focus(&mut self) {
        self.record(Call::KeyboardClearFocus);
        self.keyboard_focus = None;
    }

    fn seat_pointer_clear_focus(&mut self) {
        self.record(Call::PointerClearFocus);
        self.pointer_focus = None;
    }

    fn seat_pointer_frame(&mut self) {
        self.record(Call::PointerFrame);
    }

    fn seat_pointer_focus_client(&self) -> Option<ClientId> {
        self.pointer_focus
    }

    fn seat_set_selection(&mut self, request: &SetSelectionRequest) {
        self.record(Call::SetSelection(*request));
        self.selection = request.source;
    }
}

impl Shell for HeadlessPlatform {
    fn toplevel_initial_commit(&self, toplevel: ToplevelId) -> bool {
        self.toplevels.get(&toplevel).is_some_and(|t| !t.configured)
    }

    fn toplevel_schedule_configure(&mut self, toplevel: ToplevelId, width: i32, height: i32) {
        self.record(Call::ScheduleConfigure {
            toplevel,
            width,
            height,
        });
        if let Some(virtual_toplevel) = self.toplevels.get_mut(&toplevel) {
            virtual_toplevel.configured = true;
        }
    }

    fn toplevel_set_activated(&mut self, toplevel: ToplevelId, activated: bool) {
        self.record(Call::SetActivated {
            toplevel,
            activated,
        });
        if let Some(virtual_toplevel) = self.toplevels.get_mut(&toplevel) {
            virtual_toplevel.activated = activated;
        }
    }
}

impl Cursor for HeadlessPlatform {
    fn cursor_attach_pointer(&mut self, device: DeviceId) {
        self.record(Call::CursorAttachPointer(device));
    }

    fn cursor_set_xcursor(&mut self, theme: &str, size: u32) {
        self.record(Call::CursorSetXcursor {
            theme: theme.to_string(),
            size,
        });
        self.cursor_image = Some(CursorImage::Theme {
            name: theme.to_string(),
            size,
        });
    }

    fn cursor_move(&mut self, device: DeviceId, dx: f64, dy: f64) {
        self.record(Call::CursorMove { device, dx, dy });
        self.cursor_position.0 += dx;
        self.cursor_position.1 += dy;
    }

    fn cursor_warp_absolute(&mut self, device: DeviceId, x: f64, y: f64) {
        self.record(Call::CursorWarp { device, x, y });
        let (width, height) = self.layout_size();
        self.cursor_position = (x * width as f64, y * height as f64);
    }

    fn cursor_set_surface(&mut self, surface: Option<SurfaceId>, hotspot: (i32, i32)) {
        self.record(Call::CursorSetSurface { surface, hotspot });
        self.cursor_image = Some(match surface {
            Some(surface) => CursorImage::Surface { surface, hotspot },
            None => CursorImage::Hidden,
        });
    }
}

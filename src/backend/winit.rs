//! Winit platform for running nested inside another compositor
//!
//! The host window is the single output. Frames are paced by a timer at the
//! output refresh rate; keyboard and pointer input come from the window and
//! are reported as one virtual keyboard and one virtual pointer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use sd_notify::NotifyState;
use smithay::{
    backend::{
        input::{
            AbsolutePositionEvent, Axis, ButtonState as WinitButtonState, Event, InputEvent,
            KeyState as WinitKeyState, KeyboardKeyEvent, PointerAxisEvent, PointerButtonEvent,
        },
        renderer::{
            damage::OutputDamageTracker,
            element::{
                memory::MemoryRenderBufferRenderElement,
                render_elements,
                surface::{render_elements_from_surface_tree, WaylandSurfaceRenderElement},
                AsRenderElements, Kind,
            },
            gles::GlesRenderer,
        },
        winit::{self, WinitEvent, WinitEventLoop, WinitGraphicsBackend, WinitInput},
    },
    input::{
        keyboard::{xkb, FilterResult, Keycode, XkbConfig},
        pointer::{CursorImageStatus, MotionEvent},
    },
    output::{Mode, Output, PhysicalProperties, Scale, Subpixel},
    reexports::{
        calloop::{
            generic::Generic, EventLoop, Interest, Mode as CalloopMode, PostAction,
            RegistrationToken,
        },
        wayland_server::Display as WlDisplay,
        winit::platform::pump_events::PumpStatus,
    },
    utils::{Physical, Point, Transform, SERIAL_COUNTER},
    wayland::{
        selection::data_device::clear_data_device_selection, socket::ListeningSocketSource,
    },
};
use tracing::{debug, error, info, trace, warn};

use super::cursor_image::CursorImage;
use super::wayland::{initial_configure_sent, WaylandState};
use crate::config::KeymapNames;
use crate::error::{PlatformError, StartupError};
use crate::event::{
    AxisOrientation, ButtonState, ClientId, DeviceId, DeviceKind, InputDevice, KeyEvent,
    KeyState, KeyboardEvent, Modifiers, OutputConfiguration, OutputEvent, OutputId, OutputMode,
    PlatformEvent, PointerEvent, SceneNodeId, SeatCapabilities, SetSelectionRequest, SurfaceId,
    ToplevelId,
};
use crate::platform::{Cursor, Display, Outputs, Resource, Scene, Seat, Shell};
use crate::utils::{get_monotonic_time, spawn_client};
use crate::{tracy_span, Config, Session};

const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];
/// mHz
const REFRESH: i32 = 60_000;

render_elements! {
    pub KestrelRenderElement<=GlesRenderer>;
    Surface=WaylandSurfaceRenderElement<GlesRenderer>,
    Cursor=MemoryRenderBufferRenderElement<GlesRenderer>,
}

/// The host window as an output
struct WindowOutput {
    id: OutputId,
    output: Output,
    /// Present once bound to the renderer
    damage_tracker: Option<OutputDamageTracker>,
    enabled: bool,
    has_scene_output: bool,
    next_frame: Instant,
}

impl WindowOutput {
    fn frame_interval(&self) -> Duration {
        let refresh = self
            .output
            .current_mode()
            .map(|mode| mode.refresh)
            .filter(|refresh| *refresh > 0)
            .unwrap_or(REFRESH);
        Duration::from_micros(1_000_000_000 / refresh as u64)
    }
}

/// Virtual devices standing in for the host seat
#[derive(Debug, Clone, Copy)]
struct WindowDevices {
    keyboard: DeviceId,
    pointer: DeviceId,
}

pub struct WinitPlatform {
    event_loop: EventLoop<'static, WaylandState>,
    state: WaylandState,
    backend: Option<WinitGraphicsBackend<GlesRenderer>>,
    winit_events: WinitEventLoop,
    display_token: Option<RegistrationToken>,
    socket_token: Option<RegistrationToken>,

    output: Option<WindowOutput>,
    devices: Option<WindowDevices>,
    /// Per-keyboard XKB state used to translate keycodes
    keyboards: HashMap<DeviceId, xkb::State>,
    /// Serialized keymap handed to clients
    keymap: Option<String>,
    repeat_info: (i32, i32),
    pointers: Vec<DeviceId>,
    cursor_image: Option<CursorImage>,
    cursor_hotspot: (i32, i32),
}

impl WinitPlatform {
    /// Open the host window and create the Wayland display.
    ///
    /// The window is created before the socket is published so that winit
    /// still connects to the host compositor.
    pub fn new() -> anyhow::Result<Self> {
        let event_loop: EventLoop<'static, WaylandState> =
            EventLoop::try_new().context("failed to create event loop")?;
        let display: WlDisplay<WaylandState> =
            WlDisplay::new().context("failed to create display")?;
        let state = WaylandState::new(display.handle());

        let display_source = Generic::new(display, Interest::READ, CalloopMode::Level);
        let display_token = event_loop
            .handle()
            .insert_source(display_source, |_, display, state| {
                // SAFETY: the display is dropped only by removing this source
                let display = unsafe { display.get_mut() };
                display.dispatch_clients(state)?;
                Ok(PostAction::Continue)
            })
            .map_err(|err| anyhow!("failed to insert display source: {}", err.error))?;

        let (backend, winit_events): (WinitGraphicsBackend<GlesRenderer>, _) =
            winit::init().map_err(|e| anyhow!("failed to init winit: {:?}", e))?;

        Ok(Self {
            event_loop,
            state,
            backend: Some(backend),
            winit_events,
            display_token: Some(display_token),
            socket_token: None,
            output: None,
            devices: None,
            keyboards: HashMap::new(),
            keymap: None,
            repeat_info: (crate::config::DEFAULT_REPEAT_RATE, crate::config::DEFAULT_REPEAT_DELAY),
            pointers: Vec::new(),
            cursor_image: None,
            cursor_hotspot: (0, 0),
        })
    }

    fn output_for(&self, id: OutputId) -> Option<&WindowOutput> {
        self.output.as_ref().filter(|output| output.id == id)
    }

    fn output_for_mut(&mut self, id: OutputId) -> Option<&mut WindowOutput> {
        self.output.as_mut().filter(|output| output.id == id)
    }

    /// Wait for protocol requests, input or the next frame.
    fn pump(&mut self) {
        tracy_span!("WinitPlatform::pump");

        if let Err(err) = self.state.display_handle.flush_clients() {
            warn!("Failed to flush clients: {err}");
        }

        let state = &mut self.state;
        let keyboards = &mut self.keyboards;
        let devices = self.devices;
        let output = self.output.as_ref();
        let status = self.winit_events.dispatch_new_events(|event| match event {
            WinitEvent::Resized { size, .. } => {
                if let Some(output) = output {
                    let mode = Mode {
                        size,
                        refresh: REFRESH,
                    };
                    output.output.change_current_state(Some(mode), None, None, None);
                    output.output.set_preferred(mode);
                    debug!("Output resized to {}x{}", size.w, size.h);
                }
            }
            WinitEvent::CloseRequested => {
                info!("Host window closed");
                if let Some(output) = output {
                    state.queue_event(PlatformEvent::Output(output.id, OutputEvent::Destroy));
                }
                state.lose_display();
            }
            WinitEvent::Input(event) => {
                if let Some(devices) = devices {
                    let size = output.and_then(|o| o.output.current_mode()).map(|m| m.size);
                    translate_input(state, keyboards, devices, size, event);
                }
            }
            _ => {}
        });

        if let Some(code) = host_exit_code(&status) {
            info!("Host event loop exited with code {code}");
            self.state.lose_display();
        }
        self.state.forget_departed_clients();

        let mut timeout = self.queue_due_frame();
        if self.state.has_pending_events() {
            timeout = Duration::ZERO;
        }
        if let Err(err) = self.event_loop.dispatch(Some(timeout), &mut self.state) {
            error!("Event loop dispatch failed: {err}");
            self.state.lose_display();
        }
        self.state.space.refresh();
    }

    /// Queue a frame event if one is due. Returns how long until the next.
    fn queue_due_frame(&mut self) -> Duration {
        let idle = Duration::from_millis(16);
        let Some(output) = self.output.as_mut() else {
            return idle;
        };
        if !output.has_scene_output || !output.enabled {
            return idle;
        }
        let now = Instant::now();
        if now >= output.next_frame {
            output.next_frame = now + output.frame_interval();
            self.state
                .queue_event(PlatformEvent::Output(output.id, OutputEvent::Frame));
        }
        output.next_frame.saturating_duration_since(now)
    }

    fn render(&mut self, id: OutputId) -> anyhow::Result<bool> {
        tracy_span!("WinitPlatform::render");

        let backend = self.backend.as_mut().context("backend released")?;
        let output = self
            .output
            .as_mut()
            .filter(|output| output.id == id)
            .context("unknown output")?;
        let damage_tracker = output
            .damage_tracker
            .as_mut()
            .context("output not bound to the renderer")?;
        let geometry = self
            .state
            .space
            .output_geometry(&output.output)
            .context("output not in the layout")?;
        let scale = smithay::utils::Scale::from(output.output.current_scale().fractional_scale());

        backend
            .bind()
            .map_err(|err| anyhow!("failed to bind backend: {err:?}"))?;
        let age = backend.buffer_age().unwrap_or(0);
        let renderer = backend.renderer();

        // Front to back: cursor, then windows from the top of the stack
        let mut elements: Vec<KestrelRenderElement> = Vec::new();
        let pointer = self.state.pointer_location - geometry.loc.to_f64();
        let pointer: Point<i32, Physical> = pointer.to_physical_precise_round(scale);
        match &self.state.cursor_status {
            CursorImageStatus::Hidden => {}
            CursorImageStatus::Surface(surface) => {
                let origin = pointer - Point::from(self.cursor_hotspot);
                let surface_elements: Vec<WaylandSurfaceRenderElement<GlesRenderer>> =
                    render_elements_from_surface_tree(
                        renderer,
                        surface,
                        origin,
                        scale,
                        1.0,
                        Kind::Cursor,
                    );
                elements.extend(surface_elements.into_iter().map(KestrelRenderElement::Surface));
            }
            CursorImageStatus::Named(_) => {
                if let Some(image) = &self.cursor_image {
                    match image.render_element(renderer, pointer) {
                        Ok(element) => elements.push(KestrelRenderElement::Cursor(element)),
                        Err(e) => warn!("Failed to create cursor render element: {:?}", e),
                    }
                }
            }
        }

        for window in self.state.space.elements().rev() {
            let location = self.state.space.element_location(window).unwrap_or_default()
                - geometry.loc;
            let window_elements: Vec<WaylandSurfaceRenderElement<GlesRenderer>> =
                window.render_elements(renderer, location.to_physical_precise_round(scale), scale, 1.0);
            elements.extend(window_elements.into_iter().map(KestrelRenderElement::Surface));
        }

        let result = damage_tracker
            .render_output(renderer, age, &elements, CLEAR_COLOR)
            .map_err(|err| anyhow!("render error: {err:?}"))?;
        if let Some(ref damage) = result.damage {
            backend
                .submit(Some(damage.as_slice()))
                .map_err(|err| anyhow!("failed to submit frame: {err:?}"))?;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Exit code of the host event loop once it has stopped.
fn host_exit_code(status: &PumpStatus) -> Option<i32> {
    match status {
        PumpStatus::Exit(code) => Some(*code),
        PumpStatus::Continue => None,
    }
}

/// Convert one host input event into platform events.
fn translate_input(
    state: &mut WaylandState,
    keyboards: &mut HashMap<DeviceId, xkb::State>,
    devices: WindowDevices,
    output_size: Option<smithay::utils::Size<i32, Physical>>,
    event: InputEvent<WinitInput>,
) {
    match event {
        InputEvent::Keyboard { event } => {
            let keycode = event.key_code();
            let key_state = match event.state() {
                WinitKeyState::Pressed => KeyState::Pressed,
                WinitKeyState::Released => KeyState::Released,
            };
            let mut key = KeyEvent {
                time_msec: Event::time_msec(&event),
                keycode: keycode.raw(),
                state: key_state,
                modifiers: Modifiers::empty(),
                symbols: Vec::new(),
            };
            let mut changed_modifiers = None;
            if let Some(xkb) = keyboards.get_mut(&devices.keyboard) {
                key.modifiers = xkb_modifiers(xkb);
                key.symbols = xkb.key_get_syms(keycode).to_vec();
                let direction = match key_state {
                    KeyState::Pressed => xkb::KeyDirection::Down,
                    KeyState::Released => xkb::KeyDirection::Up,
                };
                if xkb.update_key(keycode, direction) & xkb::STATE_MODS_EFFECTIVE != 0 {
                    changed_modifiers = Some(xkb_modifiers(xkb));
                }
            }

            state.queue_event(PlatformEvent::Keyboard(
                devices.keyboard,
                KeyboardEvent::Key(key),
            ));
            if let Some(modifiers) = changed_modifiers {
                state.queue_event(PlatformEvent::Keyboard(
                    devices.keyboard,
                    KeyboardEvent::Modifiers(modifiers),
                ));
            }
        }
        InputEvent::PointerMotionAbsolute { event } => {
            let Some(size) = output_size.filter(|size| size.w > 0 && size.h > 0) else {
                return;
            };
            let position = event.position_transformed((size.w, size.h).into());
            state.queue_event(PlatformEvent::Pointer(PointerEvent::MotionAbsolute {
                device: devices.pointer,
                time_msec: event.time_msec(),
                x: position.x / size.w as f64,
                y: position.y / size.h as f64,
            }));
            state.queue_event(PlatformEvent::Pointer(PointerEvent::Frame));
        }
        InputEvent::PointerButton { event } => {
            let button_state = match event.state() {
                WinitButtonState::Pressed => ButtonState::Pressed,
                WinitButtonState::Released => ButtonState::Released,
            };
            state.queue_event(PlatformEvent::Pointer(PointerEvent::Button {
                device: devices.pointer,
                time_msec: event.time_msec(),
                button: event.button_code(),
                state: button_state,
            }));
            state.queue_event(PlatformEvent::Pointer(PointerEvent::Frame));
        }
        InputEvent::PointerAxis { event } => {
            let axes = [
                (Axis::Vertical, AxisOrientation::Vertical),
                (Axis::Horizontal, AxisOrientation::Horizontal),
            ];
            for (axis, orientation) in axes {
                let delta = event
                    .amount(axis)
                    .or_else(|| event.amount_v120(axis).map(|v| v / 120.0 * 15.0))
                    .unwrap_or(0.0);
                if delta != 0.0 {
                    state.queue_event(PlatformEvent::Pointer(PointerEvent::Axis {
                        device: devices.pointer,
                        time_msec: event.time_msec(),
                        orientation,
                        delta,
                    }));
                }
            }
            state.queue_event(PlatformEvent::Pointer(PointerEvent::Frame));
        }
        _ => {}
    }
}

fn xkb_modifiers(state: &xkb::State) -> Modifiers {
    let names = [
        (xkb::MOD_NAME_SHIFT, Modifiers::SHIFT),
        (xkb::MOD_NAME_CAPS, Modifiers::CAPS),
        (xkb::MOD_NAME_CTRL, Modifiers::CTRL),
        (xkb::MOD_NAME_ALT, Modifiers::ALT),
        (xkb::MOD_NAME_NUM, Modifiers::MOD2),
        (xkb::MOD_NAME_LOGO, Modifiers::LOGO),
    ];
    names
        .into_iter()
        .filter(|(name, _)| state.mod_name_is_active(name, xkb::STATE_MODS_EFFECTIVE))
        .fold(Modifiers::empty(), |acc, (_, bit)| acc | bit)
}

impl Display for WinitPlatform {
    fn add_socket(&mut self, name: Option<&str>) -> Result<String, StartupError> {
        let socket = match name {
            Some(name) => ListeningSocketSource::with_name(name),
            None => ListeningSocketSource::new_auto(),
        }
        .map_err(|err| StartupError::Socket(err.to_string()))?;
        let socket_name = socket.socket_name().to_string_lossy().into_owned();

        let token = self
            .event_loop
            .handle()
            .insert_source(socket, |client, _, state| {
                let data = std::sync::Arc::new(state.client_state());
                if let Err(e) = state.display_handle.insert_client(client, data) {
                    warn!("Failed to insert client: {}", e);
                }
            })
            .map_err(|err| StartupError::Socket(err.error.to_string()))?;
        self.socket_token = Some(token);
        Ok(socket_name)
    }

    fn publish_socket(&mut self, name: &str) {
        std::env::set_var("WAYLAND_DISPLAY", name);
    }

    fn start_backend(&mut self) -> Result<(), StartupError> {
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| StartupError::Backend("winit window is gone".into()))?;

        let output = Output::new(
            "winit".to_string(),
            PhysicalProperties {
                size: (0, 0).into(),
                subpixel: Subpixel::Unknown,
                make: "Kestrel".into(),
                model: "Winit".into(),
            },
        );
        let mode = Mode {
            size: backend.window_size(),
            refresh: REFRESH,
        };
        // GL has Y=0 at the bottom, the host window at the top
        output.change_current_state(None, Some(Transform::Flipped180), None, None);
        output.set_preferred(mode);
        output.create_global::<WaylandState>(&self.state.display_handle);

        let id = OutputId(self.state.next_id());
        self.output = Some(WindowOutput {
            id,
            output,
            damage_tracker: None,
            enabled: false,
            has_scene_output: false,
            next_frame: Instant::now(),
        });
        self.state.queue_event(PlatformEvent::NewOutput {
            output: id,
            name: "winit".into(),
        });

        let devices = WindowDevices {
            keyboard: DeviceId(self.state.next_id()),
            pointer: DeviceId(self.state.next_id()),
        };
        self.devices = Some(devices);
        for (id, name, kind) in [
            (devices.keyboard, "winit-keyboard", DeviceKind::Keyboard),
            (devices.pointer, "winit-pointer", DeviceKind::Pointer),
        ] {
            self.state.queue_event(PlatformEvent::NewInput(InputDevice {
                id,
                name: name.into(),
                kind,
            }));
        }

        info!("Winit backend started");
        Ok(())
    }

    fn next_event(&mut self) -> Option<PlatformEvent> {
        loop {
            if let Some(event) = self.state.pop_event() {
                return Some(event);
            }
            if self.state.is_display_lost() {
                return None;
            }
            self.pump();
        }
    }

    fn release(&mut self, resource: Resource) {
        debug!(?resource, "releasing");
        match resource {
            Resource::Seat => {
                self.state.seat.remove_keyboard();
                self.state.seat.remove_pointer();
                self.keyboards.clear();
            }
            Resource::Cursor => {
                self.cursor_image = None;
                self.state.cursor_status = CursorImageStatus::Hidden;
                self.pointers.clear();
            }
            Resource::OutputLayout => {
                let outputs: Vec<Output> = self.state.space.outputs().cloned().collect();
                for output in outputs {
                    self.state.space.unmap_output(&output);
                }
            }
            // Buffers are allocated by the EGL window surface
            Resource::Allocator => {}
            Resource::Renderer => {
                if let Some(output) = self.output.as_mut() {
                    output.damage_tracker = None;
                }
            }
            Resource::Backend => {
                self.output = None;
                self.backend = None;
            }
            Resource::Display => {
                let handle = self.event_loop.handle();
                if let Some(token) = self.socket_token.take() {
                    handle.remove(token);
                }
                if let Some(token) = self.display_token.take() {
                    handle.remove(token);
                }
            }
        }
    }
}

impl Outputs for WinitPlatform {
    fn output_init_render(&mut self, id: OutputId) {
        if let Some(output) = self.output_for_mut(id) {
            output.damage_tracker = Some(OutputDamageTracker::from_output(&output.output));
        }
    }

    fn output_preferred_mode(&self, id: OutputId) -> Option<OutputMode> {
        let mode = self.output_for(id)?.output.preferred_mode()?;
        Some(OutputMode {
            width: mode.size.w,
            height: mode.size.h,
            refresh: mode.refresh,
        })
    }

    fn output_commit(&mut self, id: OutputId, configuration: &OutputConfiguration) -> bool {
        let window_size = self.backend.as_ref().map(|backend| backend.window_size());
        let Some(output) = self.output_for_mut(id) else {
            return false;
        };
        let mode = match configuration.mode {
            // The window decides the size, only its own size can be committed
            Some(mode) if Some((mode.width, mode.height).into()) != window_size => {
                debug!(
                    "Rejecting mode {}x{} for output {}",
                    mode.width, mode.height, id
                );
                return false;
            }
            Some(mode) => Some(Mode {
                size: (mode.width, mode.height).into(),
                refresh: mode.refresh,
            }),
            None => None,
        };
        let scale = configuration.scale.map(Scale::Fractional);
        output.output.change_current_state(mode, None, scale, None);
        if let Some(enabled) = configuration.enabled {
            output.enabled = enabled;
        }
        true
    }

    fn layout_add_auto(&mut self, id: OutputId) -> (i32, i32) {
        let x = self
            .state
            .space
            .outputs()
            .filter_map(|output| self.state.space.output_geometry(output))
            .map(|geometry| geometry.loc.x + geometry.size.w)
            .max()
            .unwrap_or(0);
        let Some(output) = self.output.as_mut().filter(|output| output.id == id) else {
            return (0, 0);
        };
        self.state.space.map_output(&output.output, (x, 0));
        (x, 0)
    }

    fn layout_remove(&mut self, id: OutputId) {
        let Some(output) = self.output.as_ref().filter(|output| output.id == id) else {
            return;
        };
        self.state.space.unmap_output(&output.output);
    }
}

impl Scene for WinitPlatform {
    fn scene_output_create(&mut self, id: OutputId) {
        if let Some(output) = self.output_for_mut(id) {
            output.has_scene_output = true;
            output.next_frame = Instant::now();
        }
    }

    fn scene_output_destroy(&mut self, id: OutputId) {
        if let Some(output) = self.output_for_mut(id) {
            output.has_scene_output = false;
        }
    }

    fn scene_output_commit(&mut self, id: OutputId) -> bool {
        match self.render(id) {
            Ok(rendered) => rendered,
            Err(err) => {
                warn!("Render of output {} failed: {err:#}", id);
                false
            }
        }
    }

    fn scene_output_frame_done(&mut self, id: OutputId, now: Duration) {
        let Some(output) = self.output_for(id).map(|output| output.output.clone()) else {
            return;
        };
        for window in self.state.space.elements() {
            window.send_frame(&output, now, None, |_, _| Some(output.clone()));
        }
    }

    fn scene_tree_create(&mut self, toplevel: ToplevelId) -> SceneNodeId {
        self.state.map_window(toplevel)
    }

    fn scene_node_raise_to_top(&mut self, node: SceneNodeId) {
        self.state.raise_node(node);
    }

    fn scene_stacking_order(&self) -> Vec<SceneNodeId> {
        self.state.stacking_order()
    }
}

impl Seat for WinitPlatform {
    type Keymap = xkb::Keymap;

    fn keymap_compile(&mut self, names: &KeymapNames) -> Result<xkb::Keymap, PlatformError> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        xkb::Keymap::new_from_names(
            &context,
            &names.rules,
            &names.model,
            &names.layout,
            &names.variant,
            names.options.clone(),
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| PlatformError::Keymap(format!("no keymap for {names:?}")))
    }

    fn keyboard_set_keymap(&mut self, keyboard: DeviceId, keymap: &xkb::Keymap) {
        self.keyboards.insert(keyboard, xkb::State::new(keymap));
        let serialized = keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1);
        self.keymap = Some(serialized.clone());
        if let Some(seat_keyboard) = self.state.seat.get_keyboard() {
            if let Err(err) = seat_keyboard.set_keymap_from_string(&mut self.state, serialized) {
                warn!("Failed to set keymap: {err}");
            }
        }
    }

    fn keyboard_set_repeat_info(&mut self, _keyboard: DeviceId, rate: i32, delay: i32) {
        self.repeat_info = (rate, delay);
        if let Some(seat_keyboard) = self.state.seat.get_keyboard() {
            seat_keyboard.change_repeat_info(rate, delay);
        }
    }

    fn seat_set_capabilities(&mut self, capabilities: SeatCapabilities) {
        let seat = &mut self.state.seat;
        if capabilities.contains(SeatCapabilities::KEYBOARD) {
            if seat.get_keyboard().is_none() {
                let (rate, delay) = self.repeat_info;
                match seat.add_keyboard(XkbConfig::default(), delay, rate) {
                    Ok(keyboard) => {
                        if let Some(keymap) = self.keymap.clone() {
                            if let Err(err) = keyboard.set_keymap_from_string(&mut self.state, keymap) {
                                warn!("Failed to set keymap: {err}");
                            }
                        }
                    }
                    Err(err) => warn!("Failed to add seat keyboard: {err}"),
                }
            }
        } else if seat.get_keyboard().is_some() {
            seat.remove_keyboard();
        }

        let seat = &mut self.state.seat;
        if capabilities.contains(SeatCapabilities::POINTER) {
            if seat.get_pointer().is_none() {
                seat.add_pointer();
            }
        } else if seat.get_pointer().is_some() {
            seat.remove_pointer();
        }
    }

    fn seat_set_keyboard(&mut self, keyboard: Option<DeviceId>) {
        // All host keys arrive through one seat keyboard
        trace!(?keyboard, "active keyboard");
    }

    fn seat_notify_modifiers(&mut self, modifiers: Modifiers) {
        // The seat keyboard tracks modifiers from the key events it forwards
        trace!(?modifiers, "modifiers");
    }

    fn seat_notify_key(&mut self, event: &KeyEvent) {
        let Some(keyboard) = self.state.seat.get_keyboard() else {
            return;
        };
        let state = match event.state {
            KeyState::Pressed => WinitKeyState::Pressed,
            KeyState::Released => WinitKeyState::Released,
        };
        keyboard.input::<(), _>(
            &mut self.state,
            Keycode::new(event.keycode),
            state,
            SERIAL_COUNTER.next_serial(),
            event.time_msec,
            |_, _, _| FilterResult::Forward,
        );
    }

    fn seat_keyboard_enter(&mut self, toplevel: ToplevelId) {
        let Some(surface) = self
            .state
            .toplevel(toplevel)
            .map(|record| record.surface.wl_surface().clone())
        else {
            return;
        };
        if let Some(keyboard) = self.state.seat.get_keyboard() {
            keyboard.set_focus(&mut self.state, Some(surface), SERIAL_COUNTER.next_serial());
        }
    }

    fn seat_keyboard_clear_focus(&mut self) {
        if let Some(keyboard) = self.state.seat.get_keyboard() {
            keyboard.set_focus(&mut self.state, None, SERIAL_COUNTER.next_serial());
        }
    }

    fn seat_pointer_clear_focus(&mut self) {
        let Some(pointer) = self.state.seat.get_pointer() else {
            return;
        };
        let location = self.state.pointer_location;
        pointer.motion(
            &mut self.state,
            None,
            &MotionEvent {
                location,
                serial: SERIAL_COUNTER.next_serial(),
                time: get_monotonic_time().as_millis() as u32,
            },
        );
    }

    fn seat_pointer_frame(&mut self) {
        if let Some(pointer) = self.state.seat.get_pointer() {
            pointer.frame(&mut self.state);
        }
    }

    fn seat_pointer_focus_client(&self) -> Option<ClientId> {
        let surface = self.state.seat.get_pointer()?.current_focus()?;
        self.state.known_client_of(&surface)
    }

    fn seat_set_selection(&mut self, request: &SetSelectionRequest) {
        match request.source {
            None => clear_data_device_selection(&self.state.display_handle, &self.state.seat),
            // The data device already installed the client's source
            Some(source) => debug!(%source, serial = request.serial, "selection set"),
        }
    }
}

impl Shell for WinitPlatform {
    fn toplevel_initial_commit(&self, toplevel: ToplevelId) -> bool {
        self.state
            .toplevel(toplevel)
            .is_some_and(|record| !initial_configure_sent(&record.surface))
    }

    fn toplevel_schedule_configure(&mut self, toplevel: ToplevelId, width: i32, height: i32) {
        let Some(record) = self.state.toplevel(toplevel) else {
            return;
        };
        record.surface.with_pending_state(|state| {
            // 0x0 lets the client pick
            state.size = (width > 0 && height > 0).then(|| (width, height).into());
        });
        record.surface.send_configure();
    }

    fn toplevel_set_activated(&mut self, toplevel: ToplevelId, activated: bool) {
        use smithay::reexports::wayland_protocols::xdg::shell::server::xdg_toplevel::State as XdgToplevelState;

        let Some(record) = self.state.toplevel(toplevel) else {
            return;
        };
        record.surface.with_pending_state(|state| {
            if activated {
                state.states.set(XdgToplevelState::Activated);
            } else {
                state.states.unset(XdgToplevelState::Activated);
            }
        });
        if initial_configure_sent(&record.surface) {
            record.surface.send_pending_configure();
        }
    }
}

impl Cursor for WinitPlatform {
    fn cursor_attach_pointer(&mut self, device: DeviceId) {
        if !self.pointers.contains(&device) {
            self.pointers.push(device);
        }
    }

    fn cursor_set_xcursor(&mut self, theme: &str, size: u32) {
        self.cursor_image = Some(CursorImage::load(theme, size));
        self.state.cursor_status = CursorImageStatus::default_named();
    }

    fn cursor_move(&mut self, _device: DeviceId, dx: f64, dy: f64) {
        let location = self.state.pointer_location + Point::from((dx, dy));
        self.state.pointer_location = clamp_to_layout(&self.state, location);
    }

    fn cursor_warp_absolute(&mut self, _device: DeviceId, x: f64, y: f64) {
        let Some(geometry) = self
            .state
            .space
            .outputs()
            .next()
            .and_then(|output| self.state.space.output_geometry(output))
        else {
            return;
        };
        self.state.pointer_location = Point::from((
            geometry.loc.x as f64 + x * geometry.size.w as f64,
            geometry.loc.y as f64 + y * geometry.size.h as f64,
        ));
    }

    fn cursor_set_surface(&mut self, surface: Option<SurfaceId>, hotspot: (i32, i32)) {
        self.cursor_hotspot = hotspot;
        let surface = surface.and_then(|id| self.state.cursor_surface(id)).cloned();
        self.state.cursor_status = match surface {
            Some(surface) => CursorImageStatus::Surface(surface),
            None => CursorImageStatus::Hidden,
        };
    }
}

/// Keep `location` inside the union of output rectangles.
fn clamp_to_layout(
    state: &WaylandState,
    location: Point<f64, smithay::utils::Logical>,
) -> Point<f64, smithay::utils::Logical> {
    let bounds = state
        .space
        .outputs()
        .filter_map(|output| state.space.output_geometry(output))
        .reduce(|acc, geometry| acc.merge(geometry));
    let Some(bounds) = bounds else {
        return location;
    };
    let max_x = (bounds.loc.x + bounds.size.w - 1) as f64;
    let max_y = (bounds.loc.y + bounds.size.h - 1) as f64;
    Point::from((
        location.x.clamp(bounds.loc.x as f64, max_x),
        location.y.clamp(bounds.loc.y as f64, max_y),
    ))
}

/// Run a nested session until it terminates.
///
/// `startup` is an optional program spawned once the socket is published.
pub fn run_winit(config: Config, startup: Option<(String, Vec<String>)>) -> anyhow::Result<()> {
    let mut platform = WinitPlatform::new()?;
    let mut session = Session::initialize(config, &mut platform)?;
    info!("Wayland socket: {}", session.socket_name());

    if let Err(err) = sd_notify::notify(true, &[NotifyState::Ready]) {
        warn!("Error notifying systemd: {err:?}");
    }

    let mut client = match startup {
        Some((program, args)) => match spawn_client(&program, &args, session.socket_name()) {
            Ok(child) => {
                info!("Client spawned with PID {}", child.id());
                Some(child)
            }
            Err(err) => {
                error!("Failed to spawn {program}: {err}");
                None
            }
        },
        None => None,
    };

    session.run(&mut platform);
    session.shutdown(&mut platform);

    if let Some(child) = client.as_mut() {
        match child.try_wait() {
            Ok(Some(status)) => info!("Client exited with status: {}", status),
            Ok(None) => debug!("Client still running at shutdown"),
            Err(e) => error!("Error checking client process: {}", e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_exit_code() {
        assert_eq!(host_exit_code(&PumpStatus::Continue), None);
        assert_eq!(host_exit_code(&PumpStatus::Exit(0)), Some(0));
        assert_eq!(host_exit_code(&PumpStatus::Exit(3)), Some(3));
    }
}

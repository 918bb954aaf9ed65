//! Smithay protocol state for the real platforms
//!
//! Protocol callbacks never touch the session. Each one translates what the
//! client did into a [`PlatformEvent`] and queues it; the platform hands the
//! queue out one event at a time from `next_event`.
//!
//! Surfaces, clients and data sources are smithay objects. The session only
//! sees opaque handles, so this module also keeps the handle tables.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use smithay::{
    backend::renderer::utils::{on_commit_buffer_handler, with_renderer_surface_state},
    delegate_compositor, delegate_data_device, delegate_output, delegate_seat, delegate_shm,
    delegate_xdg_shell,
    desktop::{Space, Window},
    input::{
        pointer::{CursorImageAttributes, CursorImageStatus},
        Seat, SeatHandler, SeatState,
    },
    reexports::wayland_server::{
        backend::{ClientData, ClientId as WlClientId, DisconnectReason, ObjectId},
        protocol::{wl_buffer::WlBuffer, wl_seat::WlSeat, wl_surface::WlSurface},
        Client, DisplayHandle, Resource,
    },
    utils::{IsAlive, Logical, Point, Serial, SERIAL_COUNTER},
    wayland::{
        buffer::BufferHandler,
        compositor::{
            get_parent, is_sync_subsurface, with_states, CompositorClientState,
            CompositorHandler, CompositorState,
        },
        output::{OutputHandler, OutputManagerState},
        selection::{
            data_device::{
                set_data_device_focus, ClientDndGrabHandler, DataDeviceHandler, DataDeviceState,
                ServerDndGrabHandler,
            },
            SelectionHandler, SelectionSource, SelectionTarget,
        },
        shell::xdg::{
            PopupSurface, PositionerState, ToplevelSurface, XdgShellHandler, XdgShellState,
            XdgToplevelSurfaceData,
        },
        shm::{ShmHandler, ShmState},
    },
};
use tracing::{debug, info, trace, warn};

use crate::event::{
    ClientId, DataSourceId, PlatformEvent, PopupId, SceneNodeId, SeatEvent, SetCursorRequest,
    SetSelectionRequest, SurfaceEvent, SurfaceId, ToplevelId,
};

/// A toplevel known to the protocol layer
#[derive(Debug)]
pub struct ToplevelRecord {
    pub surface: ToplevelSurface,
    pub window: Window,
    /// Set once the session created a scene tree for it
    pub node: Option<SceneNodeId>,
    /// Whether the surface currently has a buffer attached
    pub mapped: bool,
}

pub struct WaylandState {
    pub display_handle: DisplayHandle,
    pub compositor_state: CompositorState,
    pub xdg_shell_state: XdgShellState,
    pub shm_state: ShmState,
    pub output_manager_state: OutputManagerState,
    pub seat_state: SeatState<Self>,
    pub data_device_state: DataDeviceState,
    pub seat: Seat<Self>,
    pub space: Space<Window>,
    pub pointer_location: Point<f64, Logical>,
    /// Image shown at the pointer location
    pub cursor_status: CursorImageStatus,

    events: VecDeque<PlatformEvent>,
    next_id: u64,
    toplevels: IndexMap<ToplevelId, ToplevelRecord>,
    /// Root `wl_surface` of each toplevel
    surfaces: HashMap<ObjectId, ToplevelId>,
    nodes: HashMap<SceneNodeId, ToplevelId>,
    clients: HashMap<WlClientId, ClientId>,
    /// Filled by [`ClientState::disconnected`]
    departed: Arc<Mutex<Vec<WlClientId>>>,
    cursor_surfaces: HashMap<SurfaceId, WlSurface>,
    display_lost: bool,
}

impl WaylandState {
    pub fn new(display_handle: DisplayHandle) -> Self {
        let compositor_state = CompositorState::new::<Self>(&display_handle);
        let xdg_shell_state = XdgShellState::new::<Self>(&display_handle);
        let shm_state = ShmState::new::<Self>(&display_handle, vec![]);
        let output_manager_state = OutputManagerState::new_with_xdg_output::<Self>(&display_handle);
        let mut seat_state = SeatState::new();
        let data_device_state = DataDeviceState::new::<Self>(&display_handle);
        // Capabilities are added when the session publishes them.
        let seat = seat_state.new_wl_seat(&display_handle, "seat0");

        Self {
            display_handle,
            compositor_state,
            xdg_shell_state,
            shm_state,
            output_manager_state,
            seat_state,
            data_device_state,
            seat,
            space: Space::default(),
            pointer_location: (0.0, 0.0).into(),
            cursor_status: CursorImageStatus::Hidden,
            events: VecDeque::new(),
            next_id: 0,
            toplevels: IndexMap::new(),
            surfaces: HashMap::new(),
            nodes: HashMap::new(),
            clients: HashMap::new(),
            departed: Arc::default(),
            cursor_surfaces: HashMap::new(),
            display_lost: false,
        }
    }

    /// Allocate a fresh handle value. Shared by every handle kind.
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn queue_event(&mut self, event: PlatformEvent) {
        trace!(?event, "queued");
        self.events.push_back(event);
    }

    pub fn pop_event(&mut self) -> Option<PlatformEvent> {
        self.events.pop_front()
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Queue display loss. Events already queued are still delivered first.
    pub fn lose_display(&mut self) {
        if !self.display_lost {
            self.display_lost = true;
            self.events.push_back(PlatformEvent::DisplayLost);
        }
    }

    pub fn is_display_lost(&self) -> bool {
        self.display_lost
    }

    pub fn toplevel(&self, id: ToplevelId) -> Option<&ToplevelRecord> {
        self.toplevels.get(&id)
    }

    pub fn toplevel_for_node(&self, node: SceneNodeId) -> Option<ToplevelId> {
        self.nodes.get(&node).copied()
    }

    /// Create the scene node of a toplevel: its window enters the space.
    pub fn map_window(&mut self, id: ToplevelId) -> SceneNodeId {
        let node = SceneNodeId(self.next_id());
        if let Some(record) = self.toplevels.get_mut(&id) {
            record.node = Some(node);
            self.space.map_element(record.window.clone(), (0, 0), false);
            self.nodes.insert(node, id);
        } else {
            warn!(toplevel = %id, "scene tree requested for unknown toplevel");
        }
        node
    }

    pub fn raise_node(&mut self, node: SceneNodeId) {
        let Some(record) = self
            .toplevel_for_node(node)
            .and_then(|id| self.toplevels.get(&id))
        else {
            return;
        };
        self.space.raise_element(&record.window, false);
    }

    /// Scene nodes from bottom to top.
    pub fn stacking_order(&self) -> Vec<SceneNodeId> {
        self.space
            .elements()
            .filter_map(|window| {
                let surface = window.toplevel()?.wl_surface().id();
                let id = self.surfaces.get(&surface)?;
                self.toplevels.get(id)?.node
            })
            .collect()
    }

    /// Per-client data for a newly accepted connection
    pub fn client_state(&self) -> ClientState {
        ClientState {
            compositor: CompositorClientState::default(),
            departed: self.departed.clone(),
        }
    }

    /// Drop handles of clients that disconnected since the last call.
    pub fn forget_departed_clients(&mut self) {
        forget_departed(&mut self.clients, &self.departed);
    }

    /// Handle of the client owning `surface`, allocated on first sight.
    pub fn client_of(&mut self, surface: &WlSurface) -> Option<ClientId> {
        self.forget_departed_clients();
        let client = self.display_handle.get_client(surface.id()).ok()?;
        if let Some(id) = self.clients.get(&client.id()) {
            return Some(*id);
        }
        let id = ClientId(self.next_id());
        self.clients.insert(client.id(), id);
        Some(id)
    }

    /// Like [`Self::client_of`], without allocating a handle for new clients.
    pub fn known_client_of(&self, surface: &WlSurface) -> Option<ClientId> {
        let client = self.display_handle.get_client(surface.id()).ok()?;
        self.clients.get(&client.id()).copied()
    }

    pub fn cursor_surface(&self, id: SurfaceId) -> Option<&WlSurface> {
        self.cursor_surfaces.get(&id)
    }
}

/// Whether the initial configure of `surface` went out already.
pub fn initial_configure_sent(surface: &ToplevelSurface) -> bool {
    with_states(surface.wl_surface(), |states| {
        states
            .data_map
            .get::<XdgToplevelSurfaceData>()
            .and_then(|data| data.lock().ok().map(|data| data.initial_configure_sent))
            .unwrap_or(false)
    })
}

fn forget_departed<K: Eq + Hash, V>(table: &mut HashMap<K, V>, departed: &Mutex<Vec<K>>) {
    let Ok(mut departed) = departed.lock() else {
        return;
    };
    for key in departed.drain(..) {
        table.remove(&key);
    }
}

// Client tracking
pub struct ClientState {
    pub compositor: CompositorClientState,
    departed: Arc<Mutex<Vec<WlClientId>>>,
}

impl ClientData for ClientState {
    fn initialized(&self, client_id: WlClientId) {
        info!("Client connected: {:?}", client_id);
    }

    fn disconnected(&self, client_id: WlClientId, reason: DisconnectReason) {
        info!("Client disconnected: {:?}, reason: {:?}", client_id, reason);
        if let Ok(mut departed) = self.departed.lock() {
            departed.push(client_id);
        }
    }
}

impl BufferHandler for WaylandState {
    fn buffer_destroyed(&mut self, _buffer: &WlBuffer) {}
}

impl CompositorHandler for WaylandState {
    fn compositor_state(&mut self) -> &mut CompositorState {
        &mut self.compositor_state
    }

    fn client_compositor_state<'a>(&self, client: &'a Client) -> &'a CompositorClientState {
        // Every client is inserted with a ClientState by the socket source.
        match client.get_data::<ClientState>() {
            Some(state) => &state.compositor,
            None => unreachable!("client inserted without ClientState"),
        }
    }

    fn commit(&mut self, surface: &WlSurface) {
        on_commit_buffer_handler::<Self>(surface);

        if is_sync_subsurface(surface) {
            return;
        }

        let mut root = surface.clone();
        while let Some(parent) = get_parent(&root) {
            root = parent;
        }

        let Some(&id) = self.surfaces.get(&root.id()) else {
            return;
        };
        let Some(record) = self.toplevels.get_mut(&id) else {
            return;
        };
        record.window.on_commit();

        // Subsurface commits don't change the toplevel's own state
        if root != *surface {
            return;
        }

        let has_buffer =
            with_renderer_surface_state(surface, |state| state.buffer().is_some()).unwrap_or(false);

        self.events
            .push_back(PlatformEvent::Surface(id, SurfaceEvent::Commit));
        if has_buffer != record.mapped {
            record.mapped = has_buffer;
            let event = if has_buffer {
                SurfaceEvent::Map
            } else {
                SurfaceEvent::Unmap
            };
            self.events.push_back(PlatformEvent::Surface(id, event));
        }
    }
}
delegate_compositor!(WaylandState);

impl ShmHandler for WaylandState {
    fn shm_state(&self) -> &ShmState {
        &self.shm_state
    }
}
delegate_shm!(WaylandState);

impl SeatHandler for WaylandState {
    type KeyboardFocus = WlSurface;
    type PointerFocus = WlSurface;
    type TouchFocus = WlSurface;

    fn seat_state(&mut self) -> &mut SeatState<Self> {
        &mut self.seat_state
    }

    fn focus_changed(&mut self, seat: &Seat<Self>, focused: Option<&WlSurface>) {
        debug!("focus_changed: {:?}", focused.map(|s| s.id()));
        let client = focused.and_then(|s| self.display_handle.get_client(s.id()).ok());
        set_data_device_focus(&self.display_handle, seat, client);
    }

    fn cursor_image(&mut self, _seat: &Seat<Self>, image: CursorImageStatus) {
        let request = match image {
            CursorImageStatus::Surface(surface) => {
                let Some(client) = self.client_of(&surface) else {
                    return;
                };
                let hotspot = with_states(&surface, |states| {
                    states
                        .data_map
                        .get::<Mutex<CursorImageAttributes>>()
                        .and_then(|attributes| attributes.lock().ok().map(|a| a.hotspot))
                        .unwrap_or_default()
                });
                let id = SurfaceId(self.next_id());
                self.cursor_surfaces.retain(|_, surface| surface.alive());
                self.cursor_surfaces.insert(id, surface);
                SetCursorRequest {
                    client,
                    surface: Some(id),
                    hotspot: (hotspot.x, hotspot.y),
                }
            }
            CursorImageStatus::Hidden => {
                // Only the focused client gets this far
                let focus = self.seat.get_pointer().and_then(|p| p.current_focus());
                let Some(client) = focus.and_then(|surface| self.client_of(&surface)) else {
                    return;
                };
                SetCursorRequest {
                    client,
                    surface: None,
                    hotspot: (0, 0),
                }
            }
            CursorImageStatus::Named(icon) => {
                debug!(?icon, "ignoring named cursor request");
                return;
            }
        };
        self.queue_event(PlatformEvent::Seat(SeatEvent::RequestSetCursor(request)));
    }
}
delegate_seat!(WaylandState);

impl SelectionHandler for WaylandState {
    type SelectionUserData = ();

    fn new_selection(
        &mut self,
        ty: SelectionTarget,
        source: Option<SelectionSource>,
        _seat: Seat<Self>,
    ) {
        if ty != SelectionTarget::Clipboard {
            return;
        }
        let source = source.map(|_| DataSourceId(self.next_id()));
        let serial = u32::from(SERIAL_COUNTER.next_serial());
        self.queue_event(PlatformEvent::Seat(SeatEvent::RequestSetSelection(
            SetSelectionRequest { source, serial },
        )));
    }
}
impl ClientDndGrabHandler for WaylandState {}
impl ServerDndGrabHandler for WaylandState {}
impl DataDeviceHandler for WaylandState {
    fn data_device_state(&self) -> &DataDeviceState {
        &self.data_device_state
    }
}
delegate_data_device!(WaylandState);

impl OutputHandler for WaylandState {}
delegate_output!(WaylandState);

impl XdgShellHandler for WaylandState {
    fn xdg_shell_state(&mut self) -> &mut XdgShellState {
        &mut self.xdg_shell_state
    }

    fn new_toplevel(&mut self, surface: ToplevelSurface) {
        let id = ToplevelId(self.next_id());
        let window = Window::new_wayland_window(surface.clone());
        self.surfaces.insert(surface.wl_surface().id(), id);
        self.toplevels.insert(
            id,
            ToplevelRecord {
                surface,
                window,
                node: None,
                mapped: false,
            },
        );
        info!(toplevel = %id, "new toplevel");
        self.queue_event(PlatformEvent::NewToplevel(id));
    }

    fn toplevel_destroyed(&mut self, surface: ToplevelSurface) {
        let Some(id) = self.surfaces.remove(&surface.wl_surface().id()) else {
            return;
        };
        let Some(record) = self.toplevels.shift_remove(&id) else {
            return;
        };
        // The scene tree goes away with the surface
        self.space.unmap_elem(&record.window);
        if let Some(node) = record.node {
            self.nodes.remove(&node);
        }
        if record.mapped {
            self.queue_event(PlatformEvent::Surface(id, SurfaceEvent::Unmap));
        }
        info!(toplevel = %id, "toplevel destroyed");
        self.queue_event(PlatformEvent::ToplevelDestroyed(id));
    }

    fn new_popup(&mut self, surface: PopupSurface, _positioner: PositionerState) {
        let id = PopupId(self.next_id());
        if let Err(err) = surface.send_configure() {
            warn!("initial popup configure failed: {err:?}");
        }
        self.queue_event(PlatformEvent::NewPopup(id));
    }

    fn grab(&mut self, _surface: PopupSurface, _seat: WlSeat, _serial: Serial) {}

    fn reposition_request(
        &mut self,
        surface: PopupSurface,
        positioner: PositionerState,
        token: u32,
    ) {
        surface.with_pending_state(|state| {
            state.geometry = positioner.get_geometry();
            state.positioner = positioner;
        });
        surface.send_repositioned(token);
    }
}
delegate_xdg_shell!(WaylandState);

//! Toplevel registry
//!
//! Application windows, from creation to destruction:
//!
//! ```text
//! Created -> Mapped <-> Unmapped -> (destroyed)
//! ```
//!
//! A toplevel's scene subtree is created immediately, before it maps. Mapping
//! raises it to the top of the stack and gives it keyboard focus. When the
//! focused toplevel goes away, focus moves to the top-most toplevel that is
//! still mapped.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::event::{PopupId, SceneNodeId, ToplevelId};
use crate::platform::{Platform, Signal, Source, Subscription};
use crate::{tracy_plot, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToplevelState {
    /// Created, waiting for the client to map a buffer
    Created,
    Mapped,
    Unmapped,
}

#[derive(Debug)]
pub struct ToplevelEntry {
    pub id: ToplevelId,
    /// Root of this toplevel's scene subtree, released with the scene tree
    pub node: SceneNodeId,
    pub state: ToplevelState,
    /// Higher is closer to the top
    stack_serial: u64,
    map: Subscription,
    unmap: Subscription,
    commit: Subscription,
    destroy: Subscription,
}

impl ToplevelEntry {
    pub fn is_mapped(&self) -> bool {
        self.state == ToplevelState::Mapped
    }

    pub(crate) fn into_subscriptions(self) -> [Subscription; 4] {
        [self.map, self.unmap, self.commit, self.destroy]
    }
}

#[derive(Debug, Default)]
pub struct ToplevelRegistry {
    entries: IndexMap<ToplevelId, ToplevelEntry>,
    /// Reverse lookup from scene node to its owner
    nodes: HashMap<SceneNodeId, ToplevelId>,
    next_stack_serial: u64,
}

impl ToplevelRegistry {
    pub fn get(&self, id: ToplevelId) -> Option<&ToplevelEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: ToplevelId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ToplevelId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToplevelEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn toplevel_for_node(&self, node: SceneNodeId) -> Option<ToplevelId> {
        self.nodes.get(&node).copied()
    }

    /// Mapped toplevels, bottom to top
    pub fn mapped_stack(&self) -> Vec<ToplevelId> {
        let mut mapped: Vec<_> = self
            .entries
            .values()
            .filter(|entry| entry.is_mapped())
            .map(|entry| (entry.stack_serial, entry.id))
            .collect();
        mapped.sort_unstable();
        mapped.into_iter().map(|(_, id)| id).collect()
    }

    /// Top-most mapped toplevel
    pub fn top_mapped(&self) -> Option<ToplevelId> {
        self.entries
            .values()
            .filter(|entry| entry.is_mapped())
            .max_by_key(|entry| entry.stack_serial)
            .map(|entry| entry.id)
    }

    fn insert(&mut self, entry: ToplevelEntry) {
        self.nodes.insert(entry.node, entry.id);
        self.entries.insert(entry.id, entry);
    }

    fn remove(&mut self, id: ToplevelId) -> Option<ToplevelEntry> {
        let entry = self.entries.shift_remove(&id)?;
        self.nodes.remove(&entry.node);
        Some(entry)
    }

    fn next_serial(&mut self) -> u64 {
        self.next_stack_serial += 1;
        self.next_stack_serial
    }

    /// Move to the top of the stack, returning the node to raise.
    fn raise(&mut self, id: ToplevelId) -> Option<SceneNodeId> {
        let serial = self.next_serial();
        let entry = self.entries.get_mut(&id)?;
        entry.stack_serial = serial;
        Some(entry.node)
    }

    fn set_state(&mut self, id: ToplevelId, state: ToplevelState) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = ToplevelEntry> + '_ {
        self.nodes.clear();
        self.entries.drain(..).map(|(_, entry)| entry)
    }
}

impl Session {
    pub(crate) fn on_new_toplevel<P: Platform>(&mut self, platform: &mut P, toplevel: ToplevelId) {
        if self.toplevels.contains(toplevel) {
            warn!("Toplevel {toplevel} announced twice, ignoring");
            return;
        }

        let node = platform.scene_tree_create(toplevel);
        let map = self.listeners.subscribe(Source::Surface(toplevel), Signal::Map);
        let unmap = self.listeners.subscribe(Source::Surface(toplevel), Signal::Unmap);
        let commit = self.listeners.subscribe(Source::Surface(toplevel), Signal::Commit);
        let destroy = self
            .listeners
            .subscribe(Source::Toplevel(toplevel), Signal::Destroy);

        let stack_serial = self.toplevels.next_serial();
        self.toplevels.insert(ToplevelEntry {
            id: toplevel,
            node,
            state: ToplevelState::Created,
            stack_serial,
            map,
            unmap,
            commit,
            destroy,
        });
        debug!("New toplevel {toplevel} (node {node})");
        tracy_plot!("toplevels", self.toplevels.len());
    }

    pub(crate) fn on_new_popup(&mut self, popup: PopupId) {
        debug!("Ignoring new popup {popup}");
    }

    pub(crate) fn on_toplevel_commit<P: Platform>(&mut self, platform: &mut P, toplevel: ToplevelId) {
        if platform.toplevel_initial_commit(toplevel) {
            debug!("Toplevel {toplevel}: initial commit, letting the client choose its size");
            platform.toplevel_schedule_configure(toplevel, 0, 0);
        }
    }

    pub(crate) fn on_toplevel_map<P: Platform>(&mut self, platform: &mut P, toplevel: ToplevelId) {
        if !self.toplevels.set_state(toplevel, ToplevelState::Mapped) {
            warn!("Map for unknown toplevel {toplevel}");
            return;
        }
        info!("Toplevel {toplevel} mapped");
        self.focus_toplevel(platform, toplevel);
    }

    pub(crate) fn on_toplevel_unmap<P: Platform>(&mut self, platform: &mut P, toplevel: ToplevelId) {
        if !self.toplevels.set_state(toplevel, ToplevelState::Unmapped) {
            warn!("Unmap for unknown toplevel {toplevel}");
            return;
        }
        info!("Toplevel {toplevel} unmapped");

        if self.seat.focused_toplevel == Some(toplevel) {
            platform.toplevel_set_activated(toplevel, false);
            self.seat.focused_toplevel = None;
            self.focus_top_mapped(platform);
        }
    }

    pub(crate) fn on_toplevel_destroy<P: Platform>(&mut self, platform: &mut P, toplevel: ToplevelId) {
        let Some(entry) = self.toplevels.remove(toplevel) else {
            warn!("Destroy for unknown toplevel {toplevel}");
            return;
        };
        debug!("Toplevel {toplevel} destroyed");

        for subscription in entry.into_subscriptions() {
            self.listeners.unsubscribe(subscription);
        }
        tracy_plot!("toplevels", self.toplevels.len());

        if self.seat.focused_toplevel == Some(toplevel) {
            self.seat.focused_toplevel = None;
            self.focus_top_mapped(platform);
        }
    }

    /// Raise, activate and give keyboard focus to `toplevel`.
    fn focus_toplevel<P: Platform>(&mut self, platform: &mut P, toplevel: ToplevelId) {
        let Some(node) = self.toplevels.raise(toplevel) else {
            return;
        };
        platform.scene_node_raise_to_top(node);

        if let Some(previous) = self.seat.focused_toplevel.filter(|prev| *prev != toplevel) {
            if self.toplevels.contains(previous) {
                platform.toplevel_set_activated(previous, false);
            }
        }
        platform.toplevel_set_activated(toplevel, true);
        self.seat.focused_toplevel = Some(toplevel);

        if self.seat.current_keyboard.is_some() {
            platform.seat_keyboard_enter(toplevel);
        } else {
            debug!("No keyboard attached, toplevel {toplevel} activated without keyboard focus");
        }
    }

    /// Hand focus to the top-most mapped toplevel, or clear it.
    fn focus_top_mapped<P: Platform>(&mut self, platform: &mut P) {
        match self.toplevels.top_mapped() {
            Some(next) => {
                debug!("Focus moves to toplevel {next}");
                self.focus_toplevel(platform, next);
            }
            None => {
                debug!("No mapped toplevel left, clearing keyboard focus");
                platform.seat_keyboard_clear_focus();
            }
        }
    }
}

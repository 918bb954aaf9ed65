//! Simulated Wayland clients
//!
//! A client here is just an owner of toplevels and cursor surfaces. Tests use
//! it to decide which client holds pointer focus and which windows go away
//! when a client disconnects.

use indexmap::IndexMap;

use crate::event::{ClientId, SurfaceId, ToplevelId};

/// A simulated client
#[derive(Debug, Default)]
pub struct TestClient {
    pub toplevels: Vec<ToplevelId>,
    /// Surfaces created for use as a cursor image
    pub cursor_surfaces: Vec<SurfaceId>,
}

/// Tracks simulated clients
#[derive(Debug, Default)]
pub struct ClientManager {
    clients: IndexMap<ClientId, TestClient>,
    next_id: u64,
    next_surface: u64,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_client(&mut self) -> ClientId {
        self.next_id += 1;
        let id = ClientId(self.next_id);
        self.clients.insert(id, TestClient::default());
        id
    }

    pub fn get_client(&self, id: ClientId) -> Option<&TestClient> {
        self.clients.get(&id)
    }

    pub fn remove_client(&mut self, id: ClientId) -> Option<TestClient> {
        self.clients.shift_remove(&id)
    }

    pub(crate) fn add_toplevel(&mut self, id: ClientId, toplevel: ToplevelId) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.toplevels.push(toplevel);
        }
    }

    pub(crate) fn forget_toplevel(&mut self, toplevel: ToplevelId) {
        for client in self.clients.values_mut() {
            client.toplevels.retain(|t| *t != toplevel);
        }
    }

    /// Create a surface for `id` to use as its cursor image.
    pub fn add_cursor_surface(&mut self, id: ClientId) -> Option<SurfaceId> {
        let client = self.clients.get_mut(&id)?;
        self.next_surface += 1;
        let surface = SurfaceId(self.next_surface);
        client.cursor_surfaces.push(surface);
        Some(surface)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toplevels_are_tracked_per_client() {
        let mut clients = ClientManager::new();
        let a = clients.add_client();
        let b = clients.add_client();
        clients.add_toplevel(a, ToplevelId(10));
        clients.add_toplevel(b, ToplevelId(11));

        clients.forget_toplevel(ToplevelId(10));
        assert!(clients.get_client(a).unwrap().toplevels.is_empty());
        assert_eq!(clients.get_client(b).unwrap().toplevels, vec![ToplevelId(11)]);
    }

    #[test]
    fn test_cursor_surface_requires_known_client() {
        let mut clients = ClientManager::new();
        assert!(clients.add_cursor_surface(ClientId(99)).is_none());

        let client = clients.add_client();
        let surface = clients.add_cursor_surface(client).unwrap();
        assert_eq!(clients.get_client(client).unwrap().cursor_surfaces, vec![surface]);
    }
}

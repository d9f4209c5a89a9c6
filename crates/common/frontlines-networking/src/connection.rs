//! # Connection Roles
//!
//! Tracks which roles this process plays (server, owning client, observer)
//! and the connection state of each. Role operations are idempotent:
//! starting an active role warns and changes nothing, stopping an inactive
//! role is tolerated.
//!
//! ```text
//!   Unconnected ──start──► Connecting ──mark_connected──► Connected
//!        ▲                     │                              │
//!        └──────── stop ───────┴──────────── stop ────────────┘
//! ```
//!
//! The server has no handshake and goes straight to Connected.
//!
//! [`handle_connection_requests`] owns the sessions: a role that starts gets
//! its [`ServerHost`](crate::server::ServerHost) or
//! [`ClientHost`](crate::client::ClientHost), and a role that stops loses it
//! along with the characters it replicated or mirrored.

use bevy::ecs::system::SystemState;
use bevy::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum ConnectionState {
    #[default]
    Unconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum NetworkRole {
    /// Authoritative simulator
    Server,
    /// Input owner of one character
    Client,
    /// Renders interpolated snapshots only
    Observer,
}

/// Result of a role operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleTransition {
    Changed,
    Unchanged,
}

/// Role operations requested from outside the networking systems (UI, CLI).
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRequest {
    StartServer { port: u16 },
    StopServer,
    StartClient { port: u16, observer: bool },
    StopClient,
    StopAll,
}

#[derive(Resource, Debug, Clone, PartialEq, Eq)]
pub struct ConnectionManager {
    server: ConnectionState,
    client: ConnectionState,
    client_role: NetworkRole,
    server_port: u16,
    client_port: u16,
    status: String,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self {
            server: ConnectionState::Unconnected,
            client: ConnectionState::Unconnected,
            client_role: NetworkRole::Client,
            server_port: 0,
            client_port: 0,
            status: "Disconnected".to_string(),
        }
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_state(&self) -> ConnectionState {
        self.server
    }

    pub fn client_state(&self) -> ConnectionState {
        self.client
    }

    /// Port the server listens on.
    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    /// Port the client connects to.
    pub fn client_port(&self) -> u16 {
        self.client_port
    }

    /// Human-readable status line for the last transition.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Active roles, server first.
    pub fn roles(&self) -> Vec<NetworkRole> {
        let mut roles = Vec::new();
        if self.server != ConnectionState::Unconnected {
            roles.push(NetworkRole::Server);
        }
        if self.client != ConnectionState::Unconnected {
            roles.push(self.client_role);
        }
        roles
    }

    pub fn is_server(&self) -> bool {
        self.server == ConnectionState::Connected
    }

    pub fn can_start_server(&self) -> bool {
        self.server == ConnectionState::Unconnected
    }

    pub fn can_start_client(&self) -> bool {
        self.client == ConnectionState::Unconnected
    }

    pub fn can_stop(&self) -> bool {
        self.server != ConnectionState::Unconnected || self.client != ConnectionState::Unconnected
    }

    // ------------------------------------------------------------------------
    // Role operations
    // ------------------------------------------------------------------------

    pub fn start_server(&mut self, port: u16) -> RoleTransition {
        if !self.can_start_server() {
            warn!("Server already running on port {}", self.server_port);
            return RoleTransition::Unchanged;
        }
        self.server = ConnectionState::Connected;
        self.server_port = port;
        self.status = format!("Server running on port {}", port);
        info!("{}", self.status);
        RoleTransition::Changed
    }

    pub fn stop_server(&mut self) -> RoleTransition {
        if self.server == ConnectionState::Unconnected {
            debug!("Stop server ignored: not running");
            return RoleTransition::Unchanged;
        }
        self.server = ConnectionState::Unconnected;
        self.status = "Server stopped".to_string();
        info!("{}", self.status);
        RoleTransition::Changed
    }

    /// Begin connecting to `port` as an input owner or an observer.
    pub fn start_client(&mut self, port: u16, observer: bool) -> RoleTransition {
        if !self.can_start_client() {
            warn!("Client already {:?}", self.client);
            return RoleTransition::Unchanged;
        }
        self.client = ConnectionState::Connecting;
        self.client_port = port;
        self.client_role = if observer {
            NetworkRole::Observer
        } else {
            NetworkRole::Client
        };
        self.status = "Client connecting".to_string();
        info!("{}", self.status);
        RoleTransition::Changed
    }

    /// The server accepted the join.
    pub fn mark_connected(&mut self) -> RoleTransition {
        if self.client != ConnectionState::Connecting {
            return RoleTransition::Unchanged;
        }
        self.client = ConnectionState::Connected;
        self.status = match self.client_role {
            NetworkRole::Observer => "Observer connected".to_string(),
            _ => "Client connected".to_string(),
        };
        info!("{}", self.status);
        RoleTransition::Changed
    }

    pub fn stop_client(&mut self) -> RoleTransition {
        if self.client == ConnectionState::Unconnected {
            debug!("Stop client ignored: not connected");
            return RoleTransition::Unchanged;
        }
        self.client = ConnectionState::Unconnected;
        self.status = "Disconnected".to_string();
        info!("Client disconnected");
        RoleTransition::Changed
    }

    /// Tear down every active role (host mode runs both).
    pub fn stop_all(&mut self) -> RoleTransition {
        let server = self.stop_server();
        let client = self.stop_client();
        if server == RoleTransition::Changed || client == RoleTransition::Changed {
            self.status = "Disconnected".to_string();
            RoleTransition::Changed
        } else {
            RoleTransition::Unchanged
        }
    }

    pub fn apply(&mut self, request: ConnectionRequest) -> RoleTransition {
        match request {
            ConnectionRequest::StartServer { port } => self.start_server(port),
            ConnectionRequest::StopServer => self.stop_server(),
            ConnectionRequest::StartClient { port, observer } => self.start_client(port, observer),
            ConnectionRequest::StopClient => self.stop_client(),
            ConnectionRequest::StopAll => self.stop_all(),
        }
    }
}

/// Apply queued [`ConnectionRequest`]s.
pub fn handle_connection_requests(
    world: &mut World,
    reader: &mut SystemState<MessageReader<ConnectionRequest>>,
) {
    let requests: Vec<ConnectionRequest> = {
        let mut messages = reader.get_mut(world);
        messages.read().copied().collect()
    };
    for request in requests {
        apply_request(world, request);
    }
}

/// Apply one role operation and start or stop the sessions it affects.
///
/// The host resources follow the bookkeeping: a role the manager considers
/// running gets a session, a stopped role loses any session it still has.
pub fn apply_request(world: &mut World, request: ConnectionRequest) -> RoleTransition {
    let Some(mut manager) = world.get_resource_mut::<ConnectionManager>() else {
        warn!("{:?} ignored: no connection manager", request);
        return RoleTransition::Unchanged;
    };
    let transition = manager.apply(request);
    let server_running = manager.server_state() != ConnectionState::Unconnected;
    let client_running = manager.client_state() != ConnectionState::Unconnected;
    let server_port = manager.server_port;
    let client_port = manager.client_port;
    let observer = manager.client_role == NetworkRole::Observer;

    let (touches_server, touches_client) = match request {
        ConnectionRequest::StartServer { .. } | ConnectionRequest::StopServer => (true, false),
        ConnectionRequest::StartClient { .. } | ConnectionRequest::StopClient => (false, true),
        ConnectionRequest::StopAll => (true, true),
    };

    #[cfg(feature = "server")]
    {
        let hosted = world.contains_resource::<crate::server::ServerHost>();
        if touches_server && server_running && !hosted {
            crate::server::open_server(world, server_port);
        } else if touches_server && !server_running && hosted {
            crate::server::close_server(world, server_port);
        }
    }

    #[cfg(feature = "client")]
    {
        let hosted = world.contains_resource::<crate::client::ClientHost>();
        if touches_client && client_running && !hosted {
            crate::client::open_client(world, client_port, observer);
        } else if touches_client && !client_running && hosted {
            crate::client::close_client(world);
        }
    }

    transition
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_server_is_idempotent() {
        let mut manager = ConnectionManager::new();
        assert_eq!(manager.start_server(7777), RoleTransition::Changed);
        let before = manager.clone();

        assert_eq!(manager.start_server(9999), RoleTransition::Unchanged);
        assert_eq!(manager, before);
        assert_eq!(manager.status(), "Server running on port 7777");
    }

    #[test]
    fn test_start_client_is_idempotent() {
        let mut manager = ConnectionManager::new();
        manager.start_client(7777, false);
        manager.mark_connected();
        let before = manager.clone();

        assert_eq!(manager.start_client(7777, true), RoleTransition::Unchanged);
        assert_eq!(manager, before);
        assert_eq!(manager.roles(), vec![NetworkRole::Client]);
    }

    #[test]
    fn test_client_handshake_states() {
        let mut manager = ConnectionManager::new();
        assert_eq!(manager.mark_connected(), RoleTransition::Unchanged);

        manager.start_client(7777, true);
        assert_eq!(manager.client_state(), ConnectionState::Connecting);
        manager.mark_connected();
        assert_eq!(manager.client_state(), ConnectionState::Connected);
        assert_eq!(manager.status(), "Observer connected");
        assert_eq!(manager.roles(), vec![NetworkRole::Observer]);
    }

    #[test]
    fn test_stop_tolerated_when_stopped() {
        let mut manager = ConnectionManager::new();
        assert_eq!(manager.stop_server(), RoleTransition::Unchanged);
        assert_eq!(manager.stop_client(), RoleTransition::Unchanged);
        assert_eq!(manager.stop_all(), RoleTransition::Unchanged);
        assert!(!manager.can_stop());
    }

    #[test]
    fn test_stop_all_tears_down_host_mode() {
        let mut manager = ConnectionManager::new();
        manager.apply(ConnectionRequest::StartServer { port: 7777 });
        manager.apply(ConnectionRequest::StartClient {
            port: 7777,
            observer: false,
        });
        assert!(!manager.can_start_server());
        assert!(!manager.can_start_client());
        assert_eq!(manager.roles(), vec![NetworkRole::Server, NetworkRole::Client]);

        assert_eq!(manager.apply(ConnectionRequest::StopAll), RoleTransition::Changed);
        assert!(manager.roles().is_empty());
        assert!(manager.can_start_server() && manager.can_start_client());
        assert_eq!(manager.status(), "Disconnected");
    }
}

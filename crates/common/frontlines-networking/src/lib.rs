//! # Frontlines Networking
//!
//! Server-authoritative replication for Frontlines characters.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Frontlines Networking                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Protocol Layer (messages, channels, bincode encoding)      │
//! │  ├── ClientMessage: Join, Axes (unreliable), Action edges   │
//! │  └── ServerMessage: Welcome, Snapshot (unreliable), Despawn │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Server Session                                              │
//! │  ├── Input intake (newest axes, ordered action edges)       │
//! │  └── Snapshot broadcast at a bounded rate                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Client Session                                              │
//! │  ├── Input forwarding for the owned character               │
//! │  └── Observer mirrors for every replicated character        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the server runs locomotion. Each fixed tick runs
//! [`NetworkSet::Receive`] → simulation → [`NetworkSet::Publish`] →
//! [`NetworkSet::Flush`].

pub mod connection;
pub mod ownership;
pub mod protocol;
pub mod replication;
pub mod transport;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "client")]
pub mod client;

mod config;
mod error;

// Re-exports
pub use config::{NetworkConfig, NetworkState, ReplicationConfig, TickConfig, TransportConfig};
pub use connection::{ConnectionManager, ConnectionRequest, ConnectionState, NetworkRole, RoleTransition};
pub use error::{NetworkError, NetworkResult};
pub use ownership::NetworkOwner;
pub use protocol::{ClientMessage, EntitySnapshot, FrontlinesChannel, NetworkTransform, ServerMessage};
pub use replication::{ObserverMirror, RemoteCharacter, Replicated, ReplicatedState, SnapshotDisposition};
pub use transport::{LoopbackHub, LoopbackTransport, Transport};

use bevy::prelude::*;

/// Ordering of networking work inside `FixedUpdate`.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum NetworkSet {
    /// Drain transports, deliver input
    Receive,
    /// Queue snapshots, advance mirrors
    Publish,
    /// Send queued packets
    Flush,
}

// ============================================================================
// Main Plugin
// ============================================================================

/// Main networking plugin for Frontlines.
///
/// Configure via [`NetworkConfig`] resource before adding. Roles start and
/// stop through [`ConnectionRequest`] messages, which insert and remove
/// [`server::ServerHost`] / [`client::ClientHost`]; systems for a side only
/// run while its host resource exists.
///
/// # Example
///
/// ```rust,ignore
/// use bevy::prelude::*;
/// use frontlines_networking::{FrontlinesNetworkingPlugin, NetworkConfig};
///
/// fn main() {
///     App::new()
///         .add_plugins(MinimalPlugins)
///         .insert_resource(NetworkConfig::default())
///         .add_plugins(FrontlinesNetworkingPlugin)
///         .run();
/// }
/// ```
pub struct FrontlinesNetworkingPlugin;

impl Plugin for FrontlinesNetworkingPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<NetworkOwner>()
            .register_type::<Replicated>()
            .register_type::<ReplicatedState>()
            .register_type::<NetworkTransform>();

        let config = if app.world().contains_resource::<NetworkConfig>() {
            app.world().resource::<NetworkConfig>().clone()
        } else {
            let cfg = NetworkConfig::default();
            app.insert_resource(cfg.clone());
            cfg
        };

        app.init_resource::<NetworkState>()
            .init_resource::<ConnectionManager>()
            .init_resource::<LoopbackHub>()
            .add_message::<ConnectionRequest>()
            .configure_sets(
                FixedUpdate,
                (NetworkSet::Receive, NetworkSet::Publish, NetworkSet::Flush).chain(),
            )
            .add_systems(
                FixedUpdate,
                connection::handle_connection_requests.before(NetworkSet::Receive),
            );

        #[cfg(feature = "server")]
        app.add_plugins(server::ServerNetworkPlugin);

        #[cfg(feature = "client")]
        app.add_plugins(client::ClientNetworkPlugin);

        info!(
            "Frontlines Networking initialized ({}Hz tick, {}Hz snapshots)",
            config.tick.tick_rate, config.replication.snapshot_rate
        );
    }
}

// ============================================================================
// Prelude
// ============================================================================

/// Convenient re-exports for common networking types.
pub mod prelude {
    pub use super::{
        ConnectionManager, ConnectionRequest, ConnectionState, FrontlinesChannel,
        FrontlinesNetworkingPlugin, NetworkConfig, NetworkError, NetworkOwner, NetworkResult,
        NetworkRole, NetworkSet, NetworkState, NetworkTransform, ObserverMirror, RemoteCharacter,
        Replicated, ReplicatedState, RoleTransition, SnapshotDisposition,
    };

    pub use super::protocol::{ActionEvent, ClientMessage, EntitySnapshot, InputAxes, ServerMessage};
    pub use super::transport::{LinkConditions, LoopbackHub, LoopbackTransport, Transport};

    #[cfg(feature = "server")]
    pub use super::server::{
        ClientJoined, ClientLeft, InputIntake, ServerEvent, ServerHost, ServerNetworkPlugin,
        ServerSession,
    };

    #[cfg(feature = "client")]
    pub use super::client::{
        ClientEvent, ClientHost, ClientNetworkPlugin, ClientSession, InputForwarder, LocalInput,
        RemoteEntities,
    };
}

#[cfg(all(test, feature = "server", feature = "client"))]
mod tests {
    use super::prelude::*;
    use bevy::prelude::*;
    use frontlines_common::{InputSample, LocomotionState};

    const DT: f32 = 1.0 / 60.0;

    struct Rig {
        server: ServerSession,
        owner: ClientSession,
        observer: ClientSession,
        /// Server end of the observer link, for impairing server -> observer traffic
        to_observer: LoopbackTransport,
    }

    fn connect() -> Rig {
        let config = NetworkConfig::default();
        let mut server = ServerSession::new(config.clone());

        let (owner_client, owner_server) = LoopbackTransport::pair();
        let (observer_client, observer_server) = LoopbackTransport::pair();
        let to_observer = observer_server.clone();
        server.accept(Box::new(owner_server)).expect("accept owner");
        server.accept(Box::new(observer_server)).expect("accept observer");

        let mut owner = ClientSession::new(Box::new(owner_client), "owner", false, &config);
        let mut observer = ClientSession::new(Box::new(observer_client), "observer", true, &config);
        owner.join().expect("join");
        observer.join().expect("join");

        server.receive();
        server.drain_outbound();
        owner.receive();
        observer.receive();
        assert_eq!(owner.connection(), ConnectionState::Connected);
        assert_eq!(observer.connection(), ConnectionState::Connected);

        Rig {
            server,
            owner,
            observer,
            to_observer,
        }
    }

    fn snapshots(events: Vec<ClientEvent>) -> Vec<EntitySnapshot> {
        events
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::Snapshot(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_action_edges_survive_superseded_axes() {
        let mut rig = connect();
        let owner_id = rig.owner.client_id().expect("client id");

        // Crouch tapped on alternating ticks, dive on the first tick; all in one burst.
        for tick in 0..6 {
            let sample = InputSample {
                move_axes: Vec2::new(0.0, tick as f32 / 10.0),
                crouch: tick % 2 == 0,
                dive: tick == 0,
                ..default()
            };
            rig.owner.forward_input(&sample).expect("forward");
        }
        rig.server.receive();

        let mut crouches = 0;
        let mut dives = 0;
        let mut last_move = Vec2::ZERO;
        for _ in 0..6 {
            let input = rig.server.next_input(owner_id).expect("input");
            crouches += input.crouch_pressed as usize;
            dives += input.dive_pressed as usize;
            last_move = input.move_axes;
        }
        assert_eq!(crouches, 3);
        assert_eq!(dives, 1);
        // Only the newest axes survive.
        assert!((last_move.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_reordered_snapshots_keep_newest() {
        let mut rig = connect();
        let net_id = rig.owner.net_id().expect("net id");
        rig.to_observer.set_conditions(LinkConditions {
            reorder_unreliable: true,
            ..default()
        });

        rig.server.step(DT);
        rig.server.publish(
            net_id,
            NetworkTransform::new(Vec3::X, Quat::IDENTITY),
            LocomotionState::Walking,
        );
        rig.server.step(DT);
        rig.server.publish(
            net_id,
            NetworkTransform::new(Vec3::X * 2.0, Quat::IDENTITY),
            LocomotionState::Crouching,
        );
        rig.server.drain_outbound();

        let received = snapshots(rig.observer.receive());
        assert_eq!(received.len(), 2);
        assert!(received[0].timestamp > received[1].timestamp);

        let mut mirror = ObserverMirror::new(&NetworkConfig::default().replication, &received[0]);
        assert!(!mirror.receive(&received[1]).is_applied());
        assert_eq!(mirror.state(), LocomotionState::Crouching);
        assert_eq!(mirror.target().position, Vec3::X * 2.0);
    }

    #[test]
    fn test_snapshot_acknowledges_owner_input() {
        let mut rig = connect();
        let owner_id = rig.owner.client_id().expect("client id");
        let net_id = rig.owner.net_id().expect("net id");

        for _ in 0..5 {
            rig.owner
                .forward_input(&InputSample {
                    move_axes: Vec2::Y,
                    ..default()
                })
                .expect("forward");
        }
        assert_eq!(rig.owner.pending_inputs(), 5);

        rig.server.receive();
        rig.server.next_input(owner_id).expect("input");
        rig.server.step(DT);
        let snapshot = rig.server.publish(net_id, NetworkTransform::default(), LocomotionState::Walking);
        assert_eq!(snapshot.last_input_tick, 5);
        rig.server.drain_outbound();

        rig.owner.receive();
        assert_eq!(rig.owner.pending_inputs(), 0);
    }

    #[test]
    fn test_observer_mirror_holds_state_without_updates() {
        let mut rig = connect();
        let net_id = rig.owner.net_id().expect("net id");

        rig.server.step(DT);
        rig.server.publish(
            net_id,
            NetworkTransform::new(Vec3::new(3.0, 0.0, 1.0), Quat::IDENTITY),
            LocomotionState::Sprinting,
        );
        rig.server.drain_outbound();

        let received = snapshots(rig.observer.receive());
        let mut mirror = ObserverMirror::new(&NetworkConfig::default().replication, &received[0]);
        for _ in 0..60 {
            mirror.step(DT);
            assert!(rig.observer.receive().is_empty());
        }
        assert_eq!(mirror.state(), LocomotionState::Sprinting);
        assert_eq!(mirror.visual().position, Vec3::new(3.0, 0.0, 1.0));
    }

    const PORT: u16 = 7777;

    fn app() -> App {
        let mut app = App::new();
        app.init_resource::<Time>().add_plugins(FrontlinesNetworkingPlugin);
        app
    }

    fn tick(app: &mut App) {
        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(std::time::Duration::from_secs_f32(DT));
        app.world_mut().run_schedule(FixedUpdate);
    }

    fn request(app: &mut App, request: ConnectionRequest) {
        app.world_mut().write_message(request);
        tick(app);
    }

    fn count<F: bevy::ecs::query::QueryFilter>(app: &mut App) -> usize {
        let mut query = app.world_mut().query_filtered::<Entity, F>();
        query.iter(app.world()).count()
    }

    #[test]
    fn test_stop_server_ends_all_traffic() {
        let mut app = app();
        request(&mut app, ConnectionRequest::StartServer { port: PORT });
        assert!(app.world().contains_resource::<ServerHost>());
        app.world_mut().spawn((
            Replicated::new(1),
            ReplicatedState::default(),
            Transform::default(),
        ));

        let hub = app.world().resource::<LoopbackHub>().clone();
        let transport = hub.connect(PORT).expect("connect");
        let config = NetworkConfig::default();
        let mut watcher = ClientSession::new(Box::new(transport), "watcher", true, &config);
        watcher.join().expect("join");
        let mut before = Vec::new();
        for _ in 0..10 {
            tick(&mut app);
            before.extend(watcher.receive());
        }
        assert!(!snapshots(before).is_empty());

        request(&mut app, ConnectionRequest::StopServer);
        assert!(!app.world().contains_resource::<ServerHost>());
        assert_eq!(count::<With<Replicated>>(&mut app), 0);
        assert!(!hub.is_listening(PORT));

        let mut after = Vec::new();
        for _ in 0..10 {
            tick(&mut app);
            after.extend(watcher.receive());
        }
        assert_eq!(after, vec![ClientEvent::Disconnected]);
        assert_eq!(watcher.connection(), ConnectionState::Unconnected);
    }

    #[test]
    fn test_host_mode_roles_start_and_stop() {
        let mut app = app();
        request(&mut app, ConnectionRequest::StartServer { port: PORT });
        app.world_mut().spawn((
            Replicated::new(1),
            ReplicatedState::default(),
            Transform::default(),
        ));
        request(
            &mut app,
            ConnectionRequest::StartClient {
                port: PORT,
                observer: true,
            },
        );
        assert!(app.world().contains_resource::<ClientHost>());
        for _ in 0..10 {
            tick(&mut app);
        }
        let manager = app.world().resource::<ConnectionManager>();
        assert_eq!(manager.client_state(), ConnectionState::Connected);
        assert_eq!(manager.roles(), vec![NetworkRole::Server, NetworkRole::Observer]);
        assert_eq!(count::<With<RemoteCharacter>>(&mut app), 1);

        request(&mut app, ConnectionRequest::StopAll);
        assert!(!app.world().contains_resource::<ServerHost>());
        assert!(!app.world().contains_resource::<ClientHost>());
        assert_eq!(count::<With<Replicated>>(&mut app), 0);
        assert_eq!(count::<With<RemoteCharacter>>(&mut app), 0);
        assert!(app.world().resource::<RemoteEntities>().0.is_empty());
        assert_eq!(app.world().resource::<ConnectionManager>().status(), "Disconnected");
    }

    #[test]
    fn test_server_stop_disconnects_remote_client() {
        let mut server_app = app();
        request(&mut server_app, ConnectionRequest::StartServer { port: PORT });

        // A second app in the same process reaches the server through a shared hub.
        let mut client_app = app();
        let hub = server_app.world().resource::<LoopbackHub>().clone();
        client_app.insert_resource(hub);
        request(
            &mut client_app,
            ConnectionRequest::StartClient {
                port: PORT,
                observer: false,
            },
        );
        for _ in 0..3 {
            tick(&mut server_app);
            tick(&mut client_app);
        }
        assert_eq!(
            client_app.world().resource::<ConnectionManager>().client_state(),
            ConnectionState::Connected
        );

        request(&mut server_app, ConnectionRequest::StopServer);
        for _ in 0..3 {
            tick(&mut client_app);
        }
        assert!(!client_app.world().contains_resource::<ClientHost>());
        assert!(client_app.world().resource::<ConnectionManager>().can_start_client());
    }

    #[test]
    fn test_client_without_server_is_refused() {
        let mut app = app();
        request(
            &mut app,
            ConnectionRequest::StartClient {
                port: PORT,
                observer: false,
            },
        );
        assert!(!app.world().contains_resource::<ClientHost>());
        assert_eq!(
            app.world().resource::<ConnectionManager>().client_state(),
            ConnectionState::Unconnected
        );
    }

    #[test]
    fn test_redundant_start_keeps_session() {
        let mut app = app();
        request(&mut app, ConnectionRequest::StartServer { port: PORT });
        let session = app.world().resource::<ServerHost>().session.session_id();
        request(&mut app, ConnectionRequest::StartServer { port: 9000 });
        assert_eq!(app.world().resource::<ServerHost>().session.session_id(), session);
        assert_eq!(app.world().resource::<ConnectionManager>().server_port(), PORT);
    }
}

//! # Client Session
//!
//! Client-side networking for Frontlines.
//!
//! ## Responsibilities
//!
//! - Join the server as an input owner or an observer
//! - Forward owner input: axes every tick, action edges as discrete events
//! - Mirror every replicated character from server snapshots
//!
//! Clients never simulate locomotion. Even the owner renders its own
//! character from snapshots.

use bevy::prelude::*;
use frontlines_common::{ActionEdge, InputSample, InputTracker};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use crate::config::NetworkConfig;
use crate::connection::{ConnectionManager, ConnectionRequest, ConnectionState};
use crate::error::{NetworkError, NetworkResult};
use crate::protocol::*;
use crate::replication::{ObserverMirror, RemoteCharacter, ReplicatedState};
use crate::transport::{LoopbackHub, Transport};
use crate::NetworkSet;

// ============================================================================
// Input Buffer
// ============================================================================

/// Input sent but not yet folded into a server snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedInput {
    pub tick: u64,
    pub sample: InputSample,
}

#[derive(Debug, Clone, Default)]
pub struct InputBuffer {
    /// Buffered inputs (oldest first)
    buffer: VecDeque<BufferedInput>,
    max_size: usize,
}

impl InputBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, input: BufferedInput) {
        if self.buffer.len() >= self.max_size {
            self.buffer.pop_front();
        }
        self.buffer.push_back(input);
    }

    /// Remove inputs up to and including tick.
    pub fn acknowledge(&mut self, tick: u64) {
        while let Some(front) = self.buffer.front() {
            if front.tick <= tick {
                self.buffer.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn inputs_after(&self, tick: u64) -> impl Iterator<Item = &BufferedInput> {
        self.buffer.iter().filter(move |i| i.tick > tick)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

// ============================================================================
// Input Forwarder
// ============================================================================

/// Turns per-tick input samples into outbound messages.
///
/// Sprint and aim send both edges so the server can track the held state;
/// toggles and one-shots send presses only.
#[derive(Debug, Clone)]
pub struct InputForwarder {
    tracker: InputTracker,
    next_seq: u64,
    buffer: InputBuffer,
}

impl InputForwarder {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            tracker: InputTracker::new(),
            next_seq: 0,
            buffer: InputBuffer::new(buffer_size),
        }
    }

    /// Messages for one owner tick: action edges first, then the axes.
    pub fn forward(&mut self, tick: u64, sample: &InputSample) -> Vec<ClientMessage> {
        let mut messages = Vec::new();

        for (action, edge) in self.tracker.edges(sample) {
            if edge == ActionEdge::Released && !action.is_held_action() {
                continue;
            }
            messages.push(ClientMessage::Action(ActionEvent {
                seq: self.next_seq,
                tick,
                action,
                edge,
            }));
            self.next_seq += 1;
        }
        self.tracker.commit(sample);

        messages.push(ClientMessage::Axes(InputAxes {
            tick,
            move_axes: sample.clamped_move(),
            look_axes: sample.look_axes,
        }));
        self.buffer.push(BufferedInput {
            tick,
            sample: *sample,
        });
        messages
    }

    pub fn acknowledge(&mut self, tick: u64) {
        self.buffer.acknowledge(tick);
    }

    pub fn buffer(&self) -> &InputBuffer {
        &self.buffer
    }
}

// ============================================================================
// Client Session
// ============================================================================

/// Something the driver loop has to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Welcomed {
        client_id: u64,
        net_id: Option<u64>,
    },
    Snapshot(EntitySnapshot),
    Despawned {
        net_id: u64,
    },
    Rejected {
        code: u16,
        reason: String,
    },
    /// The server closed the connection.
    Disconnected,
}

pub struct ClientSession {
    name: String,
    observer: bool,
    transport: Box<dyn Transport>,
    connection: ConnectionState,
    client_id: Option<u64>,
    net_id: Option<u64>,
    session: Option<Uuid>,
    tick: u64,
    forwarder: InputForwarder,
}

impl ClientSession {
    pub fn new(
        transport: Box<dyn Transport>,
        name: impl Into<String>,
        observer: bool,
        config: &NetworkConfig,
    ) -> Self {
        Self {
            name: name.into(),
            observer,
            transport,
            connection: ConnectionState::Unconnected,
            client_id: None,
            net_id: None,
            session: None,
            tick: 0,
            forwarder: InputForwarder::new(config.transport.input_buffer_size),
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_observer(&self) -> bool {
        self.observer
    }

    pub fn client_id(&self) -> Option<u64> {
        self.client_id
    }

    /// Character this client owns.
    pub fn net_id(&self) -> Option<u64> {
        self.net_id
    }

    pub fn session(&self) -> Option<Uuid> {
        self.session
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Inputs sent but not yet acknowledged by a snapshot.
    pub fn pending_inputs(&self) -> usize {
        self.forwarder.buffer().len()
    }

    fn send(&self, message: &ClientMessage) -> NetworkResult<()> {
        let bytes = encode(message)?;
        self.transport.send(message.channel(), bytes)
    }

    /// Send the join request. Repeated calls while joining are ignored.
    pub fn join(&mut self) -> NetworkResult<()> {
        if self.connection != ConnectionState::Unconnected {
            warn!("Join ignored: already {:?}", self.connection);
            return Ok(());
        }
        self.send(&ClientMessage::Join {
            version: PROTOCOL_VERSION,
            name: self.name.clone(),
            observer: self.observer,
        })?;
        self.connection = ConnectionState::Connecting;
        Ok(())
    }

    /// Forward one tick of owner input.
    pub fn forward_input(&mut self, sample: &InputSample) -> NetworkResult<()> {
        if self.observer {
            return Err(NetworkError::NotOwner {
                client_id: self.client_id.unwrap_or(0),
            });
        }
        if self.connection != ConnectionState::Connected {
            return Err(NetworkError::NotConnected);
        }

        self.tick += 1;
        for message in self.forwarder.forward(self.tick, sample) {
            self.send(&message)?;
        }
        Ok(())
    }

    /// Drain and decode server messages.
    pub fn receive(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();

        for packet in self.transport.receive() {
            let message: ServerMessage = match decode(&packet.bytes) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Dropping undecodable packet from server: {}", e);
                    continue;
                }
            };

            match message {
                ServerMessage::Welcome {
                    client_id,
                    net_id,
                    session,
                    tick_rate,
                } => {
                    self.client_id = Some(client_id);
                    self.net_id = net_id;
                    self.session = Some(session);
                    self.connection = ConnectionState::Connected;
                    info!(
                        "Joined session {} as client {} ({} Hz)",
                        session, client_id, tick_rate
                    );
                    events.push(ClientEvent::Welcomed { client_id, net_id });
                }
                ServerMessage::Snapshot(snapshot) => {
                    if self.net_id == Some(snapshot.net_id) {
                        self.forwarder.acknowledge(snapshot.last_input_tick);
                    }
                    events.push(ClientEvent::Snapshot(snapshot));
                }
                ServerMessage::Despawn { net_id } => {
                    events.push(ClientEvent::Despawned { net_id });
                }
                ServerMessage::Rejected { code, reason } => {
                    error!("Server rejected us ({}): {}", code, reason);
                    self.connection = ConnectionState::Unconnected;
                    events.push(ClientEvent::Rejected { code, reason });
                }
            }
        }

        if self.connection != ConnectionState::Unconnected && !self.transport.is_open() {
            info!("Server closed the connection");
            self.connection = ConnectionState::Unconnected;
            self.client_id = None;
            self.net_id = None;
            events.push(ClientEvent::Disconnected);
        }
        events
    }

    /// Tell the server we are leaving. Tolerated when not connected.
    pub fn leave(&mut self) -> NetworkResult<()> {
        if self.connection == ConnectionState::Unconnected {
            return Ok(());
        }
        self.send(&ClientMessage::Leave)?;
        self.connection = ConnectionState::Unconnected;
        self.client_id = None;
        self.net_id = None;
        Ok(())
    }
}

// ============================================================================
// Bevy Integration
// ============================================================================

/// The running client session.
#[derive(Resource)]
pub struct ClientHost {
    pub session: ClientSession,
}

/// Input sample for this tick, filled by the presentation layer.
#[derive(Resource, Debug, Clone, Default)]
pub struct LocalInput(pub InputSample);

/// Net id to mirrored entity.
#[derive(Resource, Debug, Default)]
pub struct RemoteEntities(pub HashMap<u64, Entity>);

/// Connect to `port` through the loopback hub and send the join.
pub(crate) fn open_client(world: &mut World, port: u16, observer: bool) {
    let config = world.get_resource::<NetworkConfig>().cloned().unwrap_or_default();
    let hub = LoopbackHub::clone(&world.get_resource_or_init::<LoopbackHub>());
    let name = if observer { "observer" } else { "player" };

    let joined = hub.connect(port).and_then(|transport| {
        let mut session = ClientSession::new(Box::new(transport), name, observer, &config);
        session.join()?;
        Ok(session)
    });
    match joined {
        Ok(session) => {
            info!("Client joining port {} as {}", port, name);
            world.insert_resource(ClientHost { session });
        }
        Err(e) => {
            error!("Client failed to connect to port {}: {}", port, e);
            if let Some(mut manager) = world.get_resource_mut::<ConnectionManager>() {
                manager.stop_client();
            }
        }
    }
}

/// Leave the server and despawn every mirrored character.
pub(crate) fn close_client(world: &mut World) {
    if let Some(mut host) = world.remove_resource::<ClientHost>() {
        if let Err(e) = host.session.leave() {
            debug!("Leave not delivered: {}", e);
        }
    }

    let mut remote = world.query_filtered::<Entity, With<RemoteCharacter>>();
    let mirrors: Vec<Entity> = remote.iter(world).collect();
    for entity in mirrors {
        world.despawn(entity);
    }
    if let Some(mut remotes) = world.get_resource_mut::<RemoteEntities>() {
        remotes.0.clear();
    }
}

/// Process server packets and keep mirrors in sync.
fn receive_server_messages(
    mut commands: Commands,
    mut host: ResMut<ClientHost>,
    config: Res<NetworkConfig>,
    mut remotes: ResMut<RemoteEntities>,
    mut mirrors: Query<&mut ObserverMirror>,
    mut manager: ResMut<ConnectionManager>,
    mut requests: MessageWriter<ConnectionRequest>,
) {
    // Characters first seen this batch; spawned once the batch is processed.
    let mut spawned: HashMap<u64, ObserverMirror> = HashMap::new();

    for event in host.session.receive() {
        match event {
            ClientEvent::Welcomed { .. } => {
                manager.mark_connected();
            }
            ClientEvent::Snapshot(snapshot) => {
                if let Some(&entity) = remotes.0.get(&snapshot.net_id) {
                    if let Ok(mut mirror) = mirrors.get_mut(entity) {
                        mirror.receive(&snapshot);
                    }
                } else if let Some(mirror) = spawned.get_mut(&snapshot.net_id) {
                    mirror.receive(&snapshot);
                } else {
                    spawned.insert(
                        snapshot.net_id,
                        ObserverMirror::new(&config.replication, &snapshot),
                    );
                }
            }
            ClientEvent::Despawned { net_id } => {
                spawned.remove(&net_id);
                if let Some(entity) = remotes.0.remove(&net_id) {
                    commands.entity(entity).despawn();
                }
            }
            ClientEvent::Rejected { .. } | ClientEvent::Disconnected => {
                requests.write(ConnectionRequest::StopClient);
            }
        }
    }

    let own_net_id = host.session.net_id();
    for (net_id, mirror) in spawned {
        let transform = mirror.visual().to_transform();
        let state = ReplicatedState(mirror.state());
        let entity = commands
            .spawn((
                RemoteCharacter {
                    net_id,
                    owned: own_net_id == Some(net_id),
                },
                mirror,
                state,
                transform,
            ))
            .id();
        remotes.0.insert(net_id, entity);
    }
}

/// Send this tick's local input.
fn forward_local_input(mut host: ResMut<ClientHost>, input: Res<LocalInput>) {
    if host.session.is_observer() || host.session.connection() != ConnectionState::Connected {
        return;
    }
    if let Err(e) = host.session.forward_input(&input.0) {
        warn!("Failed to forward input: {}", e);
    }
}

/// Move mirrored characters toward their latest snapshot.
pub fn interpolate_remote_characters(
    time: Res<Time>,
    mut query: Query<(&mut ObserverMirror, &mut Transform, &mut ReplicatedState)>,
) {
    let dt = time.delta_secs();
    for (mut mirror, mut transform, mut state) in query.iter_mut() {
        let visual = mirror.step(dt);
        transform.translation = visual.position;
        transform.rotation = visual.rotation;
        if state.0 != mirror.state() {
            state.0 = mirror.state();
        }
    }
}

/// Client networking plugin.
pub struct ClientNetworkPlugin;

impl Plugin for ClientNetworkPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LocalInput>()
            .init_resource::<RemoteEntities>()
            .register_type::<RemoteCharacter>()
            .add_systems(
                FixedUpdate,
                (
                    receive_server_messages.in_set(NetworkSet::Receive),
                    interpolate_remote_characters.in_set(NetworkSet::Publish),
                    forward_local_input.in_set(NetworkSet::Flush),
                )
                    .run_if(resource_exists::<ClientHost>),
            );

        info!("Client network plugin initialized");
    }
}

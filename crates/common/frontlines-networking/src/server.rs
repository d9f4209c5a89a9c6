//! # Server Session
//!
//! The authoritative side of the replication layer.
//!
//! ## Responsibilities
//!
//! - Accept client transports and answer joins
//! - Queue owner input per client ([`InputIntake`]) and hand out one
//!   [`TickInput`] per fixed tick
//! - Broadcast snapshots at the configured rate through an explicit
//!   outbound queue
//!
//! ## Input ordering
//!
//! Axes arrive every tick on the unreliable channel; only the newest tick is
//! kept. Action edges arrive on the reliable channel and are queued. Each tick
//! drains queued actions in order until an action kind repeats, so a press and
//! release of the same button in one owner tick land on consecutive server
//! ticks instead of cancelling out. Nothing is ever dropped.

use bevy::prelude::*;
use frontlines_common::{ActionSet, CharacterInput, LocomotionState, TickInput};
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

use crate::config::{NetworkConfig, NetworkState};
use crate::connection::{ConnectionManager, NetworkRole};
use crate::error::{NetworkError, NetworkResult};
use crate::ownership::NetworkOwner;
use crate::protocol::*;
use crate::replication::{Replicated, ReplicatedState};
use crate::transport::{BandwidthTracker, LoopbackHub, Transport};
use crate::NetworkSet;

// ============================================================================
// Input Intake
// ============================================================================

/// Per-owner input queue on the server.
#[derive(Debug, Clone, Default)]
pub struct InputIntake {
    axes: Option<InputAxes>,
    axes_fresh: bool,
    actions: VecDeque<ActionEvent>,
    last_seq: Option<u64>,
    sprint_held: bool,
    aim_held: bool,
    last_input_tick: u64,
}

impl InputIntake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `axes` if it is newer than the held sample. Returns whether it was kept.
    pub fn push_axes(&mut self, axes: InputAxes) -> bool {
        if let Some(held) = &self.axes {
            if axes.tick <= held.tick {
                return false;
            }
        }
        self.axes = Some(axes);
        self.axes_fresh = true;
        true
    }

    /// Queue an action edge. Returns false for a duplicate sequence number.
    pub fn push_action(&mut self, event: ActionEvent) -> bool {
        if self.last_seq.is_some_and(|last| event.seq <= last) {
            return false;
        }
        self.last_seq = Some(event.seq);
        self.actions.push_back(event);
        true
    }

    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    /// Highest owner tick folded into a [`TickInput`] so far.
    pub fn last_input_tick(&self) -> u64 {
        self.last_input_tick
    }

    /// Build this tick's input.
    ///
    /// Move axes persist until superseded; look deltas apply once.
    pub fn next_input(&mut self) -> TickInput {
        let mut input = TickInput {
            sprint_held: self.sprint_held,
            aim_held: self.aim_held,
            ..default()
        };

        if let Some(axes) = self.axes {
            input.move_axes = axes.move_axes.clamp_length_max(1.0);
            if self.axes_fresh {
                input.look_axes = axes.look_axes;
            }
            self.last_input_tick = self.last_input_tick.max(axes.tick);
        }
        self.axes_fresh = false;

        let mut applied = ActionSet::default();
        while let Some(event) = self.actions.front() {
            if applied.contains(event.action) {
                break;
            }
            let event = *event;
            self.actions.pop_front();
            applied.insert(event.action);
            input.apply_edge(event.action, event.edge);
            self.last_input_tick = self.last_input_tick.max(event.tick);
        }

        self.sprint_held = input.sprint_held;
        self.aim_held = input.aim_held;
        input
    }
}

// ============================================================================
// Server Session
// ============================================================================

/// Connected client info.
struct ClientSlot {
    name: String,
    /// `None` until the join is accepted
    role: Option<NetworkRole>,
    net_id: Option<u64>,
    transport: Box<dyn Transport>,
    intake: InputIntake,
    closing: bool,
}

/// Something the driver loop has to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Joined {
        client_id: u64,
        name: String,
        /// Character to spawn, `None` for observers
        net_id: Option<u64>,
    },
    Left {
        client_id: u64,
        net_id: Option<u64>,
    },
    Rejected {
        client_id: u64,
        error: NetworkError,
    },
}

pub struct ServerSession {
    config: NetworkConfig,
    session_id: Uuid,
    tick: u64,
    clock: f64,
    snapshot_accumulator: f32,
    clients: BTreeMap<u64, ClientSlot>,
    next_client_id: u64,
    next_net_id: u64,
    outbound: Vec<(u64, ServerMessage)>,
    bandwidth: BandwidthTracker,
}

impl ServerSession {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4(),
            tick: 0,
            clock: 0.0,
            snapshot_accumulator: 0.0,
            clients: BTreeMap::new(),
            // 0 is the server itself
            next_client_id: 1,
            next_net_id: 1,
            outbound: Vec::new(),
            bandwidth: BandwidthTracker::default(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Server clock in seconds, advanced by [`Self::step`].
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn bandwidth(&self) -> &BandwidthTracker {
        &self.bandwidth
    }

    pub fn bandwidth_mut(&mut self) -> &mut BandwidthTracker {
        &mut self.bandwidth
    }

    /// Joined clients as `(client_id, role, net_id)`.
    pub fn clients(&self) -> Vec<(u64, NetworkRole, Option<u64>)> {
        self.clients
            .iter()
            .filter_map(|(&id, slot)| slot.role.map(|role| (id, role, slot.net_id)))
            .collect()
    }

    /// Take ownership of a new connection. The client still has to join.
    pub fn accept(&mut self, transport: Box<dyn Transport>) -> NetworkResult<u64> {
        let max = self.config.transport.max_connections;
        if self.clients.len() >= max {
            let error = NetworkError::MaxConnectionsReached(max);
            let rejected = ServerMessage::Rejected {
                code: error.code(),
                reason: error.to_string(),
            };
            if let Ok(bytes) = encode(&rejected) {
                let _ = transport.send(rejected.channel(), bytes);
            }
            transport.close();
            warn!("Rejected connection: {}", error);
            return Err(error);
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;
        self.clients.insert(
            client_id,
            ClientSlot {
                name: String::new(),
                role: None,
                net_id: None,
                transport,
                intake: InputIntake::new(),
                closing: false,
            },
        );
        debug!("Accepted connection as client {}", client_id);
        Ok(client_id)
    }

    /// Drain every client transport and process what arrived.
    pub fn receive(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        let mut despawned = Vec::new();
        let tick_rate = self.config.tick.tick_rate;

        for (&client_id, slot) in self.clients.iter_mut() {
            if slot.closing {
                continue;
            }

            for packet in slot.transport.receive() {
                self.bandwidth.record_recv(packet.bytes.len() as u64);
                let message: ClientMessage = match decode(&packet.bytes) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Dropping undecodable packet from client {}: {}", client_id, e);
                        continue;
                    }
                };

                match message {
                    ClientMessage::Join {
                        version,
                        name,
                        observer,
                    } => {
                        if slot.role.is_some() {
                            warn!("Client {} joined twice", client_id);
                            continue;
                        }
                        if version != PROTOCOL_VERSION {
                            let error = NetworkError::VersionMismatch {
                                client: version,
                                server: PROTOCOL_VERSION,
                            };
                            self.outbound.push((
                                client_id,
                                ServerMessage::Rejected {
                                    code: error.code(),
                                    reason: error.to_string(),
                                },
                            ));
                            slot.closing = true;
                            events.push(ServerEvent::Rejected { client_id, error });
                            break;
                        }

                        let net_id = if observer {
                            None
                        } else {
                            let id = self.next_net_id;
                            self.next_net_id += 1;
                            Some(id)
                        };
                        slot.role = Some(if observer {
                            NetworkRole::Observer
                        } else {
                            NetworkRole::Client
                        });
                        slot.net_id = net_id;
                        slot.name = name.clone();

                        self.outbound.push((
                            client_id,
                            ServerMessage::Welcome {
                                client_id,
                                net_id,
                                session: self.session_id,
                                tick_rate,
                            },
                        ));
                        info!("Client {} '{}' joined as {:?}", client_id, name, slot.role);
                        events.push(ServerEvent::Joined {
                            client_id,
                            name,
                            net_id,
                        });
                    }
                    ClientMessage::Axes(axes) => {
                        if slot.role == Some(NetworkRole::Client) {
                            slot.intake.push_axes(axes);
                        }
                    }
                    ClientMessage::Action(event) => {
                        if slot.role != Some(NetworkRole::Client) {
                            debug!("Ignoring action from non-owner client {}", client_id);
                        } else if !slot.intake.push_action(event) {
                            debug!("Duplicate action seq {} from client {}", event.seq, client_id);
                        }
                    }
                    ClientMessage::Leave => {
                        slot.closing = true;
                        break;
                    }
                }
            }

            if !slot.closing && !slot.transport.is_open() {
                slot.closing = true;
            }
            if slot.closing && slot.role.is_some() {
                info!("Client {} left", client_id);
                events.push(ServerEvent::Left {
                    client_id,
                    net_id: slot.net_id,
                });
                if let Some(net_id) = slot.net_id {
                    despawned.push(net_id);
                }
                // Reported once.
                slot.role = None;
            }
        }

        for net_id in despawned {
            self.broadcast(ServerMessage::Despawn { net_id });
        }
        events
    }

    /// Input for the character owned by `client_id` this tick.
    pub fn next_input(&mut self, client_id: u64) -> NetworkResult<TickInput> {
        let slot = self
            .clients
            .get_mut(&client_id)
            .ok_or(NetworkError::UnknownClient(client_id))?;
        if slot.role != Some(NetworkRole::Client) {
            return Err(NetworkError::NotOwner { client_id });
        }
        Ok(slot.intake.next_input())
    }

    /// Advance the server clock by one tick. Returns whether a snapshot is due.
    pub fn step(&mut self, dt: f32) -> bool {
        self.tick += 1;
        self.clock += dt as f64;
        self.snapshot_accumulator += dt;

        let interval = self.config.replication.snapshot_interval();
        if self.snapshot_accumulator + 1e-6 >= interval {
            self.snapshot_accumulator -= interval;
            true
        } else {
            false
        }
    }

    /// Queue a snapshot of one character for every joined client.
    pub fn publish(
        &mut self,
        net_id: u64,
        transform: NetworkTransform,
        state: LocomotionState,
    ) -> EntitySnapshot {
        let last_input_tick = self
            .clients
            .values()
            .find(|slot| slot.net_id == Some(net_id))
            .map(|slot| slot.intake.last_input_tick())
            .unwrap_or(0);

        let snapshot = EntitySnapshot {
            net_id,
            transform,
            state,
            timestamp: self.clock,
            server_tick: self.tick,
            last_input_tick,
        };
        self.broadcast(ServerMessage::Snapshot(snapshot));
        snapshot
    }

    fn broadcast(&mut self, message: ServerMessage) {
        for (&client_id, slot) in &self.clients {
            if slot.role.is_some() && !slot.closing {
                self.outbound.push((client_id, message.clone()));
            }
        }
    }

    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }

    /// Encode and send the outbound queue, then drop closed clients.
    ///
    /// A message that fails to encode or send is logged and skipped; the rest
    /// of the queue still goes out. Returns the number of packets sent.
    pub fn drain_outbound(&mut self) -> usize {
        let mut sent = 0;
        for (client_id, message) in std::mem::take(&mut self.outbound) {
            let Some(slot) = self.clients.get_mut(&client_id) else {
                continue;
            };
            let bytes = match encode(&message) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to encode message for client {}: {}", client_id, e);
                    continue;
                }
            };
            let len = bytes.len() as u64;
            match slot.transport.send(message.channel(), bytes) {
                Ok(()) => {
                    sent += 1;
                    self.bandwidth.record_sent(len);
                }
                Err(e) => {
                    warn!("Send to client {} failed: {}", client_id, e);
                    if e.should_disconnect() {
                        slot.closing = true;
                    }
                }
            }
        }

        self.clients.retain(|_, slot| {
            if slot.closing {
                slot.transport.close();
            }
            !slot.closing
        });
        sent
    }

    /// Close every connection and forget queued traffic.
    ///
    /// Returns the joined clients that were dropped.
    pub fn shutdown(&mut self) -> Vec<ServerEvent> {
        self.outbound.clear();
        let mut events = Vec::new();
        for (client_id, slot) in std::mem::take(&mut self.clients) {
            slot.transport.close();
            if slot.role.is_some() {
                events.push(ServerEvent::Left {
                    client_id,
                    net_id: slot.net_id,
                });
            }
        }
        events
    }
}

// ============================================================================
// Bevy Integration
// ============================================================================

/// The running server session.
#[derive(Resource)]
pub struct ServerHost {
    pub session: ServerSession,
}

/// A client joined; spawn its character when `net_id` is set.
#[derive(Message, Debug, Clone, PartialEq)]
pub struct ClientJoined {
    pub client_id: u64,
    pub name: String,
    pub net_id: Option<u64>,
}

/// A client left; despawn its character when `net_id` is set.
#[derive(Message, Debug, Clone, PartialEq)]
pub struct ClientLeft {
    pub client_id: u64,
    pub net_id: Option<u64>,
}

/// Start serving on `port`: build the session and listen on the loopback hub.
pub(crate) fn open_server(world: &mut World, port: u16) {
    let config = world.get_resource::<NetworkConfig>().cloned().unwrap_or_default();
    let session = ServerSession::new(config);
    world.get_resource_or_init::<LoopbackHub>().listen(port);
    info!("Server session {} listening on port {}", session.session_id(), port);
    world.insert_resource(ServerHost { session });
}

/// Stop serving: close every client and despawn replicated characters.
pub(crate) fn close_server(world: &mut World, port: u16) {
    if let Some(hub) = world.get_resource::<LoopbackHub>() {
        hub.unlisten(port);
    }
    if let Some(mut host) = world.remove_resource::<ServerHost>() {
        let dropped = host.session.shutdown();
        info!("Server session {} closed, {} clients dropped", host.session.session_id(), dropped.len());
    }

    let mut replicated = world.query_filtered::<Entity, With<Replicated>>();
    let characters: Vec<Entity> = replicated.iter(world).collect();
    for entity in characters {
        world.despawn(entity);
    }
    if let Some(mut state) = world.get_resource_mut::<NetworkState>() {
        state.client_count = 0;
    }
}

/// Accept connections made to the listening port since the last tick.
fn accept_connections(
    mut host: ResMut<ServerHost>,
    hub: Res<LoopbackHub>,
    manager: Res<ConnectionManager>,
) {
    if !manager.is_server() {
        return;
    }
    for transport in hub.take_pending(manager.server_port()) {
        if let Ok(client_id) = host.session.accept(Box::new(transport)) {
            debug!("Loopback connection accepted as client {}", client_id);
        }
    }
}

/// Process incoming client packets.
fn receive_client_messages(
    mut host: ResMut<ServerHost>,
    mut joined: MessageWriter<ClientJoined>,
    mut left: MessageWriter<ClientLeft>,
    mut state: ResMut<NetworkState>,
) {
    for event in host.session.receive() {
        match event {
            ServerEvent::Joined {
                client_id,
                name,
                net_id,
            } => {
                joined.write(ClientJoined {
                    client_id,
                    name,
                    net_id,
                });
            }
            ServerEvent::Left { client_id, net_id } => {
                left.write(ClientLeft { client_id, net_id });
            }
            ServerEvent::Rejected { client_id, error } => {
                warn!("Rejected client {}: {}", client_id, error);
            }
        }
    }
    state.client_count = host.session.client_count();
}

/// Hand each owned character this tick's input.
fn deliver_inputs(
    mut host: ResMut<ServerHost>,
    mut query: Query<(&NetworkOwner, &mut CharacterInput)>,
) {
    for (owner, mut input) in query.iter_mut() {
        if owner.is_server_owned() {
            continue;
        }
        match host.session.next_input(owner.client_id) {
            Ok(tick_input) => input.pending = tick_input,
            Err(e) => debug!("No input for client {}: {}", owner.client_id, e),
        }
    }
}

/// Advance the server clock and queue snapshots when due.
fn publish_snapshots(
    mut host: ResMut<ServerHost>,
    time: Res<Time>,
    query: Query<(&Replicated, &Transform, &ReplicatedState)>,
    mut state: ResMut<NetworkState>,
) {
    let due = host.session.step(time.delta_secs());
    state.tick = host.session.tick();
    if !due {
        return;
    }

    for (replicated, transform, replicated_state) in query.iter() {
        host.session.publish(
            replicated.net_id,
            NetworkTransform::from_transform(transform),
            replicated_state.0,
        );
        state.snapshots_sent += 1;
    }
}

/// Send everything queued this tick.
fn flush_outbound(mut host: ResMut<ServerHost>, time: Res<Time>, mut state: ResMut<NetworkState>) {
    host.session.drain_outbound();
    let bandwidth = host.session.bandwidth_mut();
    bandwidth.update(time.delta_secs_f64());
    state.bytes_sent = bandwidth.bytes_per_sec_sent as u64;
    state.bytes_received = bandwidth.bytes_per_sec_recv as u64;
}

/// Server networking plugin.
pub struct ServerNetworkPlugin;

impl Plugin for ServerNetworkPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LoopbackHub>()
            .add_message::<ClientJoined>()
            .add_message::<ClientLeft>()
            .add_systems(
                FixedUpdate,
                (
                    (accept_connections, receive_client_messages, deliver_inputs)
                        .chain()
                        .in_set(NetworkSet::Receive),
                    publish_snapshots.in_set(NetworkSet::Publish),
                    flush_outbound.in_set(NetworkSet::Flush),
                )
                    .run_if(resource_exists::<ServerHost>),
            );

        info!("Server network plugin initialized");
    }
}

//! # Loopback Demo
//!
//! Drives one owner client and one observer client over in-memory transports
//! against the real server plugins, so a headless run exercises the whole
//! pipeline: input forwarding, authoritative simulation, snapshot broadcast,
//! and observer interpolation.
//!
//! The owner follows a fixed input script; the observer logs every state it
//! mirrors.

use std::collections::HashMap;

use bevy::prelude::*;
use frontlines_common::{InputSample, LocomotionState};
use frontlines_networking::prelude::*;

/// Owner and observer sessions plus the observer's mirrors.
#[derive(Resource)]
pub struct DemoClients {
    owner: ClientSession,
    observer: ClientSession,
    mirrors: HashMap<u64, ObserverMirror>,
    mirrored_state: Option<LocomotionState>,
    tick: u64,
    length: u64,
}

impl DemoClients {
    /// Connect both clients to the server listening on `port`.
    pub fn connect(
        hub: &LoopbackHub,
        port: u16,
        config: &NetworkConfig,
        length: u64,
    ) -> NetworkResult<Self> {
        let owner_end = hub.connect(port)?;
        let observer_end = hub.connect(port)?;

        let mut owner = ClientSession::new(Box::new(owner_end), "demo-owner", false, config);
        let mut observer = ClientSession::new(Box::new(observer_end), "demo-observer", true, config);
        owner.join()?;
        observer.join()?;

        Ok(Self {
            owner,
            observer,
            mirrors: HashMap::new(),
            mirrored_state: None,
            tick: 0,
            length,
        })
    }
}

/// Scripted owner input for a tick at 60 Hz.
pub fn scripted_sample(tick: u64) -> InputSample {
    let forward = Vec2::Y;
    match tick {
        0..=59 => InputSample {
            move_axes: forward,
            ..default()
        },
        60..=179 => InputSample {
            move_axes: forward,
            sprint: true,
            ..default()
        },
        // Tap crouch, then tap again to stand.
        180..=181 | 240..=241 => InputSample {
            crouch: true,
            ..default()
        },
        300..=301 => InputSample {
            move_axes: forward * 0.5,
            dive: true,
            ..default()
        },
        // Prone after the dive; prone rises to a crouch, crouch stands.
        360..=361 => InputSample {
            prone: true,
            ..default()
        },
        390..=391 => InputSample {
            crouch: true,
            ..default()
        },
        420..=479 => InputSample {
            look_axes: Vec2::new(0.5, 0.0),
            aim: true,
            ..default()
        },
        540..=541 => InputSample {
            move_axes: forward,
            jump: true,
            ..default()
        },
        _ => InputSample::default(),
    }
}

/// Pump both demo clients for one fixed tick.
pub fn drive_demo_clients(
    mut demo: ResMut<DemoClients>,
    config: Res<NetworkConfig>,
    time: Res<Time>,
    mut exit: MessageWriter<AppExit>,
) {
    let demo = &mut *demo;
    let dt = time.delta_secs();

    for event in demo.owner.receive() {
        if let ClientEvent::Rejected { code, reason } = event {
            error!("Demo owner rejected ({}): {}", code, reason);
            exit.write(AppExit::error());
            return;
        }
    }

    if demo.owner.connection() == ConnectionState::Connected {
        let sample = scripted_sample(demo.tick);
        if let Err(e) = demo.owner.forward_input(&sample) {
            warn!("Demo owner failed to forward input: {}", e);
        }
        demo.tick += 1;
    }

    for event in demo.observer.receive() {
        match event {
            ClientEvent::Snapshot(snapshot) => match demo.mirrors.get_mut(&snapshot.net_id) {
                Some(mirror) => {
                    mirror.receive(&snapshot);
                }
                None => {
                    demo.mirrors
                        .insert(snapshot.net_id, ObserverMirror::new(&config.replication, &snapshot));
                }
            },
            ClientEvent::Despawned { net_id } => {
                demo.mirrors.remove(&net_id);
            }
            _ => {}
        }
    }

    let watched = demo.owner.net_id();
    for (&net_id, mirror) in demo.mirrors.iter_mut() {
        let visual = mirror.step(dt);
        if Some(net_id) == watched && demo.mirrored_state != Some(mirror.state()) {
            demo.mirrored_state = Some(mirror.state());
            info!(
                "Observer sees character {} {} at ({:.2}, {:.2}, {:.2}), server tick {}",
                net_id,
                mirror.state(),
                visual.position.x,
                visual.position.y,
                visual.position.z,
                mirror.server_tick()
            );
        }
    }

    if demo.tick >= demo.length {
        info!(
            "Demo finished after {} owner ticks, {} inputs awaiting acknowledgement",
            demo.tick,
            demo.owner.pending_inputs()
        );
        if let Err(e) = demo.owner.leave() {
            warn!("Demo owner failed to leave: {}", e);
        }
        if let Err(e) = demo.observer.leave() {
            warn!("Demo observer failed to leave: {}", e);
        }
        exit.write(AppExit::Success);
    }
}

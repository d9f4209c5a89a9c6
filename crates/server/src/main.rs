//! # Frontlines Dedicated Server
//!
//! Headless authoritative server. Runs the locomotion simulation for every
//! owned character at a fixed tick and broadcasts snapshots.
//!
//! ## Usage
//!
//! ```bash
//! # Start server with default settings
//! frontlines-server
//!
//! # Start with config file, overriding the tick rate
//! frontlines-server --config server.toml --tick-rate 30
//!
//! # Drive an owner and an observer over loopback for ten seconds
//! frontlines-server --demo --demo-ticks 600
//! ```
//!
//! ## Configuration (server.toml)
//!
//! ```toml
//! [network.tick]
//! tick_rate = 60
//!
//! [network.transport]
//! port = 7777
//! max_connections = 16
//!
//! [network.replication]
//! snapshot_rate = 20
//!
//! [world]
//! ground_height = 0.0
//! boxes = [[[-2.0, 0.0, -8.0], [2.0, 1.0, -7.0]]]
//!
//! [locomotion.movement]
//! walk_speed = 5.0
//! ```

mod config;
mod demo;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use frontlines_networking::connection::apply_request;
use frontlines_networking::prelude::*;
use frontlines_runtime::prelude::*;

use crate::config::ServerConfig;
use crate::demo::DemoClients;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "frontlines-server")]
#[command(about = "Frontlines Dedicated Server")]
#[command(version)]
pub struct Args {
    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum connected clients
    #[arg(short, long)]
    pub max_connections: Option<usize>,

    /// Simulation tick rate (Hz)
    #[arg(short, long)]
    pub tick_rate: Option<u32>,

    /// Snapshot broadcast rate (Hz)
    #[arg(long)]
    pub snapshot_rate: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Attach a scripted owner and an observer over loopback, then exit
    #[arg(long)]
    pub demo: bool,

    /// Owner ticks the demo runs for
    #[arg(long, default_value = "600")]
    pub demo_ticks: u64,
}

// ============================================================================
// Server State
// ============================================================================

#[derive(Resource, Debug)]
struct ServerState {
    start_time: Instant,
}

impl ServerState {
    fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Seconds between status lines.
const STATUS_INTERVAL_SECS: f32 = 60.0;

// ============================================================================
// Main
// ============================================================================

fn main() -> AppExit {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║              Frontlines Dedicated Server                   ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path).unwrap_or_else(|e| {
            warn!("{}, using defaults", e);
            ServerConfig::default()
        }),
        None => ServerConfig::default(),
    };
    config.merge_args(&args);

    let network = config.network.clone();
    let tick = network.tick.tick_duration();

    info!("Server configuration:");
    info!("  Port: {}", network.transport.port);
    info!("  Max connections: {}", network.transport.max_connections);
    info!("  Tick rate: {} Hz", network.tick.tick_rate);
    info!("  Snapshot rate: {} Hz", network.replication.snapshot_rate);

    let port = network.transport.port;
    let mut app = App::new();

    if args.demo {
        // One fixed tick per frame, as fast as possible.
        app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)))
            .insert_resource(TimeUpdateStrategy::ManualDuration(tick));
    } else {
        app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(tick)));
    }

    app.insert_resource(Time::<Fixed>::from_duration(tick))
        .insert_resource(ServerState {
            start_time: Instant::now(),
        })
        .insert_resource(network.clone())
        .insert_resource(config.locomotion.clone())
        .insert_resource(config.world.spawn_layout())
        .insert_resource(PhysicsWorld::new(config.world.build_world()))
        .add_plugins((FrontlinesNetworkingPlugin, FrontlinesRuntimePlugin))
        .add_systems(Update, log_server_status);

    info!("Server starting on port {}...", port);
    if apply_request(app.world_mut(), ConnectionRequest::StartServer { port })
        != RoleTransition::Changed
    {
        error!("Server failed to start on port {}", port);
        return AppExit::error();
    }

    if args.demo {
        let hub = app.world().resource::<LoopbackHub>().clone();
        let demo = match DemoClients::connect(&hub, port, &network, args.demo_ticks) {
            Ok(demo) => demo,
            Err(e) => {
                error!("Failed to attach demo clients: {}", e);
                return AppExit::error();
            }
        };
        app.insert_resource(demo).add_systems(
            FixedUpdate,
            demo::drive_demo_clients.before(NetworkSet::Receive),
        );
    }

    app.run()
}

// ============================================================================
// Systems
// ============================================================================

fn log_server_status(
    state: Res<ServerState>,
    network: Res<NetworkState>,
    manager: Res<ConnectionManager>,
    host: Option<Res<ServerHost>>,
    time: Res<Time>,
    mut since_last: Local<f32>,
) {
    *since_last += time.delta_secs();
    if *since_last < STATUS_INTERVAL_SECS {
        return;
    }
    *since_last = 0.0;
    let Some(host) = host else {
        return;
    };

    info!(
        "{}: {} clients, tick {}, {} snapshots sent, {}, uptime {}s",
        manager.status(),
        network.client_count,
        network.tick,
        network.snapshots_sent,
        host.session.bandwidth().format_bandwidth(),
        state.uptime_secs()
    );
}

//! Server configuration: defaults, then the TOML file, then CLI flags.

use std::path::Path;

use bevy::prelude::*;
use frontlines_common::{LayerMask, StaticWorld};
use frontlines_networking::NetworkConfig;
use frontlines_runtime::prelude::{LocomotionConfig, SpawnLayout};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Args;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Contents of `server.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub world: WorldSettings,
    pub locomotion: LocomotionConfig,
}

/// Synthetic geometry for the headless world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub ground_height: f32,
    pub spawn_origin: [f32; 3],
    pub spawn_spacing: f32,
    /// Extra solid boxes as `[min, max]` corner pairs
    pub boxes: Vec<[[f32; 3]; 2]>,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            ground_height: 0.0,
            spawn_origin: [0.0, 0.0, 0.0],
            spawn_spacing: 2.0,
            boxes: Vec::new(),
        }
    }
}

impl WorldSettings {
    pub fn build_world(&self) -> StaticWorld {
        let mut world = StaticWorld::with_ground(self.ground_height);
        for [min, max] in &self.boxes {
            world.add_box(
                Vec3::from_array(*min),
                Vec3::from_array(*max),
                LayerMask::DEFAULT.union(LayerMask::GROUND),
            );
        }
        world
    }

    pub fn spawn_layout(&self) -> SpawnLayout {
        SpawnLayout {
            origin: Vec3::from_array(self.spawn_origin),
            spacing: self.spawn_spacing,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply CLI overrides (CLI takes precedence).
    pub fn merge_args(&mut self, args: &Args) {
        if let Some(port) = args.port {
            self.network.transport.port = port;
        }
        if let Some(max_connections) = args.max_connections {
            self.network.transport.max_connections = max_connections;
        }
        if let Some(tick_rate) = args.tick_rate {
            self.network.tick.tick_rate = tick_rate;
        }
        if let Some(snapshot_rate) = args.snapshot_rate {
            self.network.replication.snapshot_rate = snapshot_rate;
        }
    }
}

//! AGV control panel
//!
//! This library provides the control side of a simulated automated guided vehicle:
//! shortest-path route planning with turn-by-turn commands over a fixed map, a
//! position tracker, an RFID tag registry and a telemetry relay that keeps
//! dashboards in sync.

#![warn(unused_extern_crates)]

pub mod core;
pub mod messaging;
pub mod navigation;
pub mod server;

// Re-export commonly used items for easier access
pub use crate::core::{AgvStatus, Api, ApiRequest, ApiResponse, SharedStatus, TagRegistry};
pub use messaging::{Envelope, Publisher, TcpBroadcaster, TelemetryRelay};
pub use navigation::{Command, Node, Route, RouteController, RoutePlanner, RouteRequest, Topology};
pub use server::Server;

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Main configuration structure for the control panel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgvConfig {
    /// Control API endpoint
    #[serde(default)]
    pub control: ControlConfig,
    /// Telemetry ingest endpoint
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Fan-out endpoint for commands, status and sensor events
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    /// Map source
    #[serde(default)]
    pub map: MapConfig,
    /// Tag registry storage
    #[serde(default)]
    pub tags: TagsConfig,
}

/// Control API endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Address to bind
    #[serde(default = "default_control_address")]
    pub bind_address: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            bind_address: default_control_address(),
        }
    }
}

/// Telemetry ingest endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Address sensor clients push to
    #[serde(default = "default_telemetry_address")]
    pub bind_address: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            bind_address: default_telemetry_address(),
        }
    }
}

/// Broadcast endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Address subscribers connect to
    #[serde(default = "default_broadcast_address")]
    pub bind_address: String,
    /// Messages buffered before publishers get `QueueFull`
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        BroadcastConfig {
            bind_address: default_broadcast_address(),
            queue_depth: default_queue_depth(),
        }
    }
}

/// Map source; both unset means the embedded demo map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    /// YAML map file
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Override the map's home node
    #[serde(default)]
    pub home_node: Option<String>,
}

/// Tag registry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagsConfig {
    /// JSON file holding the tags
    #[serde(default = "default_tags_path")]
    pub db_path: PathBuf,
}

impl Default for TagsConfig {
    fn default() -> Self {
        TagsConfig {
            db_path: default_tags_path(),
        }
    }
}

fn default_control_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_telemetry_address() -> String {
    "0.0.0.0:1883".to_string()
}

fn default_broadcast_address() -> String {
    "0.0.0.0:5555".to_string()
}

fn default_queue_depth() -> usize {
    1024
}

fn default_tags_path() -> PathBuf {
    PathBuf::from("data/rfid-tags.json")
}

impl AgvConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgvError::Config(format!("{}: {}", path.display(), e)))?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Configuration with every endpoint on an ephemeral localhost port
    pub fn local(tags_path: impl Into<PathBuf>) -> Self {
        let local = || "127.0.0.1:0".to_string();
        AgvConfig {
            control: ControlConfig {
                bind_address: local(),
            },
            telemetry: TelemetryConfig {
                bind_address: local(),
            },
            broadcast: BroadcastConfig {
                bind_address: local(),
                ..BroadcastConfig::default()
            },
            map: MapConfig::default(),
            tags: TagsConfig {
                db_path: tags_path.into(),
            },
        }
    }

    fn topology(&self) -> Result<Topology> {
        let topology = match &self.map.path {
            Some(path) => Topology::load(path)?,
            None => Topology::demo(),
        };
        match &self.map.home_node {
            Some(home) => Ok(topology.with_home(home)?),
            None => Ok(topology),
        }
    }
}

/// Control panel error types
#[derive(Debug, thiserror::Error)]
pub enum AgvError {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Map could not be loaded
    #[error("Map error: {0}")]
    Map(#[from] navigation::MapError),

    /// Tag registry failure
    #[error("Tag registry error: {0}")]
    Tags(#[from] crate::core::TagError),

    /// Socket failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for AgvError {
    fn from(e: serde_yaml::Error) -> Self {
        AgvError::Config(e.to_string())
    }
}

/// Crate result alias
pub type Result<T> = std::result::Result<T, AgvError>;

/// Runtime summary for logs and the CLI
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    /// Merged AGV status
    pub agv: AgvStatus,
    /// Node the robot was at before the current one
    pub previous: Node,
    /// Successful plans
    pub routes_completed: u64,
    /// Failed plans
    pub routes_failed: u64,
    /// Decision table misses so far
    pub fallbacks: u64,
    /// Whether the endpoints are accepting
    pub operational: bool,
    /// Control and telemetry clients currently connected
    pub clients: usize,
}

/// Primary entry point: wires the planner, registry, relay and endpoints together
pub struct AgvSystem {
    config: AgvConfig,
    status: SharedStatus,
    controller: Arc<RouteController>,
    api: Api,
    relay: Arc<TelemetryRelay>,
    broadcaster: Arc<TcpBroadcaster>,
    server: Option<Server>,
}

impl AgvSystem {
    /// Load the map and tag registry and bind the broadcaster
    pub fn new(config: AgvConfig) -> Result<Self> {
        let topology = config.topology()?;
        let gaps = topology.report_coverage();
        if gaps > 0 {
            log::warn!(
                "{} decisions will fall back to {}",
                gaps,
                navigation::actions::FALLBACK_COMMAND
            );
        }
        let topology = Arc::new(topology);

        let tags = Arc::new(Mutex::new(TagRegistry::open(&config.tags.db_path)?));
        let status = SharedStatus::new(topology.home.clone());

        let broadcaster = Arc::new(TcpBroadcaster::bind(
            &config.broadcast.bind_address,
            config.broadcast.queue_depth,
        )?);
        let publisher: Arc<dyn Publisher> = broadcaster.clone();

        let controller = Arc::new(RouteController::new(
            RoutePlanner::new(topology),
            Arc::clone(&publisher),
            status.clone(),
        ));
        let api = Api::new(Arc::clone(&controller), status.clone(), Arc::clone(&tags));
        let relay = Arc::new(TelemetryRelay::new(status.clone(), tags, publisher));

        Ok(AgvSystem {
            config,
            status,
            controller,
            api,
            relay,
            broadcaster,
            server: None,
        })
    }

    /// Start the control and telemetry endpoints
    pub fn start(&mut self) -> Result<()> {
        if self.server.is_some() {
            return Ok(());
        }
        let server = Server::start(
            &self.config.control.bind_address,
            &self.config.telemetry.bind_address,
            self.api.clone(),
            Arc::clone(&self.relay),
        )?;
        self.relay.broadcast_status(&self.status.snapshot());
        self.server = Some(server);
        log::info!("AGV control panel started");
        Ok(())
    }

    /// Stop the endpoints and the broadcaster
    pub fn shutdown(&mut self) {
        log::info!("Shutting down AGV control panel...");
        if let Some(mut server) = self.server.take() {
            server.stop();
        }
        self.broadcaster.stop();
    }

    /// Request/response API, usable without the TCP endpoint
    pub fn api(&self) -> &Api {
        &self.api
    }

    /// Telemetry relay, usable without the TCP endpoint
    pub fn relay(&self) -> &TelemetryRelay {
        &self.relay
    }

    /// Control endpoint address, once started
    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(Server::control_addr)
    }

    /// Telemetry endpoint address, once started
    pub fn telemetry_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(Server::telemetry_addr)
    }

    /// Broadcast endpoint address
    pub fn broadcast_addr(&self) -> SocketAddr {
        self.broadcaster.local_addr()
    }

    /// Get current system status
    pub fn get_status(&self) -> SystemStatus {
        let tracker = self.controller.position();
        let (routes_completed, routes_failed) = self.controller.plan_counts();
        SystemStatus {
            agv: self.status.snapshot(),
            previous: tracker.current_previous().clone(),
            routes_completed,
            routes_failed,
            fallbacks: self.controller.planner().topology().actions.fallback_count(),
            operational: self.server.as_ref().is_some_and(Server::is_running),
            clients: self.server.as_ref().map_or(0, Server::client_count),
        }
    }
}

impl Drop for AgvSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

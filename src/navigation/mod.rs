//! Route planning for the AGV
//!
//! This module handles shortest-path search over the static map graph and the
//! conversion of a node path into discrete driving commands.

pub mod actions;
pub mod controller;
pub mod graph;
pub mod planner;
pub mod topology;

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

pub use actions::{ActionTable, DecisionKey, Synthesis, synthesize_commands};
pub use controller::{RouteController, RouteRequest};
pub use graph::{Graph, PathResult};
pub use planner::RoutePlanner;
pub use topology::{MapDefinition, Topology};

/// A named location or intersection on the map
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Node(String);

impl Node {
    /// Create a node from any string-like label
    pub fn new(label: impl Into<String>) -> Self {
        Node(label.into())
    }

    /// Label of the node
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Node {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Node {
    fn from(label: &str) -> Self {
        Node(label.to_string())
    }
}

impl From<String> for Node {
    fn from(label: String) -> Self {
        Node(label)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Discrete driving command issued to the robot at a decision point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Keep going through the intersection
    Straight,
    /// Turn left
    Left,
    /// Turn right
    Right,
    /// Turn around and head back
    Reverse,
    /// Destination reached
    Stop,
}

impl Command {
    /// Wire name of the command
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Straight => "straight",
            Command::Left => "left",
            Command::Right => "right",
            Command::Reverse => "reverse",
            Command::Stop => "stop",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a planning call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Cumulative edge weight of the path
    pub cost: u64,
    /// Nodes from the robot's current position to the destination
    pub path: Vec<Node>,
    /// One command per path node, the last one always `stop`
    pub commands: Vec<Command>,
}

impl Route {
    /// Node the robot ends up at
    pub fn destination(&self) -> Option<&Node> {
        self.path.last()
    }

    /// Node visited right before the destination, if the route moves at all
    pub fn arrival_previous(&self) -> Option<&Node> {
        if self.path.len() > 1 {
            self.path.get(self.path.len() - 2)
        } else {
            None
        }
    }
}

/// Route planning error types
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// Destination cannot be reached from the start node
    #[error("No route from {start} to {destination}")]
    RouteNotFound {
        /// Start node
        start: String,
        /// Requested destination
        destination: String,
    },

    /// Synthesized command list does not match the path
    #[error("Command/path length mismatch: {commands} commands for {path} nodes")]
    CommandLengthMismatch {
        /// Path length
        path: usize,
        /// Command count
        commands: usize,
    },

    /// Planned route could not be handed to the robot
    #[error("Failed to publish commands: {0}")]
    PublishFailed(String),
}

/// Map loading and validation error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// Edge weights must be strictly positive
    #[error("Edge {from} -> {to} has non-positive weight")]
    NonPositiveWeight {
        /// Source node
        from: String,
        /// Target node
        to: String,
    },

    /// Home node is not part of the graph
    #[error("Home node {0} is not in the graph")]
    UnknownHome(String),

    /// Map file could not be read
    #[error("Failed to read map file: {0}")]
    Io(#[from] std::io::Error),

    /// Map file is not valid YAML for a map definition
    #[error("Invalid map file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

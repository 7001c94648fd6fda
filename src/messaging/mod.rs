//! Messaging layer for the AGV control panel
//!
//! This module handles all traffic between the panel, the robot and dashboards:
//! - Publishing route commands and status to subscribers
//! - Ingesting sensor telemetry
//! - Framing JSON messages on TCP streams

pub mod publisher;
pub mod subscriber;
pub mod wire;

use serde::{Deserialize, Serialize};

pub use publisher::{PublishError, Publisher, TcpBroadcaster};
pub use subscriber::{RelayError, TelemetryRelay};
pub use wire::{WireError, read_frame, write_frame};

/// Topic names shared with the robot firmware and the dashboards
pub mod topics {
    /// Route commands sent to the robot
    pub const COMMANDS: &str = "agv/commands";
    /// Merged status record
    pub const STATUS: &str = "agv/status";
    /// RFID tag reads
    pub const RFID: &str = "agv/rfid";
    /// Front distance sensors
    pub const DISTANCE: &str = "agv/distance";
    /// Accelerometer / gyroscope
    pub const IMU: &str = "agv/imu";
    /// Floor color sensor
    pub const COLOR: &str = "agv/color";
}

/// A message on a topic, the unit of every TCP frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Topic name
    pub topic: String,
    /// JSON payload
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Build an envelope
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Envelope {
            topic: topic.into(),
            payload,
        }
    }
}

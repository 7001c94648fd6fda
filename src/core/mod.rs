//! Core state of the AGV control panel
//!
//! This module holds everything that is shared across requests:
//! - The position tracker and planning lifecycle
//! - The merged status record fed by telemetry
//! - The RFID tag registry
//! - The request/response API over all of the above

pub mod api;
pub mod state;
pub mod status;
pub mod tags;

pub use api::{Api, ApiRequest, ApiResponse};
pub use state::{NavigationState, PlanningPhase, PositionTracker};
pub use status::{AgvStatus, SensorReadings, SharedStatus, StatusUpdate};
pub use tags::{Tag, TagError, TagRegistry};

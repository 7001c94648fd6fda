// core/status.rs

// Shared status record of the AGV. Telemetry and the route controller push partial
// updates into it; dashboards receive the merged record.

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::navigation::Node;

/// Last RFID tag read by the robot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RfidReading {
    pub tag: String,
    /// Item registered for the tag, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    #[serde(default)]
    pub reader: Option<String>,
}

/// Front distance sensors
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistanceReading {
    pub left: f32,
    pub center: f32,
    pub right: f32,
    #[serde(default = "default_distance_unit")]
    pub unit: String,
}

impl DistanceReading {
    /// Smallest of the three readings
    pub fn nearest(&self) -> f32 {
        self.left.min(self.center).min(self.right)
    }
}

fn default_distance_unit() -> String {
    "cm".to_string()
}

/// Accelerometer and gyroscope sample
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImuReading {
    #[serde(with = "xyz")]
    pub accel: Vector3<f32>,
    #[serde(with = "xyz")]
    pub gyro: Vector3<f32>,
    #[serde(default)]
    pub temp: Option<f32>,
}

impl ImuReading {
    /// Magnitude of the acceleration vector, in g
    pub fn acceleration_magnitude(&self) -> f32 {
        self.accel.norm()
    }
}

/// Floor color seen by the color sensor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorReading {
    pub color: String,
}

/// Latest value of every sensor
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    pub rfid: Option<RfidReading>,
    pub distance: Option<DistanceReading>,
    pub imu: Option<ImuReading>,
    pub color: Option<ColorReading>,
}

/// Full status record sent to dashboards
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgvStatus {
    pub position: Node,
    pub battery: u8,
    pub sensors: SensorReadings,
    pub last_update: DateTime<Utc>,
}

/// Partial update; `None` fields keep their current value
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub position: Option<Node>,
    #[serde(default)]
    pub battery: Option<u8>,
    #[serde(default)]
    pub sensors: SensorReadings,
}

impl AgvStatus {
    /// Fresh status with the robot parked at `home`
    pub fn new(home: Node) -> Self {
        AgvStatus {
            position: home,
            battery: 100,
            sensors: SensorReadings::default(),
            last_update: Utc::now(),
        }
    }

    /// Merge a partial update, preserving sensor fields it does not carry
    pub fn apply(&mut self, update: StatusUpdate) {
        if let Some(position) = update.position {
            self.position = position;
        }
        if let Some(battery) = update.battery {
            self.battery = battery.min(100);
        }

        let sensors = update.sensors;
        if sensors.rfid.is_some() {
            self.sensors.rfid = sensors.rfid;
        }
        if sensors.distance.is_some() {
            self.sensors.distance = sensors.distance;
        }
        if sensors.imu.is_some() {
            self.sensors.imu = sensors.imu;
        }
        if sensors.color.is_some() {
            self.sensors.color = sensors.color;
        }

        self.last_update = Utc::now();
    }
}

/// Status record shared between the relay, the route controller and the API
#[derive(Clone, Debug)]
pub struct SharedStatus {
    inner: Arc<RwLock<AgvStatus>>,
}

impl SharedStatus {
    pub fn new(home: Node) -> Self {
        SharedStatus {
            inner: Arc::new(RwLock::new(AgvStatus::new(home))),
        }
    }

    /// Copy of the current record
    pub fn snapshot(&self) -> AgvStatus {
        match self.inner.read() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Merge an update and return the resulting record
    pub fn update(&self, update: StatusUpdate) -> AgvStatus {
        let mut status = match self.inner.write() {
            Ok(status) => status,
            Err(poisoned) => poisoned.into_inner(),
        };
        status.apply(update);
        status.clone()
    }

    /// Set the map position
    pub fn set_position(&self, position: Node) -> AgvStatus {
        self.update(StatusUpdate {
            position: Some(position),
            ..StatusUpdate::default()
        })
    }
}

/// (De)serializes a `Vector3` as `{ "x": .., "y": .., "z": .. }`
mod xyz {
    use nalgebra::Vector3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Xyz {
        x: f32,
        y: f32,
        z: f32,
    }

    pub fn serialize<S: Serializer>(v: &Vector3<f32>, serializer: S) -> Result<S::Ok, S::Error> {
        Xyz { x: v.x, y: v.y, z: v.z }.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vector3<f32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Xyz { x, y, z } = Xyz::deserialize(deserializer)?;
        Ok(Vector3::new(x, y, z))
    }
}

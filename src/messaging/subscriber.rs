// src/messaging/subscriber.rs
// Receives sensor telemetry, merges it into the shared status record and fans it
// out to dashboards.

use super::{Envelope, Publisher, topics};
use crate::core::status::{
    AgvStatus, ColorReading, DistanceReading, ImuReading, RfidReading, SensorReadings,
    SharedStatus, StatusUpdate,
};
use crate::core::tags::TagRegistry;
use log::{debug, error, warn};
use serde::Deserialize;
use std::sync::{Arc, Mutex};

/// Obstacle distance that triggers a warning, in the reading's unit
const OBSTACLE_WARNING: f32 = 10.0;

/// Acceleration magnitude, in g, that is logged as a possible impact
const IMPACT_WARNING_G: f32 = 2.0;

/// Telemetry relay error types
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Unknown telemetry topic: {0}")]
    UnknownTopic(String),

    #[error("Malformed payload on {topic}: {source}")]
    MalformedPayload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

/// RFID reader message as sent by the firmware
#[derive(Debug, Deserialize)]
struct RfidPayload {
    tag: String,
    #[serde(default)]
    reader: Option<String>,
}

/// Merges sensor envelopes into the shared status and re-broadcasts them
pub struct TelemetryRelay {
    status: SharedStatus,
    tags: Arc<Mutex<TagRegistry>>,
    publisher: Arc<dyn Publisher>,
}

impl TelemetryRelay {
    pub fn new(
        status: SharedStatus,
        tags: Arc<Mutex<TagRegistry>>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        TelemetryRelay {
            status,
            tags,
            publisher,
        }
    }

    /// Process one telemetry envelope and return the merged status
    pub fn ingest(&self, envelope: &Envelope) -> Result<AgvStatus, RelayError> {
        debug!("Telemetry on {}: {}", envelope.topic, envelope.payload);

        let (update, event) = match envelope.topic.as_str() {
            topics::RFID => {
                let payload: RfidPayload = parse(envelope)?;
                let item = self.resolve_item(&payload.tag);
                let reading = RfidReading {
                    tag: payload.tag,
                    item,
                    reader: payload.reader,
                };
                (
                    sensors(SensorReadings {
                        rfid: Some(reading.clone()),
                        ..SensorReadings::default()
                    }),
                    serde_json::to_value(&reading).ok(),
                )
            }
            topics::DISTANCE => {
                let reading: DistanceReading = parse(envelope)?;
                if reading.nearest() < OBSTACLE_WARNING {
                    warn!("Obstacle close: {:.1} {}", reading.nearest(), reading.unit);
                }
                (
                    sensors(SensorReadings {
                        distance: Some(reading),
                        ..SensorReadings::default()
                    }),
                    Some(envelope.payload.clone()),
                )
            }
            topics::IMU => {
                let reading: ImuReading = parse(envelope)?;
                let magnitude = reading.acceleration_magnitude();
                if magnitude > IMPACT_WARNING_G {
                    warn!("Possible impact: acceleration {:.2} g", magnitude);
                }
                (
                    sensors(SensorReadings {
                        imu: Some(reading),
                        ..SensorReadings::default()
                    }),
                    Some(envelope.payload.clone()),
                )
            }
            topics::COLOR => {
                let reading: ColorReading = parse(envelope)?;
                (
                    sensors(SensorReadings {
                        color: Some(reading),
                        ..SensorReadings::default()
                    }),
                    Some(envelope.payload.clone()),
                )
            }
            topics::STATUS => (parse::<StatusUpdate>(envelope)?, None),
            other => {
                warn!("Ignoring telemetry on unknown topic {}", other);
                return Err(RelayError::UnknownTopic(other.to_string()));
            }
        };

        let status = self.status.update(update);

        if let Some(event) = event {
            self.forward(&envelope.topic, event);
        }
        self.broadcast_status(&status);

        Ok(status)
    }

    /// Publish the full status record on the status topic
    pub fn broadcast_status(&self, status: &AgvStatus) {
        match serde_json::to_value(status) {
            Ok(payload) => self.forward(topics::STATUS, payload),
            Err(e) => error!("Failed to serialize status: {}", e),
        }
    }

    fn forward(&self, topic: &str, payload: serde_json::Value) {
        if let Err(e) = self.publisher.publish(topic, payload) {
            error!("Failed to relay {}: {}", topic, e);
        }
    }

    fn resolve_item(&self, tag: &str) -> Option<String> {
        let registry = match self.tags.lock() {
            Ok(registry) => registry,
            Err(poisoned) => poisoned.into_inner(),
        };
        registry.item_name(tag).map(str::to_string)
    }
}

fn sensors(sensors: SensorReadings) -> StatusUpdate {
    StatusUpdate {
        sensors,
        ..StatusUpdate::default()
    }
}

fn parse<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T, RelayError> {
    serde_json::from_value(envelope.payload.clone()).map_err(|source| {
        RelayError::MalformedPayload {
            topic: envelope.topic.clone(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::publisher::MockPublisher;
    use crate::navigation::Node;
    use serde_json::json;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> Arc<Mutex<TagRegistry>> {
        let mut registry = TagRegistry::open(dir.path().join("tags.json")).unwrap();
        registry.register("A1B2", "Caixa de Peças").unwrap();
        Arc::new(Mutex::new(registry))
    }

    #[test]
    fn rfid_read_is_resolved_and_relayed() {
        let dir = tempfile::tempdir().unwrap();
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|topic, payload| topic == topics::RFID && payload["item"] == "Caixa de Peças")
            .times(1)
            .returning(|_, _| Ok(()));
        publisher
            .expect_publish()
            .withf(|topic, _| topic == topics::STATUS)
            .times(1)
            .returning(|_, _| Ok(()));

        let relay = TelemetryRelay::new(
            SharedStatus::new(Node::from("Branco")),
            registry(&dir),
            Arc::new(publisher),
        );
        let status = relay
            .ingest(&Envelope::new(
                topics::RFID,
                json!({"tag": "A1B2", "timestamp": 1234, "reader": "PicoW"}),
            ))
            .unwrap();

        let rfid = status.sensors.rfid.unwrap();
        assert_eq!(rfid.item.as_deref(), Some("Caixa de Peças"));
        assert_eq!(rfid.reader.as_deref(), Some("PicoW"));
    }

    #[test]
    fn unregistered_tag_has_no_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().returning(|_, _| Ok(()));

        let relay = TelemetryRelay::new(
            SharedStatus::new(Node::from("Branco")),
            registry(&dir),
            Arc::new(publisher),
        );
        let status = relay
            .ingest(&Envelope::new(topics::RFID, json!({"tag": "FFFF"})))
            .unwrap();
        assert_eq!(status.sensors.rfid.unwrap().item, None);
    }

    #[test]
    fn sensor_updates_merge_into_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().returning(|_, _| Ok(()));

        let relay = TelemetryRelay::new(
            SharedStatus::new(Node::from("Branco")),
            registry(&dir),
            Arc::new(publisher),
        );
        relay
            .ingest(&Envelope::new(
                topics::DISTANCE,
                json!({"left": 30.5, "center": 12.0, "right": 44.1, "timestamp": 9, "unit": "cm"}),
            ))
            .unwrap();
        relay
            .ingest(&Envelope::new(topics::COLOR, json!({"color": "Verde"})))
            .unwrap();
        let status = relay
            .ingest(&Envelope::new(topics::STATUS, json!({"battery": 87})))
            .unwrap();

        assert_eq!(status.battery, 87);
        assert_eq!(status.sensors.distance.unwrap().center, 12.0);
        assert_eq!(status.sensors.color.unwrap().color, "Verde");
    }

    #[test]
    fn impact_reading_is_still_merged_and_relayed() {
        let dir = tempfile::tempdir().unwrap();
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|topic, payload| topic == topics::IMU && payload["accel"]["z"] == 3.0)
            .times(1)
            .returning(|_, _| Ok(()));
        publisher
            .expect_publish()
            .withf(|topic, _| topic == topics::STATUS)
            .times(1)
            .returning(|_, _| Ok(()));

        let relay = TelemetryRelay::new(
            SharedStatus::new(Node::from("Branco")),
            registry(&dir),
            Arc::new(publisher),
        );
        let status = relay
            .ingest(&Envelope::new(
                topics::IMU,
                json!({
                    "accel": {"x": 0.0, "y": 0.0, "z": 3.0},
                    "gyro": {"x": 0.0, "y": 0.0, "z": 0.0}
                }),
            ))
            .unwrap();

        let imu = status.sensors.imu.unwrap();
        assert!(imu.acceleration_magnitude() > IMPACT_WARNING_G);
    }

    #[test]
    fn status_topic_is_not_echoed_as_sensor_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|topic, _| topic == topics::STATUS)
            .times(1)
            .returning(|_, _| Ok(()));

        let relay = TelemetryRelay::new(
            SharedStatus::new(Node::from("Branco")),
            registry(&dir),
            Arc::new(publisher),
        );
        let status = relay
            .ingest(&Envelope::new(topics::STATUS, json!({"position": "Roxo"})))
            .unwrap();
        assert_eq!(status.position.as_str(), "Roxo");
    }

    #[test]
    fn unknown_topic_and_bad_payload_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = MockPublisher::new();
        let relay = TelemetryRelay::new(
            SharedStatus::new(Node::from("Branco")),
            registry(&dir),
            Arc::new(publisher),
        );

        assert!(matches!(
            relay.ingest(&Envelope::new("agv/unknown", json!({}))),
            Err(RelayError::UnknownTopic(_))
        ));
        assert!(matches!(
            relay.ingest(&Envelope::new(topics::IMU, json!({"accel": 1}))),
            Err(RelayError::MalformedPayload { .. })
        ));
    }
}

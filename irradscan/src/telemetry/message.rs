//! Structured telemetry records.
//!
//! Every record is a `{meta, data}` pair. `data` is tagged by its `status`
//! field so consumers can dispatch on the topic without knowing the Rust
//! types:
//!
//! ```text
//! {"meta": {"timestamp": 1700000000.25, "name": "irradscan", "type": "stage"},
//!  "data": {"status": "scan_start", "row": 3, "sweep": 0, "speed": 10.0, ...}}
//! ```

use serde::{Deserialize, Serialize};

use crate::stage::AxisId;

/// Envelope metadata attached to every telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMeta {
    /// UNIX timestamp of publication in seconds.
    pub timestamp: f64,
    /// Name of the publishing instance.
    pub name: String,
    /// Source kind, e.g. `stage` or `fluence`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Telemetry payload, tagged by topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Scan area is set up and the first sweep is about to begin.
    ScanInit {
        /// Rows per sweep.
        n_rows: usize,
        /// Row pitch in mm.
        step_size: f64,
    },

    /// A row traversal is starting.
    ScanStart {
        /// Row index within the scan area.
        row: usize,
        /// Sweep index, `None` for a single-row scan.
        sweep: Option<u32>,
        /// Scan speed of the x-axis in mm/s.
        speed: f64,
        /// Stage x position at row start in mm.
        x_start: f64,
        /// Stage y position at row start in mm.
        y_start: f64,
    },

    /// A row traversal has finished.
    ScanStop {
        /// Observed x position after the row in mm.
        x_stop: f64,
        /// Observed y position after the row in mm.
        y_stop: f64,
    },

    /// The scan ended, regardless of how.
    ScanFinished,

    /// An axis move is about to be commanded.
    MoveStart {
        /// Moving axis.
        axis: AxisId,
        /// Position before the move in mm.
        position: f64,
        /// Axis speed in mm/s.
        speed: f64,
    },

    /// An axis move has been acknowledged.
    MoveStop {
        /// Moved axis.
        axis: AxisId,
        /// Position after the move in mm.
        position: f64,
        /// Absolute distance travelled in mm.
        travel: f64,
    },

    /// Particles deposited by reconstructing one row.
    FluenceRow {
        /// Row index within the scan area.
        row: usize,
        /// Particles deposited by the row's wait and scan phases.
        particles: f64,
    },
}

impl TelemetryEvent {
    /// Topic name as it appears in the `status` field.
    pub fn topic(&self) -> &'static str {
        match self {
            TelemetryEvent::ScanInit { .. } => "scan_init",
            TelemetryEvent::ScanStart { .. } => "scan_start",
            TelemetryEvent::ScanStop { .. } => "scan_stop",
            TelemetryEvent::ScanFinished => "scan_finished",
            TelemetryEvent::MoveStart { .. } => "move_start",
            TelemetryEvent::MoveStop { .. } => "move_stop",
            TelemetryEvent::FluenceRow { .. } => "fluence_row",
        }
    }
}

/// A published telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    /// Envelope metadata.
    pub meta: MessageMeta,
    /// Topic payload.
    pub data: TelemetryEvent,
}

impl TelemetryMessage {
    /// Serializes the record to a JSON line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> MessageMeta {
        MessageMeta {
            timestamp: 1.5,
            name: "test".to_string(),
            kind: "stage".to_string(),
        }
    }

    #[test]
    fn test_scan_start_serializes_with_status_tag() {
        let msg = TelemetryMessage {
            meta: meta(),
            data: TelemetryEvent::ScanStart {
                row: 3,
                sweep: Some(1),
                speed: 10.0,
                x_start: 0.0,
                y_start: 5.0,
            },
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["data"]["status"], "scan_start");
        assert_eq!(value["data"]["row"], 3);
        assert_eq!(value["meta"]["type"], "stage");
    }

    #[test]
    fn test_scan_finished_has_empty_payload() {
        let msg = TelemetryMessage {
            meta: meta(),
            data: TelemetryEvent::ScanFinished,
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        let data = value["data"].as_object().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data["status"], "scan_finished");
    }

    #[test]
    fn test_single_row_sweep_is_null() {
        let event = TelemetryEvent::ScanStart {
            row: 0,
            sweep: None,
            speed: 1.0,
            x_start: 0.0,
            y_start: 0.0,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value["sweep"].is_null());
        assert_eq!(event.topic(), "scan_start");
    }
}

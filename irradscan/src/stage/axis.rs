//! Axis capability shared by every motor-controller family.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::{DistanceUnit, SpeedUnit};

/// Identifies one of the two stage axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisId {
    /// Horizontal scan axis.
    X,
    /// Vertical row axis.
    Y,
}

impl AxisId {
    /// Axis letter.
    pub fn as_str(self) -> &'static str {
        match self {
            AxisId::X => "x",
            AxisId::Y => "y",
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acknowledgment flag of an axis command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyFlag {
    /// Command accepted and completed.
    Ok,
    /// Command rejected by the controller.
    Rejected,
}

/// Structured acknowledgment returned by every axis command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisReply {
    /// Accept/reject flag.
    pub flag: ReplyFlag,
    /// Controller-specific reply payload or rejection reason.
    pub data: String,
}

impl AxisReply {
    /// An accepted reply.
    pub fn ok(data: impl Into<String>) -> Self {
        Self {
            flag: ReplyFlag::Ok,
            data: data.into(),
        }
    }

    /// A rejected reply.
    pub fn rejected(data: impl Into<String>) -> Self {
        Self {
            flag: ReplyFlag::Rejected,
            data: data.into(),
        }
    }

    /// Whether the command was accepted.
    pub fn is_ok(&self) -> bool {
        self.flag == ReplyFlag::Ok
    }
}

/// Transport-level failure talking to an axis.
#[derive(Debug, Error)]
pub enum AxisError {
    /// The link to the controller failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The controller answered with something that could not be parsed.
    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

/// Result type for axis calls.
pub type AxisResult<T> = Result<T, AxisError>;

/// A single linear axis of a motorized stage.
///
/// Calls block until the controller acknowledges them. Timeouts, retries
/// and wire formats are the implementation's business; the scan layer only
/// inspects the returned [`AxisReply`].
///
/// # Implementors
///
/// - [`SimulatedAxis`](super::SimulatedAxis) - in-memory axis for tests and dry runs
pub trait Axis: Send {
    /// Human-readable axis name for logs.
    fn name(&self) -> &str;

    /// Moves to an absolute position.
    fn move_absolute(&mut self, position: f64, unit: DistanceUnit) -> AxisResult<AxisReply>;

    /// Moves by a distance relative to the current position.
    fn move_relative(&mut self, distance: f64, unit: DistanceUnit) -> AxisResult<AxisReply>;

    /// Current position.
    fn get_position(&mut self, unit: DistanceUnit) -> AxisResult<f64>;

    /// Sets the speed used by subsequent moves.
    fn set_speed(&mut self, value: f64, unit: SpeedUnit) -> AxisResult<AxisReply>;

    /// Speed used by moves.
    fn get_speed(&mut self, unit: SpeedUnit) -> AxisResult<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_flags() {
        assert!(AxisReply::ok("0").is_ok());
        assert!(!AxisReply::rejected("BADDATA").is_ok());
    }

    #[test]
    fn test_axis_id_display() {
        assert_eq!(AxisId::X.to_string(), "x");
        assert_eq!(serde_json::to_string(&AxisId::Y).unwrap(), "\"y\"");
    }
}

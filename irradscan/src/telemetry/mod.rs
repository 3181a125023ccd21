//! Scan and motion telemetry for observability and live displays.
//!
//! Telemetry is best-effort: messages are fanned out over a bounded channel
//! and a slow consumer loses the oldest unread messages instead of stalling
//! the scan worker. Nothing in the crate depends on telemetry for
//! correctness; reconstruction consumes the authoritative row log instead.
//!
//! # Architecture
//!
//! ```text
//! XyStage ─────────┐
//! ScanController ──┼──► TelemetryPublisher ──► broadcast ──► TelemetrySubscriber (CLI, GUI, ...)
//! Reconstructor ───┘     (never blocks)        (capacity)     (counts dropped)
//! ```
//!
//! # Topics
//!
//! | status          | payload                                      |
//! |-----------------|----------------------------------------------|
//! | `scan_init`     | `n_rows`, `step_size`                        |
//! | `scan_start`    | `row`, `sweep`, `speed`, `x_start`, `y_start`|
//! | `scan_stop`     | `x_stop`, `y_stop`                           |
//! | `scan_finished` | (none)                                       |
//! | `move_start`    | `axis`, `position`, `speed`                  |
//! | `move_stop`     | `axis`, `position`, `travel`                 |
//! | `fluence_row`   | `row`, `particles`                           |

mod message;
mod publisher;

pub use message::{MessageMeta, TelemetryEvent, TelemetryMessage};
pub use publisher::{
    TelemetryPublisher, TelemetrySubscriber, DEFAULT_SENDER_NAME, DEFAULT_TELEMETRY_CAPACITY,
};

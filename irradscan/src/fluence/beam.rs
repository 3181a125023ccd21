//! Timestamp-ordered beam-current samples and the row cursor over them.
//!
//! Reconstruction visits rows in time order. For each row the samples split
//! into a wait window (after the previous row stopped, before this row
//! started) and a scan window (while this row was scanned):
//!
//! ```text
//!  samples:  ●  ●  ●  ●  ●  ●  ●  ●  ●  ●  ●  ●  ●  ●
//!            └─ prev ─┘  └ wait ┘  └─── scan ───┘  └ next row ...
//!                    stop      start            stop
//!                       ▲                          ▲
//!                   lower bound                next lower bound
//! ```
//!
//! [`BeamCursor`] carries the lower bound forward across rows so the whole
//! stream is scanned once; [`BeamSampleStream::row_window`] computes the same
//! split independently per row with binary search.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::{FluenceError, OrderingViolation, Result};

/// One beam-current measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamSample {
    /// UNIX timestamp in seconds.
    pub timestamp: f64,
    /// Beam current in ampere.
    pub current: f64,
}

impl BeamSample {
    /// Creates a sample.
    pub fn new(timestamp: f64, current: f64) -> Self {
        Self { timestamp, current }
    }
}

/// Beam-current samples with strictly increasing timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<BeamSample>", into = "Vec<BeamSample>")]
pub struct BeamSampleStream {
    samples: Vec<BeamSample>,
}

impl BeamSampleStream {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a stream, rejecting any sample that does not strictly follow
    /// its predecessor.
    pub fn from_samples(samples: Vec<BeamSample>) -> Result<Self> {
        for (index, pair) in samples.windows(2).enumerate() {
            check_order(index + 1, pair[0].timestamp, pair[1].timestamp)?;
        }
        if let Some(first) = samples.first() {
            if !first.timestamp.is_finite() {
                return Err(FluenceError::StreamOrderingViolation(
                    OrderingViolation::BeamSample {
                        index: 0,
                        previous: f64::NEG_INFINITY,
                        timestamp: first.timestamp,
                    },
                ));
            }
        }
        Ok(Self { samples })
    }

    /// Appends a sample.
    pub fn push(&mut self, sample: BeamSample) -> Result<()> {
        let previous = self
            .samples
            .last()
            .map(|s| s.timestamp)
            .unwrap_or(f64::NEG_INFINITY);
        check_order(self.samples.len(), previous, sample.timestamp)?;
        self.samples.push(sample);
        Ok(())
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the stream holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// All samples in time order.
    pub fn samples(&self) -> &[BeamSample] {
        &self.samples
    }

    /// Timestamp of the newest sample.
    pub fn last_timestamp(&self) -> Option<f64> {
        self.samples.last().map(|s| s.timestamp)
    }

    /// Opens a forward-only cursor at the start of the stream.
    pub fn cursor(&self) -> BeamCursor<'_> {
        BeamCursor {
            samples: &self.samples,
            position: 0,
        }
    }

    /// Opens a cursor at a saved position, clamped to the stream length.
    pub fn cursor_at(&self, position: usize) -> BeamCursor<'_> {
        BeamCursor {
            samples: &self.samples,
            position: position.min(self.samples.len()),
        }
    }

    /// Wait and scan windows of a row, found by binary search.
    ///
    /// `previous_stop` is the stop timestamp of the preceding row, `None` for
    /// the first row. Gives the same windows as a [`BeamCursor`] that has
    /// visited the preceding rows.
    pub fn row_window(&self, previous_stop: Option<f64>, start: f64, stop: f64) -> RowWindow<'_> {
        let lower = previous_stop
            .map(|t| self.samples.partition_point(|s| s.timestamp <= t))
            .unwrap_or(0);
        split_row(&self.samples, lower, start, stop).0
    }

    /// Current at `timestamp`, linearly interpolated and clamped to the
    /// first and last sample. `None` for an empty stream.
    pub fn current_at(&self, timestamp: f64) -> Option<f64> {
        interpolate_current(&self.samples, timestamp)
    }

    /// Samples with `start <= timestamp <= stop`.
    pub fn window(&self, start: f64, stop: f64) -> &[BeamSample] {
        let lo = self.samples.partition_point(|s| s.timestamp < start);
        let hi = self.samples.partition_point(|s| s.timestamp <= stop);
        &self.samples[lo..hi.max(lo)]
    }
}

impl TryFrom<Vec<BeamSample>> for BeamSampleStream {
    type Error = FluenceError;

    fn try_from(samples: Vec<BeamSample>) -> Result<Self> {
        Self::from_samples(samples)
    }
}

impl From<BeamSampleStream> for Vec<BeamSample> {
    fn from(stream: BeamSampleStream) -> Self {
        stream.samples
    }
}

fn check_order(index: usize, previous: f64, timestamp: f64) -> Result<()> {
    if timestamp.is_finite() && timestamp > previous {
        Ok(())
    } else {
        Err(FluenceError::StreamOrderingViolation(
            OrderingViolation::BeamSample {
                index,
                previous,
                timestamp,
            },
        ))
    }
}

/// Samples relevant to one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowWindow<'a> {
    /// Samples taken while the beam waited for the row to start.
    pub wait: &'a [BeamSample],
    /// Samples taken while the row was scanned.
    pub scan: &'a [BeamSample],
}

/// Forward-only cursor over a [`BeamSampleStream`].
///
/// Each call to [`next_row`](Self::next_row) consumes the samples up to the
/// row's stop timestamp.
#[derive(Debug, Clone)]
pub struct BeamCursor<'a> {
    samples: &'a [BeamSample],
    position: usize,
}

impl<'a> BeamCursor<'a> {
    /// Index of the first sample not yet consumed.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Samples not yet consumed.
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }

    /// Splits the unconsumed samples for a row and advances past its stop.
    pub fn next_row(&mut self, start: f64, stop: f64) -> RowWindow<'a> {
        let (window, next) = split_row(self.samples, self.position, start, stop);
        self.position = next;
        window
    }
}

fn split_row(samples: &[BeamSample], lower: usize, start: f64, stop: f64) -> (RowWindow<'_>, usize) {
    let rest = &samples[lower..];
    let start_idx = rest.partition_point(|s| s.timestamp < start);
    let stop_idx = rest.partition_point(|s| s.timestamp <= stop).max(start_idx);
    (
        RowWindow {
            wait: &rest[..start_idx],
            scan: &rest[start_idx..stop_idx],
        },
        lower + stop_idx,
    )
}

/// Linear interpolation over time-ordered samples, clamped at both ends.
pub(crate) fn interpolate_current(samples: &[BeamSample], timestamp: f64) -> Option<f64> {
    let first = samples.first()?;
    let last = samples.last()?;
    if timestamp <= first.timestamp {
        return Some(first.current);
    }
    if timestamp >= last.timestamp {
        return Some(last.current);
    }

    let upper = samples.partition_point(|s| s.timestamp <= timestamp);
    let (a, b) = (samples[upper - 1], samples[upper]);
    let fraction = (timestamp - a.timestamp) / (b.timestamp - a.timestamp);
    Some(a.current + fraction * (b.current - a.current))
}

/// Interpolates inside a scan window, falling back to the whole stream when
/// the window holds no samples.
pub(crate) fn scan_current_at(window: &[BeamSample], stream: &[BeamSample], timestamp: f64) -> f64 {
    if let Some(current) = interpolate_current(window, timestamp) {
        return current;
    }
    match interpolate_current(stream, timestamp) {
        Some(current) => current,
        None => {
            warn!(timestamp, "No beam samples available, assuming zero current");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(points: &[(f64, f64)]) -> BeamSampleStream {
        BeamSampleStream::from_samples(
            points
                .iter()
                .map(|&(t, i)| BeamSample::new(t, i))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_non_increasing_timestamps() {
        let err = BeamSampleStream::from_samples(vec![
            BeamSample::new(0.0, 1.0),
            BeamSample::new(1.0, 1.0),
            BeamSample::new(1.0, 1.0),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            FluenceError::StreamOrderingViolation(OrderingViolation::BeamSample { index: 2, .. })
        ));
    }

    #[test]
    fn test_push_enforces_order() {
        let mut s = BeamSampleStream::new();
        s.push(BeamSample::new(1.0, 0.0)).unwrap();
        assert!(s.push(BeamSample::new(0.5, 0.0)).is_err());
        assert!(s.push(BeamSample::new(f64::NAN, 0.0)).is_err());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_interpolation_is_clamped() {
        let s = stream(&[(0.0, 1.0), (2.0, 3.0)]);
        assert_eq!(s.current_at(-1.0), Some(1.0));
        assert_eq!(s.current_at(1.0), Some(2.0));
        assert_eq!(s.current_at(5.0), Some(3.0));
        assert_eq!(BeamSampleStream::new().current_at(1.0), None);
    }

    #[test]
    fn test_cursor_splits_wait_and_scan() {
        let s = stream(&[
            (0.0, 0.0),
            (1.0, 0.0),
            (2.0, 0.0),
            (3.0, 0.0),
            (4.0, 0.0),
            (5.0, 0.0),
            (6.0, 0.0),
        ]);
        let mut cursor = s.cursor();

        let first = cursor.next_row(1.0, 2.5);
        assert_eq!(first.wait.len(), 1);
        assert_eq!(first.scan.len(), 2);
        assert_eq!(cursor.position(), 3);

        let second = cursor.next_row(4.0, 5.0);
        assert_eq!(second.wait.len(), 1);
        assert_eq!(second.wait[0].timestamp, 3.0);
        assert_eq!(second.scan.len(), 2);
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    fn test_binary_search_matches_cursor() {
        let s = stream(&(0..100).map(|i| (i as f64 * 0.1, i as f64)).collect::<Vec<_>>());
        let rows = [(0.05, 1.0), (1.3, 2.2), (2.2, 4.0), (5.5, 9.95)];

        let mut cursor = s.cursor();
        let mut previous_stop = None;
        for &(start, stop) in &rows {
            assert_eq!(cursor.next_row(start, stop), s.row_window(previous_stop, start, stop));
            previous_stop = Some(stop);
        }
    }

    #[test]
    fn test_window_inclusive() {
        let s = stream(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        assert_eq!(s.window(1.0, 2.0).len(), 2);
        assert!(s.window(1.2, 1.8).is_empty());
    }

    #[test]
    fn test_empty_scan_window_falls_back_to_stream() {
        let s = stream(&[(0.0, 0.0), (10.0, 10.0)]);
        let window = s.window(4.0, 6.0);
        assert!(window.is_empty());
        assert!((scan_current_at(window, s.samples(), 5.0) - 5.0).abs() < 1e-12);
        assert_eq!(scan_current_at(&[], &[], 5.0), 0.0);
    }

    #[test]
    fn test_serde_validates_order() {
        let json = r#"[{"timestamp": 2.0, "current": 1.0}, {"timestamp": 1.0, "current": 1.0}]"#;
        assert!(serde_json::from_str::<BeamSampleStream>(json).is_err());

        let ok = r#"[{"timestamp": 1.0, "current": 1.0}, {"timestamp": 2.0, "current": 1.0}]"#;
        assert_eq!(serde_json::from_str::<BeamSampleStream>(ok).unwrap().len(), 2);
    }
}

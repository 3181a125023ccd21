//! Beam-quality monitor driving the scan pause signal.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::fluence::BeamSample;
use crate::scan::ScanSignals;

/// Time the current must stay above threshold before the pause is lifted.
pub const DEFAULT_RECOVERY: Duration = Duration::from_secs(1);

/// Pauses the scan while the beam current is below a threshold.
///
/// The pause is set on the first low sample and cleared once no low sample
/// has been seen for the recovery time. While the beam is down, every low
/// sample re-asserts the pause if something else cleared it, e.g. the
/// signal reset at the end of a scan.
#[derive(Debug)]
pub struct BeamQualityMonitor {
    min_current: f64,
    recovery: Duration,
    signals: Arc<ScanSignals>,
    beam_down: bool,
    last_low: f64,
}

impl BeamQualityMonitor {
    /// Monitors against `min_current` in A.
    pub fn new(min_current: f64, signals: Arc<ScanSignals>) -> Self {
        Self {
            min_current,
            recovery: DEFAULT_RECOVERY,
            signals,
            beam_down: false,
            last_low: f64::NEG_INFINITY,
        }
    }

    /// Sets the recovery time.
    pub fn with_recovery(mut self, recovery: Duration) -> Self {
        self.recovery = recovery;
        self
    }

    /// Whether the monitor currently holds the pause.
    pub fn is_beam_down(&self) -> bool {
        self.beam_down
    }

    /// Feeds one sample. Returns the new pause state when it changed.
    pub fn observe(&mut self, sample: BeamSample) -> Option<bool> {
        if sample.current < self.min_current {
            self.last_low = sample.timestamp;
            if !self.beam_down {
                self.beam_down = true;
                warn!(
                    current = sample.current,
                    min_current = self.min_current,
                    "Beam current below threshold, pausing scan"
                );
                self.signals.set_pause(true);
                return Some(true);
            }
            if !self.signals.is_paused() {
                info!(current = sample.current, "Beam still down, pause re-asserted");
                self.signals.set_pause(true);
                return Some(true);
            }
        } else if self.beam_down
            && sample.timestamp - self.last_low > self.recovery.as_secs_f64()
        {
            self.beam_down = false;
            info!(current = sample.current, "Beam recovered, resuming scan");
            self.signals.set_pause(false);
            return Some(false);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_and_recovery() {
        let signals = Arc::new(ScanSignals::new());
        let mut monitor = BeamQualityMonitor::new(0.5e-9, Arc::clone(&signals));

        assert_eq!(monitor.observe(BeamSample::new(0.0, 1e-9)), None);
        assert_eq!(monitor.observe(BeamSample::new(0.1, 0.0)), Some(true));
        assert!(signals.is_paused());
        assert_eq!(monitor.observe(BeamSample::new(0.2, 0.0)), None);

        // Back above threshold but within the recovery time
        assert_eq!(monitor.observe(BeamSample::new(0.8, 1e-9)), None);
        assert!(signals.is_paused());

        assert_eq!(monitor.observe(BeamSample::new(1.3, 1e-9)), Some(false));
        assert!(!signals.is_paused());
        assert!(!monitor.is_beam_down());
    }

    #[test]
    fn test_pause_reasserted_after_signal_reset() {
        let signals = Arc::new(ScanSignals::new());
        let mut monitor = BeamQualityMonitor::new(0.5e-9, Arc::clone(&signals));

        assert_eq!(monitor.observe(BeamSample::new(0.0, 0.0)), Some(true));

        // End-of-scan cleanup clears every signal while the beam is still down
        signals.reset();
        assert!(!signals.is_paused());
        assert!(monitor.is_beam_down());

        assert_eq!(monitor.observe(BeamSample::new(0.1, 0.0)), Some(true));
        assert!(signals.is_paused());
        assert_eq!(monitor.observe(BeamSample::new(0.2, 0.0)), None);

        assert_eq!(monitor.observe(BeamSample::new(1.3, 1e-9)), Some(false));
        assert!(!signals.is_paused());
    }

    #[test]
    fn test_recovery_restarts_on_new_dip() {
        let signals = Arc::new(ScanSignals::new());
        let mut monitor = BeamQualityMonitor::new(0.5e-9, Arc::clone(&signals))
            .with_recovery(Duration::from_millis(500));

        monitor.observe(BeamSample::new(0.0, 0.0));
        monitor.observe(BeamSample::new(0.4, 0.1e-9));
        assert_eq!(monitor.observe(BeamSample::new(0.6, 1e-9)), None);
        assert_eq!(monitor.observe(BeamSample::new(1.0, 1e-9)), Some(false));
    }
}

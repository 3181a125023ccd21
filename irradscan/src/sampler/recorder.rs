//! Background thread recording beam current into a shared stream.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::monitor::BeamQualityMonitor;
use super::source::{CurrentSource, Result, SamplerError};
use crate::clock::now_timestamp;
use crate::fluence::{BeamSample, BeamSampleStream};

/// Default sampling rate in Hz.
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 20.0;

/// Name of the sampler thread.
pub const SAMPLER_THREAD_NAME: &str = "beam-sampler";

/// Counters reported when a sampler stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Samples appended to the stream.
    pub samples: u64,
    /// Failed reads.
    pub read_errors: u64,
    /// Readings dropped because their timestamp did not advance.
    pub skipped: u64,
}

/// Handle to a running sampler thread.
///
/// Dropping the handle stops the thread and waits for it.
#[derive(Debug)]
pub struct SamplerHandle {
    stream: Arc<RwLock<BeamSampleStream>>,
    token: CancellationToken,
    handle: Option<JoinHandle<SamplerStats>>,
}

impl SamplerHandle {
    /// Starts sampling `source` at `rate_hz` into a fresh stream.
    ///
    /// Every sample is also fed to `monitor`, if given.
    pub fn spawn(
        source: Box<dyn CurrentSource>,
        rate_hz: f64,
        monitor: Option<BeamQualityMonitor>,
    ) -> Result<Self> {
        if !(rate_hz.is_finite() && rate_hz > 0.0) {
            return Err(SamplerError::InvalidRate(rate_hz));
        }

        let stream = Arc::new(RwLock::new(BeamSampleStream::new()));
        let token = CancellationToken::new();
        let period = Duration::from_secs_f64(1.0 / rate_hz);

        let thread_stream = Arc::clone(&stream);
        let thread_token = token.clone();
        let handle = thread::Builder::new()
            .name(SAMPLER_THREAD_NAME.to_string())
            .spawn(move || run(source, period, monitor, &thread_stream, &thread_token))
            .map_err(SamplerError::Spawn)?;

        info!(rate_hz, "Beam sampler started");
        Ok(Self {
            stream,
            token,
            handle: Some(handle),
        })
    }

    /// Shared stream the thread appends to.
    pub fn stream(&self) -> Arc<RwLock<BeamSampleStream>> {
        Arc::clone(&self.stream)
    }

    /// Copy of the samples recorded so far.
    pub fn snapshot(&self) -> BeamSampleStream {
        self.stream.read().clone()
    }

    /// Stops the thread and returns its counters.
    pub fn stop(mut self) -> SamplerStats {
        self.token.cancel();
        let stats = self
            .handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        info!(
            samples = stats.samples,
            read_errors = stats.read_errors,
            "Beam sampler stopped"
        );
        stats
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

fn run(
    mut source: Box<dyn CurrentSource>,
    period: Duration,
    mut monitor: Option<BeamQualityMonitor>,
    stream: &RwLock<BeamSampleStream>,
    token: &CancellationToken,
) -> SamplerStats {
    let mut stats = SamplerStats::default();
    let started = Instant::now();
    let mut next_tick = started;

    while !token.is_cancelled() {
        match source.read_current(started.elapsed().as_secs_f64()) {
            Ok(current) => {
                let sample = BeamSample::new(now_timestamp(), current);
                if stream.write().push(sample).is_ok() {
                    stats.samples += 1;
                    if let Some(monitor) = monitor.as_mut() {
                        monitor.observe(sample);
                    }
                } else {
                    stats.skipped += 1;
                    trace!(timestamp = sample.timestamp, "Sample timestamp did not advance");
                }
            }
            Err(e) => {
                stats.read_errors += 1;
                warn!(source = source.name(), error = %e, "Beam current read failed");
            }
        }

        next_tick += period;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }

    debug!(samples = stats.samples, "Sampler loop exited");
    stats
}

//! Beam current sampling.
//!
//! A [`CurrentSource`] is polled at a fixed rate on its own thread and every
//! reading is appended to a shared [`BeamSampleStream`](crate::fluence::BeamSampleStream).
//! An optional [`BeamQualityMonitor`] watches the same readings and pauses
//! the scan while the beam is down.
//!
//! ```text
//! CurrentSource ──► "beam-sampler" thread ──► Arc<RwLock<BeamSampleStream>>
//!                          │
//!                          └──► BeamQualityMonitor ──► ScanSignals::set_pause
//! ```

mod monitor;
mod recorder;
mod source;

pub use monitor::{BeamQualityMonitor, DEFAULT_RECOVERY};
pub use recorder::{SamplerHandle, SamplerStats, DEFAULT_SAMPLE_RATE_HZ, SAMPLER_THREAD_NAME};
pub use source::{ConstantCurrent, CurrentSource, Result, SamplerError};

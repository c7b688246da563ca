//! km-dsp: filtered average-loudness engine for K-System metering.
//!
//! Realtime DSP core that turns a stream of multichannel PCM blocks into
//! calibrated average-level readings for a K-20 / K-14 / K-12 style meter.
//! Two interchangeable measurement algorithms:
//!
//! - band-limited RMS (21 kHz linear-phase FIR via FFT overlap-add, plus a
//!   fixed peak-to-average calibration offset), and
//! - ITU-R BS.1770 loudness (two-stage K-weighting IIR cascade, weighted
//!   mean-square summation across channels, LKFS).
//!
//! ## Modules
//! - `ring_buffer` - multichannel FIFO with pre-delayed window reads
//! - `biquad` - block biquad with explicit cross-block history
//! - `fir` - windowed-sinc band-limiting kernel and its spectrum
//! - `convolver` - FFT overlap-add convolution with tail carry-over
//! - `weighting` - BS.1770 pre-filter + RLB cascade
//! - `engine` - the orchestrator the host drives per block
//! - `algorithm`, `channel` - algorithm registry and channel weight map
//!
//! All buffers, kernels and FFT plans are built at construction; the
//! per-block path is allocation-free. Producer and consumer share the audio
//! thread, so no locking is involved anywhere.

pub mod algorithm;
pub mod biquad;
pub mod channel;
pub mod convolver;
pub mod engine;
pub mod error;
pub mod fir;
pub mod ring_buffer;
pub mod weighting;

pub use algorithm::AverageAlgorithm;
pub use biquad::{BiquadCoeffs, BiquadState};
pub use channel::{bs1770_channel_weight, ChannelRole};
pub use convolver::OverlapAddConvolver;
pub use engine::{AverageLevelEngine, MAX_CHANNELS, RMS_PEAK_TO_AVERAGE_DB};
pub use error::{DspError, DspResult};
pub use fir::FirKernel;
pub use ring_buffer::AudioRingBuffer;
pub use weighting::{pre_filter_coeffs, rlb_filter_coeffs, KWeighting, LKFS_OFFSET};

// Re-export the core types the engine API is expressed in.
pub use km_core::{level2decibel, Sample, SampleBlock, METER_MINIMUM_DECIBEL};

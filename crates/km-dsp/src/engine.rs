//! Filtered average-level engine.
//!
//! Per audio block the host writes into a ring buffer, pulls a (possibly
//! pre-delayed) block into the engine, and reads levels back out. Two
//! algorithms drive the measurement:
//!
//! - **Band-limited RMS**: 21 kHz linear-phase low-pass via overlap-add
//!   convolution, per-channel RMS in dBFS plus a fixed peak-to-average
//!   calibration so a full-scale sine reads the same on peak and average
//!   displays.
//! - **ITU-R BS.1770**: K-weighting cascade per channel, band-limit,
//!   channel-weighted mean-square sum, LKFS.
//!
//! The engine owns every buffer, kernel and FFT plan it needs; after
//! construction the block path allocates nothing. Coefficients and kernels
//! are rebuilt in place when the algorithm or the sample rate changes, never
//! mid-block.

use km_core::{level2decibel, Sample, SampleBlock, METER_MINIMUM_DECIBEL};

use crate::algorithm::AverageAlgorithm;
use crate::channel::bs1770_channel_weight;
use crate::convolver::OverlapAddConvolver;
use crate::error::{DspError, DspResult};
use crate::ring_buffer::AudioRingBuffer;
use crate::weighting::{KWeighting, LKFS_OFFSET};

/// Largest channel count the 5.1 weighting table covers.
pub const MAX_CHANNELS: usize = 6;

/// Peak-to-average gain correction for the band-limited RMS algorithm, in
/// dB. Measured during validation against pink noise at -20 dBFS RMS;
/// BS.1770 needs no correction (the -0.691 offset is part of the formula).
pub const RMS_PEAK_TO_AVERAGE_DB: Sample = 2.9881;

/// Average-level measurement engine for one input path.
///
/// `sample_block` is engine-owned scratch: `pull_from` overwrites it with
/// ring-buffer data and each filter pass overwrites it again with filtered
/// samples. Collaborators read it through [`filtered`], [`publish_to`] or
/// [`copy_to`] only.
///
/// [`filtered`]: AverageLevelEngine::filtered
/// [`publish_to`]: AverageLevelEngine::publish_to
/// [`copy_to`]: AverageLevelEngine::copy_to
#[derive(Debug)]
pub struct AverageLevelEngine {
    channels: usize,
    buffer_size: usize,
    sample_rate: u32,
    algorithm: AverageAlgorithm,
    peak_to_average_correction: Sample,
    sample_block: SampleBlock,
    convolver: OverlapAddConvolver,
    weighting: KWeighting,
    /// Per-channel level memo for the current block (RMS mode). Guards the
    /// overlap tails against a channel being filtered twice per block.
    channel_levels: Vec<Option<Sample>>,
    /// Integrated loudness memo for the current block (BS.1770 mode).
    loudness: Option<Sample>,
}

impl AverageLevelEngine {
    /// Create an engine and eagerly build all kernels and coefficients.
    pub fn new(
        channels: usize,
        buffer_size: usize,
        sample_rate: u32,
        algorithm: AverageAlgorithm,
    ) -> DspResult<Self> {
        if channels == 0 {
            return Err(DspError::InvalidArgument("channels must be at least 1"));
        }
        if channels > MAX_CHANNELS {
            return Err(DspError::InvalidArgument("more than 6 channels"));
        }
        if buffer_size == 0 {
            return Err(DspError::InvalidArgument("buffer size must be at least 1"));
        }
        if sample_rate == 0 {
            return Err(DspError::InvalidArgument("sample rate must be positive"));
        }

        let mut engine = Self {
            channels,
            buffer_size,
            sample_rate,
            algorithm,
            peak_to_average_correction: 0.0,
            sample_block: SampleBlock::new(channels, buffer_size),
            convolver: OverlapAddConvolver::new(channels, buffer_size, sample_rate),
            weighting: KWeighting::new(channels, buffer_size, sample_rate),
            channel_levels: vec![None; channels],
            loudness: None,
        };
        engine.apply_calibration();
        Ok(engine)
    }

    /// Currently selected algorithm.
    #[inline]
    pub fn algorithm(&self) -> AverageAlgorithm {
        self.algorithm
    }

    /// Number of channels.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Fixed block size in samples.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Sample rate the current kernels were built for.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Gain added to average readings so peak and average displays agree on
    /// a full-scale sine. 0.0 in BS.1770 mode.
    #[inline]
    pub fn peak_to_average_correction(&self) -> Sample {
        self.peak_to_average_correction
    }

    /// Select the measurement algorithm.
    ///
    /// A no-op if the algorithm is unchanged. Otherwise the FIR kernel and
    /// IIR coefficients are rebuilt and all filter state (overlap tails,
    /// biquad histories, the sample block) is cleared. Returns the algorithm
    /// now in effect, which is the engine's answer to "selection is final".
    pub fn set_algorithm(&mut self, algorithm: AverageAlgorithm) -> AverageAlgorithm {
        if algorithm == self.algorithm {
            return self.algorithm;
        }

        log::debug!(
            "average algorithm change: {:?} -> {:?}",
            self.algorithm,
            algorithm
        );
        self.algorithm = algorithm;
        self.rebuild();
        self.algorithm
    }

    /// Pull one block out of the ring buffer into the engine.
    ///
    /// If `sample_rate` differs from the rate the kernels were built for,
    /// everything is rebuilt *before* any samples are consumed. The read
    /// ends `pre_delay` samples behind the ring's write cursor.
    pub fn pull_from(&mut self, ring: &AudioRingBuffer, pre_delay: usize, sample_rate: u32) {
        if sample_rate != self.sample_rate {
            log::debug!(
                "sample rate change: {} Hz -> {} Hz, rebuilding filters",
                self.sample_rate,
                sample_rate
            );
            self.sample_rate = sample_rate;
            self.rebuild();
        }

        ring.read_into(&mut self.sample_block, pre_delay);
        self.invalidate();
    }

    /// Average level of `channel` for the pulled block.
    ///
    /// In RMS mode this filters that channel (once; repeated calls return
    /// the memoized value) and returns dBFS plus the peak-to-average
    /// correction. In BS.1770 mode the first call filters *all* channels and
    /// every channel returns the same integrated loudness in LKFS — see
    /// [`compute_block`].
    ///
    /// Never returns less than `METER_MINIMUM_DECIBEL`.
    ///
    /// [`compute_block`]: AverageLevelEngine::compute_block
    pub fn level(&mut self, channel: usize) -> DspResult<Sample> {
        if channel >= self.channels {
            return Err(DspError::InvalidArgument("channel out of range"));
        }

        match self.algorithm {
            AverageAlgorithm::ItuBs1770 => Ok(self.compute_block()),
            AverageAlgorithm::RmsBandLimited => {
                if let Some(level) = self.channel_levels[channel] {
                    return Ok(level);
                }

                self.convolver
                    .filter_channel(channel, self.sample_block.channel_mut(channel));

                // A channel at the bottom of the scale stays there; the
                // calibration offset must not lift silence off the floor.
                let raw = level2decibel(self.sample_block.rms(channel));
                let level = if raw <= METER_MINIMUM_DECIBEL {
                    METER_MINIMUM_DECIBEL
                } else {
                    (raw + self.peak_to_average_correction).max(METER_MINIMUM_DECIBEL)
                };
                self.channel_levels[channel] = Some(level);
                Ok(level)
            }
        }
    }

    /// Integrated BS.1770 loudness of the pulled block, in LKFS.
    ///
    /// Filters every channel through the K-weighting cascade and the
    /// band-limiting convolver, sums the weighted per-channel mean squares
    /// (L/R/C at 1.0, surrounds at 1.41, LFE skipped) and converts with
    /// `-0.691 + 10·log10(Σ)`. The result and the filtered block are
    /// memoized until the next `pull_from`, so visualization reads see the
    /// same samples the loudness was computed from.
    pub fn compute_block(&mut self) -> Sample {
        if let Some(loudness) = self.loudness {
            return loudness;
        }

        let mut sum: Sample = 0.0;
        for channel in 0..self.channels {
            self.weighting
                .process_channel(channel, self.sample_block.channel_mut(channel));
            self.convolver
                .filter_channel(channel, self.sample_block.channel_mut(channel));
            sum += bs1770_channel_weight(channel) * self.sample_block.mean_square(channel);
        }

        let loudness = if sum > 0.0 {
            (LKFS_OFFSET + 10.0 * sum.log10()).max(METER_MINIMUM_DECIBEL)
        } else {
            METER_MINIMUM_DECIBEL
        };

        self.loudness = Some(loudness);
        loudness
    }

    /// Read-only view of one channel of the (filtered) sample block.
    pub fn filtered(&self, channel: usize) -> &[Sample] {
        self.sample_block.channel(channel)
    }

    /// Append the current sample block to an output ring buffer (listen /
    /// oscilloscope path).
    pub fn publish_to(&self, ring: &mut AudioRingBuffer) -> DspResult<()> {
        ring.write(&self.sample_block)
    }

    /// Copy `count` samples of one channel of the sample block into `dest`
    /// starting at `dest_start`.
    pub fn copy_to(
        &self,
        dest: &mut SampleBlock,
        channel: usize,
        dest_start: usize,
        count: usize,
    ) -> DspResult<()> {
        if channel >= self.channels {
            return Err(DspError::InvalidArgument("channel out of range"));
        }
        if count > self.buffer_size || dest_start + count > dest.len() {
            return Err(DspError::InvalidArgument("copy range out of bounds"));
        }

        dest.channel_mut(channel)[dest_start..dest_start + count]
            .copy_from_slice(&self.sample_block.channel(channel)[..count]);
        Ok(())
    }

    /// Rebuild kernels and coefficients for the current algorithm and
    /// sample rate, clearing all filter state.
    fn rebuild(&mut self) {
        self.convolver.rebuild(self.sample_rate);
        self.weighting.rebuild(self.sample_rate);
        self.sample_block.clear();
        self.invalidate();
        self.apply_calibration();
    }

    fn apply_calibration(&mut self) {
        self.peak_to_average_correction = match self.algorithm {
            AverageAlgorithm::ItuBs1770 => 0.0,
            AverageAlgorithm::RmsBandLimited => RMS_PEAK_TO_AVERAGE_DB,
        };
    }

    /// Forget the per-block memos (new block incoming).
    fn invalidate(&mut self) {
        self.channel_levels.fill(None);
        self.loudness = None;
    }
}

//! ITU-R BS.1770 K-weighting: pre-filter and RLB cascade.
//!
//! Coefficients follow the unofficial BS.1770 filter specification
//! (Raiden's bilinear-transform parametrization): a high-shelf-like
//! pre-filter at 1681.97 Hz and the RLB high-pass at 38.135 Hz. The design
//! math runs in f64 and is truncated to f32 rows; at 48 kHz the results
//! reproduce the reference coefficient table from the recommendation.
//!
//! Note the asymmetry between the two stages: the RLB feed-forward row is
//! normalized by its own divisor `Vl·ω² + Vb·ωQ + Vh`, which bakes the
//! shelf's DC pre-gain into the row instead of applying it separately.

use std::f64::consts::PI;

use km_core::Sample;

use crate::biquad::{BiquadCoeffs, BiquadState};

/// LKFS offset from the recommendation: loudness = -0.691 + 10·log10(Σ).
pub const LKFS_OFFSET: Sample = -0.691;

// Pre-filter parameters (ITU-R BS.1770-1)
const PRE_VH: f64 = 1.584864701130855;
const PRE_VL: f64 = 1.0;
const PRE_Q: f64 = 0.7071752369554196;
const PRE_CUTOFF_HZ: f64 = 1681.974450955533;

// RLB weighting curve parameters (ITU-R BS.1770-1)
const RLB_VH: f64 = 1.0;
const RLB_VB: f64 = 0.0;
const RLB_VL: f64 = 0.0;
const RLB_Q: f64 = 0.5003270373238773;
const RLB_CUTOFF_HZ: f64 = 38.13547087602444;

/// Pre-filter (high-shelf) coefficients for the given sample rate.
pub fn pre_filter_coeffs(sample_rate: u32) -> BiquadCoeffs {
    let vh = PRE_VH;
    let vb = PRE_VH.sqrt();
    let vl = PRE_VL;

    let omega = (PI * PRE_CUTOFF_HZ / sample_rate as f64).tan();
    let omega_2 = omega * omega;
    let omega_q = omega / PRE_Q;
    let div = omega_2 + omega_q + 1.0;

    BiquadCoeffs {
        feedforward: [
            ((vl * omega_2 + vb * omega_q + vh) / div) as Sample,
            (2.0 * (vl * omega_2 - vh) / div) as Sample,
            ((vl * omega_2 - vb * omega_q + vh) / div) as Sample,
        ],
        feedback: [
            -1.0,
            (-2.0 * (omega_2 - 1.0) / div) as Sample,
            (-(omega_2 - omega_q + 1.0) / div) as Sample,
        ],
    }
}

/// RLB (high-pass) coefficients for the given sample rate.
///
/// The feed-forward row normalizes by `Vl·ω² + Vb·ωQ + Vh` rather than the
/// feedback divisor; with the RLB parameters that makes `b0` exactly 1.
pub fn rlb_filter_coeffs(sample_rate: u32) -> BiquadCoeffs {
    let omega = (PI * RLB_CUTOFF_HZ / sample_rate as f64).tan();
    let omega_2 = omega * omega;
    let omega_q = omega / RLB_Q;
    let div_1 = RLB_VL * omega_2 + RLB_VB * omega_q + RLB_VH;
    let div_2 = omega_2 + omega_q + 1.0;

    BiquadCoeffs {
        feedforward: [
            1.0,
            (2.0 * (RLB_VL * omega_2 - RLB_VH) / div_1) as Sample,
            ((RLB_VL * omega_2 - RLB_VB * omega_q + RLB_VH) / div_1) as Sample,
        ],
        feedback: [
            -1.0,
            (-2.0 * (omega_2 - 1.0) / div_2) as Sample,
            (-(omega_2 - omega_q + 1.0) / div_2) as Sample,
        ],
    }
}

/// Per-channel K-weighting cascade with persistent cross-block state.
#[derive(Debug, Clone)]
pub struct KWeighting {
    pre_coeffs: BiquadCoeffs,
    rlb_coeffs: BiquadCoeffs,
    pre_states: Vec<BiquadState>,
    rlb_states: Vec<BiquadState>,
    /// Filter output for the channel being processed.
    scratch: Vec<Sample>,
}

impl KWeighting {
    /// Build the cascade for `channels` channels of `buffer_size` blocks.
    pub fn new(channels: usize, buffer_size: usize, sample_rate: u32) -> Self {
        Self {
            pre_coeffs: pre_filter_coeffs(sample_rate),
            rlb_coeffs: rlb_filter_coeffs(sample_rate),
            pre_states: vec![BiquadState::default(); channels],
            rlb_states: vec![BiquadState::default(); channels],
            scratch: vec![0.0; buffer_size],
        }
    }

    /// Recompute both coefficient sets for a new sample rate and clear all
    /// channel histories.
    pub fn rebuild(&mut self, sample_rate: u32) {
        self.pre_coeffs = pre_filter_coeffs(sample_rate);
        self.rlb_coeffs = rlb_filter_coeffs(sample_rate);
        self.reset();
    }

    /// Clear all channel histories.
    pub fn reset(&mut self) {
        for state in &mut self.pre_states {
            state.reset();
        }
        for state in &mut self.rlb_states {
            state.reset();
        }
    }

    /// Run one channel's block through pre-filter then RLB, in place.
    pub fn process_channel(&mut self, channel: usize, samples: &mut [Sample]) {
        let scratch = &mut self.scratch[..samples.len()];

        let state = &mut self.pre_states[channel];
        state.process(&self.pre_coeffs, samples, scratch);
        state.push_history(samples, scratch);
        samples.copy_from_slice(scratch);

        let state = &mut self.rlb_states[channel];
        state.process(&self.rlb_coeffs, samples, scratch);
        state.push_history(samples, scratch);
        samples.copy_from_slice(scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference coefficients at 48 kHz from ITU-R BS.1770 (feedback signs
    /// flipped to this crate's pre-negated convention).
    #[test]
    fn test_pre_filter_matches_itu_reference_at_48k() {
        let c = pre_filter_coeffs(48_000);
        let expected_ff = [1.535_124_9, -2.691_696_2, 1.198_392_8];
        let expected_fb = [1.690_659_3, -0.732_480_8];

        for i in 0..3 {
            assert!(
                (c.feedforward[i] - expected_ff[i]).abs() < 1e-4,
                "b{i}: {} vs {}",
                c.feedforward[i],
                expected_ff[i]
            );
        }
        assert!((c.feedback[1] - expected_fb[0]).abs() < 1e-4);
        assert!((c.feedback[2] - expected_fb[1]).abs() < 1e-4);
    }

    #[test]
    fn test_rlb_matches_itu_reference_at_48k() {
        let c = rlb_filter_coeffs(48_000);
        assert!((c.feedforward[0] - 1.0).abs() < 1e-6);
        assert!((c.feedforward[1] - (-2.0)).abs() < 1e-6);
        assert!((c.feedforward[2] - 1.0).abs() < 1e-6);
        assert!((c.feedback[1] - 1.990_047_5).abs() < 1e-4);
        assert!((c.feedback[2] - (-0.990_072_3)).abs() < 1e-4);
    }

    #[test]
    fn test_rlb_blocks_dc() {
        let mut weighting = KWeighting::new(1, 512, 48_000);

        let mut block = vec![1.0; 512];
        for _ in 0..200 {
            block.iter_mut().for_each(|x| *x = 1.0);
            weighting.process_channel(0, &mut block);
        }
        // After ~2 seconds of DC the high-pass output has decayed away.
        assert!(
            block[511].abs() < 1e-2,
            "DC leaked through RLB: {}",
            block[511]
        );
    }

    #[test]
    fn test_unity_region_at_1khz() {
        // K-weighting is close to flat around 1 kHz; a 1 kHz sine should
        // come out within about a dB of its input level.
        let sr = 48_000u32;
        let mut weighting = KWeighting::new(1, 1024, sr);

        let mut filtered_ms = 0.0f64;
        let blocks = 40;
        for b in 0..blocks {
            let mut block: Vec<Sample> = (0..1024)
                .map(|i| {
                    let n = (b * 1024 + i) as f64;
                    (2.0 * PI * 1000.0 * n / sr as f64).sin() as Sample
                })
                .collect();
            weighting.process_channel(0, &mut block);
            if b >= blocks / 2 {
                filtered_ms += block.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>();
            }
        }
        filtered_ms /= (blocks / 2 * 1024) as f64;

        let gain_db = 10.0 * (filtered_ms / 0.5).log10();
        assert!(
            gain_db.abs() < 1.0,
            "1 kHz K-weighting gain out of range: {gain_db} dB"
        );
    }

    #[test]
    fn test_rebuild_resets_state() {
        let mut weighting = KWeighting::new(1, 64, 48_000);

        let mut block = vec![1.0; 64];
        weighting.process_channel(0, &mut block);

        weighting.rebuild(48_000);

        // A silent block after a rebuild must stay silent.
        let mut silent = vec![0.0; 64];
        weighting.process_channel(0, &mut silent);
        assert!(silent.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut weighting = KWeighting::new(2, 64, 48_000);

        let mut active = vec![0.5; 64];
        weighting.process_channel(0, &mut active);

        let mut silent = vec![0.0; 64];
        weighting.process_channel(1, &mut silent);
        assert!(silent.iter().all(|&x| x == 0.0));
    }
}

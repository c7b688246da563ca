//! Block-processing biquad with explicit cross-block history.
//!
//! The K-weighting stages filter whole blocks at a time, so instead of the
//! usual per-sample `z1`/`z2` state this biquad keeps the last two input and
//! output samples of the previous block and reaches into them for the first
//! two samples of the next one. Processing and history update are separate
//! steps: `process` is pure with respect to the state, `push_history` commits
//! a finished block.

use km_core::Sample;

/// Outputs with magnitude below this are written as exactly 0.0
/// (1e-20 corresponds to -400 dBFS). Keeps denormals out of the feedback
/// path, where they stall some CPUs.
const DENORMAL_FLUSH: Sample = 1e-20;

/// Second-order filter coefficients.
///
/// Row layout follows the bilinear-transform tables: `feedforward` holds
/// `b0, b1, b2`; `feedback` holds the *negated* `a1, a2` at indices 1 and 2,
/// so the difference equation is a plain sum:
///
/// ```text
/// y[n] = ff[0]·x[n] + ff[1]·x[n-1] + ff[2]·x[n-2]
///      + fb[1]·y[n-1] + fb[2]·y[n-2]
/// ```
///
/// `feedback[0]` is fixed at -1.0 and never read; it mirrors the `a0` slot
/// of the coefficient tables this layout was lifted from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub feedforward: [Sample; 3],
    pub feedback: [Sample; 3],
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::bypass()
    }
}

impl BiquadCoeffs {
    /// Unity-gain passthrough.
    pub fn bypass() -> Self {
        Self {
            feedforward: [1.0, 0.0, 0.0],
            feedback: [-1.0, 0.0, 0.0],
        }
    }

    /// Zeroed coefficients (silence), used while a rebuild is pending.
    pub fn zeroed() -> Self {
        Self {
            feedforward: [0.0; 3],
            feedback: [-1.0, 0.0, 0.0],
        }
    }
}

/// Per-channel biquad history: the last two input and output samples of the
/// previously processed block. Index 0 is the older sample (`n-2`), index 1
/// the newer (`n-1`).
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    input: [Sample; 2],
    output: [Sample; 2],
}

impl BiquadState {
    /// Apply the biquad to `input`, writing into `output`.
    ///
    /// The first two samples reach into the stored history; the state itself
    /// is not modified (call [`push_history`] once the block is accepted).
    /// Every output sample passes the denormal flush.
    ///
    /// [`push_history`]: BiquadState::push_history
    pub fn process(&self, coeffs: &BiquadCoeffs, input: &[Sample], output: &mut [Sample]) {
        debug_assert_eq!(input.len(), output.len());

        let ff = &coeffs.feedforward;
        let fb = &coeffs.feedback;

        for n in 0..input.len() {
            let (x1, x2) = match n {
                0 => (self.input[1], self.input[0]),
                1 => (input[0], self.input[1]),
                _ => (input[n - 1], input[n - 2]),
            };
            let (y1, y2) = match n {
                0 => (self.output[1], self.output[0]),
                1 => (output[0], self.output[1]),
                _ => (output[n - 1], output[n - 2]),
            };

            let mut y = ff[0] * input[n] + ff[1] * x1 + ff[2] * x2 + fb[1] * y1 + fb[2] * y2;

            if y.abs() < DENORMAL_FLUSH {
                y = 0.0;
            }

            output[n] = y;
        }
    }

    /// Commit a processed block: store its trailing two input and output
    /// samples as the history for the next block.
    pub fn push_history(&mut self, input: &[Sample], output: &[Sample]) {
        debug_assert_eq!(input.len(), output.len());

        match input.len() {
            0 => {}
            1 => {
                self.input = [self.input[1], input[0]];
                self.output = [self.output[1], output[0]];
            }
            n => {
                self.input = [input[n - 2], input[n - 1]];
                self.output = [output[n - 2], output[n - 1]];
            }
        }
    }

    /// Clear the history (used on every coefficient rebuild).
    pub fn reset(&mut self) {
        self.input = [0.0; 2];
        self.output = [0.0; 2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A mild, stable low-pass used purely as test vehicle.
    fn test_coeffs() -> BiquadCoeffs {
        BiquadCoeffs {
            feedforward: [0.2, 0.3, 0.1],
            feedback: [-1.0, 0.4, -0.1],
        }
    }

    #[test]
    fn test_bypass_is_identity() {
        let coeffs = BiquadCoeffs::bypass();
        let state = BiquadState::default();
        let input = [0.5, -0.25, 1.0, 0.0];
        let mut output = [0.0; 4];
        state.process(&coeffs, &input, &mut output);
        assert_eq!(output, input);
    }

    #[test]
    fn test_block_split_matches_single_pass() {
        let coeffs = test_coeffs();
        let input: Vec<Sample> = (0..64).map(|i| ((i * 7 % 13) as Sample - 6.0) / 6.0).collect();

        // One pass over the whole signal
        let mut whole = vec![0.0; 64];
        let state = BiquadState::default();
        state.process(&coeffs, &input, &mut whole);

        // Two passes of 32 samples with a history push in between
        let mut state = BiquadState::default();
        let mut first = vec![0.0; 32];
        state.process(&coeffs, &input[..32], &mut first);
        state.push_history(&input[..32], &first);
        let mut second = vec![0.0; 32];
        state.process(&coeffs, &input[32..], &mut second);

        for i in 0..32 {
            assert!(
                (whole[i] - first[i]).abs() < 1e-6,
                "sample {i}: {} vs {}",
                whole[i],
                first[i]
            );
            assert!(
                (whole[32 + i] - second[i]).abs() < 1e-6,
                "sample {}: {} vs {}",
                32 + i,
                whole[32 + i],
                second[i]
            );
        }
    }

    #[test]
    fn test_denormal_flush() {
        let coeffs = test_coeffs();
        let state = BiquadState::default();
        let input = [1e-25, -1e-30, 1e-22, 0.0];
        let mut output = [1.0; 4];
        state.process(&coeffs, &input, &mut output);
        assert!(output.iter().all(|&y| y == 0.0));
    }

    #[test]
    fn test_push_history_stores_last_two() {
        let mut state = BiquadState::default();
        let input = [1.0, 2.0, 3.0, 4.0];
        let output = [5.0, 6.0, 7.0, 8.0];
        state.push_history(&input, &output);
        assert_eq!(state.input, [3.0, 4.0]);
        assert_eq!(state.output, [7.0, 8.0]);
    }

    #[test]
    fn test_push_history_single_sample_shifts() {
        let mut state = BiquadState::default();
        state.push_history(&[1.0], &[2.0]);
        state.push_history(&[3.0], &[4.0]);
        assert_eq!(state.input, [1.0, 3.0]);
        assert_eq!(state.output, [2.0, 4.0]);
    }

    #[test]
    fn test_reset() {
        let mut state = BiquadState::default();
        state.push_history(&[1.0, 2.0], &[3.0, 4.0]);
        state.reset();
        assert_eq!(state.input, [0.0; 2]);
        assert_eq!(state.output, [0.0; 2]);
    }
}

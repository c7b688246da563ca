//! Band-limiting FIR kernel for the average meter.
//!
//! A windowed-sinc low-pass at 21 kHz, one tap longer than the processing
//! block, normalized to unity gain at DC and stored both in the time domain
//! and as the precomputed half-spectrum the overlap-add convolver multiplies
//! with. Rebuilding on a sample-rate change reuses the existing buffers and
//! FFT plan; only the tap values are recomputed.

use std::f64::consts::PI;
use std::sync::Arc;

use realfft::RealToComplex;
use rustfft::num_complex::Complex;

use km_core::Sample;

/// Low-pass cutoff frequency in Hz.
const CUTOFF_HZ: f64 = 21_000.0;

/// Windowed-sinc low-pass kernel with its frequency-domain form.
#[derive(Clone)]
pub struct FirKernel {
    /// Time-domain taps, zero-padded to the FFT size.
    taps: Vec<Sample>,
    /// Scratch copy handed to the FFT (which consumes its input).
    scratch: Vec<Sample>,
    /// Half-spectrum of the padded kernel (`fft_size / 2 + 1` bins).
    spectrum: Vec<Complex<Sample>>,
    buffer_size: usize,
    fft_size: usize,
}

impl FirKernel {
    /// Build a kernel for the given block size and sample rate.
    ///
    /// `fft` must be a real-to-complex plan of size `2 * buffer_size`.
    pub fn new(buffer_size: usize, sample_rate: u32, fft: &Arc<dyn RealToComplex<Sample>>) -> Self {
        let fft_size = buffer_size * 2;
        let mut kernel = Self {
            taps: vec![0.0; fft_size],
            scratch: vec![0.0; fft_size],
            spectrum: vec![Complex::new(0.0, 0.0); fft_size / 2 + 1],
            buffer_size,
            fft_size,
        };
        kernel.rebuild(sample_rate, fft);
        kernel
    }

    /// Recompute the taps and spectrum for a new sample rate, in place.
    pub fn rebuild(&mut self, sample_rate: u32, fft: &Arc<dyn RealToComplex<Sample>>) {
        let n = self.buffer_size + 1;
        let half_n = n / 2;
        // Clamp to the Nyquist limit for low sample rates.
        let fc = (CUTOFF_HZ / sample_rate as f64).min(0.5);

        for i in 0..n {
            let tap = if i == half_n {
                2.0 * PI * fc
            } else {
                let offset = i as f64 - half_n as f64;
                let window = 0.42 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos()
                    + 0.08 * (4.0 * PI * i as f64 / n as f64).cos();
                (2.0 * PI * fc * offset).sin() / offset * window
            };
            self.taps[i] = tap as Sample;
        }

        // Normalize for unity gain at DC.
        let sum: f64 = self.taps[..n].iter().map(|&t| t as f64).sum();
        for tap in &mut self.taps[..n] {
            *tap = (*tap as f64 / sum) as Sample;
        }

        // Zero-pad up to the FFT size.
        self.taps[n..].fill(0.0);

        self.scratch.copy_from_slice(&self.taps);
        fft.process(&mut self.scratch, &mut self.spectrum).ok();
    }

    /// Time-domain taps (zero-padded to the FFT size).
    #[inline]
    pub fn taps(&self) -> &[Sample] {
        &self.taps
    }

    /// Precomputed half-spectrum.
    #[inline]
    pub fn spectrum(&self) -> &[Complex<Sample>] {
        &self.spectrum
    }

    /// FFT size the kernel is padded to (`2 * buffer_size`).
    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

impl std::fmt::Debug for FirKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirKernel")
            .field("buffer_size", &self.buffer_size)
            .field("fft_size", &self.fft_size)
            .finish()
    }
}

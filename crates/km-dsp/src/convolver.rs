//! FFT-based overlap-add convolution against the band-limiting kernel.
//!
//! Each block is zero-padded to twice its length, multiplied with the
//! kernel's half-spectrum, transformed back, and stitched to the previous
//! block by adding the stored tail. The trailing half of every inverse
//! transform becomes the tail for the next call, which makes the block
//! outputs equal to one continuous linear convolution.
//!
//! All plans and scratch buffers are allocated at construction; the audio
//! path performs no allocation.

use std::sync::Arc;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use km_core::Sample;

use crate::fir::FirKernel;

/// Block convolver with per-channel carry-over tails.
pub struct OverlapAddConvolver {
    fft_forward: Arc<dyn RealToComplex<Sample>>,
    fft_inverse: Arc<dyn ComplexToReal<Sample>>,
    kernel: FirKernel,
    /// Time-domain scratch (`fft_size` samples).
    time_td: Vec<Sample>,
    /// Frequency-domain scratch (`fft_size / 2 + 1` bins).
    spec_fd: Vec<Complex<Sample>>,
    /// Trailing half of the previous convolved frame, per channel.
    tails: Vec<Vec<Sample>>,
    buffer_size: usize,
    fft_size: usize,
}

impl OverlapAddConvolver {
    /// Create a convolver with a freshly built kernel.
    pub fn new(channels: usize, buffer_size: usize, sample_rate: u32) -> Self {
        let fft_size = buffer_size * 2;
        let mut planner = RealFftPlanner::<Sample>::new();
        let fft_forward = planner.plan_fft_forward(fft_size);
        let fft_inverse = planner.plan_fft_inverse(fft_size);
        let kernel = FirKernel::new(buffer_size, sample_rate, &fft_forward);

        Self {
            fft_forward,
            fft_inverse,
            kernel,
            time_td: vec![0.0; fft_size],
            spec_fd: vec![Complex::new(0.0, 0.0); fft_size / 2 + 1],
            tails: vec![vec![0.0; buffer_size]; channels],
            buffer_size,
            fft_size,
        }
    }

    /// Rebuild the kernel for a new sample rate and drop all tails.
    pub fn rebuild(&mut self, sample_rate: u32) {
        self.kernel.rebuild(sample_rate, &self.fft_forward);
        self.reset();
    }

    /// Zero the carry-over tails (the kernel is left untouched).
    pub fn reset(&mut self) {
        for tail in &mut self.tails {
            tail.fill(0.0);
        }
    }

    /// Convolve one channel's block in place.
    ///
    /// `samples` must be exactly one block (`buffer_size` samples). The tail
    /// of the previous call is added in and the new tail stored.
    pub fn filter_channel(&mut self, channel: usize, samples: &mut [Sample]) {
        debug_assert_eq!(samples.len(), self.buffer_size);

        self.time_td[..self.buffer_size].copy_from_slice(samples);
        self.time_td[self.buffer_size..].fill(0.0);

        self.fft_forward
            .process(&mut self.time_td, &mut self.spec_fd)
            .ok();

        for (bin, k) in self.spec_fd.iter_mut().zip(self.kernel.spectrum()) {
            *bin *= k;
        }

        // The inverse transform requires exactly-zero imaginary parts at DC
        // and Nyquist.
        self.spec_fd[0].im = 0.0;
        if let Some(last) = self.spec_fd.last_mut() {
            last.im = 0.0;
        }

        self.fft_inverse
            .process(&mut self.spec_fd, &mut self.time_td)
            .ok();

        let norm = 1.0 / self.fft_size as Sample;
        for x in &mut self.time_td {
            *x *= norm;
        }

        let tail = &mut self.tails[channel];
        for (out, (&fresh, &carried)) in samples
            .iter_mut()
            .zip(self.time_td[..self.buffer_size].iter().zip(tail.iter()))
        {
            *out = fresh + carried;
        }
        tail.copy_from_slice(&self.time_td[self.buffer_size..]);
    }

    /// The kernel currently loaded.
    #[inline]
    pub fn kernel(&self) -> &FirKernel {
        &self.kernel
    }
}

impl std::fmt::Debug for OverlapAddConvolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlapAddConvolver")
            .field("buffer_size", &self.buffer_size)
            .field("fft_size", &self.fft_size)
            .field("channels", &self.tails.len())
            .finish()
    }
}

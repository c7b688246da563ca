//! Multichannel sample ring buffer with pre-delayed reads.
//!
//! The host writes every processed audio block into this buffer; the meter
//! reads windows back out of it with a configurable pre-delay so that the
//! peak path and the (FIR-delayed) average path line up on the display.
//!
//! Producer and consumer share the audio thread, so no synchronization is
//! required. Capacity is fixed at construction and must be at least
//! `block_len + max_pre_delay`; a write larger than the capacity is rejected.

use km_core::{Sample, SampleBlock};

use crate::error::{DspError, DspResult};

/// Fixed-capacity multichannel FIFO with a single write cursor.
///
/// Reads address samples by their age behind the write cursor: age 0 is the
/// most recently written sample. Regions older than anything ever written
/// read as silence.
#[derive(Debug, Clone)]
pub struct AudioRingBuffer {
    rows: Vec<Vec<Sample>>,
    capacity: usize,
    /// Next write position.
    head: usize,
    /// Total samples written per channel since construction or `clear`.
    total_written: u64,
}

impl AudioRingBuffer {
    /// Create a zeroed ring buffer for `channels` channels of `capacity`
    /// samples each.
    pub fn new(channels: usize, capacity: usize) -> DspResult<Self> {
        if channels == 0 {
            return Err(DspError::InvalidArgument("channels must be at least 1"));
        }
        if capacity == 0 {
            return Err(DspError::InvalidArgument("capacity must be at least 1"));
        }

        Ok(Self {
            rows: vec![vec![0.0; capacity]; channels],
            capacity,
            head: 0,
            total_written: 0,
        })
    }

    /// Number of channels.
    #[inline]
    pub fn channels(&self) -> usize {
        self.rows.len()
    }

    /// Fixed capacity in samples per channel.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a full block, advancing the write cursor by the block length.
    ///
    /// Never blocks and never reallocates. Fails with `CapacityExceeded` if
    /// the block is longer than the buffer, and `InvalidArgument` if the
    /// channel counts differ.
    pub fn write(&mut self, block: &SampleBlock) -> DspResult<()> {
        if block.channels() != self.channels() {
            return Err(DspError::InvalidArgument(
                "block channel count does not match ring buffer",
            ));
        }

        let n = block.len();
        if n > self.capacity {
            return Err(DspError::CapacityExceeded {
                requested: n,
                capacity: self.capacity,
            });
        }

        let first = (self.capacity - self.head).min(n);
        for (channel, row) in self.rows.iter_mut().enumerate() {
            let src = block.channel(channel);
            row[self.head..self.head + first].copy_from_slice(&src[..first]);
            row[..n - first].copy_from_slice(&src[first..]);
        }

        self.head = (self.head + n) % self.capacity;
        self.total_written += n as u64;
        Ok(())
    }

    /// Sample `age` positions behind the write cursor, or 0.0 if that
    /// position was never written (or has already been overwritten).
    #[inline]
    fn sample_at(&self, channel: usize, age: usize) -> Sample {
        if age >= self.capacity || (age as u64) >= self.total_written {
            return 0.0;
        }
        let index = (self.head + self.capacity - 1 - age) % self.capacity;
        self.rows[channel][index]
    }

    /// Copy the most recent `dest.len()` samples ending `pre_delay` before
    /// the write cursor into `dest`, one row per channel.
    pub fn read_into(&self, dest: &mut SampleBlock, pre_delay: usize) {
        let count = dest.len();
        let channels = dest.channels().min(self.channels());
        for channel in 0..channels {
            for i in 0..count {
                let age = pre_delay + (count - 1 - i);
                dest.channel_mut(channel)[i] = self.sample_at(channel, age);
            }
        }
    }

    /// Copy `count` samples ending `pre_delay` before the write cursor into
    /// the start of each channel of `dest`.
    pub fn copy_to(&self, dest: &mut SampleBlock, pre_delay: usize, count: usize) {
        let count = count.min(dest.len());
        let channels = dest.channels().min(self.channels());
        for channel in 0..channels {
            for i in 0..count {
                let age = pre_delay + (count - 1 - i);
                dest.channel_mut(channel)[i] = self.sample_at(channel, age);
            }
        }
    }

    /// Like [`copy_to`], but adds into `dest` instead of overwriting.
    ///
    /// [`copy_to`]: AudioRingBuffer::copy_to
    pub fn add_to(&self, dest: &mut SampleBlock, pre_delay: usize, count: usize) {
        let count = count.min(dest.len());
        let channels = dest.channels().min(self.channels());
        for channel in 0..channels {
            for i in 0..count {
                let age = pre_delay + (count - 1 - i);
                dest.channel_mut(channel)[i] += self.sample_at(channel, age);
            }
        }
    }

    /// Peak absolute value over `count` samples ending `pre_delay` before
    /// the write cursor.
    pub fn magnitude(&self, channel: usize, count: usize, pre_delay: usize) -> Sample {
        let mut peak: Sample = 0.0;
        for age in pre_delay..pre_delay + count {
            peak = peak.max(self.sample_at(channel, age).abs());
        }
        peak
    }

    /// RMS level over `count` samples ending `pre_delay` before the write
    /// cursor.
    pub fn rms_level(&self, channel: usize, count: usize, pre_delay: usize) -> Sample {
        if count == 0 {
            return 0.0;
        }
        let mut sum: Sample = 0.0;
        for age in pre_delay..pre_delay + count {
            let x = self.sample_at(channel, age);
            sum += x * x;
        }
        (sum / count as Sample).sqrt()
    }

    /// Zero the buffer and reset the write cursor.
    pub fn clear(&mut self) {
        for row in &mut self.rows {
            row.fill(0.0);
        }
        self.head = 0;
        self.total_written = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_from(rows: &[&[Sample]]) -> SampleBlock {
        let mut block = SampleBlock::new(rows.len(), rows[0].len());
        for (channel, row) in rows.iter().enumerate() {
            block.channel_mut(channel).copy_from_slice(row);
        }
        block
    }

    #[test]
    fn test_write_then_read_no_delay() {
        let mut ring = AudioRingBuffer::new(1, 8).unwrap();
        ring.write(&block_from(&[&[1.0, 2.0, 3.0, 4.0]])).unwrap();

        let mut dest = SampleBlock::new(1, 4);
        ring.read_into(&mut dest, 0);
        assert_eq!(dest.channel(0), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_read_with_pre_delay() {
        let mut ring = AudioRingBuffer::new(1, 8).unwrap();
        ring.write(&block_from(&[&[1.0, 2.0, 3.0, 4.0]])).unwrap();
        ring.write(&block_from(&[&[5.0, 6.0, 7.0, 8.0]])).unwrap();

        let mut dest = SampleBlock::new(1, 4);
        ring.read_into(&mut dest, 2);
        assert_eq!(dest.channel(0), &[3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_unwritten_history_reads_as_silence() {
        let mut ring = AudioRingBuffer::new(1, 16).unwrap();
        ring.write(&block_from(&[&[1.0, 2.0]])).unwrap();

        let mut dest = SampleBlock::new(1, 4);
        ring.read_into(&mut dest, 0);
        assert_eq!(dest.channel(0), &[0.0, 0.0, 1.0, 2.0]);

        ring.read_into(&mut dest, 1);
        assert_eq!(dest.channel(0), &[0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_wrapping_write() {
        let mut ring = AudioRingBuffer::new(1, 4).unwrap();
        for i in 0..3 {
            let base = (i * 2) as Sample;
            ring.write(&block_from(&[&[base + 1.0, base + 2.0]])).unwrap();
        }

        let mut dest = SampleBlock::new(1, 4);
        ring.read_into(&mut dest, 0);
        assert_eq!(dest.channel(0), &[3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_write_larger_than_capacity_rejected() {
        let mut ring = AudioRingBuffer::new(1, 4).unwrap();
        let err = ring.write(&block_from(&[&[0.0; 8]])).unwrap_err();
        assert_eq!(
            err,
            DspError::CapacityExceeded {
                requested: 8,
                capacity: 4
            }
        );
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let mut ring = AudioRingBuffer::new(2, 8).unwrap();
        let err = ring.write(&block_from(&[&[0.0; 4]])).unwrap_err();
        assert!(matches!(err, DspError::InvalidArgument(_)));
    }

    #[test]
    fn test_magnitude_and_rms_with_pre_delay() {
        let mut ring = AudioRingBuffer::new(1, 16).unwrap();
        ring.write(&block_from(&[&[0.5, -1.0, 0.25, 0.25]])).unwrap();

        // Whole window
        assert!((ring.magnitude(0, 4, 0) - 1.0).abs() < 1e-7);
        // Skip the two most recent samples
        assert!((ring.magnitude(0, 2, 2) - 1.0).abs() < 1e-7);
        // RMS of the last two samples
        assert!((ring.rms_level(0, 2, 0) - 0.25).abs() < 1e-7);
    }

    #[test]
    fn test_add_to_accumulates() {
        let mut ring = AudioRingBuffer::new(1, 8).unwrap();
        ring.write(&block_from(&[&[1.0, 2.0]])).unwrap();

        let mut dest = SampleBlock::new(1, 2);
        dest.channel_mut(0).copy_from_slice(&[10.0, 10.0]);
        ring.add_to(&mut dest, 0, 2);
        assert_eq!(dest.channel(0), &[11.0, 12.0]);
    }

    #[test]
    fn test_clear_resets_history() {
        let mut ring = AudioRingBuffer::new(1, 8).unwrap();
        ring.write(&block_from(&[&[1.0, 2.0, 3.0, 4.0]])).unwrap();
        ring.clear();

        let mut dest = SampleBlock::new(1, 4);
        ring.read_into(&mut dest, 0);
        assert!(dest.channel(0).iter().all(|&x| x == 0.0));
    }
}

//! km-core: sample types and meter calibration shared by the K-System
//! loudness engine.
//!
//! This crate is deliberately small: the `Sample` alias and the multichannel
//! `SampleBlock` live here so that DSP crates and host plumbing agree on the
//! data layout, and `ballistics` exposes the level/decibel conversions the
//! meter display is calibrated against.

pub mod ballistics;
pub mod sample;

pub use ballistics::{decibel2level, level2decibel, METER_MINIMUM_DECIBEL};
pub use sample::{Sample, SampleBlock};

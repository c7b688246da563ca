//! Average-level algorithm registry.
//!
//! The algorithm id is the only engine state that crosses the host boundary
//! (it is persisted in session files), so its integer encoding is stable:
//! `0` = band-limited RMS, `1` = ITU-R BS.1770. Unknown ids from old or
//! foreign sessions normalize to BS.1770.

use serde::{Deserialize, Serialize};

/// Measurement algorithm driving the average meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum AverageAlgorithm {
    /// Band-limited RMS (21 kHz low-pass, peak-to-average corrected)
    RmsBandLimited,
    /// ITU-R BS.1770 loudness (K-weighting, LKFS)
    ItuBs1770,
}

impl AverageAlgorithm {
    /// Stable integer encoding for persistence.
    pub fn to_id(self) -> u32 {
        match self {
            AverageAlgorithm::RmsBandLimited => 0,
            AverageAlgorithm::ItuBs1770 => 1,
        }
    }

    /// Decode a persisted id; unknown values normalize to [`ItuBs1770`].
    ///
    /// [`ItuBs1770`]: AverageAlgorithm::ItuBs1770
    pub fn from_id(id: u32) -> Self {
        match id {
            0 => AverageAlgorithm::RmsBandLimited,
            _ => AverageAlgorithm::ItuBs1770,
        }
    }
}

impl From<u32> for AverageAlgorithm {
    fn from(id: u32) -> Self {
        Self::from_id(id)
    }
}

impl From<AverageAlgorithm> for u32 {
    fn from(algorithm: AverageAlgorithm) -> Self {
        algorithm.to_id()
    }
}

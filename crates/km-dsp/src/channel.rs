//! Positional channel roles and BS.1770 summation weights.

use km_core::Sample;

/// Channel role by position, following the 5.1 ordering used by the meter:
/// `L, R, C, LFE, Ls, Rs`. Stereo inputs use indices 0 and 1, mono uses 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Left,
    Right,
    Center,
    Lfe,
    SurroundLeft,
    SurroundRight,
}

impl ChannelRole {
    /// Role for a channel index, or `None` beyond the 5.1 layout.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(ChannelRole::Left),
            1 => Some(ChannelRole::Right),
            2 => Some(ChannelRole::Center),
            3 => Some(ChannelRole::Lfe),
            4 => Some(ChannelRole::SurroundLeft),
            5 => Some(ChannelRole::SurroundRight),
            _ => None,
        }
    }

    /// BS.1770 mean-square summation weight for this role.
    ///
    /// The LFE channel is excluded from the loudness sum entirely.
    pub fn bs1770_weight(self) -> Sample {
        match self {
            ChannelRole::Left | ChannelRole::Right | ChannelRole::Center => 1.0,
            ChannelRole::Lfe => 0.0,
            ChannelRole::SurroundLeft | ChannelRole::SurroundRight => 1.41,
        }
    }
}

/// BS.1770 summation weight for a channel index; 0.0 outside the 5.1 layout.
pub fn bs1770_channel_weight(index: usize) -> Sample {
    ChannelRole::from_index(index).map_or(0.0, ChannelRole::bs1770_weight)
}

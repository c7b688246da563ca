//! Level/decibel conversions and the meter's calibrated minimum.
//!
//! The meter display only covers a finite range; every level the engine
//! reports is clamped to `METER_MINIMUM_DECIBEL` so that silence and
//! underflows land on the bottom of the scale instead of at `-inf`.

use crate::Sample;

/// Lowest level the meter can display, in dB.
pub const METER_MINIMUM_DECIBEL: Sample = -70.01;

/// Convert a linear level (1.0 = full scale) to decibels.
///
/// Zero and negative inputs map to `METER_MINIMUM_DECIBEL`, as do levels
/// below the display range.
pub fn level2decibel(level: Sample) -> Sample {
    if level <= 0.0 {
        return METER_MINIMUM_DECIBEL;
    }

    let decibels = 20.0 * level.log10();
    if decibels < METER_MINIMUM_DECIBEL {
        METER_MINIMUM_DECIBEL
    } else {
        decibels
    }
}

/// Convert decibels to a linear level (inverse of [`level2decibel`]).
pub fn decibel2level(decibels: Sample) -> Sample {
    10.0f32.powf(decibels / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scale_is_zero_db() {
        assert!(level2decibel(1.0).abs() < 1e-6);
    }

    #[test]
    fn test_half_scale() {
        assert!((level2decibel(0.5) - (-6.0206)).abs() < 1e-3);
    }

    #[test]
    fn test_silence_clamps_to_minimum() {
        assert_eq!(level2decibel(0.0), METER_MINIMUM_DECIBEL);
        assert_eq!(level2decibel(-1.0), METER_MINIMUM_DECIBEL);
        assert_eq!(level2decibel(1e-10), METER_MINIMUM_DECIBEL);
    }

    #[test]
    fn test_roundtrip() {
        for db in [-60.0, -20.0, -6.0, 0.0] {
            let roundtrip = level2decibel(decibel2level(db));
            assert!(
                (roundtrip - db).abs() < 1e-4,
                "roundtrip failed for {db} dB: got {roundtrip}"
            );
        }
    }
}

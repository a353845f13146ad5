//! Real-time sample rate conversion arithmetic
//!
//! The engines resample on the fly with plain linear interpolation, which
//! keeps no history and never allocates. Higher quality conversion happens
//! once at import time (see [`crate::import`]).

use crate::types::Sample;

/// Rates closer than this are treated as equal
pub const RATE_TOLERANCE_HZ: f64 = 0.1;

/// Whether and how fast to step through the source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResamplingPolicy {
    /// True if source and device rates differ by more than [`RATE_TOLERANCE_HZ`]
    pub active: bool,
    /// Source samples advanced per output frame (source rate / device rate)
    pub ratio: f64,
}

impl Default for ResamplingPolicy {
    fn default() -> Self {
        Self::PASS_THROUGH
    }
}

impl ResamplingPolicy {
    pub const PASS_THROUGH: Self = Self {
        active: false,
        ratio: 1.0,
    };

    /// Decide the policy for a source/device rate pair
    ///
    /// A non-positive rate on either side means the rate is unknown; the engine
    /// then plays at the source rate as-is.
    pub fn for_rates(source_rate: f64, device_rate: f64) -> Self {
        if source_rate <= 0.0 || device_rate <= 0.0 {
            return Self::PASS_THROUGH;
        }
        if (source_rate - device_rate).abs() > RATE_TOLERANCE_HZ {
            Self {
                active: true,
                ratio: source_rate / device_rate,
            }
        } else {
            Self::PASS_THROUGH
        }
    }
}

/// Linear interpolation between `data[index]` and the following sample
///
/// The following sample is clamped to the last element, so the final sample
/// of a buffer interpolates against itself. `index` must be in bounds.
#[inline]
pub fn interpolate(data: &[Sample], index: usize, fraction: f64) -> Sample {
    let s1 = data[index];
    let s2 = data[(index + 1).min(data.len() - 1)];
    s1 + (fraction as Sample) * (s2 - s1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_rates_pass_through() {
        assert_eq!(ResamplingPolicy::for_rates(44100.0, 44100.0), ResamplingPolicy::PASS_THROUGH);
        assert_eq!(ResamplingPolicy::for_rates(44100.0, 44100.05), ResamplingPolicy::PASS_THROUGH);
    }

    #[test]
    fn test_different_rates_resample() {
        let p = ResamplingPolicy::for_rates(44100.0, 48000.0);
        assert!(p.active);
        assert!((p.ratio - 0.91875).abs() < 1e-12);

        let p = ResamplingPolicy::for_rates(44100.0, 44100.2);
        assert!(p.active);
    }

    #[test]
    fn test_unknown_rate_disables_resampling() {
        assert_eq!(ResamplingPolicy::for_rates(44100.0, 0.0), ResamplingPolicy::PASS_THROUGH);
        assert_eq!(ResamplingPolicy::for_rates(-1.0, 48000.0), ResamplingPolicy::PASS_THROUGH);
    }

    #[test]
    fn test_interpolate() {
        let data = [0.0, 1.0, -1.0];
        assert_eq!(interpolate(&data, 0, 0.0), 0.0);
        assert_eq!(interpolate(&data, 0, 0.25), 0.25);
        assert_eq!(interpolate(&data, 1, 0.5), 0.0);
        // last sample clamps to itself
        assert_eq!(interpolate(&data, 2, 0.9), -1.0);
    }
}

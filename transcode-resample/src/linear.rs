//! Linear interpolation.
//!
//! Fast, low-quality reconstruction suitable for previews or for rates
//! that are already close. No anti-aliasing is applied when downsampling.

use crate::resampler::Interpolator;

/// Two-tap linear interpolator.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl Interpolator for LinearInterpolator {
    fn radius(&self) -> usize {
        1
    }

    #[inline]
    fn interpolate(&self, window: &[f64], frac: f64) -> f64 {
        let a = window[0];
        let b = window[1];
        a + (b - a) * frac
    }
}

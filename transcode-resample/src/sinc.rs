//! Windowed sinc interpolation.
//!
//! The kernel is a low-pass sinc at `min(1, out / in)` of the input Nyquist
//! rate, tapered by a [`WindowFunction`]. Coefficients are precomputed for
//! [`PHASES`] fractional offsets and each row is normalised to unity gain.

use crate::error::{ResampleError, Result};
use crate::resampler::Interpolator;
use std::f64::consts::PI;

/// Number of precomputed fractional offsets.
pub const PHASES: usize = 256;

/// Window functions for sinc interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum WindowFunction {
    /// Rectangular window (no windowing).
    Rectangular,
    /// Hann window - good balance of main lobe width and side lobe attenuation.
    Hann,
    /// Hamming window - slightly better side lobe attenuation than Hann.
    Hamming,
    /// Blackman window - excellent side lobe attenuation.
    #[default]
    Blackman,
    /// Kaiser window with configurable beta parameter.
    Kaiser {
        /// Shape parameter; larger values trade main lobe width for attenuation.
        beta: f64,
    },
    /// Lanczos window (sinc window).
    Lanczos,
}

impl WindowFunction {
    /// Window value at `x` in `[-1, 1]` (1.0 at the centre, 0 outside).
    pub fn value(&self, x: f64) -> f64 {
        if x.abs() > 1.0 {
            return 0.0;
        }
        match self {
            Self::Rectangular => 1.0,
            Self::Hann => 0.5 + 0.5 * (PI * x).cos(),
            Self::Hamming => 0.54 + 0.46 * (PI * x).cos(),
            Self::Blackman => 0.42 + 0.5 * (PI * x).cos() + 0.08 * (2.0 * PI * x).cos(),
            Self::Kaiser { beta } => {
                bessel_i0(beta * (1.0 - x * x).sqrt()) / bessel_i0(*beta)
            }
            Self::Lanczos => sinc(x),
        }
    }
}

#[inline]
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-10 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Approximate Bessel function I0 using a polynomial approximation.
fn bessel_i0(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 3.75 {
        let y = (x / 3.75) * (x / 3.75);
        1.0 + y
            * (3.5156229
                + y * (3.0899424
                    + y * (1.2067492 + y * (0.2659732 + y * (0.0360768 + y * 0.0045813)))))
    } else {
        let y = 3.75 / ax;
        (ax.exp() / ax.sqrt())
            * (0.39894228
                + y * (0.01328592
                    + y * (0.00225319
                        + y * (-0.00157565
                            + y * (0.00916281
                                + y * (-0.02057706
                                    + y * (0.02635537 + y * (-0.01647633 + y * 0.00392377))))))))
    }
}

/// Windowed sinc interpolator with a polyphase coefficient table.
#[derive(Debug, Clone)]
pub struct SincInterpolator {
    radius: usize,
    /// `PHASES + 1` rows of `2 * radius` taps.
    table: Vec<Vec<f64>>,
}

impl SincInterpolator {
    /// Build the kernel for converting `input_rate` to `output_rate`.
    ///
    /// `window_size` is the tap count at unity ratio; when downsampling the
    /// kernel widens by the decimation factor so the cutoff tracks the
    /// output Nyquist rate.
    pub fn new(
        input_rate: u32,
        output_rate: u32,
        window_size: usize,
        window: WindowFunction,
    ) -> Result<Self> {
        if window_size < 2 || window_size % 2 != 0 {
            return Err(ResampleError::InvalidWindowSize { size: window_size });
        }
        if input_rate == 0 || output_rate == 0 {
            return Err(ResampleError::InvalidSampleRate {
                rate: input_rate.min(output_rate),
            });
        }
        let cutoff = (f64::from(output_rate) / f64::from(input_rate)).min(1.0);
        let radius = ((window_size / 2) as f64 / cutoff).ceil() as usize;
        let table = (0..=PHASES)
            .map(|phase| {
                let frac = phase as f64 / PHASES as f64;
                let mut row: Vec<f64> = (0..2 * radius)
                    .map(|j| {
                        let x = j as f64 - (radius as f64 - 1.0) - frac;
                        cutoff * sinc(cutoff * x) * window.value(x / radius as f64)
                    })
                    .collect();
                let sum: f64 = row.iter().sum();
                if sum.abs() > f64::EPSILON {
                    row.iter_mut().for_each(|c| *c /= sum);
                }
                row
            })
            .collect();
        Ok(Self { radius, table })
    }
}

impl Interpolator for SincInterpolator {
    fn radius(&self) -> usize {
        self.radius
    }

    #[inline]
    fn interpolate(&self, window: &[f64], frac: f64) -> f64 {
        let phase = (frac * PHASES as f64).round() as usize;
        self.table[phase.min(PHASES)]
            .iter()
            .zip(window)
            .map(|(c, s)| c * s)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_values() {
        for w in [
            WindowFunction::Rectangular,
            WindowFunction::Hann,
            WindowFunction::Hamming,
            WindowFunction::Blackman,
            WindowFunction::Kaiser { beta: 8.6 },
            WindowFunction::Lanczos,
        ] {
            assert!((w.value(0.0) - 1.0).abs() < 1e-6, "{w:?}");
            assert_eq!(w.value(1.5), 0.0);
        }
        assert!(WindowFunction::Blackman.value(1.0).abs() < 1e-9);
        assert!(WindowFunction::Hann.value(-1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_window_size() {
        assert!(matches!(
            SincInterpolator::new(44100, 48000, 31, WindowFunction::Blackman),
            Err(ResampleError::InvalidWindowSize { size: 31 })
        ));
    }

    #[test]
    fn test_radius_widens_when_downsampling() {
        let up = SincInterpolator::new(44100, 48000, 32, WindowFunction::Blackman).unwrap();
        let down = SincInterpolator::new(48000, 24000, 32, WindowFunction::Blackman).unwrap();
        assert_eq!(up.radius(), 16);
        assert_eq!(down.radius(), 32);
    }

    #[test]
    fn test_zero_phase_reproduces_sample() {
        let k = SincInterpolator::new(44100, 48000, 16, WindowFunction::Blackman).unwrap();
        let mut window = vec![0.0; 16];
        window[7] = 1.0;
        assert!((k.interpolate(&window, 0.0) - 1.0).abs() < 1e-9);
        window[7] = 0.0;
        window[8] = 1.0;
        assert!(k.interpolate(&window, 0.0).abs() < 1e-9);
    }
}

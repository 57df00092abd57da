//! Streaming sample rate conversion.
//!
//! The [`Resampler`] keeps a per-channel history and walks it with exact
//! integer positions: output sample `k` sits at input time `k * in / out`,
//! tracked as a numerator over the (reduced) output rate so long streams do
//! not drift. The kernel ([`Interpolator`]) only sees a window of `2 * radius`
//! input samples around that time plus the fractional offset.

use crate::error::{ResampleError, Result};
use crate::linear::LinearInterpolator;
use crate::sinc::{SincInterpolator, WindowFunction};
use crate::gcd;

/// A reconstruction kernel.
pub trait Interpolator: Send {
    /// Get the number of input samples used on each side of the output time.
    fn radius(&self) -> usize;

    /// Compute one output sample.
    ///
    /// `window` holds `2 * radius` samples; the output time lies `frac`
    /// (in `[0, 1)`) past `window[radius - 1]`.
    fn interpolate(&self, window: &[f64], frac: f64) -> f64;
}

/// Type of resampling algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResamplerType {
    /// Linear interpolation - fast, low quality.
    Linear,
    /// Windowed sinc interpolation.
    Sinc {
        /// Number of taps at unity ratio (must be even, typically 16-256).
        window_size: usize,
    },
}

impl Default for ResamplerType {
    fn default() -> Self {
        Self::Sinc { window_size: 32 }
    }
}

/// Configuration for the resampler.
#[derive(Debug, Clone)]
pub struct ResamplerConfig {
    /// Input sample rate in Hz.
    pub input_rate: u32,
    /// Output sample rate in Hz.
    pub output_rate: u32,
    /// Number of channels.
    pub channels: usize,
    /// Resampler type and parameters.
    pub resampler_type: ResamplerType,
    /// Window function for sinc resampler.
    pub window_function: WindowFunction,
}

impl ResamplerConfig {
    /// Create a new configuration.
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            input_rate,
            output_rate,
            channels: 2,
            resampler_type: ResamplerType::default(),
            window_function: WindowFunction::default(),
        }
    }

    /// Set the number of channels.
    #[must_use]
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    /// Set the resampler type.
    #[must_use]
    pub fn with_type(mut self, resampler_type: ResamplerType) -> Self {
        self.resampler_type = resampler_type;
        self
    }

    /// Set the window function (only used for sinc resampler).
    #[must_use]
    pub fn with_window(mut self, window: WindowFunction) -> Self {
        self.window_function = window;
        self
    }

    /// Create a config for fast, low-quality resampling.
    pub fn fast(input_rate: u32, output_rate: u32) -> Self {
        Self::new(input_rate, output_rate).with_type(ResamplerType::Linear)
    }

    /// Create a config for high-quality resampling.
    pub fn high_quality(input_rate: u32, output_rate: u32) -> Self {
        Self::new(input_rate, output_rate)
            .with_type(ResamplerType::Sinc { window_size: 128 })
            .with_window(WindowFunction::Blackman)
    }

    fn validate(&self) -> Result<()> {
        for rate in [self.input_rate, self.output_rate] {
            if rate == 0 {
                return Err(ResampleError::InvalidSampleRate { rate });
            }
        }
        if self.channels == 0 {
            return Err(ResampleError::InvalidChannelCount {
                count: self.channels,
            });
        }
        let ratio = f64::from(self.output_rate) / f64::from(self.input_rate);
        if !(1.0 / 256.0..=256.0).contains(&ratio) {
            return Err(ResampleError::RatioTooExtreme { ratio });
        }
        Ok(())
    }
}

/// Streaming multi-channel resampler over planar `f64` samples.
pub struct Resampler {
    kernel: Box<dyn Interpolator>,
    input_rate: u32,
    output_rate: u32,
    /// Input step per output sample, in units of `1 / out`.
    step_in: u64,
    out: u64,
    history: Vec<Vec<f64>>,
    /// Position of the next output in history samples, scaled by `out`.
    pos: u64,
    consumed: u64,
    emitted: u64,
    flushed: bool,
}

impl Resampler {
    /// Create a new resampler from configuration.
    pub fn new(config: ResamplerConfig) -> Result<Self> {
        config.validate()?;
        let kernel: Box<dyn Interpolator> = match config.resampler_type {
            ResamplerType::Linear => Box::new(LinearInterpolator),
            ResamplerType::Sinc { window_size } => Box::new(SincInterpolator::new(
                config.input_rate,
                config.output_rate,
                window_size,
                config.window_function,
            )?),
        };
        let g = gcd(config.input_rate, config.output_rate);
        let mut resampler = Self {
            kernel,
            input_rate: config.input_rate,
            output_rate: config.output_rate,
            step_in: u64::from(config.input_rate / g),
            out: u64::from(config.output_rate / g),
            history: vec![Vec::new(); config.channels],
            pos: 0,
            consumed: 0,
            emitted: 0,
            flushed: false,
        };
        resampler.reset();
        Ok(resampler)
    }

    /// Get the input sample rate.
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Get the output sample rate.
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Get the resampling ratio (output_rate / input_rate).
    pub fn ratio(&self) -> f64 {
        f64::from(self.output_rate) / f64::from(self.input_rate)
    }

    /// Get the number of channels.
    pub fn channels(&self) -> usize {
        self.history.len()
    }

    /// Output samples still owed for the input consumed so far.
    pub fn delay(&self) -> usize {
        (self.expected_outputs() - self.emitted) as usize
    }

    fn expected_outputs(&self) -> u64 {
        let num = u128::from(self.consumed) * u128::from(self.out);
        num.div_ceil(u128::from(self.step_in)) as u64
    }

    /// Resample one block of planar input.
    pub fn process(&mut self, input: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if input.len() != self.channels() {
            return Err(ResampleError::InvalidChannelCount { count: input.len() });
        }
        let len = input.first().map_or(0, Vec::len);
        if let Some(bad) = input.iter().find(|c| c.len() != len) {
            return Err(ResampleError::BufferSizeMismatch {
                actual: bad.len(),
                expected: len,
            });
        }
        if self.flushed {
            self.reset();
        }
        for (history, samples) in self.history.iter_mut().zip(input) {
            history.extend_from_slice(samples);
        }
        self.consumed += len as u64;
        Ok(self.run(u64::MAX))
    }

    /// Pad the stream end and return the remaining output.
    pub fn flush(&mut self) -> Result<Vec<Vec<f64>>> {
        if self.flushed {
            return Ok(vec![Vec::new(); self.channels()]);
        }
        let radius = self.kernel.radius();
        for history in &mut self.history {
            history.extend(std::iter::repeat(0.0).take(radius));
        }
        let out = self.run(self.expected_outputs());
        self.flushed = true;
        Ok(out)
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        let radius = self.kernel.radius();
        for history in &mut self.history {
            history.clear();
            history.resize(radius, 0.0);
        }
        self.pos = radius as u64 * self.out;
        self.consumed = 0;
        self.emitted = 0;
        self.flushed = false;
    }

    fn run(&mut self, limit: u64) -> Vec<Vec<f64>> {
        let radius = self.kernel.radius();
        let available = self.history.first().map_or(0, Vec::len);
        let mut out = vec![Vec::new(); self.channels()];
        while self.emitted < limit {
            let n = (self.pos / self.out) as usize;
            if n + radius >= available {
                break;
            }
            let frac = (self.pos % self.out) as f64 / self.out as f64;
            for (history, samples) in self.history.iter().zip(out.iter_mut()) {
                let window = &history[n + 1 - radius..=n + radius];
                samples.push(self.kernel.interpolate(window, frac));
            }
            self.pos += self.step_in;
            self.emitted += 1;
        }

        let keep_from = ((self.pos / self.out) as usize + 1).saturating_sub(radius);
        let drop = keep_from.min(available);
        if drop > 0 {
            for history in &mut self.history {
                history.drain(..drop);
            }
            self.pos -= drop as u64 * self.out;
        }
        out
    }
}

impl std::fmt::Debug for Resampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resampler")
            .field("input_rate", &self.input_rate)
            .field("output_rate", &self.output_rate)
            .field("channels", &self.channels())
            .field("radius", &self.kernel.radius())
            .finish()
    }
}

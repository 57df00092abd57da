//! [`AudioAdapter`]: the audio [`FormatAdapter`].
//!
//! Input is decoded to planar `f64`, remixed, resampled, queued, and written
//! out in the target sample format. With a `frame_size` the queue is cut into
//! fixed-size frames and only the last frame after a drain may be short.

use crate::convert::{read_channels, write_channels};
use crate::error::ResampleError;
use crate::remix::RemixMatrix;
use crate::resampler::{Resampler, ResamplerConfig, ResamplerType};
use crate::sinc::WindowFunction;
use std::collections::VecDeque;
use tracing::{debug, trace};
use transcode_core::{
    AudioFormat, Buffer, Error, FormatAdapter, MediaFormat, Result, RetrieveStatus, TimeBase,
    Timestamp,
};

/// Queued output samples per channel above which the adapter refuses input.
const FIFO_LIMIT: usize = 16384;

/// Settings of an [`AudioAdapter`].
#[derive(Debug, Clone, Default)]
pub struct AudioAdapterConfig {
    /// Samples per output frame; 0 emits whatever is ready.
    pub frame_size: usize,
    /// Rate conversion algorithm.
    pub resampler_type: ResamplerType,
    /// Window function for sinc resampling.
    pub window_function: WindowFunction,
}

impl AudioAdapterConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output frame size.
    #[must_use]
    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size;
        self
    }

    /// Set the rate conversion algorithm.
    #[must_use]
    pub fn with_resampler(mut self, resampler_type: ResamplerType) -> Self {
        self.resampler_type = resampler_type;
        self
    }

    /// Set the sinc window.
    #[must_use]
    pub fn with_window(mut self, window: WindowFunction) -> Self {
        self.window_function = window;
        self
    }
}

/// Converts sample format, channel layout and sample rate.
#[derive(Debug, Default)]
pub struct AudioAdapter {
    config: AudioAdapterConfig,
    input: Option<AudioFormat>,
    output: Option<AudioFormat>,
    open: bool,
    remix: Option<RemixMatrix>,
    resampler: Option<Resampler>,
    fifo: Vec<VecDeque<f64>>,
    next_pts: i64,
    stream_index: u32,
    flushed: bool,
}

fn audio(format: MediaFormat, what: &str) -> Result<AudioFormat> {
    match format {
        MediaFormat::Audio(a) => Ok(a),
        other => Err(Error::invalid_config(format!(
            "audio adapter {what} must be audio, got '{other}'"
        ))),
    }
}

impl AudioAdapter {
    /// Create an adapter with the given settings.
    pub fn new(config: AudioAdapterConfig) -> Self {
        Self {
            config,
            next_pts: Timestamp::NONE,
            ..Self::default()
        }
    }

    /// Get the settings.
    pub fn config(&self) -> &AudioAdapterConfig {
        &self.config
    }

    fn queued(&self) -> usize {
        self.fifo.first().map_or(0, VecDeque::len)
    }

    fn enqueue(&mut self, channels: Vec<Vec<f64>>) {
        for (queue, samples) in self.fifo.iter_mut().zip(channels) {
            queue.extend(samples);
        }
    }

    fn fifo_limit(&self) -> usize {
        self.config.frame_size.max(FIFO_LIMIT)
    }

    fn output_time_base(&self) -> TimeBase {
        TimeBase::for_sample_rate(self.output.map_or(1, |o| o.sample_rate))
    }
}

impl FormatAdapter for AudioAdapter {
    fn name(&self) -> &'static str {
        "aresample"
    }

    fn configure(&mut self, input: MediaFormat, output: MediaFormat) -> Result<()> {
        if self.open {
            return Err(Error::invalid_state("configure while the adapter is open"));
        }
        self.input = Some(audio(input, "input")?);
        self.output = Some(audio(output, "output")?);
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        if self.open {
            return Err(Error::invalid_state("adapter is already open"));
        }
        let (Some(input), Some(output)) = (self.input, self.output) else {
            return Err(Error::invalid_state("open before configure"));
        };
        input.validate()?;
        output.validate()?;

        let remix = RemixMatrix::new(input.channel_layout, output.channel_layout);
        self.remix = (!remix.is_identity()).then_some(remix);
        self.resampler = if input.sample_rate != output.sample_rate {
            let config = ResamplerConfig::new(input.sample_rate, output.sample_rate)
                .with_channels(output.channels())
                .with_type(self.config.resampler_type)
                .with_window(self.config.window_function);
            Some(Resampler::new(config)?)
        } else {
            None
        };
        self.fifo = vec![VecDeque::new(); output.channels()];
        self.next_pts = Timestamp::NONE;
        self.flushed = false;
        self.open = true;
        debug!(
            from = %input,
            to = %output,
            remix = self.remix.is_some(),
            resample = self.resampler.is_some(),
            frame_size = self.config.frame_size,
            "audio adapter opened"
        );
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn output_format(&self) -> MediaFormat {
        self.output.map_or(MediaFormat::Unset, MediaFormat::Audio)
    }

    fn has_capacity(&self) -> bool {
        self.queued() < self.fifo_limit()
    }

    fn push(&mut self, input: Option<&Buffer>) -> Result<()> {
        if !self.open {
            return Err(Error::invalid_state("adapter is not open"));
        }
        let Some(buffer) = input else {
            if !self.flushed {
                if let Some(resampler) = self.resampler.as_mut() {
                    let tail = resampler.flush()?;
                    self.enqueue(tail);
                }
                self.flushed = true;
            }
            return Ok(());
        };
        if self.flushed {
            return Err(Error::invalid_state("push after drain; reset first"));
        }

        let Some(expected) = self.input else {
            return Err(Error::invalid_state("adapter is not configured"));
        };
        if buffer.audio_format() != Some(expected) {
            return Err(ResampleError::FormatMismatch {
                expected: expected.to_string(),
                actual: buffer.format().to_string(),
            }
            .into());
        }

        if self.next_pts == Timestamp::NONE && buffer.pts != Timestamp::NONE {
            let pts = buffer.time_base.convert(buffer.pts, self.output_time_base());
            self.next_pts = pts - self.queued() as i64;
            self.stream_index = buffer.stream_index;
        }

        let mut channels = read_channels(buffer, expected)?;
        if let Some(remix) = &self.remix {
            channels = remix.apply(&channels);
        }
        if let Some(resampler) = self.resampler.as_mut() {
            channels = resampler.process(&channels)?;
        }
        let extra = channels.first().map_or(0, Vec::len);
        for queue in &mut self.fifo {
            queue
                .try_reserve(extra)
                .map_err(|_| Error::OutOfMemory { requested: extra * 8 })?;
        }
        self.enqueue(channels);
        trace!(in_samples = buffer.nb_samples(), queued = self.queued(), "audio pushed");
        Ok(())
    }

    fn pull(&mut self, output: &mut Buffer) -> Result<RetrieveStatus> {
        if !self.open {
            return Err(Error::invalid_state("adapter is not open"));
        }
        let Some(format) = self.output else {
            return Err(Error::invalid_state("adapter is not configured"));
        };
        let queued = self.queued();
        let take = match self.config.frame_size {
            0 => queued,
            n if queued >= n => n,
            _ if self.flushed => queued,
            _ => 0,
        };
        if take == 0 {
            return Ok(if self.flushed {
                RetrieveStatus::EndOfStream
            } else {
                RetrieveStatus::NeedsInput
            });
        }

        let channels: Vec<Vec<f64>> = self
            .fifo
            .iter_mut()
            .map(|queue| queue.drain(..take).collect())
            .collect();
        output.unreference();
        write_channels(&channels, format, output)?;
        output.time_base = self.output_time_base();
        output.pts = self.next_pts;
        output.dts = self.next_pts;
        output.duration = take as i64;
        output.stream_index = self.stream_index;
        if self.next_pts != Timestamp::NONE {
            self.next_pts += take as i64;
        }
        Ok(RetrieveStatus::Produced)
    }

    fn pending_delay(&self) -> usize {
        self.queued() + self.resampler.as_ref().map_or(0, Resampler::delay)
    }

    fn reset(&mut self) {
        for queue in &mut self.fifo {
            queue.clear();
        }
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
        self.next_pts = Timestamp::NONE;
        self.flushed = false;
    }

    fn close(&mut self) {
        self.reset();
        self.remix = None;
        self.resampler = None;
        self.fifo.clear();
        self.open = false;
    }
}

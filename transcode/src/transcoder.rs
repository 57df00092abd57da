//! High-level transcoder API.

use crate::io::{RawFileSink, RawFileSource, Unit, UnitSink, UnitSource};
use crate::options::{AudioConfig, TranscodeOptions, VideoConfig};
use std::time::Instant;
use tracing::{debug, info, warn};
use transcode_codecs::{create_decoder, create_encoder, parse_bsf_list};
use transcode_core::{
    record_histogram, AdapterStage, Buffer, Chain, CodecId, Error, Logger, MediaFormat, MediaType, Result,
    RetrieveStatus, SampleFormat, Stage, StageParams, StageState, StreamParams, SubmitStatus,
    TimeBase,
};
use transcode_hwaccel::HwDeviceContext;
use transcode_pipeline::{GraphConfig, GraphStage, MemoryKind};
use transcode_resample::{AudioAdapter, AudioAdapterConfig, ResamplerType};
use transcode_scale::{ScaleConfig, ScaleFilter, VideoAdapter};

/// Progress callback type: percent of input consumed and units written.
pub type ProgressCallback = Box<dyn Fn(f64, u64) + Send>;

/// Surfaces the decoder allocates when decoding into device memory.
const HW_POOL_SIZE: usize = 8;

/// Transcoding statistics.
#[derive(Debug, Clone, Default)]
pub struct TranscodeStats {
    /// Units read from the source.
    pub units_read: u64,
    /// Units written to the sink.
    pub units_written: u64,
    /// Corrupt units dropped.
    pub units_skipped: u64,
    /// Times the chain refused input and had to be drained first.
    pub busy_retries: u64,
    /// Input bytes consumed.
    pub input_bytes: u64,
    /// Total input size in bytes, when the source knows it.
    pub input_size: Option<u64>,
    /// Output bytes produced.
    pub output_bytes: u64,
    /// Wall time in seconds.
    pub elapsed_secs: f64,
}

impl TranscodeStats {
    /// Get progress as percentage (0.0 - 100.0).
    pub fn progress(&self) -> f64 {
        match self.input_size {
            Some(total) if total > 0 => (self.input_bytes as f64 / total as f64 * 100.0).min(100.0),
            _ => 0.0,
        }
    }

    /// Get compression ratio.
    pub fn compression_ratio(&self) -> f64 {
        if self.input_bytes > 0 && self.output_bytes > 0 {
            self.input_bytes as f64 / self.output_bytes as f64
        } else {
            1.0
        }
    }
}

/// Drives source → decoder → [filters] → [conversion] → encoder →
/// [stream filters] → sink.
pub struct Transcoder {
    options: TranscodeOptions,
    progress_callback: Option<ProgressCallback>,
    stats: TranscodeStats,
    logger: Logger,
}

impl Transcoder {
    /// Create a new transcoder with the given options.
    pub fn new(options: TranscodeOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            progress_callback: None,
            stats: TranscodeStats::default(),
            logger: Logger::disabled(),
        })
    }

    /// Set the logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Set progress callback.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(f64, u64) + Send + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Get current statistics.
    pub fn stats(&self) -> &TranscodeStats {
        &self.stats
    }

    /// Get the options.
    pub fn options(&self) -> &TranscodeOptions {
        &self.options
    }

    /// Get current progress (0.0 - 100.0).
    pub fn progress(&self) -> f64 {
        self.stats.progress()
    }

    /// Transcode between the files named in the options.
    pub fn run(&mut self) -> Result<TranscodeStats> {
        let (input, output) = match (&self.options.input, &self.options.output) {
            (Some(i), Some(o)) => (i.clone(), o.clone()),
            _ => return Err(Error::invalid_config("input and output must be specified")),
        };
        info!(
            parent: self.logger.span(),
            input = %input.path.display(),
            output = %output.path.display(),
            "starting transcode"
        );
        let mut source = RawFileSource::open(&input.path, input.unit_size()?, input.unit_duration())?;
        let mut sink = RawFileSink::create(&output.path, self.options.overwrite)?;
        self.run_with(&mut source, &mut sink)
    }

    /// Transcode every unit of `source` into `sink`.
    pub fn run_with(&mut self, source: &mut dyn UnitSource, sink: &mut dyn UnitSink) -> Result<TranscodeStats> {
        let started = Instant::now();
        self.stats = TranscodeStats {
            input_size: source.size_hint(),
            ..TranscodeStats::default()
        };
        let (mut chain, params) = self.build_chain()?;
        let codec = params
            .stream
            .codec
            .ok_or_else(|| Error::invalid_config("input stream has no codec"))?;
        let time_base = params.stream.time_base;
        chain.configure(params)?;
        chain.open()?;

        let mut pending: Option<Buffer> = None;
        let mut input_done = false;
        let mut eos_sent = false;
        let mut out = Buffer::new();
        loop {
            if pending.is_none() && !input_done {
                match source.read_unit()? {
                    Some(unit) => {
                        self.stats.units_read += 1;
                        self.stats.input_bytes += unit.data.len() as u64;
                        pending = Some(to_buffer(unit, codec, time_base));
                    }
                    None => input_done = true,
                }
            }
            if let Some(buffer) = pending.as_mut() {
                match chain.submit(Some(buffer))? {
                    SubmitStatus::Accepted => pending = None,
                    SubmitStatus::Busy => self.stats.busy_retries += 1,
                }
            } else if input_done && !eos_sent {
                chain.submit(None)?;
                eos_sent = true;
                debug!(parent: self.logger.span(), units = self.stats.units_read, "input ended");
            }

            if self.drain(&mut chain, &mut out, sink)? {
                break;
            }
            self.report_progress();
        }

        sink.finish()?;
        chain.close();
        self.stats.elapsed_secs = started.elapsed().as_secs_f64();
        record_histogram!("transcode.duration_ns", started.elapsed().as_nanos() as f64);
        info!(
            parent: self.logger.span(),
            read = self.stats.units_read,
            written = self.stats.units_written,
            skipped = self.stats.units_skipped,
            ratio = self.stats.compression_ratio(),
            "transcode complete"
        );
        self.report_progress();
        Ok(self.stats.clone())
    }

    /// Retrieve until the chain wants input. Returns true at end of stream.
    fn drain(&mut self, chain: &mut Chain, out: &mut Buffer, sink: &mut dyn UnitSink) -> Result<bool> {
        loop {
            match chain.retrieve(out) {
                Ok(RetrieveStatus::Produced) => {
                    let unit = to_unit(out);
                    self.stats.units_written += 1;
                    self.stats.output_bytes += unit.data.len() as u64;
                    sink.write_unit(&unit)?;
                }
                Ok(RetrieveStatus::NeedsInput) => return Ok(false),
                Ok(RetrieveStatus::EndOfStream) => return Ok(true),
                Err(e) if e.is_recoverable() => {
                    self.stats.units_skipped += 1;
                    warn!(parent: self.logger.span(), error = %e, "dropping corrupt unit");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn report_progress(&self) {
        if let Some(callback) = &self.progress_callback {
            callback(self.stats.progress(), self.stats.units_written);
        }
    }

    /// Assemble the stage chain and the parameters it is configured with.
    fn build_chain(&self) -> Result<(Chain, StageParams)> {
        let options = &self.options;
        let input = options
            .input
            .as_ref()
            .ok_or_else(|| Error::invalid_config("input not specified"))?;
        let stream = input.stream_params()?;
        let media = input.codec.media_type();
        let output_codec = options.output_codec()?;
        let threads = options.threads.unwrap_or(0);

        let mut params = StageParams::new(stream);
        let mut decoder_params = StageParams::default();
        let hardware = options.hardware_accel && media == MediaType::Video;
        if hardware {
            params = params.with_device(HwDeviceContext::software()?);
            decoder_params = decoder_params.with_option("hw_pool_size", HW_POOL_SIZE);
        }

        let mut chain = Chain::new("transcode").with_logger(self.logger.child("chain", "transcode"));
        chain.push(
            create_decoder(input.codec, self.logger.child("decoder", input.codec.name()))?,
            decoder_params,
        );
        let memory = if hardware { MemoryKind::Device } else { MemoryKind::Host };
        if let Some(description) = &options.filters {
            let stage = GraphStage::new("filters", description.as_str())
                .with_config(GraphConfig::new().with_threads(threads))
                .with_input_memory(memory)
                .with_logger(self.logger.child("graph", "filters"));
            chain.push(Box::new(stage), StageParams::default());
        } else if hardware && options.video.is_some() {
            let stage = GraphStage::new("download", "hwdownload")
                .with_input_memory(MemoryKind::Device)
                .with_logger(self.logger.child("graph", "download"));
            chain.push(Box::new(stage), StageParams::default());
        }

        let pcm = output_codec.pcm_sample_format();
        if options.video.is_some() || options.audio.is_some() || pcm.is_some() {
            let stage = FormatStage {
                video: options.video.clone(),
                audio: options.audio.clone(),
                pcm,
                threads,
                inner: None,
                logger: self.logger.child("adapter", "format"),
            };
            chain.push(Box::new(stage), StageParams::default());
        }

        let mut encoder_params = StageParams::default();
        if let (Some(output), MediaType::Audio) = (&options.output, media) {
            encoder_params = encoder_params.with_option("frame_size", output.frame_size);
        }
        chain.push(
            create_encoder(output_codec, self.logger.child("encoder", output_codec.name()))?,
            encoder_params,
        );
        if let Some(list) = &options.bitstream_filters {
            chain.push(Box::new(parse_bsf_list(list)?), StageParams::default());
        }
        debug!(parent: self.logger.span(), stages = chain.len(), "chain built");
        Ok((chain, params))
    }
}

fn to_buffer(unit: Unit, codec: CodecId, time_base: TimeBase) -> Buffer {
    let mut buffer = Buffer::from_packet(unit.data, codec);
    buffer.pts = unit.pts;
    buffer.dts = unit.pts;
    buffer.duration = unit.duration;
    buffer.time_base = time_base;
    buffer.set_keyframe(unit.keyframe);
    buffer
}

fn to_unit(buffer: &mut Buffer) -> Unit {
    let unit = Unit {
        data: buffer.data().to_vec(),
        pts: buffer.pts,
        duration: buffer.duration,
        keyframe: buffer.is_keyframe(),
    };
    buffer.unreference();
    unit
}

/// Converts toward the configured format, resolved against whatever stream
/// reaches it. PCM encoders additionally pin the sample format.
struct FormatStage {
    video: Option<VideoConfig>,
    audio: Option<AudioConfig>,
    pcm: Option<SampleFormat>,
    threads: usize,
    inner: Option<Box<dyn Stage>>,
    logger: Logger,
}

impl FormatStage {
    fn build(&self, stream: &StreamParams) -> Result<Box<dyn Stage>> {
        let stage: Box<dyn Stage> = match stream.media_format() {
            MediaFormat::Video(decoded) => {
                let config = self.video.clone().unwrap_or_default();
                let target = config.target(decoded)?;
                let filter = match &config.scale_filter {
                    Some(name) => name.parse()?,
                    None => ScaleFilter::default(),
                };
                let adapter = VideoAdapter::new(
                    ScaleConfig::new().with_filter(filter).with_threads(self.threads),
                );
                Box::new(AdapterStage::new(adapter, MediaFormat::Video(target)).with_logger(self.logger.clone()))
            }
            MediaFormat::Audio(decoded) => {
                let config = self.audio.clone().unwrap_or_default();
                let mut target = config.target(decoded)?;
                if let Some(pcm) = self.pcm {
                    target.sample_format = pcm;
                }
                let resampler = match config.resampler.as_deref() {
                    Some("linear") => ResamplerType::Linear,
                    Some("sinc") | None => ResamplerType::default(),
                    Some(other) => {
                        return Err(Error::InvalidOption {
                            name: "resampler".into(),
                            reason: format!("'{other}' is not sinc or linear"),
                        })
                    }
                };
                let adapter = AudioAdapter::new(AudioAdapterConfig::new().with_resampler(resampler));
                Box::new(AdapterStage::new(adapter, MediaFormat::Audio(target)).with_logger(self.logger.clone()))
            }
            other => {
                return Err(Error::invalid_config(format!(
                    "format conversion needs decoded input, got '{other}'"
                )))
            }
        };
        Ok(stage)
    }

    fn inner(&mut self) -> Result<&mut Box<dyn Stage>> {
        self.inner
            .as_mut()
            .ok_or_else(|| Error::invalid_state("format conversion is not configured"))
    }
}

impl Stage for FormatStage {
    fn name(&self) -> &str {
        "format"
    }

    fn state(&self) -> StageState {
        self.inner.as_ref().map_or(StageState::Unconfigured, |s| s.state())
    }

    fn configure(&mut self, params: StageParams) -> Result<()> {
        let mut stage = self.build(&params.stream)?;
        stage.configure(params)?;
        self.inner = Some(stage);
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        self.inner()?.open()
    }

    fn submit(&mut self, input: Option<&mut Buffer>) -> Result<SubmitStatus> {
        self.inner()?.submit(input)
    }

    fn retrieve(&mut self, output: &mut Buffer) -> Result<RetrieveStatus> {
        self.inner()?.retrieve(output)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner()?.flush()
    }

    fn close(&mut self) {
        if let Some(stage) = self.inner.as_mut() {
            stage.close();
        }
    }

    fn output_params(&self) -> Option<&StreamParams> {
        self.inner.as_ref().and_then(|s| s.output_params())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_progress() {
        let stats = TranscodeStats {
            input_size: Some(1000),
            input_bytes: 500,
            ..Default::default()
        };
        assert!((stats.progress() - 50.0).abs() < 0.001);
        assert_eq!(TranscodeStats::default().progress(), 0.0);
    }

    #[test]
    fn test_stats_compression_ratio() {
        let stats = TranscodeStats {
            input_bytes: 1000,
            output_bytes: 500,
            ..Default::default()
        };
        assert!((stats.compression_ratio() - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_unit_conversion_keeps_timing() {
        let unit = Unit::new(vec![1, 2, 3], 40, 2);
        let mut buffer = to_buffer(unit.clone(), CodecId::PcmU8, TimeBase::new(1, 8000));
        assert_eq!(buffer.pts, 40);
        assert!(buffer.is_keyframe());
        assert_eq!(to_unit(&mut buffer), unit);
        assert!(!buffer.has_storage());
    }
}

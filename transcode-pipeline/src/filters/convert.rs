//! `scale` and `aresample`, also inserted automatically by negotiation.

use super::UnitSlot;
use crate::node::{FilterNode, NodeContext};
use crate::pad::{FormatConstraint, LinkFormat, PadDescriptor};
use tracing::debug;
use transcode_core::{
    AudioFormat, Buffer, ChannelLayout, Error, FormatAdapter, MediaFormat, OptionSchema, Options,
    PixelFormat, Result, RetrieveStatus, SampleFormat, VideoFormat,
};
use transcode_resample::{AudioAdapter, AudioAdapterConfig, ResamplerType};
use transcode_scale::{ScaleConfig, ScaleFilter, VideoAdapter};

/// Pixel formats the rescaler reads and writes.
pub(crate) const SCALE_FORMATS: &[PixelFormat] = &[
    PixelFormat::Yuv420p,
    PixelFormat::Yuv422p,
    PixelFormat::Yuv444p,
    PixelFormat::Nv12,
    PixelFormat::Nv21,
    PixelFormat::Rgb24,
    PixelFormat::Bgr24,
    PixelFormat::Rgba,
    PixelFormat::Bgra,
    PixelFormat::Gray8,
];

/// Resizes and converts pictures with [`VideoAdapter`].
#[derive(Debug)]
pub struct ScaleNode {
    width: i64,
    height: i64,
    pixel_format: Option<PixelFormat>,
    filter: ScaleFilter,
    inputs: Vec<PadDescriptor>,
    outputs: Vec<PadDescriptor>,
    adapter: Option<VideoAdapter>,
    slot: UnitSlot,
}

impl ScaleNode {
    /// Create a scaler. Non-positive dimensions follow the input, keeping its
    /// aspect ratio when the other dimension is given.
    pub fn new(width: i64, height: i64, pixel_format: Option<PixelFormat>, filter: ScaleFilter) -> Self {
        Self {
            width,
            height,
            pixel_format,
            filter,
            inputs: vec![PadDescriptor::video("default")],
            outputs: vec![PadDescriptor::video("default")],
            adapter: None,
            slot: UnitSlot::default(),
        }
    }

    /// Create a scaler producing exactly `target`.
    pub fn converter(target: VideoFormat, filter: ScaleFilter) -> Self {
        Self::new(
            i64::from(target.width),
            i64::from(target.height),
            Some(target.pixel_format),
            filter,
        )
    }

    pub(crate) fn schema() -> OptionSchema {
        OptionSchema::new()
            .int("w", -1, -1, 16384, "output width, -1 to follow the input")
            .int("h", -1, -1, 16384, "output height, -1 to follow the input")
            .pixel_format("pix_fmt", None, "output pixel format")
            .choice("flags", "bilinear", &["bilinear", "neighbor"], "resize filter")
    }

    pub(crate) fn from_options(options: &Options) -> Result<Self> {
        let pixel_format = if options.is_set("pix_fmt") {
            Some(options.pixel_format("pix_fmt")?)
        } else {
            None
        };
        Ok(Self::new(
            options.int("w")?,
            options.int("h")?,
            pixel_format,
            options.string("flags")?.parse()?,
        ))
    }

    fn output_size(&self, input: VideoFormat) -> (u32, u32) {
        let scaled = |given: i64, other_given: i64, own: u32, other: u32| -> u32 {
            if given > 0 {
                given as u32
            } else if other_given > 0 {
                let value = (other_given as f64 * f64::from(own) / f64::from(other)).round();
                (value as u32).max(1)
            } else {
                own
            }
        };
        (
            scaled(self.width, self.height, input.width, input.height),
            scaled(self.height, self.width, input.height, input.width),
        )
    }
}

impl FilterNode for ScaleNode {
    fn kind(&self) -> &'static str {
        "scale"
    }

    fn inputs(&self) -> &[PadDescriptor] {
        &self.inputs
    }

    fn outputs(&self) -> &[PadDescriptor] {
        &self.outputs
    }

    fn input_constraint(&self, _pad: usize, _negotiated: &[Option<LinkFormat>]) -> FormatConstraint {
        FormatConstraint::host_video(SCALE_FORMATS)
    }

    fn init(&mut self, inputs: &[LinkFormat], ctx: &NodeContext<'_>) -> Result<Vec<LinkFormat>> {
        let link = inputs
            .first()
            .ok_or_else(|| Error::invalid_state("scale initialised without input"))?;
        let input = link
            .video()
            .ok_or_else(|| Error::invalid_config("scale needs pictures"))?;
        let (width, height) = self.output_size(input);
        let output = VideoFormat::new(width, height, self.pixel_format.unwrap_or(input.pixel_format));

        let config = ScaleConfig::new()
            .with_filter(self.filter)
            .with_threads(ctx.config.threads);
        let mut adapter = VideoAdapter::new(config);
        adapter.configure(MediaFormat::Video(input), MediaFormat::Video(output))?;
        adapter.open()?;
        debug!(parent: ctx.logger.span(), from = %input, to = %output, filter = self.filter.name(), "scaler ready");
        self.adapter = Some(adapter);
        Ok(vec![link.with_video(output)])
    }

    fn has_capacity(&self, _pad: usize) -> bool {
        self.slot.has_room()
    }

    fn push(&mut self, _pad: usize, input: Option<Buffer>) -> Result<()> {
        let Some(unit) = input else {
            self.slot.finish();
            return Ok(());
        };
        let adapter = self
            .adapter
            .as_mut()
            .ok_or_else(|| Error::invalid_state("scale is not initialised"))?;
        let mut picture = Buffer::new();
        if adapter.convert(&unit, &mut picture)? == RetrieveStatus::Produced {
            self.slot.put(picture)?;
        }
        Ok(())
    }

    fn pull(&mut self, _pad: usize, output: &mut Buffer) -> Result<RetrieveStatus> {
        Ok(self.slot.take(output))
    }

    fn reset(&mut self) {
        self.slot.clear();
        if let Some(adapter) = self.adapter.as_mut() {
            adapter.reset();
        }
    }

    fn uninit(&mut self) {
        self.slot.clear();
        if let Some(mut adapter) = self.adapter.take() {
            adapter.close();
        }
    }
}

/// Converts sample format, layout and rate with [`AudioAdapter`].
#[derive(Debug)]
pub struct ResampleNode {
    sample_rate: Option<u32>,
    sample_format: Option<SampleFormat>,
    channel_layout: Option<ChannelLayout>,
    config: AudioAdapterConfig,
    inputs: Vec<PadDescriptor>,
    outputs: Vec<PadDescriptor>,
    adapter: Option<AudioAdapter>,
}

impl ResampleNode {
    /// Create a converter; `None` fields follow the input.
    pub fn new(
        sample_rate: Option<u32>,
        sample_format: Option<SampleFormat>,
        channel_layout: Option<ChannelLayout>,
        config: AudioAdapterConfig,
    ) -> Self {
        Self {
            sample_rate,
            sample_format,
            channel_layout,
            config,
            inputs: vec![PadDescriptor::audio("default")],
            outputs: vec![PadDescriptor::audio("default")],
            adapter: None,
        }
    }

    /// Create a converter producing exactly `target`.
    pub fn converter(target: AudioFormat) -> Self {
        Self::new(
            Some(target.sample_rate),
            Some(target.sample_format),
            Some(target.channel_layout),
            AudioAdapterConfig::new(),
        )
    }

    pub(crate) fn schema() -> OptionSchema {
        OptionSchema::new()
            .optional_int("sample_rate", 1, 768_000, "output sample rate")
            .sample_format("sample_fmt", None, "output sample format")
            .channel_layout("channel_layout", None, "output channel layout")
            .int("frame_size", 0, 0, 1 << 20, "samples per output unit, 0 for any")
            .choice("resampler", "sinc", &["sinc", "linear"], "rate conversion kernel")
    }

    pub(crate) fn from_options(options: &Options) -> Result<Self> {
        let sample_rate = if options.is_set("sample_rate") {
            Some(options.usize("sample_rate")? as u32)
        } else {
            None
        };
        let sample_format = if options.is_set("sample_fmt") {
            Some(options.sample_format("sample_fmt")?)
        } else {
            None
        };
        let channel_layout = if options.is_set("channel_layout") {
            Some(options.channel_layout("channel_layout")?)
        } else {
            None
        };
        let resampler = match options.string("resampler")?.as_str() {
            "linear" => ResamplerType::Linear,
            _ => ResamplerType::default(),
        };
        let config = AudioAdapterConfig::new()
            .with_frame_size(options.usize("frame_size")?)
            .with_resampler(resampler);
        Ok(Self::new(sample_rate, sample_format, channel_layout, config))
    }

    fn adapter(&mut self) -> Result<&mut AudioAdapter> {
        self.adapter
            .as_mut()
            .ok_or_else(|| Error::invalid_state("aresample is not initialised"))
    }
}

impl FilterNode for ResampleNode {
    fn kind(&self) -> &'static str {
        "aresample"
    }

    fn inputs(&self) -> &[PadDescriptor] {
        &self.inputs
    }

    fn outputs(&self) -> &[PadDescriptor] {
        &self.outputs
    }

    fn init(&mut self, inputs: &[LinkFormat], ctx: &NodeContext<'_>) -> Result<Vec<LinkFormat>> {
        let link = inputs
            .first()
            .ok_or_else(|| Error::invalid_state("aresample initialised without input"))?;
        let input = link
            .audio()
            .ok_or_else(|| Error::invalid_config("aresample needs audio"))?;
        let output = AudioFormat::new(
            self.sample_format.unwrap_or(input.sample_format),
            self.channel_layout.unwrap_or(input.channel_layout),
            self.sample_rate.unwrap_or(input.sample_rate),
        );
        let mut adapter = AudioAdapter::new(self.config.clone());
        adapter.configure(MediaFormat::Audio(input), MediaFormat::Audio(output))?;
        adapter.open()?;
        debug!(parent: ctx.logger.span(), from = %input, to = %output, "resampler ready");
        self.adapter = Some(adapter);
        Ok(vec![link.with_audio(output)])
    }

    fn has_capacity(&self, _pad: usize) -> bool {
        true
    }

    fn push(&mut self, _pad: usize, input: Option<Buffer>) -> Result<()> {
        let adapter = self.adapter()?;
        match input {
            Some(unit) => adapter.push(Some(&unit)),
            None => adapter.drain(),
        }
    }

    fn pull(&mut self, _pad: usize, output: &mut Buffer) -> Result<RetrieveStatus> {
        self.adapter()?.pull(output)
    }

    fn reset(&mut self) {
        if let Some(adapter) = self.adapter.as_mut() {
            adapter.reset();
        }
    }

    fn uninit(&mut self) {
        if let Some(mut adapter) = self.adapter.take() {
            adapter.close();
        }
    }
}

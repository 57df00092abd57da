//! Pads, negotiated link formats and the constraints input pads place on them.

use std::fmt;
use transcode_core::{
    AudioFormat, ChannelLayout, MediaType, PixelFormat, SampleFormat, StreamParams, TimeBase,
    VideoFormat,
};

/// Where picture data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryKind {
    /// Host memory planes.
    #[default]
    Host,
    /// Device surfaces.
    Device,
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Device => write!(f, "device"),
        }
    }
}

/// One input or output pad of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadDescriptor {
    /// Pad name, unique per direction on its node.
    pub name: String,
    /// Media carried by the pad.
    pub media: MediaType,
}

impl PadDescriptor {
    /// Create a pad.
    pub fn new(name: impl Into<String>, media: MediaType) -> Self {
        Self {
            name: name.into(),
            media,
        }
    }

    /// Create a video pad.
    pub fn video(name: impl Into<String>) -> Self {
        Self::new(name, MediaType::Video)
    }

    /// Create an audio pad.
    pub fn audio(name: impl Into<String>) -> Self {
        Self::new(name, MediaType::Audio)
    }
}

/// Format settled on a link during configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkFormat {
    /// Decoded stream description.
    pub stream: StreamParams,
    /// Memory holding picture data.
    pub memory: MemoryKind,
}

impl LinkFormat {
    /// A stream in host memory.
    pub fn host(stream: StreamParams) -> Self {
        Self {
            stream,
            memory: MemoryKind::Host,
        }
    }

    /// A stream of device surfaces.
    pub fn device(stream: StreamParams) -> Self {
        Self {
            stream,
            memory: MemoryKind::Device,
        }
    }

    /// Get the media type.
    pub fn media_type(&self) -> Option<MediaType> {
        self.stream.media_type()
    }

    /// Get the picture format.
    pub fn video(&self) -> Option<VideoFormat> {
        self.stream.video
    }

    /// Get the audio format.
    pub fn audio(&self) -> Option<AudioFormat> {
        self.stream.audio
    }

    /// Get the time base.
    pub fn time_base(&self) -> TimeBase {
        self.stream.time_base
    }

    /// The same link carrying pictures of `format`.
    #[must_use]
    pub fn with_video(&self, format: VideoFormat) -> Self {
        let mut next = self.clone();
        next.stream.video = Some(format);
        next
    }

    /// The same link carrying audio of `format`, timed in samples.
    #[must_use]
    pub fn with_audio(&self, format: AudioFormat) -> Self {
        let mut next = self.clone();
        next.stream.audio = Some(format);
        next.stream.time_base = TimeBase::for_sample_rate(format.sample_rate);
        next
    }

    /// The same link in another memory kind.
    #[must_use]
    pub fn with_memory(&self, memory: MemoryKind) -> Self {
        Self {
            stream: self.stream.clone(),
            memory,
        }
    }
}

impl fmt::Display for LinkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stream.media_format())?;
        if self.memory == MemoryKind::Device {
            write!(f, " (device)")?;
        }
        Ok(())
    }
}

/// Pictures an input pad accepts. Empty lists accept anything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoConstraint {
    /// Allowed pixel formats.
    pub pixel_formats: Vec<PixelFormat>,
    /// Required dimensions.
    pub size: Option<(u32, u32)>,
    /// Required memory, `None` for either.
    pub memory: Option<MemoryKind>,
}

impl VideoConstraint {
    /// Accept any picture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict pixel formats.
    #[must_use]
    pub fn with_pixel_formats(mut self, formats: impl Into<Vec<PixelFormat>>) -> Self {
        self.pixel_formats = formats.into();
        self
    }

    /// Require dimensions.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    /// Require a memory kind.
    #[must_use]
    pub fn with_memory(mut self, memory: MemoryKind) -> Self {
        self.memory = Some(memory);
        self
    }

    fn accepts(&self, format: VideoFormat, memory: MemoryKind) -> bool {
        (self.pixel_formats.is_empty() || self.pixel_formats.contains(&format.pixel_format))
            && self.size.map_or(true, |(w, h)| (format.width, format.height) == (w, h))
            && self.memory.map_or(true, |m| m == memory)
    }

    fn nearest(&self, format: VideoFormat, memory: MemoryKind) -> Option<VideoFormat> {
        if self.memory.is_some_and(|m| m != memory) {
            return None;
        }
        let pixel_format = nearest_by(&self.pixel_formats, format.pixel_format, |c, f| {
            (c.is_rgb() == f.is_rgb(), c.has_alpha() == f.has_alpha())
        });
        let (width, height) = self.size.unwrap_or((format.width, format.height));
        Some(VideoFormat::new(width, height, pixel_format))
    }
}

/// Audio an input pad accepts. Empty lists accept anything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioConstraint {
    /// Allowed sample formats.
    pub sample_formats: Vec<SampleFormat>,
    /// Allowed sample rates.
    pub sample_rates: Vec<u32>,
    /// Allowed channel layouts.
    pub channel_layouts: Vec<ChannelLayout>,
}

impl AudioConstraint {
    /// Accept any audio.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict sample formats.
    #[must_use]
    pub fn with_sample_formats(mut self, formats: impl Into<Vec<SampleFormat>>) -> Self {
        self.sample_formats = formats.into();
        self
    }

    /// Restrict sample rates.
    #[must_use]
    pub fn with_sample_rates(mut self, rates: impl Into<Vec<u32>>) -> Self {
        self.sample_rates = rates.into();
        self
    }

    /// Restrict channel layouts.
    #[must_use]
    pub fn with_channel_layouts(mut self, layouts: impl Into<Vec<ChannelLayout>>) -> Self {
        self.channel_layouts = layouts.into();
        self
    }

    fn accepts(&self, format: AudioFormat) -> bool {
        (self.sample_formats.is_empty() || self.sample_formats.contains(&format.sample_format))
            && (self.sample_rates.is_empty() || self.sample_rates.contains(&format.sample_rate))
            && (self.channel_layouts.is_empty()
                || self.channel_layouts.contains(&format.channel_layout))
    }

    fn nearest(&self, format: AudioFormat) -> AudioFormat {
        let sample_format = nearest_by(&self.sample_formats, format.sample_format, |c, f| {
            (c.is_planar() == f.is_planar(), c.is_float() == f.is_float())
        });
        let sample_rate = if self.sample_rates.is_empty()
            || self.sample_rates.contains(&format.sample_rate)
        {
            format.sample_rate
        } else {
            self.sample_rates
                .iter()
                .copied()
                .min_by_key(|r| r.abs_diff(format.sample_rate))
                .unwrap_or(format.sample_rate)
        };
        let channel_layout = nearest_by(&self.channel_layouts, format.channel_layout, |c, f| {
            (c.channels() == f.channels(), c.channels() > f.channels())
        });
        AudioFormat::new(sample_format, channel_layout, sample_rate)
    }
}

/// Pick `current` when allowed, else the candidate scoring highest on
/// `affinity`, earlier candidates winning ties.
fn nearest_by<T: Copy + PartialEq, K: Ord>(
    allowed: &[T],
    current: T,
    affinity: impl Fn(T, T) -> K,
) -> T {
    if allowed.is_empty() || allowed.contains(&current) {
        return current;
    }
    let mut best = allowed[0];
    let mut best_key = affinity(best, current);
    for &candidate in &allowed[1..] {
        let key = affinity(candidate, current);
        if key > best_key {
            best = candidate;
            best_key = key;
        }
    }
    best
}

/// Formats an input pad accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatConstraint {
    /// Picture constraint.
    Video(VideoConstraint),
    /// Audio constraint.
    Audio(AudioConstraint),
}

impl FormatConstraint {
    /// Accept any format of `media`.
    pub fn any(media: MediaType) -> Self {
        match media {
            MediaType::Video => Self::Video(VideoConstraint::new()),
            MediaType::Audio => Self::Audio(AudioConstraint::new()),
        }
    }

    /// Accept pictures in host memory only.
    pub fn host_video(pixel_formats: impl Into<Vec<PixelFormat>>) -> Self {
        Self::Video(
            VideoConstraint::new()
                .with_pixel_formats(pixel_formats)
                .with_memory(MemoryKind::Host),
        )
    }

    /// Accept exactly `format`, ignoring its time base.
    pub fn exact(format: &LinkFormat) -> Self {
        match (format.video(), format.audio()) {
            (Some(v), _) => Self::Video(VideoConstraint {
                pixel_formats: vec![v.pixel_format],
                size: Some((v.width, v.height)),
                memory: Some(format.memory),
            }),
            (None, Some(a)) => Self::Audio(AudioConstraint {
                sample_formats: vec![a.sample_format],
                sample_rates: vec![a.sample_rate],
                channel_layouts: vec![a.channel_layout],
            }),
            (None, None) => Self::Video(VideoConstraint::new()),
        }
    }

    /// Get the media type.
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Video(_) => MediaType::Video,
            Self::Audio(_) => MediaType::Audio,
        }
    }

    /// Check if `format` satisfies this constraint.
    pub fn accepts(&self, format: &LinkFormat) -> bool {
        match (self, format.video(), format.audio()) {
            (Self::Video(c), Some(v), _) => c.accepts(v, format.memory),
            (Self::Audio(c), None, Some(a)) => c.accepts(a),
            _ => false,
        }
    }

    /// The acceptable format closest to `format`, or `None` when none can be
    /// reached by conversion (other media type, other memory kind).
    pub fn nearest(&self, format: &LinkFormat) -> Option<LinkFormat> {
        match (self, format.video(), format.audio()) {
            (Self::Video(c), Some(v), _) => c
                .nearest(v, format.memory)
                .map(|target| format.with_video(target)),
            (Self::Audio(c), None, Some(a)) => Some(format.with_audio(c.nearest(a))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yuv(width: u32, height: u32) -> LinkFormat {
        LinkFormat::host(StreamParams::video(
            VideoFormat::new(width, height, PixelFormat::Yuv420p),
            TimeBase::new(1, 25),
        ))
    }

    fn audio(format: SampleFormat, layout: ChannelLayout, rate: u32) -> LinkFormat {
        LinkFormat::host(StreamParams::audio(AudioFormat::new(format, layout, rate)))
    }

    #[test]
    fn test_any_accepts_same_media_only() {
        let any = FormatConstraint::any(MediaType::Video);
        assert!(any.accepts(&yuv(16, 16)));
        assert!(!any.accepts(&audio(SampleFormat::S16, ChannelLayout::Mono, 8000)));
    }

    #[test]
    fn test_video_nearest_prefers_same_family() {
        let c = FormatConstraint::host_video([PixelFormat::Gray8, PixelFormat::Rgb24, PixelFormat::Rgba]);
        let near = c.nearest(&yuv(16, 8)).unwrap();
        assert_eq!(near.video().unwrap().pixel_format, PixelFormat::Gray8);

        let rgba = yuv(16, 8).with_video(VideoFormat::new(16, 8, PixelFormat::Bgra));
        let near = c.nearest(&rgba).unwrap();
        assert_eq!(near.video().unwrap().pixel_format, PixelFormat::Rgba);
    }

    #[test]
    fn test_video_size_and_memory() {
        let c = FormatConstraint::Video(VideoConstraint::new().with_size(8, 8));
        assert!(!c.accepts(&yuv(16, 16)));
        let near = c.nearest(&yuv(16, 16)).unwrap();
        assert_eq!((near.video().unwrap().width, near.video().unwrap().height), (8, 8));

        let host_only = FormatConstraint::host_video(Vec::new());
        let device = yuv(16, 16).with_memory(MemoryKind::Device);
        assert!(!host_only.accepts(&device));
        assert!(host_only.nearest(&device).is_none());
    }

    #[test]
    fn test_audio_nearest() {
        let c = FormatConstraint::Audio(
            AudioConstraint::new()
                .with_sample_formats([SampleFormat::S16, SampleFormat::F32p])
                .with_sample_rates([44100, 48000])
                .with_channel_layouts([ChannelLayout::Stereo]),
        );
        let input = audio(SampleFormat::F64p, ChannelLayout::Surround51, 32000);
        assert!(!c.accepts(&input));
        let near = c.nearest(&input).unwrap();
        let a = near.audio().unwrap();
        assert_eq!(a.sample_format, SampleFormat::F32p);
        assert_eq!(a.sample_rate, 44100);
        assert_eq!(a.channel_layout, ChannelLayout::Stereo);
        assert_eq!(near.time_base(), TimeBase::for_sample_rate(44100));
        assert!(c.accepts(&near));
    }

    #[test]
    fn test_exact() {
        let f = audio(SampleFormat::S16, ChannelLayout::Mono, 8000);
        let c = FormatConstraint::exact(&f);
        assert!(c.accepts(&f));
        assert!(!c.accepts(&audio(SampleFormat::S16, ChannelLayout::Stereo, 8000)));
    }
}

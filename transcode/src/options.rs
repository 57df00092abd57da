//! Transcoding options and configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use transcode_core::{
    AudioFormat, ChannelLayout, CodecId, Error, MediaFormat, MediaType, PixelFormat, Rational,
    Result, SampleFormat, StreamParams, TimeBase, VideoFormat,
};

/// High-level transcoding options using builder pattern.
///
/// Every field is serde-enabled so a job can be described in JSON:
///
/// ```json
/// {
///   "input": { "path": "in.yuv", "codec": "rawvideo", "width": 64, "height": 48, "pixel_format": "yuv420p" },
///   "output": { "path": "out.rgb" },
///   "video": { "pixel_format": "rgb24" }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeOptions {
    /// Input configuration.
    pub input: Option<InputConfig>,
    /// Output configuration.
    pub output: Option<OutputConfig>,
    /// Filter graph description run on decoded units.
    pub filters: Option<String>,
    /// Picture conversion before the encoder.
    pub video: Option<VideoConfig>,
    /// Audio conversion before the encoder.
    pub audio: Option<AudioConfig>,
    /// Stream filter list run on encoded units, e.g. `"setts=offset=10,null"`.
    pub bitstream_filters: Option<String>,
    /// Worker threads for picture conversion (0 lets the pool decide).
    pub threads: Option<usize>,
    /// Decode into device surfaces of the emulated accelerator.
    pub hardware_accel: bool,
    /// Overwrite output file if exists.
    pub overwrite: bool,
}

impl TranscodeOptions {
    /// Create new transcoding options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the input file and its codec.
    #[must_use]
    pub fn input(mut self, path: impl Into<PathBuf>, codec: CodecId) -> Self {
        self.input = Some(InputConfig::new(path, codec));
        self
    }

    /// Set input configuration.
    #[must_use]
    pub fn input_config(mut self, config: InputConfig) -> Self {
        self.input = Some(config);
        self
    }

    /// Set output file path.
    #[must_use]
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(OutputConfig::new(path));
        self
    }

    /// Set output configuration.
    #[must_use]
    pub fn output_config(mut self, config: OutputConfig) -> Self {
        self.output = Some(config);
        self
    }

    /// Set the filter graph description.
    #[must_use]
    pub fn filters(mut self, description: impl Into<String>) -> Self {
        self.filters = Some(description.into());
        self
    }

    /// Set the stream filter list.
    #[must_use]
    pub fn bitstream_filters(mut self, list: impl Into<String>) -> Self {
        self.bitstream_filters = Some(list.into());
        self
    }

    /// Set video configuration.
    #[must_use]
    pub fn video_config(mut self, config: VideoConfig) -> Self {
        self.video = Some(config);
        self
    }

    /// Set audio configuration.
    #[must_use]
    pub fn audio_config(mut self, config: AudioConfig) -> Self {
        self.audio = Some(config);
        self
    }

    /// Set video resolution.
    #[must_use]
    pub fn video_resolution(mut self, width: u32, height: u32) -> Self {
        let video = self.video.get_or_insert_with(VideoConfig::default);
        video.width = Some(width);
        video.height = Some(height);
        self
    }

    /// Set the output pixel format.
    #[must_use]
    pub fn video_pixel_format(mut self, format: PixelFormat) -> Self {
        self.video.get_or_insert_with(VideoConfig::default).pixel_format = Some(format);
        self
    }

    /// Set audio sample rate.
    #[must_use]
    pub fn audio_sample_rate(mut self, sample_rate: u32) -> Self {
        self.audio.get_or_insert_with(AudioConfig::default).sample_rate = Some(sample_rate);
        self
    }

    /// Set audio channels.
    #[must_use]
    pub fn audio_channels(mut self, channels: u32) -> Self {
        self.audio.get_or_insert_with(AudioConfig::default).channels = Some(channels);
        self
    }

    /// Set number of threads.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Enable hardware acceleration.
    #[must_use]
    pub fn hardware_acceleration(mut self, enable: bool) -> Self {
        self.hardware_accel = enable;
        self
    }

    /// Enable overwrite mode.
    #[must_use]
    pub fn overwrite(mut self, enable: bool) -> Self {
        self.overwrite = enable;
        self
    }

    /// Check that the options describe a runnable job.
    pub fn validate(&self) -> Result<()> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| Error::invalid_config("input not specified"))?;
        if self.output.is_none() {
            return Err(Error::invalid_config("output not specified"));
        }
        let stream = input.stream_params()?;
        let output = self.output_codec()?;
        if output.media_type() != input.codec.media_type() {
            return Err(Error::invalid_config(format!(
                "cannot encode {} input as {output}",
                input.codec.media_type()
            )));
        }
        match input.codec.media_type() {
            MediaType::Video if self.audio.is_some() => {
                return Err(Error::invalid_config("audio settings given for a video input"))
            }
            MediaType::Audio if self.video.is_some() => {
                return Err(Error::invalid_config("video settings given for an audio input"))
            }
            _ => {}
        }
        if let (Some(video), Some(decoded)) = (&self.video, stream.video) {
            video.target(decoded)?;
        }
        if let (Some(audio), Some(decoded)) = (&self.audio, stream.audio) {
            audio.target(decoded)?;
        }
        if input.unit_size()? == 0 {
            return Err(Error::invalid_config("input units would be empty"));
        }
        Ok(())
    }

    /// Get the codec written to the output, defaulting to the input codec.
    pub fn output_codec(&self) -> Result<CodecId> {
        match (self.output.as_ref().and_then(|o| o.codec), &self.input) {
            (Some(codec), _) => Ok(codec),
            (None, Some(input)) => Ok(input.codec),
            (None, None) => Err(Error::invalid_config("input not specified")),
        }
    }
}

/// Input file configuration.
///
/// Raw inputs carry no header, so the stream is described here: picture size
/// and pixel format for `rawvideo`, sample rate and channels for PCM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Input file path.
    pub path: PathBuf,
    /// Codec of the stored units.
    #[serde(with = "codec_name")]
    pub codec: CodecId,
    /// Picture width.
    #[serde(default)]
    pub width: Option<u32>,
    /// Picture height.
    #[serde(default)]
    pub height: Option<u32>,
    /// Pixel format.
    #[serde(default)]
    pub pixel_format: Option<PixelFormat>,
    /// Frame rate, 25 when unset.
    #[serde(default)]
    pub frame_rate: Option<Rational>,
    /// Sample rate in Hz.
    #[serde(default)]
    pub sample_rate: Option<u32>,
    /// Number of channels.
    #[serde(default)]
    pub channels: Option<u32>,
    /// Samples per unit read from the file, 1024 when unset.
    #[serde(default)]
    pub frame_samples: Option<usize>,
}

const DEFAULT_FRAME_RATE: Rational = Rational { num: 25, den: 1 };
const DEFAULT_FRAME_SAMPLES: usize = 1024;

impl InputConfig {
    /// Create new input configuration.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, codec: CodecId) -> Self {
        Self {
            path: path.into(),
            codec,
            width: None,
            height: None,
            pixel_format: None,
            frame_rate: None,
            sample_rate: None,
            channels: None,
            frame_samples: None,
        }
    }

    /// Describe raw pictures.
    #[must_use]
    pub fn video(mut self, width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self.pixel_format = Some(pixel_format);
        self
    }

    /// Set the frame rate.
    #[must_use]
    pub fn frame_rate(mut self, rate: Rational) -> Self {
        self.frame_rate = Some(rate);
        self
    }

    /// Describe raw audio.
    #[must_use]
    pub fn audio(mut self, sample_rate: u32, channels: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self.channels = Some(channels);
        self
    }

    /// Set the samples per unit.
    #[must_use]
    pub fn frame_samples(mut self, samples: usize) -> Self {
        self.frame_samples = Some(samples);
        self
    }

    /// Get the stream description handed to the decoder.
    pub fn stream_params(&self) -> Result<StreamParams> {
        match self.codec.media_type() {
            MediaType::Video => {
                let (Some(width), Some(height), Some(pixel_format)) =
                    (self.width, self.height, self.pixel_format)
                else {
                    return Err(Error::invalid_config(format!(
                        "{} input needs width, height and pixel_format",
                        self.codec
                    )));
                };
                let format = VideoFormat::new(width, height, pixel_format);
                format.validate()?;
                let rate = self.frame_rate.unwrap_or(DEFAULT_FRAME_RATE);
                let tick = rate
                    .inverse()
                    .filter(Rational::is_positive)
                    .ok_or_else(|| Error::invalid_config(format!("frame rate {rate} is not positive")))?;
                Ok(StreamParams::compressed(self.codec, TimeBase(tick))
                    .with_video(format)
                    .with_frame_rate(rate))
            }
            MediaType::Audio => {
                let (Some(sample_rate), Some(channels)) = (self.sample_rate, self.channels) else {
                    return Err(Error::invalid_config(format!(
                        "{} input needs sample_rate and channels",
                        self.codec
                    )));
                };
                let sample_format = self.codec.pcm_sample_format().ok_or_else(|| {
                    Error::unsupported(format!("no raw reader for {} input", self.codec))
                })?;
                let format =
                    AudioFormat::new(sample_format, ChannelLayout::from_channels(channels), sample_rate);
                format.validate()?;
                Ok(StreamParams::compressed(self.codec, TimeBase::for_sample_rate(sample_rate))
                    .with_audio(format))
            }
        }
    }

    /// Get the decoded format the decoder will produce.
    pub fn decoded_format(&self) -> Result<MediaFormat> {
        let stream = self.stream_params()?;
        match (stream.video, stream.audio) {
            (Some(v), _) => Ok(MediaFormat::Video(v)),
            (None, Some(a)) => Ok(MediaFormat::Audio(a)),
            _ => Err(Error::invalid_config("input stream has no format")),
        }
    }

    /// Get the size in bytes of one stored unit.
    pub fn unit_size(&self) -> Result<usize> {
        let stream = self.stream_params()?;
        match (stream.video, stream.audio) {
            (Some(v), _) => Ok(v.packed_size()),
            (None, Some(a)) => Ok(a.plane_size(self.samples_per_unit())),
            _ => Err(Error::invalid_config("input stream has no format")),
        }
    }

    /// Get the duration of one stored unit in the input time base.
    pub fn unit_duration(&self) -> i64 {
        match self.codec.media_type() {
            MediaType::Video => 1,
            MediaType::Audio => self.samples_per_unit() as i64,
        }
    }

    fn samples_per_unit(&self) -> usize {
        self.frame_samples.unwrap_or(DEFAULT_FRAME_SAMPLES)
    }
}

/// Output file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output file path.
    pub path: PathBuf,
    /// Output codec, the input codec when unset.
    #[serde(default, with = "optional_codec_name")]
    pub codec: Option<CodecId>,
    /// Samples per encoded audio unit, 0 to keep the decoded unit sizes.
    #[serde(default)]
    pub frame_size: usize,
}

impl OutputConfig {
    /// Create new output configuration.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            codec: None,
            frame_size: 0,
        }
    }

    /// Set the output codec.
    #[must_use]
    pub fn codec(mut self, codec: CodecId) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Set the encoded audio unit size.
    #[must_use]
    pub fn frame_size(mut self, samples: usize) -> Self {
        self.frame_size = samples;
        self
    }
}

/// Picture conversion settings. Unset fields keep the decoded value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Output width.
    pub width: Option<u32>,
    /// Output height.
    pub height: Option<u32>,
    /// Pixel format.
    pub pixel_format: Option<PixelFormat>,
    /// Resize filter: `bilinear` or `neighbor`.
    pub scale_filter: Option<String>,
}

impl VideoConfig {
    /// Create new video configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set resolution.
    #[must_use]
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Set pixel format.
    #[must_use]
    pub fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }

    /// Resolve against the decoded format.
    pub fn target(&self, decoded: VideoFormat) -> Result<VideoFormat> {
        let target = VideoFormat::new(
            self.width.unwrap_or(decoded.width),
            self.height.unwrap_or(decoded.height),
            self.pixel_format.unwrap_or(decoded.pixel_format),
        );
        target.validate()?;
        Ok(target)
    }
}

/// Audio conversion settings. Unset fields keep the decoded value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Number of channels.
    pub channels: Option<u32>,
    /// Sample format.
    pub sample_format: Option<SampleFormat>,
    /// Rate conversion kernel: `sinc` or `linear`.
    pub resampler: Option<String>,
}

impl AudioConfig {
    /// Create new audio configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set sample rate.
    #[must_use]
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Set number of channels.
    #[must_use]
    pub fn channels(mut self, channels: u32) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Set sample format.
    #[must_use]
    pub fn sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = Some(format);
        self
    }

    /// Resolve against the decoded format.
    pub fn target(&self, decoded: AudioFormat) -> Result<AudioFormat> {
        let target = AudioFormat::new(
            self.sample_format.unwrap_or(decoded.sample_format),
            self.channels
                .map_or(decoded.channel_layout, ChannelLayout::from_channels),
            self.sample_rate.unwrap_or(decoded.sample_rate),
        );
        target.validate()?;
        Ok(target)
    }
}

mod codec_name {
    use serde::{Deserialize, Deserializer, Serializer};
    use transcode_core::CodecId;

    pub fn serialize<S: Serializer>(codec: &CodecId, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(codec.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CodecId, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

mod optional_codec_name {
    use serde::{Deserialize, Deserializer, Serializer};
    use transcode_core::CodecId;

    pub fn serialize<S: Serializer>(codec: &Option<CodecId>, serializer: S) -> Result<S::Ok, S::Error> {
        match codec {
            Some(codec) => serializer.serialize_some(codec.name()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<CodecId>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|name| name.parse().map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_input() -> InputConfig {
        InputConfig::new("in.yuv", CodecId::RawVideo).video(64, 48, PixelFormat::Yuv420p)
    }

    #[test]
    fn test_validate_requires_input_and_output() {
        assert!(TranscodeOptions::new().validate().is_err());
        let options = TranscodeOptions::new().input_config(video_input());
        assert!(options.validate().is_err());
        assert!(options.output("out.yuv").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_media_mismatch() {
        let options = TranscodeOptions::new()
            .input_config(video_input())
            .output_config(OutputConfig::new("out.pcm").codec(CodecId::PcmS16Le));
        assert!(options.validate().is_err());

        let options = TranscodeOptions::new()
            .input_config(video_input())
            .output("out.yuv")
            .audio_sample_rate(8000);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_video_input_description() {
        let input = video_input().frame_rate(Rational::new(30, 1));
        let stream = input.stream_params().unwrap();
        assert_eq!(stream.codec, Some(CodecId::RawVideo));
        assert_eq!(stream.time_base, TimeBase::new(1, 30));
        assert_eq!(input.unit_size().unwrap(), 64 * 48 * 3 / 2);
        assert!(InputConfig::new("x", CodecId::RawVideo).stream_params().is_err());
    }

    #[test]
    fn test_audio_input_description() {
        let input = InputConfig::new("in.pcm", CodecId::PcmS16Le)
            .audio(48_000, 2)
            .frame_samples(480);
        assert_eq!(input.unit_size().unwrap(), 480 * 4);
        assert_eq!(input.unit_duration(), 480);
        assert_eq!(
            input.stream_params().unwrap().time_base,
            TimeBase::new(1, 48_000)
        );
    }

    #[test]
    fn test_targets_keep_unset_fields() {
        let decoded = VideoFormat::new(64, 48, PixelFormat::Yuv420p);
        let target = VideoConfig::new().pixel_format(PixelFormat::Rgb24).target(decoded).unwrap();
        assert_eq!(target, VideoFormat::new(64, 48, PixelFormat::Rgb24));

        let decoded = AudioFormat::new(SampleFormat::S16, ChannelLayout::Stereo, 48_000);
        let target = AudioConfig::new().channels(1).target(decoded).unwrap();
        assert_eq!(target.channel_layout, ChannelLayout::Mono);
        assert_eq!(target.sample_rate, 48_000);
    }

    #[test]
    fn test_output_codec_defaults_to_input() {
        let options = TranscodeOptions::new().input_config(video_input()).output("o");
        assert_eq!(options.output_codec().unwrap(), CodecId::RawVideo);
    }
}

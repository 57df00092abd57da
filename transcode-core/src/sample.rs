//! Sample formats, channel layouts and audio format descriptors.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sample format for audio data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SampleFormat {
    /// Unsigned 8-bit.
    U8,
    /// Signed 16-bit, little-endian.
    S16,
    /// Signed 32-bit, little-endian.
    S32,
    /// 32-bit float, little-endian.
    F32,
    /// 64-bit float, little-endian.
    F64,
    /// Unsigned 8-bit planar.
    U8p,
    /// Signed 16-bit planar.
    S16p,
    /// Signed 32-bit planar.
    S32p,
    /// 32-bit float planar.
    F32p,
    /// 64-bit float planar.
    F64p,
}

const ALL_SAMPLE_FORMATS: &[SampleFormat] = &[
    SampleFormat::U8,
    SampleFormat::S16,
    SampleFormat::S32,
    SampleFormat::F32,
    SampleFormat::F64,
    SampleFormat::U8p,
    SampleFormat::S16p,
    SampleFormat::S32p,
    SampleFormat::F32p,
    SampleFormat::F64p,
];

impl SampleFormat {
    /// Get the number of bytes per sample.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::U8 | Self::U8p => 1,
            Self::S16 | Self::S16p => 2,
            Self::S32 | Self::S32p | Self::F32 | Self::F32p => 4,
            Self::F64 | Self::F64p => 8,
        }
    }

    /// Check if this is a planar format.
    pub fn is_planar(&self) -> bool {
        matches!(
            self,
            Self::U8p | Self::S16p | Self::S32p | Self::F32p | Self::F64p
        )
    }

    /// Check if this is a floating-point format.
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64 | Self::F32p | Self::F64p)
    }

    /// Get the packed equivalent of this format.
    pub fn to_packed(&self) -> Self {
        match self {
            Self::U8p => Self::U8,
            Self::S16p => Self::S16,
            Self::S32p => Self::S32,
            Self::F32p => Self::F32,
            Self::F64p => Self::F64,
            other => *other,
        }
    }

    /// Get the planar equivalent of this format.
    pub fn to_planar(&self) -> Self {
        match self {
            Self::U8 => Self::U8p,
            Self::S16 => Self::S16p,
            Self::S32 => Self::S32p,
            Self::F32 => Self::F32p,
            Self::F64 => Self::F64p,
            other => *other,
        }
    }

    /// Get the canonical short name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::F32 => "flt",
            Self::F64 => "dbl",
            Self::U8p => "u8p",
            Self::S16p => "s16p",
            Self::S32p => "s32p",
            Self::F32p => "fltp",
            Self::F64p => "dblp",
        }
    }

    /// Iterate over every known sample format.
    pub fn all() -> impl Iterator<Item = SampleFormat> {
        ALL_SAMPLE_FORMATS.iter().copied()
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "f32" => return Ok(Self::F32),
            "f32p" => return Ok(Self::F32p),
            "f64" => return Ok(Self::F64),
            "f64p" => return Ok(Self::F64p),
            _ => {}
        }
        Self::all()
            .find(|f| f.name() == lower)
            .ok_or_else(|| Error::unsupported(format!("unknown sample format '{s}'")))
    }
}

impl TryFrom<String> for SampleFormat {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SampleFormat> for String {
    fn from(f: SampleFormat) -> Self {
        f.name().to_string()
    }
}

/// Channel layout for audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Mono (1 channel).
    Mono,
    /// Stereo (2 channels: left, right).
    #[default]
    Stereo,
    /// 2.1 (3 channels: left, right, LFE).
    Surround21,
    /// Quad (4 channels: FL, FR, BL, BR).
    Quad,
    /// 5.0 (5 channels: FL, FR, FC, BL, BR).
    Surround50,
    /// 5.1 (6 channels: FL, FR, FC, LFE, BL, BR).
    Surround51,
    /// 7.1 (8 channels: FL, FR, FC, LFE, BL, BR, SL, SR).
    Surround71,
    /// Unspecified layout with a channel count.
    Custom(u32),
}

impl ChannelLayout {
    /// Get the number of channels.
    pub fn channels(&self) -> u32 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Surround21 => 3,
            Self::Quad => 4,
            Self::Surround50 => 5,
            Self::Surround51 => 6,
            Self::Surround71 => 8,
            Self::Custom(n) => *n,
        }
    }

    /// Create the default layout for a channel count.
    pub fn from_channels(channels: u32) -> Self {
        match channels {
            1 => Self::Mono,
            2 => Self::Stereo,
            3 => Self::Surround21,
            4 => Self::Quad,
            5 => Self::Surround50,
            6 => Self::Surround51,
            8 => Self::Surround71,
            n => Self::Custom(n),
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mono => write!(f, "mono"),
            Self::Stereo => write!(f, "stereo"),
            Self::Surround21 => write!(f, "2.1"),
            Self::Quad => write!(f, "quad"),
            Self::Surround50 => write!(f, "5.0"),
            Self::Surround51 => write!(f, "5.1"),
            Self::Surround71 => write!(f, "7.1"),
            Self::Custom(n) => write!(f, "{}c", n),
        }
    }
}

impl FromStr for ChannelLayout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let layout = match lower.as_str() {
            "mono" => Self::Mono,
            "stereo" => Self::Stereo,
            "2.1" => Self::Surround21,
            "quad" | "4.0" => Self::Quad,
            "5.0" => Self::Surround50,
            "5.1" => Self::Surround51,
            "7.1" => Self::Surround71,
            other => {
                let count = other.strip_suffix('c').unwrap_or(other);
                match count.parse::<u32>() {
                    Ok(n) if n > 0 => Self::from_channels(n),
                    _ => {
                        return Err(Error::unsupported(format!("unknown channel layout '{s}'")))
                    }
                }
            }
        };
        Ok(layout)
    }
}

/// Format descriptor of a decoded audio unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    /// Sample format.
    pub sample_format: SampleFormat,
    /// Channel layout.
    pub channel_layout: ChannelLayout,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioFormat {
    /// Create a new audio format.
    pub fn new(sample_format: SampleFormat, channel_layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            sample_format,
            channel_layout,
            sample_rate,
        }
    }

    /// Validate rate and channel count.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.sample_rate > 768_000 {
            return Err(Error::invalid_config(format!(
                "sample rate {} out of range",
                self.sample_rate
            )));
        }
        if self.channels() == 0 || self.channels() > 64 {
            return Err(Error::invalid_config(format!(
                "channel count {} out of range",
                self.channels()
            )));
        }
        Ok(())
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channel_layout.channels() as usize
    }

    /// Number of storage planes (one per channel when planar, else one).
    pub fn num_planes(&self) -> usize {
        if self.sample_format.is_planar() {
            self.channels()
        } else {
            1
        }
    }

    /// Bytes needed in each plane to hold `nb_samples` samples per channel.
    pub fn plane_size(&self, nb_samples: usize) -> usize {
        let per_sample = self.sample_format.bytes_per_sample();
        if self.sample_format.is_planar() {
            nb_samples * per_sample
        } else {
            nb_samples * per_sample * self.channels()
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz {} {}",
            self.sample_rate, self.channel_layout, self.sample_format
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_sample() {
        assert_eq!(SampleFormat::S16.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::F64p.bytes_per_sample(), 8);
    }

    #[test]
    fn test_planar_conversion() {
        assert_eq!(SampleFormat::S16.to_planar(), SampleFormat::S16p);
        assert_eq!(SampleFormat::F32p.to_packed(), SampleFormat::F32);
    }

    #[test]
    fn test_parse_layouts() {
        assert_eq!("5.1".parse::<ChannelLayout>().unwrap(), ChannelLayout::Surround51);
        assert_eq!("2c".parse::<ChannelLayout>().unwrap(), ChannelLayout::Stereo);
        assert_eq!("3".parse::<ChannelLayout>().unwrap(), ChannelLayout::Surround21);
        assert_eq!("10".parse::<ChannelLayout>().unwrap(), ChannelLayout::Custom(10));
        assert!("0".parse::<ChannelLayout>().is_err());
    }

    #[test]
    fn test_plane_size() {
        let packed = AudioFormat::new(SampleFormat::S16, ChannelLayout::Stereo, 48000);
        assert_eq!(packed.num_planes(), 1);
        assert_eq!(packed.plane_size(10), 40);

        let planar = AudioFormat::new(SampleFormat::F32p, ChannelLayout::Stereo, 48000);
        assert_eq!(planar.num_planes(), 2);
        assert_eq!(planar.plane_size(10), 40);
    }

    #[test]
    fn test_parse_sample_format() {
        assert_eq!("fltp".parse::<SampleFormat>().unwrap(), SampleFormat::F32p);
        assert_eq!("f32".parse::<SampleFormat>().unwrap(), SampleFormat::F32);
        assert!("s24".parse::<SampleFormat>().is_err());
    }
}

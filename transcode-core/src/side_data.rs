//! Buffer flags and auxiliary side-channel records.

use bitflags::bitflags;

bitflags! {
    /// Flags for buffer properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// Unit starts a keyframe / random access point.
        const KEYFRAME = 0x0001;
        /// Unit data is known to be damaged.
        const CORRUPT = 0x0002;
        /// Unit should be decoded but not output.
        const DISCARD = 0x0004;
        /// Unit is not referenced by others and can be dropped.
        const DISPOSABLE = 0x0008;
    }
}

/// Types of side data that can be attached to buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideDataType {
    /// Palette for paletted formats (RGBA entries).
    Palette,
    /// SMPTE timecode.
    Timecode,
    /// H.264/H.265 parameter sets (SPS, PPS).
    ParameterSets,
    /// Codec extradata changed starting at this unit.
    NewExtradata,
    /// Stream parameters changed starting at this unit.
    ParamChange,
    /// Display matrix (rotation/flip).
    DisplayMatrix,
    /// Skip samples (for gapless playback).
    SkipSamples,
    /// Custom/unknown.
    Custom(u32),
}

/// Side data attached to a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideData {
    /// Type of side data.
    pub data_type: SideDataType,
    /// The side data payload.
    pub data: Vec<u8>,
}

impl SideData {
    /// Create new side data.
    pub fn new(data_type: SideDataType, data: Vec<u8>) -> Self {
        Self { data_type, data }
    }

    /// Parameter change record carrying new picture dimensions.
    ///
    /// Payload: width and height as little-endian `u32`.
    pub fn dimensions_change(width: u32, height: u32) -> Self {
        let mut data = Vec::with_capacity(8);
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        Self::new(SideDataType::ParamChange, data)
    }

    /// Decode a [`SideData::dimensions_change`] payload.
    pub fn as_dimensions_change(&self) -> Option<(u32, u32)> {
        if self.data_type != SideDataType::ParamChange || self.data.len() != 8 {
            return None;
        }
        let width = u32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]]);
        let height = u32::from_le_bytes([self.data[4], self.data[5], self.data[6], self.data[7]]);
        Some((width, height))
    }
}

//! Pixel formats and picture format descriptors.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Row alignment, in bytes, of planes allocated by [`crate::Buffer::allocate`].
pub const PLANE_ALIGN: usize = 32;

/// Pixel format for video frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[non_exhaustive]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp (1 Cr & Cb sample per 2x2 Y samples).
    Yuv420p,
    /// Planar YUV 4:2:2, 16bpp (1 Cr & Cb sample per 2x1 Y samples).
    Yuv422p,
    /// Planar YUV 4:4:4, 24bpp (no subsampling).
    Yuv444p,
    /// Planar YUV 4:2:0, 10-bit little-endian in 16-bit words.
    Yuv420p10le,
    /// Semi-planar 4:2:0 (Y plane, interleaved UV plane).
    Nv12,
    /// Semi-planar 4:2:0 (Y plane, interleaved VU plane).
    Nv21,
    /// Packed RGB24, 24bpp.
    Rgb24,
    /// Packed BGR24, 24bpp.
    Bgr24,
    /// Packed RGBA, 32bpp.
    Rgba,
    /// Packed BGRA, 32bpp.
    Bgra,
    /// Grayscale, 8bpp.
    Gray8,
    /// Grayscale, 16bpp little-endian.
    Gray16,
}

const ALL_PIXEL_FORMATS: &[PixelFormat] = &[
    PixelFormat::Yuv420p,
    PixelFormat::Yuv422p,
    PixelFormat::Yuv444p,
    PixelFormat::Yuv420p10le,
    PixelFormat::Nv12,
    PixelFormat::Nv21,
    PixelFormat::Rgb24,
    PixelFormat::Bgr24,
    PixelFormat::Rgba,
    PixelFormat::Bgra,
    PixelFormat::Gray8,
    PixelFormat::Gray16,
];

impl PixelFormat {
    /// Get the number of planes for this pixel format.
    pub fn num_planes(&self) -> usize {
        match self {
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p | Self::Yuv420p10le => 3,
            Self::Nv12 | Self::Nv21 => 2,
            Self::Rgb24 | Self::Bgr24 | Self::Rgba | Self::Bgra | Self::Gray8 | Self::Gray16 => 1,
        }
    }

    /// Get the number of bytes per component sample.
    pub fn bytes_per_component(&self) -> usize {
        if self.is_high_depth() {
            2
        } else {
            1
        }
    }

    /// Check if components are wider than 8 bits.
    pub fn is_high_depth(&self) -> bool {
        matches!(self, Self::Yuv420p10le | Self::Gray16)
    }

    /// Check if this is an RGB family format.
    pub fn is_rgb(&self) -> bool {
        matches!(self, Self::Rgb24 | Self::Bgr24 | Self::Rgba | Self::Bgra)
    }

    /// Check if the format carries an alpha channel.
    pub fn has_alpha(&self) -> bool {
        matches!(self, Self::Rgba | Self::Bgra)
    }

    /// Get chroma subsampling factors (horizontal, vertical).
    pub fn chroma_subsampling(&self) -> (u32, u32) {
        match self {
            Self::Yuv420p | Self::Yuv420p10le | Self::Nv12 | Self::Nv21 => (2, 2),
            Self::Yuv422p => (2, 1),
            _ => (1, 1),
        }
    }

    /// Width in bytes of one row of `plane` for a picture `width` pixels wide.
    pub fn plane_row_bytes(&self, plane: usize, width: u32) -> usize {
        let width = width as usize;
        let (hsub, _) = self.chroma_subsampling();
        let chroma = width.div_ceil(hsub as usize);
        match self {
            Self::Nv12 | Self::Nv21 if plane == 1 => chroma * 2,
            Self::Rgb24 | Self::Bgr24 => width * 3,
            Self::Rgba | Self::Bgra => width * 4,
            _ if plane == 0 => width * self.bytes_per_component(),
            _ => chroma * self.bytes_per_component(),
        }
    }

    /// Number of rows in `plane` for a picture `height` pixels tall.
    pub fn plane_rows(&self, plane: usize, height: u32) -> usize {
        let (_, vsub) = self.chroma_subsampling();
        if plane == 0 {
            height as usize
        } else {
            (height as usize).div_ceil(vsub as usize)
        }
    }

    /// Iterate over every known pixel format.
    pub fn all() -> impl Iterator<Item = PixelFormat> {
        ALL_PIXEL_FORMATS.iter().copied()
    }

    /// Get the canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Yuv420p => "yuv420p",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Yuv420p10le => "yuv420p10le",
            Self::Nv12 => "nv12",
            Self::Nv21 => "nv21",
            Self::Rgb24 => "rgb24",
            Self::Bgr24 => "bgr24",
            Self::Rgba => "rgba",
            Self::Bgra => "bgra",
            Self::Gray8 => "gray",
            Self::Gray16 => "gray16le",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "gray8" => return Ok(Self::Gray8),
            "gray16" => return Ok(Self::Gray16),
            _ => {}
        }
        Self::all()
            .find(|f| f.name() == lower)
            .ok_or_else(|| Error::unsupported(format!("unknown pixel format '{s}'")))
    }
}

impl TryFrom<String> for PixelFormat {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PixelFormat> for String {
    fn from(f: PixelFormat) -> Self {
        f.name().to_string()
    }
}

/// Format descriptor of a decoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoFormat {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub pixel_format: PixelFormat,
}

impl VideoFormat {
    /// Create a new picture format.
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            pixel_format,
        }
    }

    /// Validate dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::invalid_config(format!(
                "picture dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width > 16384 || self.height > 16384 {
            return Err(Error::invalid_config(format!(
                "picture dimensions {}x{} exceed 16384x16384",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Number of planes.
    pub fn num_planes(&self) -> usize {
        self.pixel_format.num_planes()
    }

    /// Bytes per row of `plane` without padding.
    pub fn row_bytes(&self, plane: usize) -> usize {
        self.pixel_format.plane_row_bytes(plane, self.width)
    }

    /// Rows in `plane`.
    pub fn rows(&self, plane: usize) -> usize {
        self.pixel_format.plane_rows(plane, self.height)
    }

    /// Size in bytes of the tightly packed picture (no row padding).
    pub fn packed_size(&self) -> usize {
        (0..self.num_planes())
            .map(|p| self.row_bytes(p) * self.rows(p))
            .sum()
    }

    /// Stride of `plane` when rows are padded to [`PLANE_ALIGN`].
    pub fn aligned_stride(&self, plane: usize) -> usize {
        (self.row_bytes(plane) + PLANE_ALIGN - 1) & !(PLANE_ALIGN - 1)
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.pixel_format)
    }
}

/// Parses `"WIDTHxHEIGHT"`.
pub fn parse_image_size(s: &str) -> Result<(u32, u32)> {
    let (w, h) = s
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| Error::invalid_config(format!("'{s}' is not WIDTHxHEIGHT")))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .map_err(|_| Error::invalid_config(format!("'{s}' is not WIDTHxHEIGHT")))
    };
    Ok((parse(w)?, parse(h)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_planes() {
        assert_eq!(PixelFormat::Yuv420p.num_planes(), 3);
        assert_eq!(PixelFormat::Nv12.num_planes(), 2);
        assert_eq!(PixelFormat::Rgb24.num_planes(), 1);
    }

    #[test]
    fn test_odd_dimensions_round_chroma_up() {
        let fmt = VideoFormat::new(5, 3, PixelFormat::Yuv420p);
        assert_eq!(fmt.row_bytes(0), 5);
        assert_eq!(fmt.row_bytes(1), 3);
        assert_eq!(fmt.rows(1), 2);
        assert_eq!(fmt.packed_size(), 15 + 6 + 6);

        let nv12 = VideoFormat::new(5, 3, PixelFormat::Nv12);
        assert_eq!(nv12.row_bytes(1), 6);
    }

    #[test]
    fn test_stride_alignment() {
        let fmt = VideoFormat::new(100, 100, PixelFormat::Yuv420p);
        assert_eq!(fmt.aligned_stride(0), 128);
        assert_eq!(fmt.aligned_stride(1) % PLANE_ALIGN, 0);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("YUV420P".parse::<PixelFormat>().unwrap(), PixelFormat::Yuv420p);
        assert_eq!("gray8".parse::<PixelFormat>().unwrap(), PixelFormat::Gray8);
        assert!("yuv411p".parse::<PixelFormat>().is_err());
        assert_eq!(parse_image_size("640x480").unwrap(), (640, 480));
        assert!(parse_image_size("640").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(VideoFormat::new(0, 10, PixelFormat::Gray8).validate().is_err());
        assert!(VideoFormat::new(16, 16, PixelFormat::Gray8).validate().is_ok());
    }
}

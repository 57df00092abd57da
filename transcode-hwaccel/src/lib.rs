//! Device contexts and pooled hardware surfaces for transcode.
//!
//! - [`HwDeviceContext`]: implements [`transcode_core::Device`]
//! - [`HwFramesPool`]: fixed slot count, `ResourceExhausted` when every slot
//!   is live, slots recycled when the last buffer referencing them drops
//! - [`map_surface`]: in-place plane access with [`MapFlags`]
//!
//! Driver integration is out of scope: only the emulated
//! [`HwAccelType::Software`] device allocates memory. Every other
//! accelerator type reports [`HwAccelError::NotSupported`].
//!
//! # Example
//!
//! ```ignore
//! use transcode_hwaccel::HwDeviceContext;
//! use transcode_core::transfer_data;
//!
//! let device = HwDeviceContext::software()?;
//! let pool = device.create_surface_pool(format, 4)?;
//! let mut hw = Buffer::new();
//! hw.allocate_surface(&pool)?;
//! transfer_data(&mut hw, &frame)?;
//! ```

pub mod device;
pub mod error;
pub mod frames;
pub mod map;

pub use device::HwDeviceContext;
pub use error::{HwAccelError, Result};
pub use frames::{HwFramesPool, HwSurface};
pub use map::{map_surface, MapFlags, MappedSurface};

use std::str::FromStr;

/// Hardware acceleration type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwAccelType {
    /// VA-API (Linux).
    Vaapi,
    /// VideoToolbox (macOS).
    VideoToolbox,
    /// NVIDIA NVENC/NVDEC.
    Nvenc,
    /// Intel Quick Sync Video.
    Qsv,
    /// AMD Advanced Media Framework.
    Amf,
    /// Direct3D 11 Video Acceleration.
    D3d11va,
    /// VDPAU (older Linux API).
    Vdpau,
    /// Emulated device in process memory.
    Software,
}

impl HwAccelType {
    /// Check if a device of this type can be opened.
    pub fn is_available(&self) -> bool {
        matches!(self, HwAccelType::Software)
    }

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        match self {
            HwAccelType::Vaapi => "VA-API",
            HwAccelType::VideoToolbox => "VideoToolbox",
            HwAccelType::Nvenc => "NVENC",
            HwAccelType::Qsv => "Quick Sync",
            HwAccelType::Amf => "AMD AMF",
            HwAccelType::D3d11va => "D3D11VA",
            HwAccelType::Vdpau => "VDPAU",
            HwAccelType::Software => "Software",
        }
    }
}

impl FromStr for HwAccelType {
    type Err = HwAccelError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "vaapi" => Self::Vaapi,
            "videotoolbox" => Self::VideoToolbox,
            "cuda" | "nvenc" => Self::Nvenc,
            "qsv" => Self::Qsv,
            "amf" => Self::Amf,
            "d3d11va" => Self::D3d11va,
            "vdpau" => Self::Vdpau,
            "software" | "sw" => Self::Software,
            other => return Err(HwAccelError::NotSupported(other.to_string())),
        })
    }
}

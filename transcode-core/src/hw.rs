//! Hardware device and surface capabilities.
//!
//! A [`Device`] is an opaque handle to accelerator memory obtained from
//! outside the pipeline. Stages that place data on the device draw
//! [`Surface`]s from a [`SurfacePool`] created by that device; a surface is
//! attached to a [`Buffer`] as [`crate::buffer::Storage::Hardware`] and goes
//! back to its pool when the last buffer referencing it is released.
//!
//! # Example
//!
//! ```ignore
//! let pool = device.create_surface_pool(format, 4)?;
//! let mut hw = Buffer::new();
//! hw.allocate_surface(&pool)?;
//! transfer_data(&mut hw, &software_frame)?;   // upload
//! let mut back = Buffer::new();
//! transfer_data(&mut back, &hw)?;             // download
//! ```

use crate::buffer::{Buffer, Plane, Storage};
use crate::error::{Error, Result};
use crate::frame::VideoFormat;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An accelerator device context.
pub trait Device: Send + Sync + fmt::Debug {
    /// Get a human readable device name.
    fn name(&self) -> &str;

    /// Create a pool of `capacity` surfaces of the given format.
    fn create_surface_pool(&self, format: VideoFormat, capacity: usize)
        -> Result<Arc<dyn SurfacePool>>;
}

/// A fixed-size pool of device surfaces.
pub trait SurfacePool: Send + Sync + fmt::Debug {
    /// Get the surface format.
    fn format(&self) -> VideoFormat;

    /// Get the total number of slots.
    fn capacity(&self) -> usize;

    /// Get the number of free slots.
    fn available(&self) -> usize;

    /// Take a free slot. Fails with [`Error::ResourceExhausted`] when every
    /// slot is held by a live surface.
    fn acquire(&self) -> Result<Arc<dyn Surface>>;
}

/// One surface slot in device memory.
pub trait Surface: Send + Sync + fmt::Debug {
    /// Get the surface format.
    fn format(&self) -> VideoFormat;

    /// Get the slot index within the owning pool.
    fn slot(&self) -> usize;

    /// Get the device this surface lives on.
    fn device(&self) -> DeviceRef;

    /// Copy host planes into the surface.
    fn upload(&self, planes: &[Plane]) -> Result<()>;

    /// Copy the surface into freshly allocated host planes.
    fn download(&self) -> Result<Vec<Plane>>;

    /// Copy into a new slot from the same pool.
    fn duplicate(&self) -> Result<Arc<dyn Surface>>;

    /// Downcast support for device-specific access such as mapping.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a [`Device`].
#[derive(Clone)]
pub struct DeviceRef(Arc<dyn Device>);

impl DeviceRef {
    /// Wrap a device.
    pub fn new(device: impl Device + 'static) -> Self {
        Self(Arc::new(device))
    }

    /// Wrap an already shared device.
    pub fn from_arc(device: Arc<dyn Device>) -> Self {
        Self(device)
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Create a surface pool on this device.
    pub fn create_surface_pool(
        &self,
        format: VideoFormat,
        capacity: usize,
    ) -> Result<Arc<dyn SurfacePool>> {
        self.0.create_surface_pool(format, capacity)
    }

    /// Check if two handles refer to the same device.
    pub fn same_device(&self, other: &DeviceRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeviceRef").field(&self.0.name()).finish()
    }
}

/// Copy picture data between host and device memory.
///
/// - software `src`, hardware `dst`: upload into `dst`'s surface, which must
///   be exclusively owned.
/// - hardware `src`: download into `dst`, replacing whatever `dst` held with
///   new host storage.
///
/// Timing, flags and side data are copied from `src`.
pub fn transfer_data(dst: &mut Buffer, src: &Buffer) -> Result<()> {
    let src_storage = src
        .storage()
        .ok_or_else(|| Error::invalid_state("transfer source has no storage"))?;
    match src_storage {
        Storage::Software(sw) => {
            let surface = match dst.storage() {
                Some(Storage::Hardware(hw)) => Arc::clone(&hw.surface),
                _ => {
                    return Err(Error::invalid_state(
                        "upload destination must hold a device surface",
                    ))
                }
            };
            if !dst.is_writable() {
                return Err(Error::invalid_state(
                    "upload destination surface is shared; make it writable first",
                ));
            }
            let src_fmt = src
                .video_format()
                .ok_or_else(|| Error::unsupported("only pictures can be transferred"))?;
            let dst_fmt = surface.format();
            if src_fmt != dst_fmt {
                return Err(Error::invalid_config(format!(
                    "cannot upload {src_fmt} into a {dst_fmt} surface"
                )));
            }
            surface.upload(sw.planes())?;
            dst.copy_props_from(src);
            Ok(())
        }
        Storage::Hardware(hw) => {
            if matches!(dst.storage(), Some(Storage::Hardware(_))) {
                return Err(Error::unsupported("device to device transfer"));
            }
            let planes = hw.surface.download()?;
            let format = hw.surface.format();
            dst.unreference();
            dst.attach_planes(crate::buffer::MediaFormat::Video(format), planes, 0);
            dst.copy_props_from(src);
            Ok(())
        }
    }
}

//! In-place access to surface memory.

use crate::error::HwAccelError;
use crate::frames::HwSurface;
use bitflags::bitflags;
use parking_lot::MutexGuard;
use transcode_core::{Buffer, Plane, Result, VideoFormat};

bitflags! {
    /// Access requested by [`map_surface`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: u32 {
        /// Read the surface contents.
        const READ = 1 << 0;
        /// Modify the surface contents.
        const WRITE = 1 << 1;
        /// Contents will be fully replaced; the previous picture is cleared.
        const OVERWRITE = 1 << 2;
    }
}

/// A mapped surface. The slot stays locked until this is dropped.
pub struct MappedSurface<'a> {
    memory: MutexGuard<'a, Vec<Plane>>,
    format: VideoFormat,
    flags: MapFlags,
}

impl MappedSurface<'_> {
    /// Get the surface format.
    pub fn format(&self) -> VideoFormat {
        self.format
    }

    /// Get the granted access.
    pub fn flags(&self) -> MapFlags {
        self.flags
    }

    /// Get the mapped planes.
    pub fn planes(&self) -> &[Plane] {
        &self.memory
    }

    /// Get plane `index` for writing.
    pub fn plane_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        if !self.flags.intersects(MapFlags::WRITE | MapFlags::OVERWRITE) {
            return Err(HwAccelError::Map("surface was mapped read-only".into()).into());
        }
        self.memory
            .get_mut(index)
            .map(Plane::data_mut)
            .ok_or_else(|| HwAccelError::Map(format!("no plane {index}")).into())
    }
}

/// Map the device surface held by `buffer`.
///
/// Write access requires `buffer` to own its surface exclusively.
pub fn map_surface(buffer: &Buffer, flags: MapFlags) -> Result<MappedSurface<'_>> {
    if flags.is_empty() {
        return Err(HwAccelError::Map("no access requested".into()).into());
    }
    let surface = buffer
        .surface()
        .ok_or_else(|| HwAccelError::Map("buffer does not hold a device surface".into()))?;
    let surface = surface
        .as_any()
        .downcast_ref::<HwSurface>()
        .ok_or_else(|| HwAccelError::NotSupported(format!("mapping {surface:?}")))?;
    let writes = flags.intersects(MapFlags::WRITE | MapFlags::OVERWRITE);
    if writes && !buffer.is_writable() {
        return Err(HwAccelError::Map("surface is shared; make the buffer writable first".into()).into());
    }
    let mut memory = surface.memory().lock();
    if flags.contains(MapFlags::OVERWRITE) {
        for plane in memory.iter_mut() {
            plane.data_mut().fill(0);
        }
    }
    Ok(MappedSurface {
        memory,
        format: buffer
            .video_format()
            .ok_or_else(|| HwAccelError::Map("surface without a picture format".into()))?,
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HwDeviceContext;
    use transcode_core::{transfer_data, Error, PixelFormat};

    fn hw_buffer() -> Buffer {
        let pool = HwDeviceContext::software()
            .unwrap()
            .create_surface_pool(VideoFormat::new(2, 2, PixelFormat::Gray8), 2)
            .unwrap();
        let mut hw = Buffer::new();
        hw.allocate_surface(&pool).unwrap();
        hw
    }

    #[test]
    fn test_write_then_download() {
        let hw = hw_buffer();
        {
            let mut map = map_surface(&hw, MapFlags::WRITE).unwrap();
            map.plane_mut(0).unwrap().copy_from_slice(&[9, 8, 7, 6]);
        }
        let mut host = Buffer::new();
        transfer_data(&mut host, &hw).unwrap();
        assert_eq!(&host.plane(0).unwrap()[..2], &[9, 8]);
    }

    #[test]
    fn test_write_requires_exclusive_ownership() {
        let mut hw = hw_buffer();
        let shared = hw.share().unwrap();
        assert!(matches!(
            map_surface(&hw, MapFlags::WRITE),
            Err(Error::InvalidState(_))
        ));
        {
            let map = map_surface(&hw, MapFlags::READ).unwrap();
            assert_eq!(map.planes().len(), 1);
        }
        hw.make_writable().unwrap();
        assert!(map_surface(&hw, MapFlags::WRITE).is_ok());
        drop(shared);
    }

    #[test]
    fn test_read_only_map_refuses_writes() {
        let hw = hw_buffer();
        let mut map = map_surface(&hw, MapFlags::READ).unwrap();
        assert!(map.plane_mut(0).is_err());
    }

    #[test]
    fn test_host_buffer_cannot_be_mapped() {
        let mut host = Buffer::new();
        host.allocate(VideoFormat::new(2, 2, PixelFormat::Gray8)).unwrap();
        assert!(map_surface(&host, MapFlags::READ).is_err());
    }
}

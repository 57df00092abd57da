//! Surface pools and surfaces of the emulated device.
//!
//! A pool owns `capacity` slots of device memory, each holding one picture
//! as tightly packed planes. [`HwFramesPool::acquire`] hands out a slot as an
//! [`HwSurface`]; the slot returns to the free list when the surface drops,
//! which happens when the last [`Buffer`](transcode_core::Buffer) referencing
//! it is released.

use crate::error::{HwAccelError, Result};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tracing::trace;
use transcode_core::{record_gauge, DeviceRef, Plane, Surface, SurfacePool, VideoFormat};

pub(crate) struct PoolInner {
    pub(crate) format: VideoFormat,
    device: DeviceRef,
    pub(crate) slots: Vec<Mutex<Vec<Plane>>>,
    free: Mutex<Vec<usize>>,
}

impl PoolInner {
    fn take_slot(self: &Arc<Self>) -> Result<HwSurface> {
        let mut free = self.free.lock();
        let slot = free.pop().ok_or_else(|| {
            HwAccelError::ResourceExhausted(format!(
                "all {} surfaces of the {} pool are in use",
                self.slots.len(),
                self.format
            ))
        })?;
        record_gauge!("pool.surfaces_in_use", (self.slots.len() - free.len()) as f64);
        drop(free);
        trace!(slot, "surface acquired");
        Ok(HwSurface {
            pool: Arc::clone(self),
            slot,
        })
    }
}

/// Fixed-size pool of device surfaces.
#[derive(Clone)]
pub struct HwFramesPool {
    inner: Arc<PoolInner>,
}

impl HwFramesPool {
    /// Allocate `capacity` zeroed surfaces of `format` on `device`.
    pub fn new(device: DeviceRef, format: VideoFormat, capacity: usize) -> Result<Self> {
        format
            .validate()
            .map_err(|e| HwAccelError::Config(e.to_string()))?;
        if capacity == 0 {
            return Err(HwAccelError::Config("surface pool needs at least one slot".into()));
        }
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| HwAccelError::OutOfMemory {
                requested: capacity.saturating_mul(std::mem::size_of::<Mutex<Vec<Plane>>>()),
            })?;
        for _ in 0..capacity {
            let planes = (0..format.num_planes())
                .map(|p| Plane::zeroed(format.row_bytes(p), format.rows(p)))
                .collect::<transcode_core::Result<Vec<_>>>()?;
            slots.push(Mutex::new(planes));
        }
        // Lowest slot is handed out first.
        let free = Mutex::new((0..capacity).rev().collect());
        Ok(Self {
            inner: Arc::new(PoolInner {
                format,
                device,
                slots,
                free,
            }),
        })
    }

    /// Take a free surface.
    pub fn acquire_surface(&self) -> Result<HwSurface> {
        self.inner.take_slot()
    }
}

impl SurfacePool for HwFramesPool {
    fn format(&self) -> VideoFormat {
        self.inner.format
    }

    fn capacity(&self) -> usize {
        self.inner.slots.len()
    }

    fn available(&self) -> usize {
        self.inner.free.lock().len()
    }

    fn acquire(&self) -> transcode_core::Result<Arc<dyn Surface>> {
        Ok(Arc::new(self.acquire_surface()?))
    }
}

impl std::fmt::Debug for HwFramesPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HwFramesPool")
            .field("format", &self.inner.format)
            .field("capacity", &self.inner.slots.len())
            .field("available", &self.available())
            .finish()
    }
}

/// One slot of device memory.
pub struct HwSurface {
    pool: Arc<PoolInner>,
    slot: usize,
}

impl HwSurface {
    pub(crate) fn memory(&self) -> &Mutex<Vec<Plane>> {
        &self.pool.slots[self.slot]
    }
}

impl Surface for HwSurface {
    fn format(&self) -> VideoFormat {
        self.pool.format
    }

    fn slot(&self) -> usize {
        self.slot
    }

    fn device(&self) -> DeviceRef {
        self.pool.device.clone()
    }

    fn upload(&self, planes: &[Plane]) -> transcode_core::Result<()> {
        let format = self.pool.format;
        if planes.len() < format.num_planes() {
            return Err(HwAccelError::Transfer(format!(
                "{} planes supplied for a {} surface",
                planes.len(),
                format
            ))
            .into());
        }
        let mut memory = self.memory().lock();
        for (p, (dst, src)) in memory.iter_mut().zip(planes).enumerate() {
            let width = format.row_bytes(p);
            for y in 0..format.rows(p) {
                let (Some(to), Some(from)) = (dst.row_mut(y, width), src.row(y, width)) else {
                    return Err(HwAccelError::Transfer(format!("plane {p} is too small")).into());
                };
                to.copy_from_slice(from);
            }
        }
        Ok(())
    }

    fn download(&self) -> transcode_core::Result<Vec<Plane>> {
        let format = self.pool.format;
        let memory = self.memory().lock();
        memory
            .iter()
            .enumerate()
            .map(|(p, src)| {
                let width = format.row_bytes(p);
                let mut dst = Plane::zeroed(format.aligned_stride(p), format.rows(p))?;
                for y in 0..format.rows(p) {
                    let (Some(to), Some(from)) = (dst.row_mut(y, width), src.row(y, width)) else {
                        return Err(HwAccelError::Transfer(format!("surface plane {p} is short")).into());
                    };
                    to.copy_from_slice(from);
                }
                Ok(dst)
            })
            .collect()
    }

    fn duplicate(&self) -> transcode_core::Result<Arc<dyn Surface>> {
        let copy = self.pool.take_slot()?;
        let contents = self.memory().lock().clone();
        *copy.memory().lock() = contents;
        Ok(Arc::new(copy))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for HwSurface {
    fn drop(&mut self) {
        trace!(slot = self.slot, "surface released");
        let mut free = self.pool.free.lock();
        free.push(self.slot);
        record_gauge!("pool.surfaces_in_use", (self.pool.slots.len() - free.len()) as f64);
    }
}

impl std::fmt::Debug for HwSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HwSurface")
            .field("slot", &self.slot)
            .field("format", &self.pool.format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HwDeviceContext;
    use transcode_core::{transfer_data, Buffer, Error, PixelFormat};

    fn pool(capacity: usize) -> Arc<dyn SurfacePool> {
        HwDeviceContext::software()
            .unwrap()
            .create_surface_pool(VideoFormat::new(4, 2, PixelFormat::Gray8), capacity)
            .unwrap()
    }

    #[test]
    fn test_exhaustion_and_release() {
        let pool = pool(2);
        let mut a = Buffer::new();
        let mut b = Buffer::new();
        a.allocate_surface(&pool).unwrap();
        b.allocate_surface(&pool).unwrap();
        assert_eq!(pool.available(), 0);

        let mut c = Buffer::new();
        assert!(matches!(
            c.allocate_surface(&pool),
            Err(Error::ResourceExhausted(_))
        ));

        let shared = a.share().unwrap();
        a.unreference();
        assert_eq!(pool.available(), 0);
        drop(shared);
        assert_eq!(pool.available(), 1);
        c.allocate_surface(&pool).unwrap();
    }

    #[test]
    fn test_upload_download() {
        let pool = pool(1);
        let format = pool.format();
        let mut host = Buffer::new();
        host.allocate(format).unwrap();
        let stride = host.stride(0);
        host.plane_mut(0).unwrap()[..4].copy_from_slice(&[1, 2, 3, 4]);
        host.plane_mut(0).unwrap()[stride..stride + 4].copy_from_slice(&[5, 6, 7, 8]);
        host.pts = 7;

        let mut hw = Buffer::new();
        hw.allocate_surface(&pool).unwrap();
        transfer_data(&mut hw, &host).unwrap();
        assert!(hw.is_hardware());
        assert_eq!(hw.pts, 7);

        let mut back = Buffer::new();
        transfer_data(&mut back, &hw).unwrap();
        assert!(!back.is_hardware());
        assert_eq!(&back.plane(0).unwrap()[..4], &[1, 2, 3, 4]);
        assert_eq!(&back.plane(0).unwrap()[back.stride(0)..back.stride(0) + 4], &[5, 6, 7, 8]);
    }

    #[test]
    fn test_try_clone_needs_free_slot() {
        let pool = pool(1);
        let mut hw = Buffer::new();
        hw.allocate_surface(&pool).unwrap();
        assert!(matches!(hw.try_clone(), Err(Error::ResourceExhausted(_))));
    }

    #[test]
    fn test_oversized_pool_fails_with_out_of_memory() {
        let result = HwFramesPool::new(
            HwDeviceContext::software().unwrap(),
            VideoFormat::new(4, 2, PixelFormat::Gray8),
            usize::MAX / 2,
        );
        assert!(matches!(result, Err(HwAccelError::OutOfMemory { .. })));
    }
}

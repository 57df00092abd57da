//! Device contexts.

use crate::error::{HwAccelError, Result};
use crate::frames::HwFramesPool;
use crate::HwAccelType;
use std::sync::{Arc, Weak};
use tracing::info;
use transcode_core::{Device, DeviceRef, SurfacePool, VideoFormat};

/// A device context.
///
/// Only [`HwAccelType::Software`] is backed by memory: an emulated device
/// whose surfaces live in process memory but are reachable only through
/// upload, download and mapping, like real device memory.
#[derive(Debug)]
pub struct HwDeviceContext {
    accel_type: HwAccelType,
    device_index: u32,
    device_name: String,
    this: Weak<HwDeviceContext>,
}

impl HwDeviceContext {
    /// Open device `device_index` of the given accelerator type.
    pub fn open(accel_type: HwAccelType, device_index: u32) -> Result<DeviceRef> {
        if !accel_type.is_available() {
            return Err(HwAccelError::NotSupported(accel_type.name().to_string()));
        }
        let context = Arc::new_cyclic(|this| Self {
            accel_type,
            device_index,
            device_name: format!("{}:{}", accel_type.name(), device_index),
            this: this.clone(),
        });
        info!(device = %context.device_name, "device opened");
        Ok(DeviceRef::from_arc(context))
    }

    /// Open the emulated device.
    pub fn software() -> Result<DeviceRef> {
        Self::open(HwAccelType::Software, 0)
    }

    /// Get the accelerator type.
    pub fn accel_type(&self) -> HwAccelType {
        self.accel_type
    }

    /// Get the device index.
    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    fn handle(&self) -> Result<DeviceRef> {
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| HwAccelError::DeviceInit("device context was released".into()))?;
        Ok(DeviceRef::from_arc(this))
    }
}

impl Device for HwDeviceContext {
    fn name(&self) -> &str {
        &self.device_name
    }

    fn create_surface_pool(
        &self,
        format: VideoFormat,
        capacity: usize,
    ) -> transcode_core::Result<Arc<dyn SurfacePool>> {
        let pool = HwFramesPool::new(self.handle()?, format, capacity)?;
        Ok(Arc::new(pool))
    }
}

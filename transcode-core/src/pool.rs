//! Frame storage pool.
//!
//! A [`BufferPool`] hands out picture or sample storage of one fixed layout
//! and takes the planes back when the last [`Buffer`] referencing them is
//! released, so steady-state decoding does not allocate.

use crate::buffer::{Buffer, MediaFormat, Plane, SoftwareStorage, Storage};
use crate::error::{Error, Result};
use crate::frame::VideoFormat;
use crate::sample::AudioFormat;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Layout of the storage handed out by a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolLayout {
    /// Pictures with aligned strides.
    Video(VideoFormat),
    /// Sample arrays of a fixed length.
    Audio { format: AudioFormat, nb_samples: usize },
}

struct PoolState {
    layout: PoolLayout,
    available: Vec<Vec<Plane>>,
    max_size: usize,
    total_allocated: usize,
    recycled: usize,
}

/// Returns planes to the owning pool when storage is dropped.
pub(crate) struct Recycler {
    pool: Weak<Mutex<PoolState>>,
}

impl Recycler {
    pub(crate) fn recycle(&self, mut planes: Vec<Plane>) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let mut state = pool.lock();
        if state.available.len() < state.max_size {
            for plane in &mut planes {
                plane.data_mut().fill(0);
            }
            state.available.push(planes);
            state.recycled += 1;
        }
    }
}

/// A thread-safe pool of reusable frame storage.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Mutex<PoolState>>,
}

impl BufferPool {
    /// Create a pool keeping at most `max_size` idle storage blocks.
    pub fn new(layout: PoolLayout, max_size: usize) -> Result<Self> {
        match layout {
            PoolLayout::Video(v) => v.validate()?,
            PoolLayout::Audio { format, .. } => format.validate()?,
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(PoolState {
                layout,
                available: Vec::with_capacity(max_size),
                max_size,
                total_allocated: 0,
                recycled: 0,
            })),
        })
    }

    /// Create a picture pool.
    pub fn video(format: VideoFormat, max_size: usize) -> Result<Self> {
        Self::new(PoolLayout::Video(format), max_size)
    }

    /// Get the pool layout.
    pub fn layout(&self) -> PoolLayout {
        self.inner.lock().layout
    }

    /// Attach pooled storage to `buffer`, replacing whatever it held.
    ///
    /// Reuses idle storage when available, otherwise allocates.
    pub fn acquire_into(&self, buffer: &mut Buffer) -> Result<()> {
        let (layout, reused) = {
            let mut state = self.inner.lock();
            (state.layout, state.available.pop())
        };
        let planes = match reused {
            Some(planes) => planes,
            None => {
                let planes = allocate_layout(&layout)?;
                self.inner.lock().total_allocated += 1;
                planes
            }
        };
        let recycler = Recycler {
            pool: Arc::downgrade(&self.inner),
        };
        let storage = Storage::Software(SoftwareStorage::pooled(planes, recycler));
        match layout {
            PoolLayout::Video(v) => buffer.attach_storage(MediaFormat::Video(v), storage, 0),
            PoolLayout::Audio { format, nb_samples } => {
                buffer.attach_storage(MediaFormat::Audio(format), storage, nb_samples)
            }
        }
        Ok(())
    }

    /// Get a new buffer backed by pooled storage.
    pub fn acquire(&self) -> Result<Buffer> {
        let mut buffer = Buffer::new();
        self.acquire_into(&mut buffer)?;
        Ok(buffer)
    }

    /// Get the number of idle storage blocks.
    pub fn available(&self) -> usize {
        self.inner.lock().available.len()
    }

    /// Get the number of storage blocks ever allocated.
    pub fn total_allocated(&self) -> usize {
        self.inner.lock().total_allocated
    }

    /// Get the number of storage blocks returned to the pool.
    pub fn recycled(&self) -> usize {
        self.inner.lock().recycled
    }

    /// Drop all idle storage.
    pub fn clear(&self) {
        self.inner.lock().available.clear();
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("BufferPool")
            .field("layout", &state.layout)
            .field("available", &state.available.len())
            .field("total_allocated", &state.total_allocated)
            .finish()
    }
}

fn allocate_layout(layout: &PoolLayout) -> Result<Vec<Plane>> {
    match layout {
        PoolLayout::Video(v) => (0..v.num_planes())
            .map(|p| Plane::zeroed(v.aligned_stride(p), v.rows(p)))
            .collect(),
        PoolLayout::Audio { format, nb_samples } => {
            let size = format.plane_size(*nb_samples);
            if size == 0 {
                return Err(Error::invalid_config("audio pool needs at least one sample"));
            }
            (0..format.num_planes()).map(|_| Plane::zeroed(size, 1)).collect()
        }
    }
}

//! Reference-counted media buffers.
//!
//! A [`Buffer`] is a reusable handle carrying either a compressed unit
//! (packet) or a decoded unit (frame). Storage lives behind an [`Arc`]: many
//! handles may share one storage block, which is freed (or returned to its
//! pool) when the last handle lets go. Shared storage is read-only; call
//! [`Buffer::make_writable`] before mutating in place.
//!
//! # Example
//!
//! ```ignore
//! let mut a = Buffer::new();
//! a.allocate(VideoFormat::new(64, 48, PixelFormat::Yuv420p))?;
//!
//! let mut b = Buffer::new();
//! b.reference(&a)?;             // shares storage, ref_count == 2
//! b.make_writable()?;           // private copy, a is untouched
//! b.plane_mut(0)?.fill(16);
//! ```

use crate::error::{Error, Result};
use crate::format::{CodecId, MediaType};
use crate::frame::VideoFormat;
use crate::hw::{DeviceRef, Surface, SurfacePool};
use crate::pool::Recycler;
use crate::sample::AudioFormat;
use crate::side_data::{BufferFlags, SideData, SideDataType};
use crate::timestamp::{TimeBase, Timestamp};
use std::fmt;
use std::sync::Arc;

/// Whether a buffer holds compressed or decoded data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Compressed unit.
    Packet,
    /// Decoded picture or sample array.
    Frame,
}

/// Format descriptor attached to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MediaFormat {
    /// No format yet (empty handle).
    #[default]
    Unset,
    /// Compressed data of the given codec.
    Compressed(CodecId),
    /// Decoded picture.
    Video(VideoFormat),
    /// Decoded samples.
    Audio(AudioFormat),
}

impl MediaFormat {
    /// Get the buffer kind implied by this format.
    pub fn kind(&self) -> Option<BufferKind> {
        match self {
            Self::Unset => None,
            Self::Compressed(_) => Some(BufferKind::Packet),
            Self::Video(_) | Self::Audio(_) => Some(BufferKind::Frame),
        }
    }

    /// Get the media type, if known.
    pub fn media_type(&self) -> Option<MediaType> {
        match self {
            Self::Unset => None,
            Self::Compressed(codec) => Some(codec.media_type()),
            Self::Video(_) => Some(MediaType::Video),
            Self::Audio(_) => Some(MediaType::Audio),
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "unset"),
            Self::Compressed(codec) => write!(f, "{codec}"),
            Self::Video(v) => write!(f, "{v}"),
            Self::Audio(a) => write!(f, "{a}"),
        }
    }
}

/// Storage request for [`Buffer::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocRequest {
    /// Opaque byte payload for a compressed unit.
    Bytes { size: usize, codec: Option<CodecId> },
    /// Picture planes with aligned strides.
    Video(VideoFormat),
    /// Sample planes for `nb_samples` samples per channel.
    Audio { format: AudioFormat, nb_samples: usize },
}

impl From<usize> for AllocRequest {
    fn from(size: usize) -> Self {
        Self::Bytes { size, codec: None }
    }
}

impl From<VideoFormat> for AllocRequest {
    fn from(format: VideoFormat) -> Self {
        Self::Video(format)
    }
}

impl From<(AudioFormat, usize)> for AllocRequest {
    fn from((format, nb_samples): (AudioFormat, usize)) -> Self {
        Self::Audio { format, nb_samples }
    }
}

/// One plane of host memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Plane {
    data: Vec<u8>,
    stride: usize,
}

impl Plane {
    /// Create a plane from raw bytes and a row stride.
    pub fn new(data: Vec<u8>, stride: usize) -> Self {
        Self { data, stride }
    }

    /// Allocate a zeroed plane of `stride * rows` bytes.
    pub fn zeroed(stride: usize, rows: usize) -> Result<Self> {
        let size = stride
            .checked_mul(rows)
            .ok_or(Error::OutOfMemory { requested: usize::MAX })?;
        Ok(Self {
            data: alloc_zeroed(size)?,
            stride,
        })
    }

    /// Get the plane bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the plane bytes mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the row stride in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Get the plane size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the plane is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get row `y`, `width` bytes long. `None` if the row lies outside the
    /// plane or `width` exceeds the stride.
    pub fn row(&self, y: usize, width: usize) -> Option<&[u8]> {
        let range = self.row_range(y, width)?;
        self.data.get(range)
    }

    /// Get row `y` mutably, `width` bytes long.
    pub fn row_mut(&mut self, y: usize, width: usize) -> Option<&mut [u8]> {
        let range = self.row_range(y, width)?;
        self.data.get_mut(range)
    }

    fn row_range(&self, y: usize, width: usize) -> Option<std::ops::Range<usize>> {
        if width > self.stride {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        Some(start..start.checked_add(width)?)
    }

    fn try_copy(&self) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(self.data.len())
            .map_err(|_| Error::OutOfMemory {
                requested: self.data.len(),
            })?;
        data.extend_from_slice(&self.data);
        Ok(Self {
            data,
            stride: self.stride,
        })
    }
}

impl fmt::Debug for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plane")
            .field("len", &self.data.len())
            .field("stride", &self.stride)
            .finish()
    }
}

/// Host memory planes, optionally owned by a [`crate::pool::BufferPool`].
pub struct SoftwareStorage {
    planes: Vec<Plane>,
    recycler: Option<Recycler>,
}

impl SoftwareStorage {
    /// Get the planes.
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub(crate) fn pooled(planes: Vec<Plane>, recycler: Recycler) -> Self {
        Self {
            planes,
            recycler: Some(recycler),
        }
    }
}

impl Drop for SoftwareStorage {
    fn drop(&mut self) {
        if let Some(recycler) = self.recycler.take() {
            recycler.recycle(std::mem::take(&mut self.planes));
        }
    }
}

/// Device memory: a pooled surface plus the device it belongs to.
pub struct HardwareStorage {
    /// Surface slot holding the data.
    pub surface: Arc<dyn Surface>,
    /// Owning device.
    pub device: DeviceRef,
}

/// Storage shared by one or more buffer handles.
pub enum Storage {
    /// Planes in host memory.
    Software(SoftwareStorage),
    /// Opaque accelerator memory.
    Hardware(HardwareStorage),
}

impl Storage {
    fn software(planes: Vec<Plane>) -> Self {
        Storage::Software(SoftwareStorage {
            planes,
            recycler: None,
        })
    }

    fn deep_copy(&self) -> Result<Self> {
        match self {
            Storage::Software(sw) => {
                let planes = sw
                    .planes
                    .iter()
                    .map(Plane::try_copy)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Storage::software(planes))
            }
            Storage::Hardware(hw) => Ok(Storage::Hardware(HardwareStorage {
                surface: hw.surface.duplicate()?,
                device: hw.device.clone(),
            })),
        }
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Storage::Software(sw) => f
                .debug_struct("Software")
                .field("planes", &sw.planes.len())
                .field("pooled", &sw.recycler.is_some())
                .finish(),
            Storage::Hardware(hw) => f
                .debug_struct("Hardware")
                .field("device", &hw.device)
                .field("slot", &hw.surface.slot())
                .finish(),
        }
    }
}

/// A reference-counted media unit.
pub struct Buffer {
    storage: Option<Arc<Storage>>,
    format: MediaFormat,
    nb_samples: usize,
    /// Time base of `pts`, `dts` and `duration`.
    pub time_base: TimeBase,
    /// Presentation time in `time_base` ticks, or [`Timestamp::NONE`].
    pub pts: i64,
    /// Decode time in `time_base` ticks, or [`Timestamp::NONE`].
    pub dts: i64,
    /// Duration in `time_base` ticks (0 when unknown).
    pub duration: i64,
    /// Buffer flags.
    pub flags: BufferFlags,
    /// Stream index this unit belongs to.
    pub stream_index: u32,
    /// Monotonic tag assigned by sources, carried through stages.
    pub sequence: u64,
    side_data: Vec<SideData>,
}

impl Buffer {
    /// Create an empty handle with no storage.
    pub fn new() -> Self {
        Self {
            storage: None,
            format: MediaFormat::Unset,
            nb_samples: 0,
            time_base: TimeBase::default(),
            pts: Timestamp::NONE,
            dts: Timestamp::NONE,
            duration: 0,
            flags: BufferFlags::empty(),
            stream_index: 0,
            sequence: 0,
            side_data: Vec::new(),
        }
    }

    /// Create a compressed unit owning `data` without copying.
    pub fn from_packet(data: Vec<u8>, codec: CodecId) -> Self {
        let mut buffer = Self::new();
        buffer.set_data(data);
        buffer.format = MediaFormat::Compressed(codec);
        buffer
    }

    /// Create a frame from pre-filled planes.
    pub fn from_planes(format: MediaFormat, planes: Vec<Plane>, nb_samples: usize) -> Self {
        let mut buffer = Self::new();
        buffer.attach_planes(format, planes, nb_samples);
        buffer
    }

    /// Reserve zeroed storage sized for the request, replacing any storage
    /// this handle held. Metadata other than the format is left untouched.
    pub fn allocate(&mut self, request: impl Into<AllocRequest>) -> Result<()> {
        let request = request.into();
        let (format, planes, nb_samples) = match request {
            AllocRequest::Bytes { size, codec } => {
                let format = codec.map_or(self.format, MediaFormat::Compressed);
                (format, vec![Plane::new(alloc_zeroed(size)?, size)], 0)
            }
            AllocRequest::Video(video) => {
                video.validate()?;
                let planes = (0..video.num_planes())
                    .map(|p| Plane::zeroed(video.aligned_stride(p), video.rows(p)))
                    .collect::<Result<Vec<_>>>()?;
                (MediaFormat::Video(video), planes, 0)
            }
            AllocRequest::Audio { format, nb_samples } => {
                format.validate()?;
                let size = format.plane_size(nb_samples);
                let planes = (0..format.num_planes())
                    .map(|_| Plane::zeroed(size, 1))
                    .collect::<Result<Vec<_>>>()?;
                (MediaFormat::Audio(format), planes, nb_samples)
            }
        };
        self.storage = Some(Arc::new(Storage::software(planes)));
        self.format = format;
        self.nb_samples = nb_samples;
        Ok(())
    }

    /// Attach a free surface from `pool` as this handle's storage.
    pub fn allocate_surface(&mut self, pool: &Arc<dyn SurfacePool>) -> Result<()> {
        let surface = pool.acquire()?;
        let device = surface.device();
        self.format = MediaFormat::Video(surface.format());
        self.nb_samples = 0;
        self.storage = Some(Arc::new(Storage::Hardware(HardwareStorage { surface, device })));
        Ok(())
    }

    /// Replace this handle's storage with `planes`.
    pub fn attach_planes(&mut self, format: MediaFormat, planes: Vec<Plane>, nb_samples: usize) {
        self.storage = Some(Arc::new(Storage::software(planes)));
        self.format = format;
        self.nb_samples = nb_samples;
    }

    pub(crate) fn attach_storage(&mut self, format: MediaFormat, storage: Storage, nb_samples: usize) {
        self.storage = Some(Arc::new(storage));
        self.format = format;
        self.nb_samples = nb_samples;
    }

    /// Relabel the storage as `format` without copying it.
    pub fn set_format(&mut self, format: MediaFormat, nb_samples: usize) {
        self.format = format;
        self.nb_samples = nb_samples;
    }

    /// Replace the payload with `data` in fresh exclusive storage. Other
    /// handles sharing the previous storage are unaffected.
    pub fn set_data(&mut self, data: Vec<u8>) {
        let stride = data.len();
        self.storage = Some(Arc::new(Storage::software(vec![Plane::new(data, stride)])));
        self.nb_samples = 0;
    }

    /// Become an additional owner of `other`'s storage, copying its metadata.
    pub fn reference(&mut self, other: &Buffer) -> Result<()> {
        let storage = other
            .storage
            .as_ref()
            .ok_or_else(|| Error::invalid_state("cannot reference a buffer without storage"))?;
        self.storage = Some(Arc::clone(storage));
        self.format = other.format;
        self.nb_samples = other.nb_samples;
        self.copy_props_from(other);
        Ok(())
    }

    /// New handle sharing this handle's storage.
    pub fn share(&self) -> Result<Buffer> {
        let mut buffer = Buffer::new();
        buffer.reference(self)?;
        Ok(buffer)
    }

    /// Independent handle with copied storage and metadata.
    pub fn try_clone(&self) -> Result<Buffer> {
        let storage = match &self.storage {
            Some(storage) => Some(Arc::new(storage.deep_copy()?)),
            None => None,
        };
        let mut buffer = Buffer::new();
        buffer.storage = storage;
        buffer.format = self.format;
        buffer.nb_samples = self.nb_samples;
        buffer.copy_props_from(self);
        Ok(buffer)
    }

    /// Release this handle's claim on storage and reset all metadata. The
    /// handle stays usable.
    pub fn unreference(&mut self) {
        *self = Buffer::new();
    }

    /// Move `src`'s storage and metadata into this handle, leaving `src` empty.
    pub fn move_ref(&mut self, src: &mut Buffer) {
        *self = std::mem::replace(src, Buffer::new());
    }

    /// Ensure exclusive ownership of storage, copying it if shared.
    pub fn make_writable(&mut self) -> Result<()> {
        let storage = self
            .storage
            .as_mut()
            .ok_or_else(|| Error::invalid_state("cannot make an empty buffer writable"))?;
        if Arc::get_mut(storage).is_some() {
            return Ok(());
        }
        let copy = storage.deep_copy()?;
        *storage = Arc::new(copy);
        Ok(())
    }

    /// Check if storage is exclusively owned by this handle.
    pub fn is_writable(&self) -> bool {
        self.storage
            .as_ref()
            .is_some_and(|s| Arc::strong_count(s) == 1 && Arc::weak_count(s) == 0)
    }

    /// Number of handles sharing this handle's storage (0 when empty).
    pub fn ref_count(&self) -> usize {
        self.storage.as_ref().map_or(0, Arc::strong_count)
    }

    /// Check if this handle has storage attached.
    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    /// Check if two handles share the same storage block.
    pub fn shares_storage_with(&self, other: &Buffer) -> bool {
        match (&self.storage, &other.storage) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Get the storage, if any.
    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_deref()
    }

    /// Check if storage lives in device memory.
    pub fn is_hardware(&self) -> bool {
        matches!(self.storage(), Some(Storage::Hardware(_)))
    }

    /// Get the device surface, if storage is in device memory.
    pub fn surface(&self) -> Option<&Arc<dyn Surface>> {
        match self.storage() {
            Some(Storage::Hardware(hw)) => Some(&hw.surface),
            _ => None,
        }
    }

    /// Get the format descriptor.
    pub fn format(&self) -> MediaFormat {
        self.format
    }

    /// Get the buffer kind.
    pub fn kind(&self) -> Option<BufferKind> {
        self.format.kind()
    }

    /// Get the codec of a compressed unit.
    pub fn codec(&self) -> Option<CodecId> {
        match self.format {
            MediaFormat::Compressed(codec) => Some(codec),
            _ => None,
        }
    }

    /// Set the codec of a compressed unit.
    pub fn set_codec(&mut self, codec: CodecId) {
        self.format = MediaFormat::Compressed(codec);
    }

    /// Get the picture format of a video frame.
    pub fn video_format(&self) -> Option<VideoFormat> {
        match self.format {
            MediaFormat::Video(v) => Some(v),
            _ => None,
        }
    }

    /// Get the sample format of an audio frame.
    pub fn audio_format(&self) -> Option<AudioFormat> {
        match self.format {
            MediaFormat::Audio(a) => Some(a),
            _ => None,
        }
    }

    /// Get the number of samples per channel (audio frames).
    pub fn nb_samples(&self) -> usize {
        self.nb_samples
    }

    /// Shrink the number of valid samples. Cannot grow past allocation.
    pub fn truncate_samples(&mut self, nb_samples: usize) -> Result<()> {
        if nb_samples > self.nb_samples {
            return Err(Error::invalid_state(format!(
                "cannot grow {} samples to {nb_samples}",
                self.nb_samples
            )));
        }
        self.nb_samples = nb_samples;
        Ok(())
    }

    /// Get the host planes, empty for device or missing storage.
    pub fn planes(&self) -> &[Plane] {
        match self.storage() {
            Some(Storage::Software(sw)) => &sw.planes,
            _ => &[],
        }
    }

    /// Get the number of host planes.
    pub fn num_planes(&self) -> usize {
        self.planes().len()
    }

    /// Get a plane's bytes.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        self.planes().get(index).map(Plane::data)
    }

    /// Get the stride of a plane.
    pub fn stride(&self, index: usize) -> usize {
        self.planes().get(index).map_or(0, Plane::stride)
    }

    /// Get the payload of a compressed unit (first plane).
    pub fn data(&self) -> &[u8] {
        self.plane(0).unwrap_or(&[])
    }

    /// Get the payload size in bytes.
    pub fn size(&self) -> usize {
        self.data().len()
    }

    fn software_mut(&mut self) -> Result<&mut SoftwareStorage> {
        let storage = self
            .storage
            .as_mut()
            .ok_or_else(|| Error::invalid_state("buffer has no storage"))?;
        match Arc::get_mut(storage) {
            Some(Storage::Software(sw)) => Ok(sw),
            Some(Storage::Hardware(_)) => Err(Error::invalid_state(
                "device storage must be mapped or transferred before host access",
            )),
            None => Err(Error::invalid_state(
                "storage is shared; call make_writable first",
            )),
        }
    }

    /// Get a plane mutably. Fails while storage is shared.
    pub fn plane_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        let sw = self.software_mut()?;
        let count = sw.planes.len();
        sw.planes
            .get_mut(index)
            .map(Plane::data_mut)
            .ok_or_else(|| Error::invalid_state(format!("plane {index} out of {count}")))
    }

    /// Get all planes mutably. Fails while storage is shared.
    pub fn planes_mut(&mut self) -> Result<&mut [Plane]> {
        Ok(&mut self.software_mut()?.planes)
    }

    /// Get the payload mutably. Fails while storage is shared.
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        self.plane_mut(0)
    }

    /// Shorten the payload of a compressed unit. Fails while shared.
    pub fn truncate(&mut self, len: usize) -> Result<()> {
        let sw = self.software_mut()?;
        let plane = sw
            .planes
            .first_mut()
            .ok_or_else(|| Error::invalid_state("buffer has no payload"))?;
        plane.data.truncate(len);
        plane.stride = plane.data.len();
        Ok(())
    }

    /// Copy timing, flags, stream index, sequence and side data from `other`.
    pub fn copy_props_from(&mut self, other: &Buffer) {
        self.time_base = other.time_base;
        self.pts = other.pts;
        self.dts = other.dts;
        self.duration = other.duration;
        self.flags = other.flags;
        self.stream_index = other.stream_index;
        self.sequence = other.sequence;
        self.side_data = other.side_data.clone();
    }

    /// Get the presentation time as a [`Timestamp`].
    pub fn pts_timestamp(&self) -> Timestamp {
        Timestamp::new(self.pts, self.time_base)
    }

    /// Rescale `pts`, `dts` and `duration` to `target`.
    pub fn rescale_ts(&mut self, target: TimeBase) {
        if self.time_base == target {
            return;
        }
        self.pts = self.time_base.convert(self.pts, target);
        self.dts = self.time_base.convert(self.dts, target);
        self.duration = self.time_base.convert(self.duration, target);
        self.time_base = target;
    }

    /// Check if this is a keyframe.
    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(BufferFlags::KEYFRAME)
    }

    /// Set or clear the keyframe flag.
    pub fn set_keyframe(&mut self, keyframe: bool) {
        self.flags.set(BufferFlags::KEYFRAME, keyframe);
    }

    /// Append a side data record.
    pub fn add_side_data(&mut self, data: SideData) {
        self.side_data.push(data);
    }

    /// Get the first side data record of a type.
    pub fn side_data(&self, data_type: SideDataType) -> Option<&SideData> {
        self.side_data.iter().find(|sd| sd.data_type == data_type)
    }

    /// Get all side data records in insertion order.
    pub fn all_side_data(&self) -> &[SideData] {
        &self.side_data
    }

    /// Remove every side data record of a type.
    pub fn remove_side_data(&mut self, data_type: SideDataType) {
        self.side_data.retain(|sd| sd.data_type != data_type);
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("format", &self.format)
            .field("storage", &self.storage)
            .field("refs", &self.ref_count())
            .field("pts", &self.pts)
            .field("time_base", &self.time_base)
            .field("flags", &self.flags)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Allocate a zero-filled byte vector, reporting failure instead of aborting.
pub fn alloc_zeroed(size: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    data.try_reserve_exact(size)
        .map_err(|_| Error::OutOfMemory { requested: size })?;
    data.resize(size, 0);
    Ok(data)
}

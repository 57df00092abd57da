//! [`VideoAdapter`]: the picture [`FormatAdapter`].

use crate::color;
use crate::error::ScaleError;
use crate::image::{self, ColorModel};
use crate::scaler::{scale_image, ScaleFilter};
use rayon::ThreadPool;
use std::sync::Arc;
use tracing::{debug, trace};
use transcode_core::{
    Buffer, Error, FormatAdapter, MediaFormat, Result, RetrieveStatus, VideoFormat,
};

/// Settings of a [`VideoAdapter`].
#[derive(Debug, Clone, Default)]
pub struct ScaleConfig {
    /// Interpolation used when the size changes.
    pub filter: ScaleFilter,
    /// Worker threads; 0 uses the global rayon pool.
    pub threads: usize,
}

impl ScaleConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interpolation filter.
    #[must_use]
    pub fn with_filter(mut self, filter: ScaleFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the worker thread count.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
}

/// Converts pixel format and picture size.
///
/// One picture in, one picture out: `pending_delay` is always zero.
#[derive(Default)]
pub struct VideoAdapter {
    config: ScaleConfig,
    input: Option<VideoFormat>,
    output: Option<VideoFormat>,
    pool: Option<Arc<ThreadPool>>,
    open: bool,
    ready: Option<Buffer>,
    flushed: bool,
}

fn video(format: MediaFormat, what: &str) -> Result<VideoFormat> {
    match format {
        MediaFormat::Video(v) => Ok(v),
        other => Err(Error::invalid_config(format!(
            "video adapter {what} must be video, got '{other}'"
        ))),
    }
}

impl VideoAdapter {
    /// Create an adapter with the given settings.
    pub fn new(config: ScaleConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Get the settings.
    pub fn config(&self) -> &ScaleConfig {
        &self.config
    }

    fn run(&self, input: &Buffer, from: VideoFormat, to: VideoFormat) -> Result<Vec<transcode_core::Plane>> {
        let filter = self.config.filter;
        let work = || -> crate::error::Result<_> {
            let unpacked = image::unpack(from, input.planes())?;
            let mut scaled = scale_image(&unpacked, to.width as usize, to.height as usize, filter);
            color::convert(&mut scaled, ColorModel::of(to.pixel_format));
            image::pack(&scaled, to)
        };
        let planes = match &self.pool {
            Some(pool) => pool.install(work)?,
            None => work()?,
        };
        Ok(planes)
    }
}

impl FormatAdapter for VideoAdapter {
    fn name(&self) -> &'static str {
        "scale"
    }

    fn configure(&mut self, input: MediaFormat, output: MediaFormat) -> Result<()> {
        if self.open {
            return Err(Error::invalid_state("configure while the adapter is open"));
        }
        self.input = Some(video(input, "input")?);
        self.output = Some(video(output, "output")?);
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        if self.open {
            return Err(Error::invalid_state("adapter is already open"));
        }
        let (Some(input), Some(output)) = (self.input, self.output) else {
            return Err(Error::invalid_state("open before configure"));
        };
        input.validate()?;
        output.validate()?;
        if input != output {
            image::check_supported(input.pixel_format)?;
            image::check_supported(output.pixel_format)?;
        }
        if self.config.threads > 0 && self.pool.is_none() {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.threads)
                .thread_name(|i| format!("scale-{i}"))
                .build()
                .map_err(|e| ScaleError::ThreadPool(e.to_string()))?;
            self.pool = Some(Arc::new(pool));
        }
        debug!(
            from = %input,
            to = %output,
            filter = self.config.filter.name(),
            "video adapter opened"
        );
        self.ready = None;
        self.flushed = false;
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn output_format(&self) -> MediaFormat {
        self.output.map_or(MediaFormat::Unset, MediaFormat::Video)
    }

    fn has_capacity(&self) -> bool {
        self.ready.is_none()
    }

    fn push(&mut self, input: Option<&Buffer>) -> Result<()> {
        if !self.open {
            return Err(Error::invalid_state("adapter is not open"));
        }
        let Some(buffer) = input else {
            self.flushed = true;
            return Ok(());
        };
        if self.flushed {
            return Err(Error::invalid_state("push after drain; reset first"));
        }
        if self.ready.is_some() {
            return Err(Error::invalid_state("previous picture has not been pulled"));
        }
        let (Some(from), Some(to)) = (self.input, self.output) else {
            return Err(Error::invalid_state("adapter is not configured"));
        };
        if buffer.video_format() != Some(from) {
            return Err(ScaleError::FormatMismatch {
                expected: from.to_string(),
                actual: buffer.format().to_string(),
            }
            .into());
        }

        let out = if from == to {
            buffer.share()?
        } else {
            if buffer.is_hardware() {
                return Err(Error::unsupported(
                    "video adapter converts host memory only; download the surface first",
                ));
            }
            let planes = self.run(buffer, from, to)?;
            let mut out = Buffer::new();
            out.attach_planes(MediaFormat::Video(to), planes, 0);
            out.copy_props_from(buffer);
            out
        };
        trace!(pts = out.pts, "picture converted");
        self.ready = Some(out);
        Ok(())
    }

    fn pull(&mut self, output: &mut Buffer) -> Result<RetrieveStatus> {
        if !self.open {
            return Err(Error::invalid_state("adapter is not open"));
        }
        match self.ready.take() {
            Some(mut picture) => {
                output.move_ref(&mut picture);
                Ok(RetrieveStatus::Produced)
            }
            None if self.flushed => Ok(RetrieveStatus::EndOfStream),
            None => Ok(RetrieveStatus::NeedsInput),
        }
    }

    fn reset(&mut self) {
        self.ready = None;
        self.flushed = false;
    }

    fn close(&mut self) {
        self.reset();
        self.open = false;
    }
}

impl std::fmt::Debug for VideoAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoAdapter")
            .field("config", &self.config)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("open", &self.open)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcode_core::PixelFormat;

    fn adapter(from: VideoFormat, to: VideoFormat) -> VideoAdapter {
        let mut adapter = VideoAdapter::new(ScaleConfig::new());
        adapter
            .configure(MediaFormat::Video(from), MediaFormat::Video(to))
            .unwrap();
        adapter.open().unwrap();
        adapter
    }

    #[test]
    fn test_identity_shares_storage() {
        let format = VideoFormat::new(4, 4, PixelFormat::Yuv420p);
        let mut a = adapter(format, format);
        let mut input = Buffer::new();
        input.allocate(format).unwrap();
        let mut out = Buffer::new();
        assert_eq!(a.convert(&input, &mut out).unwrap(), RetrieveStatus::Produced);
        assert!(out.shares_storage_with(&input));
    }

    #[test]
    fn test_one_in_one_out() {
        let from = VideoFormat::new(4, 4, PixelFormat::Gray8);
        let to = VideoFormat::new(2, 2, PixelFormat::Rgb24);
        let mut a = adapter(from, to);
        let mut input = Buffer::new();
        input.allocate(from).unwrap();
        input.plane_mut(0).unwrap().fill(200);
        input.pts = 42;

        a.push(Some(&input)).unwrap();
        assert!(!a.has_capacity());
        assert!(a.push(Some(&input)).is_err());
        let mut out = Buffer::new();
        assert_eq!(a.pull(&mut out).unwrap(), RetrieveStatus::Produced);
        assert_eq!(out.video_format(), Some(to));
        assert_eq!(out.pts, 42);
        assert_eq!(&out.plane(0).unwrap()[..6], &[200; 6]);
        assert_eq!(a.pull(&mut out).unwrap(), RetrieveStatus::NeedsInput);
        a.drain().unwrap();
        assert_eq!(a.pull(&mut out).unwrap(), RetrieveStatus::EndOfStream);
    }

    #[test]
    fn test_high_depth_rejected_at_open() {
        let mut a = VideoAdapter::new(ScaleConfig::new());
        a.configure(
            MediaFormat::Video(VideoFormat::new(4, 4, PixelFormat::Yuv420p10le)),
            MediaFormat::Video(VideoFormat::new(4, 4, PixelFormat::Yuv420p)),
        )
        .unwrap();
        assert!(matches!(a.open(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_dedicated_pool() {
        let from = VideoFormat::new(8, 8, PixelFormat::Nv12);
        let to = VideoFormat::new(16, 16, PixelFormat::Yuv444p);
        let mut a = VideoAdapter::new(ScaleConfig::new().with_threads(2));
        a.configure(MediaFormat::Video(from), MediaFormat::Video(to))
            .unwrap();
        a.open().unwrap();
        let mut input = Buffer::new();
        input.allocate(from).unwrap();
        let mut out = Buffer::new();
        assert_eq!(a.convert(&input, &mut out).unwrap(), RetrieveStatus::Produced);
        assert_eq!(out.num_planes(), 3);
    }
}

//! Where compressed units come from and go to.
//!
//! The driver only sees opaque byte units with timing; containers are out of
//! scope, so files are read and written as raw unit streams.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use tracing::{debug, trace};
use transcode_core::{Error, Result};

/// One compressed unit outside the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unit {
    /// Payload.
    pub data: Vec<u8>,
    /// Presentation time in stream time base ticks.
    pub pts: i64,
    /// Duration in stream time base ticks.
    pub duration: i64,
    /// Whether decoding can start here.
    pub keyframe: bool,
}

impl Unit {
    /// Create a keyframe unit.
    pub fn new(data: Vec<u8>, pts: i64, duration: i64) -> Self {
        Self {
            data,
            pts,
            duration,
            keyframe: true,
        }
    }
}

/// A producer of compressed units.
pub trait UnitSource {
    /// Read the next unit, `None` at the end.
    fn read_unit(&mut self) -> Result<Option<Unit>>;

    /// Total input size in bytes, when known.
    fn size_hint(&self) -> Option<u64> {
        None
    }
}

/// A consumer of compressed units.
pub trait UnitSink {
    /// Store one unit.
    fn write_unit(&mut self, unit: &Unit) -> Result<()>;

    /// Flush whatever is buffered.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Units held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    units: VecDeque<Unit>,
    size: u64,
}

impl MemorySource {
    /// Create a source yielding `units` in order.
    pub fn new(units: Vec<Unit>) -> Self {
        let size = units.iter().map(|u| u.data.len() as u64).sum();
        Self {
            units: units.into(),
            size,
        }
    }

    /// Split `data` into units of `unit_size` bytes, each `duration` ticks long.
    pub fn chunked(data: &[u8], unit_size: usize, duration: i64) -> Self {
        let units = data
            .chunks(unit_size.max(1))
            .enumerate()
            .map(|(i, chunk)| Unit::new(chunk.to_vec(), i as i64 * duration, duration))
            .collect();
        Self::new(units)
    }

    /// Get the number of units left.
    pub fn remaining(&self) -> usize {
        self.units.len()
    }
}

impl UnitSource for MemorySource {
    fn read_unit(&mut self) -> Result<Option<Unit>> {
        Ok(self.units.pop_front())
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.size)
    }
}

/// Collects units in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    units: Vec<Unit>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the collected units.
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Get every payload concatenated.
    pub fn bytes(&self) -> Vec<u8> {
        self.units.iter().flat_map(|u| u.data.iter().copied()).collect()
    }

    /// Take the collected units.
    pub fn into_units(self) -> Vec<Unit> {
        self.units
    }
}

impl UnitSink for MemorySink {
    fn write_unit(&mut self, unit: &Unit) -> Result<()> {
        self.units.push(unit.clone());
        Ok(())
    }
}

/// Reads a headerless file as fixed-size units.
///
/// A short trailing chunk is still returned; decoders that need whole units
/// report it as corrupt.
#[derive(Debug)]
pub struct RawFileSource {
    reader: BufReader<File>,
    unit_size: usize,
    duration: i64,
    next_pts: i64,
    size: u64,
}

impl RawFileSource {
    /// Open `path`, reading `unit_size` bytes per unit of `duration` ticks.
    pub fn open(path: impl AsRef<Path>, unit_size: usize, duration: i64) -> Result<Self> {
        if unit_size == 0 {
            return Err(Error::invalid_config("unit size must be positive"));
        }
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        debug!(path = %path.display(), size, unit_size, "raw input opened");
        Ok(Self {
            reader: BufReader::new(file),
            unit_size,
            duration,
            next_pts: 0,
            size,
        })
    }
}

impl UnitSource for RawFileSource {
    fn read_unit(&mut self) -> Result<Option<Unit>> {
        let mut data = vec![0u8; self.unit_size];
        let mut filled = 0;
        while filled < data.len() {
            match self.reader.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        data.truncate(filled);
        let unit = Unit::new(data, self.next_pts, self.duration);
        self.next_pts += self.duration;
        trace!(pts = unit.pts, size = filled, "unit read");
        Ok(Some(unit))
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.size)
    }
}

/// Writes unit payloads back to back into a file.
#[derive(Debug)]
pub struct RawFileSink {
    writer: BufWriter<File>,
    written: u64,
}

impl RawFileSink {
    /// Create `path`. Fails if it exists unless `overwrite` is set.
    pub fn create(path: impl AsRef<Path>, overwrite: bool) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() && !overwrite {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("output file already exists: {}", path.display()),
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        debug!(path = %path.display(), "raw output created");
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Get the number of bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl UnitSink for RawFileSink {
    fn write_unit(&mut self, unit: &Unit) -> Result<()> {
        self.writer.write_all(&unit.data)?;
        self.written += unit.data.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_chunks() {
        let mut source = MemorySource::chunked(&[1, 2, 3, 4, 5], 2, 10);
        assert_eq!(source.size_hint(), Some(5));
        assert_eq!(source.remaining(), 3);
        let units: Vec<Unit> = std::iter::from_fn(|| source.read_unit().unwrap()).collect();
        assert_eq!(units[1], Unit::new(vec![3, 4], 10, 10));
        assert_eq!(units[2].data, vec![5]);
    }

    #[test]
    fn test_raw_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.raw");
        std::fs::write(&input, (0u8..10).collect::<Vec<_>>()).unwrap();

        let mut source = RawFileSource::open(&input, 4, 1).unwrap();
        let output = dir.path().join("nested/out.raw");
        let mut sink = RawFileSink::create(&output, false).unwrap();
        let mut sizes = Vec::new();
        while let Some(unit) = source.read_unit().unwrap() {
            sizes.push((unit.pts, unit.data.len()));
            sink.write_unit(&unit).unwrap();
        }
        sink.finish().unwrap();

        assert_eq!(sizes, vec![(0, 4), (1, 4), (2, 2)]);
        assert_eq!(sink.bytes_written(), 10);
        assert_eq!(std::fs::read(&output).unwrap(), (0u8..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_sink_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.raw");
        std::fs::write(&path, b"x").unwrap();
        assert!(RawFileSink::create(&path, false).is_err());
        assert!(RawFileSink::create(&path, true).is_ok());
    }
}

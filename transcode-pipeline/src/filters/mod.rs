//! Built-in node kinds.
//!
//! | Kind | Pads | Arguments |
//! |------|------|-----------|
//! | `buffer`, `abuffer` | source | stream description |
//! | `buffersink`, `abuffersink` | sink | optional format lists |
//! | `null`, `anull` | 1 → 1 | |
//! | `format`, `aformat` | 1 → 1 | format lists |
//! | `scale` | 1 → 1 | `w`, `h`, `pix_fmt`, `flags` |
//! | `aresample` | 1 → 1 | `sample_rate`, `sample_fmt`, `channel_layout`, `frame_size` |
//! | `volume` | 1 → 1 | `volume` |
//! | `split`, `asplit` | 1 → N | `outputs` |
//! | `overlay` | 2 → 1 | `x`, `y` |
//! | `interleave`, `ainterleave` | N → 1 | `nb_inputs` |
//! | `hwupload`, `hwdownload` | 1 → 1 | `pool_size` |
//!
//! Arguments use the `key=value:key=value` syntax; leading values without a
//! key fill the kind's positional arguments in order (`split=3`,
//! `scale=320:240`).

mod convert;
mod hw;
mod interleave;
mod overlay;
mod passthrough;
mod sink;
mod source;
mod split;
mod volume;

pub use convert::{ResampleNode, ScaleNode};
pub use hw::{HwDownload, HwUpload};
pub use interleave::Interleave;
pub use overlay::Overlay;
pub use passthrough::Passthrough;
pub use sink::BufferSink;
pub use source::BufferSource;
pub use split::Split;
pub use volume::Volume;

use crate::node::FilterNode;
use std::str::FromStr;
use transcode_core::{
    Buffer, Error, GraphError, MediaType, OptionMap, OptionSchema, Options, Result,
    RetrieveStatus, UnknownOptionPolicy,
};

/// Names of every built-in node kind.
pub const FILTER_KINDS: &[&str] = &[
    "buffer",
    "abuffer",
    "buffersink",
    "abuffersink",
    "null",
    "anull",
    "format",
    "aformat",
    "scale",
    "aresample",
    "volume",
    "split",
    "asplit",
    "overlay",
    "interleave",
    "ainterleave",
    "hwupload",
    "hwdownload",
];

/// Create a node of a built-in kind from its argument string.
///
/// Unknown kinds fail with [`GraphError::UnknownKind`]; bad arguments with
/// [`GraphError::InvalidArgs`].
pub fn create_filter(kind: &str, name: &str, args: &str) -> Result<Box<dyn FilterNode>> {
    let invalid = |e: Error| -> Error {
        GraphError::InvalidArgs {
            node: name.to_string(),
            reason: e.to_string(),
        }
        .into()
    };
    let (schema, positional) = schema_for(kind)?;
    let map = parse_args(args, positional).map_err(invalid)?;
    let options = schema
        .resolve(&map, UnknownOptionPolicy::Reject)
        .map_err(invalid)?;
    build(kind, &options).map_err(invalid)
}

fn schema_for(kind: &str) -> Result<(OptionSchema, &'static [&'static str])> {
    let entry = match kind {
        "buffer" => (BufferSource::video_schema(), &["video_size", "pix_fmt"][..]),
        "abuffer" => (BufferSource::audio_schema(), &["sample_rate", "sample_fmt"][..]),
        "buffersink" => (BufferSink::video_schema(), &[][..]),
        "abuffersink" => (BufferSink::audio_schema(), &[][..]),
        "null" | "anull" => (OptionSchema::new(), &[][..]),
        "format" => (Passthrough::video_schema(), &["pix_fmts"][..]),
        "aformat" => (Passthrough::audio_schema(), &["sample_fmts"][..]),
        "scale" => (ScaleNode::schema(), &["w", "h"][..]),
        "aresample" => (ResampleNode::schema(), &["sample_rate"][..]),
        "volume" => (Volume::schema(), &["volume"][..]),
        "split" | "asplit" => (Split::schema(), &["outputs"][..]),
        "overlay" => (Overlay::schema(), &["x", "y"][..]),
        "interleave" | "ainterleave" => (Interleave::schema(), &["nb_inputs"][..]),
        "hwupload" => (HwUpload::schema(), &[][..]),
        "hwdownload" => (OptionSchema::new(), &[][..]),
        other => return Err(GraphError::UnknownKind(other.to_string()).into()),
    };
    Ok(entry)
}

fn build(kind: &str, options: &Options) -> Result<Box<dyn FilterNode>> {
    let node: Box<dyn FilterNode> = match kind {
        "buffer" => Box::new(BufferSource::from_video_options(options)?),
        "abuffer" => Box::new(BufferSource::from_audio_options(options)?),
        "buffersink" => Box::new(BufferSink::from_video_options(options)?),
        "abuffersink" => Box::new(BufferSink::from_audio_options(options)?),
        "null" => Box::new(Passthrough::null(MediaType::Video)),
        "anull" => Box::new(Passthrough::null(MediaType::Audio)),
        "format" => Box::new(Passthrough::from_video_options(options)?),
        "aformat" => Box::new(Passthrough::from_audio_options(options)?),
        "scale" => Box::new(ScaleNode::from_options(options)?),
        "aresample" => Box::new(ResampleNode::from_options(options)?),
        "volume" => Box::new(Volume::from_options(options)?),
        "split" => Box::new(Split::from_options(MediaType::Video, options)?),
        "asplit" => Box::new(Split::from_options(MediaType::Audio, options)?),
        "overlay" => Box::new(Overlay::from_options(options)?),
        "interleave" => Box::new(Interleave::from_options(MediaType::Video, options)?),
        "ainterleave" => Box::new(Interleave::from_options(MediaType::Audio, options)?),
        "hwupload" => Box::new(HwUpload::from_options(options)?),
        "hwdownload" => Box::new(HwDownload::new()),
        other => return Err(GraphError::UnknownKind(other.to_string()).into()),
    };
    Ok(node)
}

/// Parse `key=value` pairs, assigning bare values to `positional` names.
fn parse_args(args: &str, positional: &[&str]) -> Result<OptionMap> {
    let mut map = OptionMap::new();
    let mut next = positional.iter();
    for entry in args.split(':').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.split_once('=') {
            Some((key, value)) => {
                map.set(key.trim(), value.trim());
            }
            None => {
                let key = next.next().ok_or_else(|| {
                    Error::invalid_config(format!("unexpected positional argument '{entry}'"))
                })?;
                map.set(*key, entry);
            }
        }
    }
    Ok(map)
}

/// Parse a `|`-separated list option; unset options give an empty list.
pub(crate) fn parse_list<T: FromStr>(options: &Options, name: &str) -> Result<Vec<T>>
where
    T::Err: std::fmt::Display,
{
    if !options.is_set(name) {
        return Ok(Vec::new());
    }
    options
        .string(name)?
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|e: T::Err| Error::invalid_option(name, e.to_string())))
        .collect()
}

/// One unit of buffering plus an end-of-stream mark.
#[derive(Debug, Default)]
pub(crate) struct UnitSlot {
    unit: Option<Buffer>,
    eof: bool,
}

impl UnitSlot {
    pub(crate) fn has_room(&self) -> bool {
        self.unit.is_none() && !self.eof
    }

    pub(crate) fn put(&mut self, unit: Buffer) -> Result<()> {
        if !self.has_room() {
            return Err(Error::invalid_state("node input is full"));
        }
        self.unit = Some(unit);
        Ok(())
    }

    pub(crate) fn finish(&mut self) {
        self.eof = true;
    }

    pub(crate) fn take(&mut self, output: &mut Buffer) -> RetrieveStatus {
        match self.unit.take() {
            Some(mut unit) => {
                output.move_ref(&mut unit);
                RetrieveStatus::Produced
            }
            None if self.eof => RetrieveStatus::EndOfStream,
            None => RetrieveStatus::NeedsInput,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.unit = None;
        self.eof = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind() {
        let err = create_filter("nope", "n", "").err().unwrap();
        assert!(matches!(err.as_graph(), Some(GraphError::UnknownKind(k)) if k == "nope"));
    }

    #[test]
    fn test_invalid_args() {
        let err = create_filter("split", "s", "outputs=0").err().unwrap();
        assert!(matches!(err.as_graph(), Some(GraphError::InvalidArgs { node, .. }) if node == "s"));
        let err = create_filter("null", "n", "bogus=1").err().unwrap();
        assert!(matches!(err.as_graph(), Some(GraphError::InvalidArgs { .. })));
    }

    #[test]
    fn test_positional_args() {
        let map = parse_args("3:y=4", &["x", "y"]).unwrap();
        assert_eq!(map.get("x"), Some("3"));
        assert_eq!(map.get("y"), Some("4"));
        assert!(parse_args("1:2", &["x"]).is_err());
    }

    #[test]
    fn test_every_kind_builds_with_defaults() {
        for kind in FILTER_KINDS {
            let args = match *kind {
                "buffer" => "video_size=16x16:pix_fmt=yuv420p",
                "abuffer" => "sample_rate=8000:sample_fmt=s16:channel_layout=mono",
                "format" => "pix_fmts=gray",
                "aformat" => "sample_fmts=s16",
                _ => "",
            };
            let node = create_filter(kind, "n", args).unwrap();
            assert_eq!(node.kind(), *kind);
        }
    }

    #[test]
    fn test_unit_slot() {
        let mut slot = UnitSlot::default();
        let mut out = Buffer::new();
        assert_eq!(slot.take(&mut out), RetrieveStatus::NeedsInput);
        slot.put(Buffer::from_packet(vec![1], transcode_core::CodecId::RawVideo)).unwrap();
        assert!(!slot.has_room());
        assert_eq!(slot.take(&mut out), RetrieveStatus::Produced);
        slot.finish();
        assert_eq!(slot.take(&mut out), RetrieveStatus::EndOfStream);
    }
}

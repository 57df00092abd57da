//! # Transcode Pipeline
//!
//! A directed graph of filter nodes with typed pads.
//!
//! Nodes are created by kind ([`Graph::create_node`], [`FILTER_KINDS`]) or
//! added as custom [`FilterNode`] implementations, then linked pad to pad.
//! [`Graph::configure`] checks the topology, negotiates a format for every
//! link and inserts `scale` or `aresample` converters where neighbours
//! disagree. Units enter through `buffer`/`abuffer` sources and leave through
//! `buffersink`/`abuffersink` sinks; pulling a sink runs upstream nodes on
//! demand.
//!
//! A textual form is accepted by [`Graph::parse`]:
//!
//! ```ignore
//! let mut graph = Graph::new(GraphConfig::new());
//! graph.create_node("buffer", "in", "video_size=1280x720:pix_fmt=yuv420p:time_base=1/25")?;
//! graph.create_node("buffersink", "out", "")?;
//! graph.parse("split[a][b]; [b]scale=w=320:h=-1[pip]; [a][pip]overlay=x=16:y=16")?;
//! graph.configure()?;
//! graph.push(input, Some(&mut picture))?;
//! graph.pull(output, &mut result)?;
//! ```
//!
//! [`GraphStage`] wraps a one-in, one-out description as a
//! [`Stage`](transcode_core::Stage) so a graph can sit in a
//! [`Chain`](transcode_core::Chain).

mod filters;
mod graph;
mod node;
mod pad;
mod parse;
mod stage;

pub use filters::{
    create_filter, BufferSink, BufferSource, HwDownload, HwUpload, Interleave, Overlay,
    Passthrough, ResampleNode, ScaleNode, Split, Volume, FILTER_KINDS,
};
pub use graph::{Graph, GraphConfig, GraphState, Scheduling};
pub use node::{FilterNode, NodeContext, NodeId};
pub use pad::{
    AudioConstraint, FormatConstraint, LinkFormat, MemoryKind, PadDescriptor, VideoConstraint,
};
pub use parse::{OpenPad, OpenPads};
pub use stage::GraphStage;

//! The node trait every graph filter implements.

use crate::graph::GraphConfig;
use crate::pad::{FormatConstraint, LinkFormat, PadDescriptor};
use std::fmt;
use transcode_core::{Buffer, DeviceRef, Logger, MediaType, Result, RetrieveStatus};

/// Index of a node inside its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Get the raw index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// What a node sees while it is initialised.
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    /// Instance name.
    pub name: &'a str,
    /// Accelerator device given to the graph.
    pub device: Option<&'a DeviceRef>,
    /// Logger of this node.
    pub logger: &'a Logger,
    /// Graph settings.
    pub config: &'a GraphConfig,
}

/// A filter inside a [`Graph`](crate::Graph).
///
/// Nodes are driven by the graph one unit at a time: the graph pushes into
/// an input pad when [`has_capacity`](FilterNode::has_capacity) allows and
/// pulls from output pads when a downstream node needs data. `push(pad,
/// None)` marks the end of that input and must always be accepted.
///
/// A source has no input pads and is fed by the graph through `push(0, ..)`;
/// a sink has no output pads and is drained through `pull(0, ..)`.
pub trait FilterNode: Send {
    /// Get the kind name (`scale`, `split`, ...).
    fn kind(&self) -> &'static str;

    /// Input pads.
    fn inputs(&self) -> &[PadDescriptor];

    /// Output pads.
    fn outputs(&self) -> &[PadDescriptor];

    /// Formats input `pad` accepts, given the inputs negotiated so far.
    fn input_constraint(&self, pad: usize, negotiated: &[Option<LinkFormat>]) -> FormatConstraint {
        let _ = negotiated;
        let media = self.inputs().get(pad).map_or(MediaType::Video, |p| p.media);
        FormatConstraint::any(media)
    }

    /// Accept the negotiated input formats and describe every output pad.
    fn init(&mut self, inputs: &[LinkFormat], ctx: &NodeContext<'_>) -> Result<Vec<LinkFormat>>;

    /// Check if input `pad` can take another unit.
    fn has_capacity(&self, pad: usize) -> bool;

    /// Take one unit on input `pad`, or its end of stream.
    fn push(&mut self, pad: usize, input: Option<Buffer>) -> Result<()>;

    /// Produce one unit on output `pad`.
    fn pull(&mut self, pad: usize, output: &mut Buffer) -> Result<RetrieveStatus>;

    /// Sources only: nothing queued and no end of stream.
    fn is_starved(&self) -> bool {
        false
    }

    /// Drop buffered units and forget end of stream.
    fn reset(&mut self);

    /// Release what `init` allocated.
    fn uninit(&mut self) {}
}

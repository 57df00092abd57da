//! The dataflow engine.
//!
//! A [`Graph`] owns its nodes and the edges between their pads. Building it
//! happens in two phases:
//!
//! 1. **Topology**: [`Graph::create_node`] / [`Graph::add_node`] and
//!    [`Graph::link`] (or [`Graph::parse`]). Media type mismatches are
//!    reported by `link` and again by `configure`.
//! 2. **Configuration**: [`Graph::configure`] checks that every pad is
//!    linked, orders nodes topologically and negotiates one format per edge.
//!    Nodes are initialised in order; when an edge carries a format its
//!    consumer refuses, a `scale` or `aresample` converter is inserted on
//!    that edge. Any failure undoes every initialisation and leaves the
//!    graph as it was.
//!
//! At run time units enter through [`Graph::push`] on a source and leave
//! through [`Graph::pull`] on a sink. `pull` drives the graph backwards from
//! the sink: every edge holds at most one pending unit, and a node whose
//! output is requested is fed from its inputs, least recently serviced
//! input first.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = Graph::new(GraphConfig::default());
//! let src = graph.create_node("buffer", "in", "video_size=64x48:pix_fmt=rgb24")?;
//! let scale = graph.create_node("scale", "scale", "w=32:h=24")?;
//! let sink = graph.create_node("buffersink", "out", "pix_fmts=yuv420p")?;
//! graph.link(src, 0, scale, 0)?;
//! graph.link(scale, 0, sink, 0)?;
//! graph.configure()?;
//!
//! graph.push(src, Some(&mut picture))?;
//! graph.push(src, None)?;
//! while graph.pull(sink, &mut out)? == RetrieveStatus::Produced {
//!     // ...
//! }
//! ```

use crate::filters::{create_filter, ResampleNode, ScaleNode};
use crate::node::{FilterNode, NodeContext, NodeId};
use crate::pad::{FormatConstraint, LinkFormat};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::{debug, info, trace, warn};
use transcode_core::{
    Buffer, DeviceRef, Error, GraphError, Logger, MediaType, PadDirection, Result,
    RetrieveStatus, SubmitStatus,
};
use transcode_core::record_counter;
use transcode_scale::ScaleFilter;

/// Order in which a node's inputs are serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheduling {
    /// The input fed least recently goes first.
    #[default]
    LeastRecentlyServiced,
    /// Inputs are tried in pad order.
    PadOrder,
}

/// Graph settings.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Insert converters on edges whose format the consumer refuses.
    pub auto_convert: bool,
    /// Units a source or fan-out node may queue.
    pub queue_size: usize,
    /// Input servicing order.
    pub scheduling: Scheduling,
    /// Filter used by inserted and default scalers.
    pub scale_filter: ScaleFilter,
    /// Worker threads for scalers; 0 uses the global pool.
    pub threads: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            auto_convert: true,
            queue_size: 16,
            scheduling: Scheduling::default(),
            scale_filter: ScaleFilter::default(),
            threads: 0,
        }
    }
}

impl GraphConfig {
    /// Create the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable converter insertion.
    #[must_use]
    pub fn with_auto_convert(mut self, enabled: bool) -> Self {
        self.auto_convert = enabled;
        self
    }

    /// Set the queue size.
    #[must_use]
    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.queue_size = size;
        self
    }

    /// Set the input servicing order.
    #[must_use]
    pub fn with_scheduling(mut self, scheduling: Scheduling) -> Self {
        self.scheduling = scheduling;
        self
    }

    /// Set the scaler filter.
    #[must_use]
    pub fn with_scale_filter(mut self, filter: ScaleFilter) -> Self {
        self.scale_filter = filter;
        self
    }

    /// Set the scaler thread count.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
}

/// Lifecycle of a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    /// Topology may still change.
    Incomplete,
    /// Formats negotiated, units flow.
    Configured,
    /// Every node released.
    Closed,
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Incomplete => "incomplete",
            Self::Configured => "configured",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Result of asking a node's inputs for data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pump {
    /// A unit or end of stream moved one hop.
    Progress,
    /// Nothing can move until a source is fed.
    Starved,
}

struct NodeSlot {
    name: String,
    node: Box<dyn FilterNode>,
    inputs: Vec<Option<usize>>,
    outputs: Vec<Option<usize>>,
    initialised: bool,
    /// End of stream was pushed into this source.
    ended: bool,
    logger: Logger,
}

#[derive(Debug)]
struct Edge {
    src: usize,
    src_pad: usize,
    dst: usize,
    dst_pad: usize,
    format: Option<LinkFormat>,
    pending: Option<Buffer>,
    upstream_done: bool,
    eof_delivered: bool,
    serviced: u64,
}

impl Edge {
    fn clear(&mut self) {
        self.pending = None;
        self.upstream_done = false;
        self.eof_delivered = false;
        self.serviced = 0;
    }
}

/// A converter chosen during negotiation, spliced in on success.
struct Converter {
    edge: usize,
    name: String,
    node: Box<dyn FilterNode>,
    logger: Logger,
    produced: LinkFormat,
}

#[derive(Default)]
struct Plan {
    formats: Vec<Option<LinkFormat>>,
    converters: Vec<Converter>,
    initialised: Vec<usize>,
}

fn state_error(message: impl Into<String>) -> Error {
    GraphError::InvalidState(message.into()).into()
}

/// A network of filter nodes with whole-graph format negotiation.
pub struct Graph {
    config: GraphConfig,
    state: GraphState,
    nodes: Vec<NodeSlot>,
    edges: Vec<Edge>,
    names: HashMap<String, usize>,
    link_errors: Vec<GraphError>,
    device: Option<DeviceRef>,
    logger: Logger,
    tick: u64,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

impl Graph {
    /// Create an empty graph.
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            state: GraphState::Incomplete,
            nodes: Vec::new(),
            edges: Vec::new(),
            names: HashMap::new(),
            link_errors: Vec::new(),
            device: None,
            logger: Logger::disabled(),
            tick: 0,
        }
    }

    /// Set the logger. Nodes added afterwards log under it.
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Get the settings.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Get the current state.
    pub fn state(&self) -> GraphState {
        self.state
    }

    /// Give nodes such as `hwupload` a device to allocate from.
    pub fn set_device(&mut self, device: DeviceRef) -> Result<()> {
        self.require(GraphState::Incomplete)?;
        self.device = Some(device);
        Ok(())
    }

    /// Get the device, if any.
    pub fn device(&self) -> Option<&DeviceRef> {
        self.device.as_ref()
    }

    fn require(&self, state: GraphState) -> Result<()> {
        if self.state != state {
            return Err(state_error(format!(
                "graph is {}, operation needs {state}",
                self.state
            )));
        }
        Ok(())
    }

    /// Create a built-in node. Fails with `UnknownKind` or `InvalidArgs`.
    pub fn create_node(&mut self, kind: &str, name: &str, args: &str) -> Result<NodeId> {
        self.require(GraphState::Incomplete)?;
        self.check_name(name)?;
        let node = create_filter(kind, name, args)?;
        self.add_node(name, node)
    }

    /// Add a node built outside the graph.
    pub fn add_node(&mut self, name: &str, node: Box<dyn FilterNode>) -> Result<NodeId> {
        self.require(GraphState::Incomplete)?;
        self.check_name(name)?;
        let index = self.nodes.len();
        debug!(
            parent: self.logger.span(),
            node = name,
            kind = node.kind(),
            inputs = node.inputs().len(),
            outputs = node.outputs().len(),
            "node created"
        );
        self.nodes.push(NodeSlot {
            name: name.to_string(),
            inputs: vec![None; node.inputs().len()],
            outputs: vec![None; node.outputs().len()],
            logger: self.logger.child("node", name),
            node,
            initialised: false,
            ended: false,
        });
        self.names.insert(name.to_string(), index);
        Ok(NodeId(index))
    }

    fn check_name(&self, name: &str) -> Result<()> {
        let reason = if name.is_empty() {
            "node names must not be empty"
        } else if self.names.contains_key(name) {
            "name already in use"
        } else {
            return Ok(());
        };
        Err(GraphError::InvalidArgs {
            node: name.to_string(),
            reason: reason.to_string(),
        }
        .into())
    }

    /// Look up a node by name.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied().map(NodeId)
    }

    /// Get the name of a node.
    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.0).map(|n| n.name.as_str())
    }

    /// Get the kind of a node.
    pub fn node_kind(&self, id: NodeId) -> Option<&'static str> {
        self.nodes.get(id.0).map(|n| n.node.kind())
    }

    /// Get the number of nodes, converters included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over `(id, name, kind)` of every node.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &str, &'static str)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i), n.name.as_str(), n.node.kind()))
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Input and output pad counts of a node.
    pub(crate) fn pad_counts(&self, id: NodeId) -> (usize, usize) {
        self.nodes
            .get(id.0)
            .map_or((0, 0), |n| (n.inputs.len(), n.outputs.len()))
    }

    fn slot(&self, id: NodeId) -> Result<&NodeSlot> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()).into())
    }

    /// Connect output `src_pad` of `src` to input `dst_pad` of `dst`.
    ///
    /// A media type mismatch fails with `TypeMismatch` and is reported
    /// again by [`configure`](Graph::configure).
    pub fn link(&mut self, src: NodeId, src_pad: usize, dst: NodeId, dst_pad: usize) -> Result<()> {
        self.require(GraphState::Incomplete)?;
        let (src_slot, dst_slot) = (self.slot(src)?, self.slot(dst)?);

        let out_pads = src_slot.node.outputs();
        let Some(out_pad) = out_pads.get(src_pad) else {
            return Err(GraphError::PadOutOfRange {
                node: src_slot.name.clone(),
                pad: src_pad,
                count: out_pads.len(),
                direction: PadDirection::Output,
            }
            .into());
        };
        let in_pads = dst_slot.node.inputs();
        let Some(in_pad) = in_pads.get(dst_pad) else {
            return Err(GraphError::PadOutOfRange {
                node: dst_slot.name.clone(),
                pad: dst_pad,
                count: in_pads.len(),
                direction: PadDirection::Input,
            }
            .into());
        };
        if src_slot.outputs[src_pad].is_some() {
            return Err(state_error(format!(
                "output pad {src_pad} of '{}' is already linked",
                src_slot.name
            )));
        }
        if dst_slot.inputs[dst_pad].is_some() {
            return Err(state_error(format!(
                "input pad {dst_pad} of '{}' is already linked",
                dst_slot.name
            )));
        }
        if out_pad.media != in_pad.media {
            let err = GraphError::TypeMismatch {
                src: src_slot.name.clone(),
                dst: dst_slot.name.clone(),
                src_type: out_pad.media.to_string(),
                dst_type: in_pad.media.to_string(),
            };
            warn!(parent: self.logger.span(), error = %err, "link rejected");
            self.link_errors.push(err.clone());
            return Err(err.into());
        }

        let edge = self.edges.len();
        trace!(
            parent: self.logger.span(),
            src = %src_slot.name,
            src_pad,
            dst = %dst_slot.name,
            dst_pad,
            "linked"
        );
        self.edges.push(Edge {
            src: src.0,
            src_pad,
            dst: dst.0,
            dst_pad,
            format: None,
            pending: None,
            upstream_done: false,
            eof_delivered: false,
            serviced: 0,
        });
        self.nodes[src.0].outputs[src_pad] = Some(edge);
        self.nodes[dst.0].inputs[dst_pad] = Some(edge);
        Ok(())
    }

    /// Negotiate formats and initialise every node.
    ///
    /// Fails with the first `TypeMismatch` recorded by [`link`](Graph::link),
    /// `Incomplete` when a pad is unlinked, or `Unresolvable` on a cycle or
    /// an edge no format satisfies. On failure the graph stays
    /// [`GraphState::Incomplete`] with no node initialised.
    pub fn configure(&mut self) -> Result<()> {
        self.require(GraphState::Incomplete)?;
        if let Some(err) = self.link_errors.first() {
            return Err(err.clone().into());
        }
        self.check_complete()?;
        let order = self.topological_order()?;

        let mut plan = Plan {
            formats: vec![None; self.edges.len()],
            ..Plan::default()
        };
        if let Err(err) = self.negotiate(&order, &mut plan) {
            warn!(parent: self.logger.span(), error = %err, "configuration failed");
            for &n in plan.initialised.iter().rev() {
                self.nodes[n].node.uninit();
            }
            for converter in &mut plan.converters {
                converter.node.uninit();
            }
            return Err(err);
        }

        for (edge, format) in self.edges.iter_mut().zip(plan.formats) {
            edge.format = format;
        }
        for &n in &plan.initialised {
            self.nodes[n].initialised = true;
        }
        for converter in plan.converters {
            self.splice(converter);
        }
        self.state = GraphState::Configured;
        info!(
            parent: self.logger.span(),
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "graph configured"
        );
        Ok(())
    }

    fn check_complete(&self) -> Result<()> {
        for slot in &self.nodes {
            let unlinked = |pads: &[Option<usize>], direction| {
                pads.iter().position(Option::is_none).map(|pad| GraphError::Incomplete {
                    node: slot.name.clone(),
                    pad,
                    direction,
                })
            };
            if let Some(err) = unlinked(&slot.inputs, PadDirection::Input)
                .or_else(|| unlinked(&slot.outputs, PadDirection::Output))
            {
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn topological_order(&self) -> Result<Vec<usize>> {
        let mut indegree: Vec<usize> = self.nodes.iter().map(|n| n.inputs.len()).collect();
        let mut ready: VecDeque<usize> = (0..self.nodes.len()).filter(|&n| indegree[n] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(n) = ready.pop_front() {
            order.push(n);
            for edge in self.nodes[n].outputs.iter().flatten() {
                let dst = self.edges[*edge].dst;
                indegree[dst] -= 1;
                if indegree[dst] == 0 {
                    ready.push_back(dst);
                }
            }
        }
        if order.len() < self.nodes.len() {
            let stuck: Vec<&str> = (0..self.nodes.len())
                .filter(|&n| indegree[n] > 0)
                .map(|n| self.nodes[n].name.as_str())
                .collect();
            return Err(GraphError::Unresolvable(format!(
                "cycle through {}",
                stuck.join(", ")
            ))
            .into());
        }
        Ok(order)
    }

    fn negotiate(&mut self, order: &[usize], plan: &mut Plan) -> Result<()> {
        for &n in order {
            let pad_count = self.nodes[n].inputs.len();
            let mut negotiated: Vec<Option<LinkFormat>> = vec![None; pad_count];
            for pad in 0..pad_count {
                let edge = self.nodes[n].inputs[pad]
                    .ok_or_else(|| state_error("unlinked input during negotiation"))?;
                let offered = plan.formats[edge].clone().ok_or_else(|| {
                    state_error(format!("no format offered to '{}'", self.nodes[n].name))
                })?;
                let constraint = self.nodes[n].node.input_constraint(pad, &negotiated);
                let accepted = if constraint.accepts(&offered) {
                    offered
                } else {
                    self.insert_converter(edge, &offered, &constraint, plan)?
                };
                negotiated[pad] = Some(accepted);
            }
            let inputs: Vec<LinkFormat> = negotiated.into_iter().flatten().collect();

            let slot = &mut self.nodes[n];
            let ctx = NodeContext {
                name: &slot.name,
                device: self.device.as_ref(),
                logger: &slot.logger,
                config: &self.config,
            };
            let outputs = slot.node.init(&inputs, &ctx)?;
            plan.initialised.push(n);
            if outputs.len() != slot.outputs.len() {
                return Err(state_error(format!(
                    "'{}' described {} outputs but has {}",
                    slot.name,
                    outputs.len(),
                    slot.outputs.len()
                )));
            }
            for (edge, format) in slot.outputs.iter().zip(outputs) {
                if let Some(edge) = edge {
                    debug!(parent: slot.logger.span(), pad = self.edges[*edge].src_pad, %format, "output negotiated");
                    plan.formats[*edge] = Some(format);
                }
            }
        }
        Ok(())
    }

    /// Build and initialise a converter turning `offered` into a format
    /// `constraint` accepts.
    fn insert_converter(
        &self,
        edge: usize,
        offered: &LinkFormat,
        constraint: &FormatConstraint,
        plan: &mut Plan,
    ) -> Result<LinkFormat> {
        let (src, dst) = (&self.nodes[self.edges[edge].src], &self.nodes[self.edges[edge].dst]);
        let unresolvable = |reason: &str| -> Error {
            GraphError::Unresolvable(format!(
                "'{}' offers {offered} to input {} of '{}': {reason}",
                src.name, self.edges[edge].dst_pad, dst.name
            ))
            .into()
        };
        if !self.config.auto_convert {
            return Err(unresolvable("format refused and conversion is disabled"));
        }
        let target = constraint
            .nearest(offered)
            .ok_or_else(|| unresolvable("no conversion reaches an accepted format"))?;
        if offered.video().is_some_and(|v| v.pixel_format.is_high_depth())
            || target.video().is_some_and(|v| v.pixel_format.is_high_depth())
        {
            return Err(unresolvable("high bit depth pictures cannot be converted"));
        }

        let mut node: Box<dyn FilterNode> = match (target.media_type(), target.video(), target.audio()) {
            (Some(MediaType::Video), Some(v), _) => Box::new(ScaleNode::converter(v, self.config.scale_filter)),
            (Some(MediaType::Audio), _, Some(a)) => Box::new(ResampleNode::converter(a)),
            _ => return Err(unresolvable("no converter for this media")),
        };
        let name = format!("auto_{}_{}", node.kind(), plan.converters.len());
        let logger = self.logger.child("node", &name);
        let ctx = NodeContext {
            name: &name,
            device: self.device.as_ref(),
            logger: &logger,
            config: &self.config,
        };
        let produced = node
            .init(std::slice::from_ref(offered), &ctx)
            .map_err(|e| unresolvable(&e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| unresolvable("converter produced no output"))?;
        if !constraint.accepts(&produced) {
            node.uninit();
            return Err(unresolvable(&format!("converter output {produced} is still refused")));
        }
        debug!(parent: self.logger.span(), converter = %name, from = %offered, to = %produced, "converter inserted");
        plan.converters.push(Converter {
            edge,
            name,
            node,
            logger,
            produced: produced.clone(),
        });
        Ok(produced)
    }

    /// Put a negotiated converter between the two ends of its edge.
    fn splice(&mut self, converter: Converter) {
        let index = self.nodes.len();
        let out_edge = self.edges.len();
        let (dst, dst_pad) = (self.edges[converter.edge].dst, self.edges[converter.edge].dst_pad);

        self.edges[converter.edge].dst = index;
        self.edges[converter.edge].dst_pad = 0;
        self.edges.push(Edge {
            src: index,
            src_pad: 0,
            dst,
            dst_pad,
            format: Some(converter.produced),
            pending: None,
            upstream_done: false,
            eof_delivered: false,
            serviced: 0,
        });
        self.nodes[dst].inputs[dst_pad] = Some(out_edge);
        self.names.insert(converter.name.clone(), index);
        self.nodes.push(NodeSlot {
            name: converter.name,
            node: converter.node,
            inputs: vec![Some(converter.edge)],
            outputs: vec![Some(out_edge)],
            initialised: true,
            ended: false,
            logger: converter.logger,
        });
    }

    fn running_slot(&self, id: NodeId) -> Result<&NodeSlot> {
        match self.state {
            GraphState::Configured => self.slot(id),
            GraphState::Incomplete => Err(state_error("graph is not configured")),
            GraphState::Closed => Err(state_error("graph is closed")),
        }
    }

    /// Feed a unit into a source, or its end of stream with `None`.
    ///
    /// Returns `Busy` when the source queue is full; pull from a sink and
    /// retry. On `Accepted` the buffer's content has been moved out.
    pub fn push(&mut self, source: NodeId, input: Option<&mut Buffer>) -> Result<SubmitStatus> {
        let slot = self.running_slot(source)?;
        if !slot.inputs.is_empty() || slot.outputs.is_empty() {
            return Err(state_error(format!("'{}' is not a source", slot.name)));
        }
        let node = &mut self.nodes[source.0];
        if node.ended {
            return Err(Error::Closed);
        }
        match input {
            Some(buffer) => {
                if !buffer.has_storage() {
                    return Err(Error::invalid_state("submitted buffer holds no data"));
                }
                if !node.node.has_capacity(0) {
                    trace!(parent: node.logger.span(), "source busy");
                    return Ok(SubmitStatus::Busy);
                }
                let mut unit = Buffer::new();
                unit.move_ref(buffer);
                node.node.push(0, Some(unit))?;
                record_counter!("graph.units_pushed", 1);
            }
            None => {
                debug!(parent: node.logger.span(), "source ended");
                node.node.push(0, None)?;
                node.ended = true;
            }
        }
        Ok(SubmitStatus::Accepted)
    }

    /// Take one unit from a sink, running upstream nodes as needed.
    ///
    /// `NeedsInput` means some source must be fed first (see
    /// [`starved_sources`](Graph::starved_sources)); `EndOfStream` that every
    /// path into the sink has ended.
    pub fn pull(&mut self, sink: NodeId, output: &mut Buffer) -> Result<RetrieveStatus> {
        let slot = self.running_slot(sink)?;
        if slot.inputs.is_empty() || !slot.outputs.is_empty() {
            return Err(state_error(format!("'{}' is not a sink", slot.name)));
        }
        output.unreference();
        loop {
            match self.nodes[sink.0].node.pull(0, output)? {
                RetrieveStatus::NeedsInput => {
                    if self.request(sink.0)? == Pump::Starved {
                        return Ok(RetrieveStatus::NeedsInput);
                    }
                }
                RetrieveStatus::Produced => {
                    record_counter!("graph.units_pulled", 1);
                    return Ok(RetrieveStatus::Produced);
                }
                status => return Ok(status),
            }
        }
    }

    /// Input edges of `node` in servicing order.
    fn service_order(&self, node: usize) -> Vec<usize> {
        let mut edges: Vec<usize> = self.nodes[node].inputs.iter().flatten().copied().collect();
        if self.config.scheduling == Scheduling::LeastRecentlyServiced {
            edges.sort_by_key(|&e| self.edges[e].serviced);
        }
        edges
    }

    /// Move one unit or end of stream toward `node`.
    fn request(&mut self, node: usize) -> Result<Pump> {
        let order = self.service_order(node);
        let mut progressed = false;
        for &edge in &order {
            progressed |= self.deliver(edge)?;
        }
        if progressed {
            return Ok(Pump::Progress);
        }

        for &edge in &order {
            let e = &self.edges[edge];
            if e.pending.is_some() || e.upstream_done || !self.nodes[node].node.has_capacity(e.dst_pad) {
                continue;
            }
            let (src, src_pad) = (e.src, e.src_pad);
            let mut unit = Buffer::new();
            match self.nodes[src].node.pull(src_pad, &mut unit)? {
                RetrieveStatus::Produced => {
                    self.edges[edge].pending = Some(unit);
                    self.deliver(edge)?;
                    return Ok(Pump::Progress);
                }
                RetrieveStatus::EndOfStream => {
                    trace!(parent: self.nodes[src].logger.span(), pad = src_pad, "output ended");
                    self.edges[edge].upstream_done = true;
                    self.deliver(edge)?;
                    return Ok(Pump::Progress);
                }
                RetrieveStatus::NeedsInput => {
                    if self.request(src)? == Pump::Progress {
                        return Ok(Pump::Progress);
                    }
                }
            }
        }
        Ok(Pump::Starved)
    }

    /// Hand the edge's pending unit or end of stream to its consumer.
    fn deliver(&mut self, edge: usize) -> Result<bool> {
        let e = &mut self.edges[edge];
        if e.eof_delivered {
            return Ok(false);
        }
        let node = &mut self.nodes[e.dst].node;
        if e.pending.is_some() {
            if !node.has_capacity(e.dst_pad) {
                return Ok(false);
            }
            self.tick += 1;
            e.serviced = self.tick;
            node.push(e.dst_pad, e.pending.take())?;
            return Ok(true);
        }
        if e.upstream_done {
            e.eof_delivered = true;
            node.push(e.dst_pad, None)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Sources that must be fed before `sink` can progress.
    pub fn starved_sources(&self, sink: NodeId) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![sink.0];
        let mut starved = Vec::new();
        while let Some(n) = stack.pop() {
            if n >= self.nodes.len() || std::mem::replace(&mut seen[n], true) {
                continue;
            }
            let slot = &self.nodes[n];
            if slot.inputs.is_empty() && slot.node.is_starved() && self.wants_input(slot) {
                starved.push(NodeId(n));
            }
            stack.extend(slot.inputs.iter().flatten().map(|&e| self.edges[e].src));
        }
        starved.sort();
        starved
    }

    /// Check if a downstream node could take a unit from this source now.
    fn wants_input(&self, source: &NodeSlot) -> bool {
        source.outputs.iter().flatten().any(|&e| {
            let edge = &self.edges[e];
            edge.pending.is_none() && self.nodes[edge.dst].node.has_capacity(edge.dst_pad)
        })
    }

    /// Get the format negotiated on output `pad` of `node`.
    pub fn link_format(&self, node: NodeId, pad: usize) -> Option<&LinkFormat> {
        let edge = (*self.nodes.get(node.0)?.outputs.get(pad)?)?;
        self.edges[edge].format.as_ref()
    }

    /// Get the format negotiated into input `pad` of `node`.
    pub fn input_format(&self, node: NodeId, pad: usize) -> Option<&LinkFormat> {
        let edge = (*self.nodes.get(node.0)?.inputs.get(pad)?)?;
        self.edges[edge].format.as_ref()
    }

    /// Drop every queued unit and forget end of stream, keeping formats.
    pub fn flush(&mut self) -> Result<()> {
        self.require(GraphState::Configured)?;
        for slot in &mut self.nodes {
            slot.node.reset();
            slot.ended = false;
        }
        self.edges.iter_mut().for_each(Edge::clear);
        self.tick = 0;
        debug!(parent: self.logger.span(), "graph flushed");
        Ok(())
    }

    /// Release every node. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.state == GraphState::Closed {
            return;
        }
        for slot in &mut self.nodes {
            if slot.initialised {
                slot.node.uninit();
                slot.initialised = false;
            }
        }
        self.edges.iter_mut().for_each(Edge::clear);
        self.state = GraphState::Closed;
        debug!(parent: self.logger.span(), "graph closed");
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("state", &self.state)
            .field("nodes", &self.nodes.iter().map(|n| &n.name).collect::<Vec<_>>())
            .field("edges", &self.edges.len())
            .finish()
    }
}

//! [`GraphStage`]: a one-in, one-out filter description behind the
//! [`Stage`] protocol.
//!
//! The graph is built at `open` from the configured stream: a source named
//! `in`, a sink named `out` and the description between them. When a unit
//! arrives in another format (new size, sample rate, or device memory) the
//! current graph is drained and rebuilt for the new format; units already
//! inside the old graph come out first.

use crate::filters::{BufferSink, BufferSource};
use crate::graph::{Graph, GraphConfig};
use crate::node::NodeId;
use crate::pad::{LinkFormat, MemoryKind};
use std::collections::VecDeque;
use tracing::{debug, info};
use transcode_core::{
    Buffer, Error, Logger, MediaFormat, ProtocolGuard, Result, RetrieveStatus, Stage,
    StageParams, StageState, StreamParams, SubmitStatus, UnknownOptionPolicy,
};

struct Active {
    graph: Graph,
    source: NodeId,
    sink: NodeId,
    input: (MediaFormat, MemoryKind),
    output: StreamParams,
}

/// A filter graph used as a single stage.
pub struct GraphStage {
    name: String,
    description: String,
    config: GraphConfig,
    guard: ProtocolGuard,
    params: Option<StageParams>,
    active: Option<Active>,
    retired: VecDeque<(Buffer, StreamParams)>,
    output: Option<StreamParams>,
    memory: MemoryKind,
    rebuilds: usize,
    logger: Logger,
}

fn memory_of(buffer: &Buffer) -> MemoryKind {
    if buffer.is_hardware() {
        MemoryKind::Device
    } else {
        MemoryKind::Host
    }
}

impl GraphStage {
    /// Create a stage running `description`.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            config: GraphConfig::default(),
            guard: ProtocolGuard::new(),
            params: None,
            active: None,
            retired: VecDeque::new(),
            output: None,
            memory: MemoryKind::Host,
            rebuilds: 0,
            logger: Logger::disabled(),
        }
    }

    /// Set the graph settings.
    #[must_use]
    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    /// Expect the first units in `memory`; later units may differ.
    #[must_use]
    pub fn with_input_memory(mut self, memory: MemoryKind) -> Self {
        self.memory = memory;
        self
    }

    /// Set the logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Get the filter description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get how many times the graph was rebuilt after a format change.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    /// Get the running graph.
    pub fn graph(&self) -> Option<&Graph> {
        self.active.as_ref().map(|a| &a.graph)
    }

    fn build(&self, stream: StreamParams, memory: MemoryKind) -> Result<Active> {
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| Error::invalid_state("open before configure"))?;
        let media = stream
            .media_type()
            .ok_or_else(|| Error::invalid_config("graph stage input has no media type"))?;
        let input = (stream.media_format(), memory);
        let link = match memory {
            MemoryKind::Host => LinkFormat::host(stream),
            MemoryKind::Device => LinkFormat::device(stream),
        };

        let mut graph = Graph::new(self.config.clone()).with_logger(self.logger.child("graph", &self.name));
        if let Some(device) = &params.device {
            graph.set_device(device.clone())?;
        }
        let source = graph.add_node("in", Box::new(BufferSource::new(link)?))?;
        let sink = graph.add_node("out", Box::new(BufferSink::any(media)))?;
        let open = graph.parse(&self.description)?;
        if let Some(pad) = open.inputs.first().or_else(|| open.outputs.first()) {
            return Err(Error::invalid_config(format!(
                "'{}' leaves pad {} of '{}' unlinked",
                self.description,
                pad.pad,
                graph.node_name(pad.node).unwrap_or("?")
            )));
        }
        graph.configure()?;
        let output = graph
            .input_format(sink, 0)
            .map(|f| f.stream.clone())
            .ok_or_else(|| Error::invalid_state("graph sink has no negotiated format"))?;
        debug!(parent: self.logger.span(), input = %input.0, output = %output.media_format(), "graph built");
        Ok(Active {
            graph,
            source,
            sink,
            input,
            output,
        })
    }

    fn active(&mut self) -> Result<&mut Active> {
        self.active
            .as_mut()
            .ok_or_else(|| Error::invalid_state("graph stage is not open"))
    }

    /// Drain the running graph into `retired` and build one for `unit`.
    fn rebuild(&mut self, unit: &Buffer) -> Result<()> {
        if let Some(mut old) = self.active.take() {
            old.graph.push(old.source, None)?;
            loop {
                let mut out = Buffer::new();
                match old.graph.pull(old.sink, &mut out)? {
                    RetrieveStatus::Produced => self.retired.push_back((out, old.output.clone())),
                    _ => break,
                }
            }
            old.graph.close();
        }
        let mut stream = StreamParams::decoded(unit.format(), unit.time_base)?;
        if let Some(params) = &self.params {
            stream.frame_rate = params.stream.frame_rate;
        }
        let active = self.build(stream, memory_of(unit))?;
        self.rebuilds += 1;
        info!(
            parent: self.logger.span(),
            stage = %self.name,
            format = %unit.format(),
            rebuilds = self.rebuilds,
            "input format changed, graph rebuilt"
        );
        self.active = Some(active);
        Ok(())
    }
}

impl Stage for GraphStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> StageState {
        self.guard.state()
    }

    fn configure(&mut self, params: StageParams) -> Result<()> {
        if params.unknown_options == UnknownOptionPolicy::Reject {
            if let Some((key, _)) = params.options.iter().next() {
                return Err(Error::UnknownOption(key.to_string()));
            }
        }
        if !matches!(
            params.stream.media_format(),
            MediaFormat::Video(_) | MediaFormat::Audio(_)
        ) {
            return Err(Error::invalid_config(format!(
                "graph stage needs decoded input, got '{}'",
                params.stream.media_format()
            )));
        }
        self.guard.configure()?;
        self.params = Some(params);
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        self.guard.check_open()?;
        let stream = self
            .params
            .as_ref()
            .map(|p| p.stream.clone())
            .ok_or_else(|| Error::invalid_state("open before configure"))?;
        self.active = Some(self.build(stream, self.memory)?);
        self.guard.opened();
        Ok(())
    }

    fn submit(&mut self, input: Option<&mut Buffer>) -> Result<SubmitStatus> {
        self.guard.check_submit()?;
        let Some(buffer) = input else {
            let active = self.active()?;
            active.graph.push(active.source, None)?;
            self.guard.end_of_stream();
            return Ok(SubmitStatus::Accepted);
        };
        if !buffer.has_storage() {
            return Err(Error::invalid_state(
                "submitted buffer holds no data; pass None to signal end of stream",
            ));
        }
        let key = (buffer.format(), memory_of(buffer));
        if self.active()?.input != key {
            self.rebuild(buffer)?;
        }
        let active = self.active()?;
        let status = active.graph.push(active.source, Some(buffer))?;
        if status == SubmitStatus::Busy {
            self.guard.busy();
        }
        Ok(status)
    }

    fn retrieve(&mut self, output: &mut Buffer) -> Result<RetrieveStatus> {
        output.unreference();
        if !self.guard.check_retrieve()? {
            return Ok(RetrieveStatus::EndOfStream);
        }
        if let Some((mut unit, params)) = self.retired.pop_front() {
            output.move_ref(&mut unit);
            self.output = Some(params);
            return Ok(RetrieveStatus::Produced);
        }
        let draining = self.guard.state() == StageState::Draining;
        let active = self.active()?;
        let status = active.graph.pull(active.sink, output)?;
        match status {
            RetrieveStatus::Produced => {
                self.output = Some(active.output.clone());
                Ok(status)
            }
            RetrieveStatus::EndOfStream => {
                self.guard.drained();
                Ok(status)
            }
            RetrieveStatus::NeedsInput if draining => {
                self.guard.drained();
                Ok(RetrieveStatus::EndOfStream)
            }
            RetrieveStatus::NeedsInput => Ok(status),
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.guard.flush()?;
        self.retired.clear();
        self.active()?.graph.flush()
    }

    fn close(&mut self) {
        if self.guard.close() {
            if let Some(mut active) = self.active.take() {
                active.graph.close();
            }
            self.retired.clear();
        }
    }

    fn output_params(&self) -> Option<&StreamParams> {
        self.output.as_ref()
    }
}

impl std::fmt::Debug for GraphStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStage")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("state", &self.guard.state())
            .field("rebuilds", &self.rebuilds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcode_core::{PixelFormat, TimeBase, VideoFormat};

    fn picture(width: u32, height: u32, pts: i64) -> Buffer {
        let mut buffer = Buffer::new();
        buffer
            .allocate(VideoFormat::new(width, height, PixelFormat::Gray8))
            .unwrap();
        buffer.pts = pts;
        buffer.time_base = TimeBase::new(1, 25);
        buffer
    }

    fn opened(description: &str) -> GraphStage {
        let format = VideoFormat::new(16, 16, PixelFormat::Gray8);
        let mut stage = GraphStage::new("filters", description);
        stage
            .configure(StageParams::new(StreamParams::video(format, TimeBase::new(1, 25))))
            .unwrap();
        stage.open().unwrap();
        stage
    }

    #[test]
    fn test_scales_through_graph() {
        let mut stage = opened("scale=w=8:h=8");
        stage.submit(Some(&mut picture(16, 16, 0))).unwrap();

        let mut out = Buffer::new();
        assert_eq!(stage.retrieve(&mut out).unwrap(), RetrieveStatus::Produced);
        assert_eq!(out.video_format().map(|v| (v.width, v.height)), Some((8, 8)));
        assert_eq!(out.pts, 0);
        assert_eq!(
            stage.output_params().and_then(|p| p.video).map(|v| v.width),
            Some(8)
        );
    }

    #[test]
    fn test_format_change_rebuilds_in_order() {
        let mut stage = opened("scale=w=8:h=8");
        stage.submit(Some(&mut picture(16, 16, 0))).unwrap();
        stage.submit(Some(&mut picture(32, 32, 1))).unwrap();
        assert_eq!(stage.rebuilds(), 1);

        let mut out = Buffer::new();
        assert_eq!(stage.retrieve(&mut out).unwrap(), RetrieveStatus::Produced);
        assert_eq!(out.pts, 0);
        assert_eq!(stage.retrieve(&mut out).unwrap(), RetrieveStatus::Produced);
        assert_eq!(out.pts, 1);
        assert_eq!(out.video_format().map(|v| v.width), Some(8));

        stage.submit(None).unwrap();
        assert_eq!(stage.retrieve(&mut out).unwrap(), RetrieveStatus::EndOfStream);
        assert_eq!(stage.state(), StageState::Closed);
    }

    #[test]
    fn test_open_pads_rejected() {
        let format = VideoFormat::new(16, 16, PixelFormat::Gray8);
        let mut stage = GraphStage::new("filters", "[x]overlay");
        stage
            .configure(StageParams::new(StreamParams::video(format, TimeBase::new(1, 25))))
            .unwrap();
        assert!(stage.open().is_err());
    }

    #[test]
    fn test_empty_submit_and_close() {
        let mut stage = opened("null");
        assert!(stage.submit(Some(&mut Buffer::new())).is_err());
        stage.close();
        stage.close();
        assert_eq!(stage.state(), StageState::Closed);
    }
}

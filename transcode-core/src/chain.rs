//! Linear composition of stages.
//!
//! A [`Chain`] is itself a [`Stage`]: input submitted to the chain enters the
//! first stage, and retrieving from the chain pulls output through every
//! stage in turn. Stages after the first are configured lazily from the
//! output parameters of their upstream stage, once it produced a unit.
//!
//! # Example
//!
//! ```ignore
//! let mut chain = Chain::new("video")
//!     .with(decoder)
//!     .with_params(scaler, StageParams::default().with_option("size", "320x240"))
//!     .with(encoder);
//! chain.configure(StageParams::new(input_stream))?;
//! chain.open()?;
//! ```

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::log::Logger;
use crate::record_counter;
use crate::stage::{
    ProtocolGuard, RetrieveStatus, Stage, StageParams, StageState, StreamParams, SubmitStatus,
};
use std::fmt;
use tracing::{debug, trace};

struct Link {
    stage: Box<dyn Stage>,
    template: StageParams,
    /// Unit waiting to enter this stage. For the first link this is the
    /// chain's input slot.
    pending: Option<Buffer>,
    eos_sent: bool,
    /// The stream ended before this stage ever saw data.
    skipped: bool,
}

fn is_open(state: StageState) -> bool {
    matches!(
        state,
        StageState::Opened | StageState::Draining | StageState::Closed
    )
}

/// A sequence of stages behaving as one stage.
pub struct Chain {
    name: String,
    links: Vec<Link>,
    guard: ProtocolGuard,
    params: Option<StageParams>,
    input_eos: bool,
    logger: Logger,
}

impl Chain {
    /// Create an empty chain.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            links: Vec::new(),
            guard: ProtocolGuard::new(),
            params: None,
            input_eos: false,
            logger: Logger::disabled(),
        }
    }

    /// Set the logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Append a stage configured with default parameters.
    #[must_use]
    pub fn with(self, stage: impl Stage + 'static) -> Self {
        self.with_params(stage, StageParams::default())
    }

    /// Append a stage with a parameter template. The template's stream
    /// description is replaced by the upstream output when the stage opens.
    #[must_use]
    pub fn with_params(mut self, stage: impl Stage + 'static, template: StageParams) -> Self {
        self.push(Box::new(stage), template);
        self
    }

    /// Append a boxed stage.
    pub fn push(&mut self, stage: Box<dyn Stage>, template: StageParams) {
        self.links.push(Link {
            stage,
            template,
            pending: None,
            eos_sent: false,
            skipped: false,
        });
    }

    /// Get the number of stages.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Get a stage by position.
    pub fn stage(&self, index: usize) -> Option<&dyn Stage> {
        self.links.get(index).map(|l| l.stage.as_ref())
    }

    fn open_link(&mut self, i: usize) -> Result<()> {
        let state = self.links[i].stage.state();
        if is_open(state) {
            return Ok(());
        }
        if state == StageState::Unconfigured {
            let stream = self.upstream_params(i)?;
            let mut params = self.links[i].template.clone();
            params.stream = stream;
            if params.device.is_none() {
                params.device = self.params.as_ref().and_then(|p| p.device.clone());
            }
            self.links[i].stage.configure(params)?;
        }
        self.links[i].stage.open()?;
        debug!(
            parent: self.logger.span(),
            chain = %self.name,
            stage = %self.links[i].stage.name(),
            position = i,
            "stage opened"
        );
        Ok(())
    }

    fn upstream_params(&self, i: usize) -> Result<StreamParams> {
        if i == 0 {
            return self
                .params
                .as_ref()
                .map(|p| p.stream.clone())
                .ok_or_else(|| Error::invalid_state("chain is not configured"));
        }
        self.links[i - 1]
            .stage
            .output_params()
            .cloned()
            .ok_or_else(|| {
                Error::invalid_state(format!(
                    "stage '{}' produced output without describing it",
                    self.links[i - 1].stage.name()
                ))
            })
    }

    fn finish_link(&mut self, i: usize) -> Result<()> {
        let link = &mut self.links[i];
        link.eos_sent = true;
        if is_open(link.stage.state()) {
            link.stage.submit(None)?;
        } else {
            link.skipped = true;
        }
        trace!(parent: self.logger.span(), chain = %self.name, position = i, "end of stream forwarded");
        Ok(())
    }

    /// Pull one unit out of stage `i`, feeding it from upstream as needed.
    fn pull(&mut self, i: usize, out: &mut Buffer) -> Result<RetrieveStatus> {
        loop {
            if self.links[i].skipped {
                return Ok(RetrieveStatus::EndOfStream);
            }
            if is_open(self.links[i].stage.state()) {
                match self.links[i].stage.retrieve(out)? {
                    RetrieveStatus::NeedsInput => {}
                    status => return Ok(status),
                }
                if self.links[i].eos_sent {
                    return Err(Error::invalid_state(format!(
                        "stage '{}' asked for input after end of stream",
                        self.links[i].stage.name()
                    )));
                }
            }

            if self.links[i].pending.is_none() {
                let upstream = if i == 0 {
                    if !self.input_eos {
                        return Ok(RetrieveStatus::NeedsInput);
                    }
                    RetrieveStatus::EndOfStream
                } else {
                    let mut unit = Buffer::new();
                    let status = self.pull(i - 1, &mut unit)?;
                    if status == RetrieveStatus::Produced {
                        self.links[i].pending = Some(unit);
                        record_counter!("chain.units_pumped", 1);
                    }
                    status
                };
                match upstream {
                    RetrieveStatus::NeedsInput => return Ok(RetrieveStatus::NeedsInput),
                    RetrieveStatus::EndOfStream => {
                        self.finish_link(i)?;
                        continue;
                    }
                    RetrieveStatus::Produced => {}
                }
            }

            self.open_link(i)?;
            let link = &mut self.links[i];
            if let Some(mut unit) = link.pending.take() {
                if link.stage.submit(Some(&mut unit))? == SubmitStatus::Busy {
                    link.pending = Some(unit);
                    return Err(Error::invalid_state(format!(
                        "stage '{}' reported Busy while asking for input",
                        link.stage.name()
                    )));
                }
            }
        }
    }
}

impl Stage for Chain {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> StageState {
        self.guard.state()
    }

    fn configure(&mut self, params: StageParams) -> Result<()> {
        if self.links.is_empty() {
            return Err(Error::invalid_config("chain has no stages"));
        }
        self.guard.configure()?;
        self.params = Some(params);
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        self.guard.check_open()?;
        self.open_link(0)?;
        self.guard.opened();
        debug!(parent: self.logger.span(), chain = %self.name, stages = self.links.len(), "opened");
        Ok(())
    }

    fn submit(&mut self, input: Option<&mut Buffer>) -> Result<SubmitStatus> {
        self.guard.check_submit()?;
        let Some(input) = input else {
            self.input_eos = true;
            self.guard.end_of_stream();
            return Ok(SubmitStatus::Accepted);
        };
        if !input.has_storage() {
            return Err(Error::invalid_state(
                "submitted buffer holds no data; pass None to signal end of stream",
            ));
        }
        let slot = &mut self.links[0].pending;
        if slot.is_some() {
            self.guard.busy();
            return Ok(SubmitStatus::Busy);
        }
        let mut unit = Buffer::new();
        unit.move_ref(input);
        *slot = Some(unit);
        Ok(SubmitStatus::Accepted)
    }

    fn retrieve(&mut self, output: &mut Buffer) -> Result<RetrieveStatus> {
        output.unreference();
        if !self.guard.check_retrieve()? {
            return Ok(RetrieveStatus::EndOfStream);
        }
        let last = self.links.len() - 1;
        let status = self.pull(last, output)?;
        if status == RetrieveStatus::EndOfStream {
            self.guard.drained();
            debug!(parent: self.logger.span(), chain = %self.name, "drained");
        }
        Ok(status)
    }

    fn flush(&mut self) -> Result<()> {
        self.guard.flush()?;
        for link in &mut self.links {
            link.pending = None;
            // drained stages stay closed and keep answering end of stream
            if link.stage.state() == StageState::Closed {
                continue;
            }
            link.eos_sent = false;
            link.skipped = false;
            if is_open(link.stage.state()) {
                link.stage.flush()?;
            }
        }
        self.input_eos = self
            .links
            .first()
            .is_some_and(|l| l.stage.state() == StageState::Closed);
        Ok(())
    }

    fn close(&mut self) {
        if self.guard.close() {
            for link in &mut self.links {
                link.pending = None;
                link.stage.close();
            }
            debug!(parent: self.logger.span(), chain = %self.name, "closed");
        }
    }

    fn output_params(&self) -> Option<&StreamParams> {
        self.links.last().and_then(|l| l.stage.output_params())
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<&str> = self.links.iter().map(|l| l.stage.name()).collect();
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field("stages", &stages)
            .field("state", &self.guard.state())
            .finish()
    }
}

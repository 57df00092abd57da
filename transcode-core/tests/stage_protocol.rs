//! Protocol scenarios: a well-behaved caller always makes progress and sees
//! every unit exactly once, in order.

use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use transcode_core::{
    Buffer, Chain, CodecId, Error, OpenContext, OptionSchema, Processor, Result, RetrieveStatus,
    Session, Stage, StageParams, StageState, StreamParams, SubmitStatus, TimeBase,
};

// =============================================================================
// Mock processor
// =============================================================================

/// Buffers up to `capacity` inputs and releases them in groups of `group`.
struct MockProcessor {
    capacity: usize,
    group: usize,
    held: VecDeque<Buffer>,
    ready: VecDeque<Buffer>,
    closes: Arc<AtomicUsize>,
}

impl MockProcessor {
    fn new(capacity: usize, group: usize) -> Self {
        Self {
            capacity,
            group,
            held: VecDeque::new(),
            ready: VecDeque::new(),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Processor for MockProcessor {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn option_schema(&self) -> OptionSchema {
        OptionSchema::new().int("capacity", 1, 1, 16, "held units")
    }

    fn open(&mut self, ctx: &OpenContext<'_>) -> Result<()> {
        if ctx.options.is_set("capacity") && self.capacity == 0 {
            self.capacity = ctx.options.usize("capacity")?;
        }
        Ok(())
    }

    fn has_capacity(&self) -> bool {
        self.held.len() + self.ready.len() < self.capacity
    }

    fn push(&mut self, input: Buffer) -> Result<()> {
        self.held.push_back(input);
        if self.held.len() >= self.group {
            self.ready.extend(self.held.drain(..));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.ready.extend(self.held.drain(..));
        Ok(())
    }

    fn pull(&mut self, output: &mut Buffer) -> Result<bool> {
        match self.ready.pop_front() {
            Some(mut unit) => {
                output.move_ref(&mut unit);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn output_params(&self) -> Option<StreamParams> {
        Some(StreamParams::compressed(CodecId::RawVideo, TimeBase::MPEG))
    }

    fn reset(&mut self) {
        self.held.clear();
        self.ready.clear();
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn params() -> StageParams {
    StageParams::new(StreamParams::compressed(CodecId::RawVideo, TimeBase::MPEG))
}

fn unit(seq: u64) -> Buffer {
    let mut buffer = Buffer::from_packet(seq.to_le_bytes().to_vec(), CodecId::RawVideo);
    buffer.sequence = seq;
    buffer.pts = seq as i64;
    buffer
}

/// The canonical caller loop. Returns produced sequence numbers.
fn drive(stage: &mut dyn Stage, count: u64) -> Vec<u64> {
    let mut out = Buffer::new();
    let mut seen = Vec::new();
    for seq in 0..count {
        let mut input = unit(seq);
        let mut attempts = 0;
        while stage.submit(Some(&mut input)).unwrap() == SubmitStatus::Busy {
            attempts += 1;
            assert!(attempts < 100, "no progress after Busy");
            while stage.retrieve(&mut out).unwrap() == RetrieveStatus::Produced {
                seen.push(out.sequence);
            }
        }
        while stage.retrieve(&mut out).unwrap() == RetrieveStatus::Produced {
            seen.push(out.sequence);
        }
    }
    stage.submit(None).unwrap();
    loop {
        match stage.retrieve(&mut out).unwrap() {
            RetrieveStatus::Produced => seen.push(out.sequence),
            RetrieveStatus::EndOfStream => break,
            RetrieveStatus::NeedsInput => panic!("NeedsInput while draining"),
        }
    }
    seen
}

// =============================================================================
// Liveness and ordering
// =============================================================================

proptest! {
    #[test]
    fn session_never_stalls(capacity in 1usize..6, group in 1usize..6, count in 0u64..40) {
        let group = group.min(capacity);
        let mut stage = Session::new(MockProcessor::new(capacity, group));
        stage.configure(params()).unwrap();
        stage.open().unwrap();
        let seen = drive(&mut stage, count);
        prop_assert_eq!(seen, (0..count).collect::<Vec<_>>());
        prop_assert_eq!(stage.state(), StageState::Closed);
    }

    #[test]
    fn chain_preserves_order(caps in prop::collection::vec((1usize..4, 1usize..4), 1..4),
                             count in 0u64..30) {
        let mut chain = Chain::new("chain");
        for (capacity, group) in caps {
            let stage = Session::new(MockProcessor::new(capacity, group.min(capacity)));
            chain.push(Box::new(stage), StageParams::default());
        }
        chain.configure(params()).unwrap();
        chain.open().unwrap();
        let seen = drive(&mut chain, count);
        prop_assert_eq!(seen, (0..count).collect::<Vec<_>>());
    }
}

// =============================================================================
// Misuse
// =============================================================================

#[test]
fn test_submit_before_open() {
    let mut stage = Session::new(MockProcessor::new(1, 1));
    assert!(matches!(
        stage.submit(Some(&mut unit(0))),
        Err(Error::InvalidState(_))
    ));
    stage.configure(params()).unwrap();
    assert!(matches!(
        stage.submit(Some(&mut unit(0))),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn test_submit_after_end_of_stream() {
    let mut stage = Session::new(MockProcessor::new(1, 1));
    stage.configure(params()).unwrap();
    stage.open().unwrap();
    stage.submit(None).unwrap();
    assert!(matches!(stage.submit(Some(&mut unit(0))), Err(Error::Closed)));
    assert!(matches!(stage.submit(None), Err(Error::Closed)));
}

#[test]
fn test_configure_after_open() {
    let mut stage = Session::new(MockProcessor::new(1, 1));
    stage.configure(params()).unwrap();
    stage.open().unwrap();
    assert!(matches!(stage.configure(params()), Err(Error::InvalidState(_))));
}

#[test]
fn test_close_runs_once() {
    let processor = MockProcessor::new(1, 1);
    let closes = Arc::clone(&processor.closes);
    let mut stage = Session::new(processor);
    stage.configure(params()).unwrap();
    stage.open().unwrap();
    stage.close();
    stage.close();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_chain_close_closes_stages() {
    let first = MockProcessor::new(1, 1);
    let second = MockProcessor::new(1, 1);
    let a = Arc::clone(&first.closes);
    let b = Arc::clone(&second.closes);
    let mut chain = Chain::new("c").with(Session::new(first)).with(Session::new(second));
    chain.configure(params()).unwrap();
    chain.open().unwrap();
    chain.close();
    chain.close();
    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(b.load(Ordering::SeqCst), 1);
}

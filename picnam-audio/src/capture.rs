use crate::frame_buffer::{BlockSink, SampleBlock};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Failure reported by a capture source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CaptureFault {
    pub message: String,
}

impl CaptureFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A live audio input that delivers mono blocks into a capture window.
///
/// Swapping implementations lets a session run against a real device, a
/// synthetic signal, or a scripted mock.
pub trait CaptureSource: Send {
    fn sample_rate(&self) -> u32;

    /// Starts delivering blocks into `sink` until [`CaptureSource::stop`].
    fn start(&mut self, sink: BlockSink) -> Result<(), CaptureFault>;

    fn stop(&mut self) -> Result<(), CaptureFault>;

    /// Reports a failure that happened since `start`, e.g. a device that
    /// disappeared mid-window. Polled while a window is open.
    fn check(&mut self) -> Result<(), CaptureFault> {
        Ok(())
    }
}

/// Counters shared between a [`MockCaptureSource`] and the test holding it.
#[derive(Debug, Clone, Default)]
pub struct MockStats {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl MockStats {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

/// Scripted capture source for tests and dry runs.
///
/// Every `start` pushes the configured blocks synchronously.
#[derive(Debug, Clone)]
pub struct MockCaptureSource {
    sample_rate: u32,
    blocks: Vec<SampleBlock>,
    fail_start_on: Option<usize>,
    fail_check_on: Option<usize>,
    late_block: Option<SampleBlock>,
    error_message: String,
    sink: Option<BlockSink>,
    stats: MockStats,
}

impl MockCaptureSource {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            blocks: vec![vec![0.0; 160]],
            fail_start_on: None,
            fail_check_on: None,
            late_block: None,
            error_message: "mock capture error".to_string(),
            sink: None,
            stats: MockStats::default(),
        }
    }

    /// Silent source delivering `blocks` blocks of `block_size` per window.
    pub fn silence(sample_rate: u32, block_size: usize, blocks: usize) -> Self {
        Self::new(sample_rate).with_blocks(vec![vec![0.0; block_size]; blocks])
    }

    pub fn with_blocks(mut self, blocks: Vec<SampleBlock>) -> Self {
        self.blocks = blocks;
        self
    }

    /// Fail the `n`th start (1-based).
    pub fn with_start_failure_on(mut self, n: usize) -> Self {
        self.fail_start_on = Some(n);
        self
    }

    /// Report a fault from `check` during the `n`th window (1-based).
    pub fn with_failure_during(mut self, n: usize) -> Self {
        self.fail_check_on = Some(n);
        self
    }

    /// Push one more block from `stop`, after the window has closed.
    pub fn with_late_block(mut self, block: SampleBlock) -> Self {
        self.late_block = Some(block);
        self
    }

    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    pub fn stats(&self) -> MockStats {
        self.stats.clone()
    }
}

impl CaptureSource for MockCaptureSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, sink: BlockSink) -> Result<(), CaptureFault> {
        let n = self.stats.starts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_start_on == Some(n) {
            return Err(CaptureFault::new(self.error_message.clone()));
        }
        for block in &self.blocks {
            sink.push(block.clone());
        }
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureFault> {
        self.stats.stops.fetch_add(1, Ordering::SeqCst);
        if let (Some(sink), Some(block)) = (self.sink.take(), &self.late_block) {
            sink.push(block.clone());
        }
        Ok(())
    }

    fn check(&mut self) -> Result<(), CaptureFault> {
        match self.fail_check_on {
            Some(n) if self.sink.is_some() && self.stats.starts() == n => {
                Err(CaptureFault::new(self.error_message.clone()))
            }
            _ => Ok(()),
        }
    }
}

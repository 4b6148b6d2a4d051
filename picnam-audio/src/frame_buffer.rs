//! Per-trial accumulation of captured sample blocks.
//!
//! A capture source never touches the buffer directly. Opening a window
//! creates a bounded queue; the source gets a [`BlockSink`] for the sending
//! end and the buffer keeps the receiving end. Closing the window drops the
//! receiver, so blocks pushed afterwards (late callbacks, or a sink held
//! over from an earlier trial) are discarded instead of leaking into the
//! next window.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use picnam_core::{Result, SessionError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Mono 32-bit float samples in [-1, 1].
pub type SampleBlock = Vec<f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// The window this sink belonged to has closed.
    Closed,
    /// The queue was full and the block was dropped.
    Overflow,
}

/// Producer handle for one capture window.
#[derive(Debug, Clone)]
pub struct BlockSink {
    tx: Sender<SampleBlock>,
    dropped: Arc<AtomicUsize>,
}

impl BlockSink {
    pub fn push(&self, samples: SampleBlock) -> PushOutcome {
        match self.tx.try_send(samples) {
            Ok(()) => PushOutcome::Accepted,
            Err(TrySendError::Disconnected(_)) => PushOutcome::Closed,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Overflow
            }
        }
    }
}

#[derive(Debug)]
struct CaptureWindow {
    rx: Receiver<SampleBlock>,
    blocks: Vec<SampleBlock>,
    dropped: Arc<AtomicUsize>,
}

impl CaptureWindow {
    fn drain(&mut self) -> usize {
        let before = self.blocks.len();
        self.blocks.extend(self.rx.try_iter());
        self.blocks.len() - before
    }
}

#[derive(Debug)]
pub struct AudioFrameBuffer {
    queue_capacity: usize,
    window: Option<CaptureWindow>,
}

impl AudioFrameBuffer {
    /// `queue_capacity` bounds how many blocks may wait between drains.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            window: None,
        }
    }

    /// Queue size that holds a whole window of `duration_ms` without any
    /// draining, plus slack for callback jitter.
    pub fn capacity_for(duration_ms: u64, sample_rate: u32, block_size: usize) -> usize {
        let samples = duration_ms * u64::from(sample_rate) / 1000;
        let blocks = samples.div_ceil(block_size.max(1) as u64) as usize;
        blocks * 2 + 8
    }

    pub fn is_active(&self) -> bool {
        self.window.is_some()
    }

    /// Opens an empty window. Only one window may be open at a time.
    pub fn start_window(&mut self) -> Result<BlockSink> {
        if self.window.is_some() {
            return Err(SessionError::WindowAlreadyActive);
        }
        let (tx, rx) = bounded(self.queue_capacity);
        let dropped = Arc::new(AtomicUsize::new(0));
        self.window = Some(CaptureWindow {
            rx,
            blocks: Vec::new(),
            dropped: Arc::clone(&dropped),
        });
        debug!(capacity = self.queue_capacity, "capture window opened");
        Ok(BlockSink { tx, dropped })
    }

    /// Appends a block to the open window; a no-op when no window is open.
    pub fn push_block(&mut self, samples: &[f32]) {
        if let Some(window) = &mut self.window {
            // keep arrival order with blocks still sitting in the queue
            window.drain();
            window.blocks.push(samples.to_vec());
        }
    }

    /// Moves queued blocks into the window. Returns how many were moved.
    pub fn drain(&mut self) -> usize {
        self.window.as_mut().map_or(0, CaptureWindow::drain)
    }

    /// Blocks rejected because the queue was full in the open window.
    pub fn dropped_blocks(&self) -> usize {
        self.window
            .as_ref()
            .map_or(0, |w| w.dropped.load(Ordering::Relaxed))
    }

    pub fn sample_count(&self) -> usize {
        self.window
            .as_ref()
            .map_or(0, |w| w.blocks.iter().map(Vec::len).sum())
    }

    /// Closes the window and hands back its blocks in arrival order.
    /// Returns nothing when no window was open.
    pub fn stop_window(&mut self) -> Vec<SampleBlock> {
        let Some(mut window) = self.window.take() else {
            return Vec::new();
        };
        window.drain();
        let dropped = window.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!(dropped, "capture window closed with dropped blocks");
        }
        debug!(blocks = window.blocks.len(), "capture window closed");
        window.blocks
    }
}

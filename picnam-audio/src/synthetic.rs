//! Real-time synthetic input: low-level noise delivered at the pace of a
//! real device, one block per block period, from a background thread.

use crate::capture::{CaptureFault, CaptureSource};
use crate::frame_buffer::{BlockSink, PushOutcome};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use rand::Rng;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

pub struct SyntheticSource {
    sample_rate: u32,
    block_size: usize,
    amplitude: f32,
    worker: Option<(Sender<()>, JoinHandle<()>)>,
}

impl SyntheticSource {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            amplitude: 0.01,
            worker: None,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    fn block_period(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.sample_rate.max(1)))
    }
}

impl CaptureSource for SyntheticSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, sink: BlockSink) -> Result<(), CaptureFault> {
        if self.worker.is_some() {
            return Err(CaptureFault::new("synthetic source already started"));
        }
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let period = self.block_period();
        let block_size = self.block_size;
        let amplitude = self.amplitude;

        let handle = std::thread::Builder::new()
            .name("synthetic-capture".into())
            .spawn(move || {
                let mut rng = rand::rng();
                loop {
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let block = (0..block_size)
                        .map(|_| rng.random_range(-amplitude..=amplitude))
                        .collect();
                    match sink.push(block) {
                        PushOutcome::Accepted => {}
                        PushOutcome::Closed => break,
                        PushOutcome::Overflow => warn!("synthetic block dropped, queue full"),
                    }
                }
                debug!("synthetic capture thread exiting");
            })
            .map_err(|e| CaptureFault::new(format!("failed to spawn capture thread: {e}")))?;

        self.worker = Some((stop_tx, handle));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureFault> {
        if let Some((stop_tx, handle)) = self.worker.take() {
            let _ = stop_tx.send(());
            handle
                .join()
                .map_err(|_| CaptureFault::new("capture thread panicked"))?;
        }
        Ok(())
    }

    fn check(&mut self) -> Result<(), CaptureFault> {
        match &self.worker {
            Some((_, handle)) if handle.is_finished() => {
                Err(CaptureFault::new("capture thread stopped unexpectedly"))
            }
            _ => Ok(()),
        }
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

use super::assets::{AssetLoader, preload_all};
use super::config::{CaptureMode, PartialCapturePolicy, SessionConfig};
use super::order::{OrderGenerator, TrialOrder};
use super::record::{Recording, SessionOutput, SessionRecordAssembler};
use super::trial::{Trial, TrialTimestamps};
use super::ui::UiSink;
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, select};
use picnam_audio::{AudioFrameBuffer, CaptureFault, CaptureSource, WavBlob, encode};
use picnam_core::{Result, SessionError, SessionState};
use picnam_timing::Timer;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Handle for the operator side of a session: the start signal and abort
/// requests. Clones drive the same session.
#[derive(Debug, Clone)]
pub struct SessionControl {
    start_tx: Sender<()>,
    abort_tx: Sender<String>,
}

impl SessionControl {
    pub fn begin(&self) {
        let _ = self.start_tx.try_send(());
    }

    /// Requests an abort. Honoured at the next poll of the running hold.
    pub fn abort(&self, reason: impl Into<String>) {
        let _ = self.abort_tx.try_send(reason.into());
    }
}

/// A session that stopped before completion, with whatever it had recorded.
#[derive(Debug, Error)]
#[error("session stopped after {} completed trials", .partial.results.len())]
pub struct SessionAbort {
    #[source]
    pub error: SessionError,
    pub partial: SessionOutput,
}

/// Source of captured audio for the response window. `Timed` holds the
/// same duration without capturing anything.
enum ResponseCapture {
    Timed,
    Audio {
        source: Box<dyn CaptureSource>,
        buffer: AudioFrameBuffer,
        on_failure: PartialCapturePolicy,
    },
}

impl ResponseCapture {
    fn open(&mut self, trial: usize) -> Result<()> {
        if let Self::Audio { source, buffer, .. } = self {
            let sink = buffer.start_window()?;
            if let Err(fault) = source.start(sink) {
                buffer.stop_window();
                return Err(SessionError::capture(trial, fault.message));
            }
        }
        Ok(())
    }

    /// Moves queued blocks into the window and checks the source is healthy.
    fn service(&mut self, trial: usize) -> Result<()> {
        if let Self::Audio { source, buffer, .. } = self {
            buffer.drain();
            let dropped = buffer.dropped_blocks();
            if dropped > 0 {
                return Err(SessionError::capture(
                    trial,
                    format!("capture queue overflowed, {dropped} blocks dropped"),
                ));
            }
            source
                .check()
                .map_err(|fault| SessionError::capture(trial, fault.message))?;
        }
        Ok(())
    }

    /// Closes the window of a completed trial and encodes it. On error the
    /// window stays open for [`ResponseCapture::force_close`].
    fn close(&mut self, trial: usize) -> Result<Option<WavBlob>> {
        self.service(trial)?;
        match self {
            Self::Timed => Ok(None),
            Self::Audio { source, buffer, .. } => {
                let blocks = buffer.stop_window();
                stop_source(source.as_mut());
                let blob = encode(blocks.as_slice(), source.sample_rate());
                debug!(trial, duration_ms = blob.duration_ms(), "capture window encoded");
                Ok(Some(blob))
            }
        }
    }

    /// Closes a window cut short by an error. Returns the partial audio
    /// when the policy keeps it.
    fn force_close(&mut self) -> Option<WavBlob> {
        let Self::Audio {
            source,
            buffer,
            on_failure,
        } = self
        else {
            return None;
        };
        if !buffer.is_active() {
            return None;
        }
        let blocks = buffer.stop_window();
        stop_source(source.as_mut());
        match on_failure {
            PartialCapturePolicy::Discard => {
                debug!(blocks = blocks.len(), "partial capture discarded");
                None
            }
            PartialCapturePolicy::Encode => Some(encode(blocks.as_slice(), source.sample_rate())),
        }
    }
}

fn stop_source(source: &mut dyn CaptureSource) {
    if let Err(fault) = source.stop() {
        warn!(error = %fault, "capture source failed to stop cleanly");
    }
}

#[derive(Debug, Clone, Copy)]
enum Mark {
    Onset,
    ResponseStart,
    ResponseEnd,
}

/// Drives one naming session from the start signal to the final rest.
///
/// Every interval is a timed hold on the session timer. Holds poll at the
/// configured interval so abort requests and capture faults are noticed
/// while waiting.
pub struct SessionStateMachine<T: Timer> {
    pub state: SessionState,
    pub timer: T,
    config: SessionConfig,
    participant_id: String,
    order: TrialOrder,
    capture: ResponseCapture,
    records: SessionRecordAssembler,
    current: Option<Trial>,
    trial_number: usize,
    start_rx: Receiver<()>,
    abort_rx: Receiver<String>,
}

impl<T: Timer> SessionStateMachine<T> {
    /// Validates the configuration, builds the trial order, preloads every
    /// image and acquires the capture source. Nothing is kept on failure.
    ///
    /// `acquire` receives the configured sample rate and block size and is
    /// only called when the session records audio.
    pub fn prepare<A>(
        config: SessionConfig,
        participant_id: &str,
        timer: T,
        assets: &mut dyn AssetLoader,
        ui: &mut dyn UiSink,
        acquire: A,
    ) -> Result<(Self, SessionControl)>
    where
        A: FnOnce(u32, usize) -> std::result::Result<Box<dyn CaptureSource>, CaptureFault>,
    {
        config.validate()?;
        let participant_id = participant_id.trim();
        let order = OrderGenerator::from_config(&config).build(participant_id, &config.lists)?;
        preload_all(assets, order.iter(), ui)?;

        let capture = match config.capture {
            CaptureMode::Disabled => ResponseCapture::Timed,
            CaptureMode::Enabled {
                sample_rate,
                block_size,
                on_failure,
            } => {
                let source = acquire(sample_rate, block_size)
                    .map_err(|fault| SessionError::resource("audio input", fault.message))?;
                ResponseCapture::Audio {
                    source,
                    buffer: AudioFrameBuffer::new(config.queue_capacity()),
                    on_failure,
                }
            }
        };

        info!(
            participant_id,
            variant = ?config.variant,
            trials = order.len(),
            seed = order.seed(),
            records_audio = config.records_audio(),
            "session prepared"
        );

        let (start_tx, start_rx) = bounded(1);
        let (abort_tx, abort_rx) = bounded(1);
        let machine = Self {
            state: SessionState::Idle,
            timer,
            records: SessionRecordAssembler::new(participant_id, config.iti_ms),
            participant_id: participant_id.to_string(),
            config,
            order,
            capture,
            current: None,
            trial_number: 0,
            start_rx,
            abort_rx,
        };
        Ok((machine, SessionControl { start_tx, abort_tx }))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn order(&self) -> &TrialOrder {
        &self.order
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// Trials started so far.
    pub fn trial_number(&self) -> usize {
        self.trial_number
    }

    /// Runs the session to completion. Errors after the start signal end the
    /// session; the returned [`SessionAbort`] carries every completed trial.
    pub fn run(mut self, ui: &mut dyn UiSink) -> std::result::Result<SessionOutput, SessionAbort> {
        let outcome = self.drive(ui);
        let pacing = self.timer.pacing_stats();
        debug!(?pacing, "pacing summary");

        match outcome {
            Ok(()) => {
                info!(
                    trials = self.records.len(),
                    avg_overshoot_ms = pacing.average_overshoot_ns / 1_000_000.0,
                    "session complete"
                );
                Ok(self.records.finish(pacing))
            }
            Err(error) => {
                let partial_audio = self.capture.force_close();
                if let (Some(blob), Some(trial)) = (partial_audio, &self.current) {
                    let file_name = self
                        .config
                        .partial_recording_file_name(&self.participant_id, &trial.stimulus.word);
                    info!(file = %file_name, "keeping partial recording");
                    self.records.record_partial(Recording {
                        file_name,
                        blob,
                        partial: true,
                    });
                }
                self.state = SessionState::Aborted;
                warn!(
                    error = %error,
                    completed = self.records.len(),
                    "session aborted"
                );
                ui.show_fixation();
                ui.show_message(&format!("Session stopped: {error}"));
                Err(SessionAbort {
                    error,
                    partial: self.records.finish(pacing),
                })
            }
        }
    }

    fn drive(&mut self, ui: &mut dyn UiSink) -> Result<()> {
        self.transition();
        ui.show_message("Ready. Waiting for the start signal.");
        self.await_start()?;

        self.transition();
        ui.show_fixation();
        ui.set_status("Rest");
        self.hold(self.config.rest())?;

        while self.transition() == SessionState::StimulusOnset {
            self.run_trial(ui)?;
        }

        ui.show_fixation();
        ui.set_status("Rest");
        self.hold(self.config.rest())?;
        self.transition();
        ui.show_message("Session complete. Thank you!");
        Ok(())
    }

    fn run_trial(&mut self, ui: &mut dyn UiSink) -> Result<()> {
        let index = self.trial_number;
        let Some(stimulus) = self.order.get(index).cloned() else {
            return Ok(());
        };
        let number = index + 1;
        let start = self.timer.now();
        let start_epoch_ms = self.timer.epoch_ms();
        ui.set_status(&format!("Trial {}/{}", number, self.order.len()));
        ui.show_stimulus(&stimulus);
        self.current = Some(Trial {
            index,
            stimulus,
            timestamps: TrialTimestamps::new(start, start_epoch_ms),
        });
        self.mark(Mark::Onset);
        self.trial_number += 1;

        self.transition();
        self.capture.open(number)?;
        self.mark(Mark::ResponseStart);
        self.hold(self.config.record_duration())?;
        self.mark(Mark::ResponseEnd);
        let blob = self.capture.close(number)?;

        self.transition();
        ui.show_fixation();
        if let Some(trial) = self.current.take() {
            let recording = blob.map(|blob| Recording {
                file_name: self
                    .config
                    .recording_file_name(&self.participant_id, &trial.stimulus.word),
                blob,
                partial: false,
            });
            let result = self.records.record_trial(&trial, recording);
            info!(
                trial = result.trial_index,
                word = %result.word,
                onset_ms = result.image_onset_ms,
                window_ms = result.response_window_ms(),
                recording = %result.recording_file,
                "trial complete"
            );
        }
        self.hold(self.config.iti())
    }

    fn await_start(&mut self) -> Result<()> {
        // an abort queued before the start signal wins
        self.check_abort()?;
        select! {
            recv(self.start_rx) -> msg => msg.map_err(|_| SessionError::Aborted {
                reason: "start signal channel closed".to_string(),
            }),
            recv(self.abort_rx) -> msg => Err(SessionError::Aborted {
                reason: msg.unwrap_or_else(|_| "session control dropped".to_string()),
            }),
        }
    }

    fn check_abort(&mut self) -> Result<()> {
        match self.abort_rx.try_recv() {
            Ok(reason) => Err(SessionError::Aborted { reason }),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(()),
        }
    }

    /// Holds the current state for `duration`, polling for aborts and
    /// servicing an open capture window.
    fn hold(&mut self, duration: Duration) -> Result<()> {
        let start = self.timer.now();
        let deadline = start + duration.as_nanos() as u64;
        let poll_ns = self.config.poll_interval().as_nanos() as u64;
        loop {
            self.check_abort()?;
            if self.state.allows_capture() {
                self.capture.service(self.trial_number)?;
            }
            let now = self.timer.now();
            if now >= deadline {
                break;
            }
            self.timer.sleep_until(deadline.min(now + poll_ns));
        }
        let actual = self.timer.elapsed(start);
        self.timer.record_hold(duration, actual);
        debug!(
            state = ?self.state,
            requested_ms = duration.as_millis() as u64,
            overshoot_us = (actual.as_nanos() as i64 - duration.as_nanos() as i64) / 1000,
            "hold finished"
        );
        Ok(())
    }

    fn mark(&mut self, mark: Mark) {
        let now = self.timer.now();
        if let Some(trial) = &mut self.current {
            let ts = &mut trial.timestamps;
            match mark {
                Mark::Onset => ts.stimulus_onset = Some(now),
                Mark::ResponseStart => ts.response_start = Some(now),
                Mark::ResponseEnd => ts.response_end = Some(now),
            }
        }
    }

    fn transition(&mut self) -> SessionState {
        let remaining = self.trial_number < self.order.len();
        if let Some(next) = self.state.next(remaining) {
            info!(from = ?self.state, to = ?next, trial = self.trial_number, "state transition");
            self.state = next;
        }
        self.state
    }
}

use picnam_audio::{CaptureFault, CaptureSource, MockCaptureSource};
use picnam_core::{SessionError, SessionState, StimulusItem, StimulusList, TargetWord};
use picnam_experiment::{
    AcceptAllAssets, CaptureMode, EventLog, PartialCapturePolicy, SessionConfig, SessionControl,
    SessionOutput, SessionStateMachine, UiSink,
};
use picnam_timing::SimulatedTimer;
use std::io::Cursor;
use std::time::Duration;

fn two_trials(capture: CaptureMode) -> SessionConfig {
    SessionConfig {
        capture,
        lists: vec![
            StimulusList::new("a", vec![TargetWord::new(1, 1, "oso")]),
            StimulusList::new("b", vec![TargetWord::new(2, 2, "pato")]),
        ],
        ..SessionConfig::production()
    }
}

fn enabled(on_failure: PartialCapturePolicy) -> CaptureMode {
    CaptureMode::Enabled {
        sample_rate: 44_100,
        block_size: 4096,
        on_failure,
    }
}

fn start(
    config: SessionConfig,
    timer: &SimulatedTimer,
    ui: &mut dyn UiSink,
    source: MockCaptureSource,
) -> (SessionStateMachine<SimulatedTimer>, SessionControl) {
    SessionStateMachine::prepare(
        config,
        "S001",
        timer.clone(),
        &mut AcceptAllAssets,
        ui,
        move |_, _| Ok(Box::new(source) as Box<dyn CaptureSource>),
    )
    .unwrap()
}

fn run(config: SessionConfig, source: MockCaptureSource) -> (SimulatedTimer, Result<SessionOutput, picnam_experiment::SessionAbort>) {
    let timer = SimulatedTimer::new();
    let mut ui = EventLog::default();
    let (machine, control) = start(config, &timer, &mut ui, source);
    control.begin();
    let outcome = machine.run(&mut ui);
    (timer, outcome)
}

#[test]
fn two_trial_session_meets_pacing_lower_bound() {
    let (timer, outcome) = run(
        two_trials(enabled(PartialCapturePolicy::Discard)),
        MockCaptureSource::silence(44_100, 4096, 3),
    );
    let output = outcome.unwrap();

    let lower_bound = Duration::from_millis(2 * 5000 + 2 * 6000 + 2 * 1500);
    assert!(timer.total_elapsed() >= lower_bound);
    assert_eq!(output.results.len(), 2);
    assert!(output.results[0].trial_start_epoch_ms <= output.results[1].trial_start_epoch_ms);

    let first = &output.results[0];
    assert_eq!(first.word, "oso");
    assert_eq!(first.recording_file, "S001_oso.wav");
    assert_eq!(first.response_window_ms(), 6000.0);
    assert!(first.image_onset_ms <= first.recording_start_ms);
    assert!(first.recording_start_epoch_ms <= first.recording_end_epoch_ms);
    // initial rest precedes the first trial
    assert_eq!(first.trial_start_epoch_ms, 1_700_000_005_000);
    assert_eq!(output.results[1].trial_start_epoch_ms, 1_700_000_012_500);
}

#[test]
fn recordings_decode_as_mono_pcm16() {
    let (_, outcome) = run(
        two_trials(enabled(PartialCapturePolicy::Discard)),
        MockCaptureSource::new(44_100).with_blocks(vec![vec![0.5; 100], vec![-0.5; 100]]),
    );
    let output = outcome.unwrap();
    let (name, blob) = output.artifacts().nth(1).unwrap();
    assert_eq!(name, "S001_pato.wav");

    let reader = hound::WavReader::new(Cursor::new(blob.as_bytes().to_vec())).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 44_100);
    assert_eq!(spec.bits_per_sample, 16);
    let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), 200);
    assert_eq!(samples[0], 16383);
    assert_eq!(samples[199], -16384);
}

#[test]
fn disabled_capture_keeps_pacing_without_audio() {
    let enabled_timer = {
        let (timer, outcome) = run(
            two_trials(enabled(PartialCapturePolicy::Discard)),
            MockCaptureSource::silence(44_100, 4096, 2),
        );
        outcome.unwrap();
        timer
    };
    let (timer, outcome) = run(
        two_trials(CaptureMode::Disabled),
        MockCaptureSource::silence(44_100, 4096, 2),
    );
    let output = outcome.unwrap();

    assert_eq!(timer.total_elapsed(), enabled_timer.total_elapsed());
    assert_eq!(output.results.len(), 2);
    assert!(output.recordings.is_empty());
    for result in &output.results {
        assert!(result.recording_file.is_empty());
        assert_eq!(result.response_window_ms(), 6000.0);
    }
}

#[test]
fn capture_failure_discards_partial_audio() {
    let source = MockCaptureSource::silence(44_100, 4096, 3)
        .with_failure_during(2)
        .with_error_message("device unplugged");
    let stats = source.stats();
    let (timer, outcome) = run(two_trials(enabled(PartialCapturePolicy::Discard)), source);
    let abort = outcome.unwrap_err();

    assert!(matches!(abort.error, SessionError::Capture { trial: 2, .. }));
    assert!(abort.error.to_string().contains("device unplugged"));
    assert_eq!(abort.partial.results.len(), 1);
    assert_eq!(abort.partial.recordings.len(), 1);
    assert!(!abort.partial.recordings[0].partial);
    assert_eq!(timer.total_elapsed(), Duration::from_millis(12_500));
    assert_eq!(stats.stops(), 2);
}

#[test]
fn capture_failure_can_keep_partial_audio() {
    let source = MockCaptureSource::silence(44_100, 4096, 3).with_failure_during(2);
    let (_, outcome) = run(two_trials(enabled(PartialCapturePolicy::Encode)), source);
    let abort = outcome.unwrap_err();

    assert_eq!(abort.partial.results.len(), 1);
    let names: Vec<&str> = abort.partial.artifacts().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["S001_oso.wav", "S001_pato_partial.wav"]);
    let partial = &abort.partial.recordings[1];
    assert!(partial.partial);
    assert_eq!(partial.blob.sample_count(), 3 * 4096);
}

#[test]
fn source_start_failure_ends_session() {
    let source = MockCaptureSource::silence(44_100, 4096, 1).with_start_failure_on(1);
    let (_, outcome) = run(two_trials(enabled(PartialCapturePolicy::Encode)), source);
    let abort = outcome.unwrap_err();
    assert!(matches!(abort.error, SessionError::Capture { trial: 1, .. }));
    assert!(abort.partial.results.is_empty());
    assert!(abort.partial.recordings.is_empty());
}

#[test]
fn queue_overflow_is_a_capture_error() {
    let source = MockCaptureSource::silence(44_100, 4096, 500);
    let (_, outcome) = run(two_trials(enabled(PartialCapturePolicy::Discard)), source);
    let abort = outcome.unwrap_err();
    assert!(matches!(abort.error, SessionError::Capture { trial: 1, .. }));
    assert!(abort.error.to_string().contains("overflowed"));
}

#[test]
fn late_blocks_never_reach_a_recording() {
    let source = MockCaptureSource::silence(44_100, 4096, 2).with_late_block(vec![1.0; 4096]);
    let (_, outcome) = run(two_trials(enabled(PartialCapturePolicy::Discard)), source);
    let output = outcome.unwrap();
    for (_, blob) in output.artifacts() {
        assert_eq!(blob.sample_count(), 2 * 4096);
        assert!(blob.as_bytes()[44..].iter().all(|&b| b == 0));
    }
}

/// Sink that requests an abort when a given word appears.
struct AbortOnStimulus {
    log: EventLog,
    word_id: u32,
    control: Option<SessionControl>,
}

impl UiSink for AbortOnStimulus {
    fn show_fixation(&mut self) {
        self.log.show_fixation();
    }

    fn show_stimulus(&mut self, item: &StimulusItem) {
        self.log.show_stimulus(item);
        if item.word_id == self.word_id {
            if let Some(control) = &self.control {
                control.abort("operator pressed q");
            }
        }
    }

    fn show_message(&mut self, text: &str) {
        self.log.show_message(text);
    }

    fn set_status(&mut self, text: &str) {
        self.log.set_status(text);
    }
}

#[test]
fn abort_mid_trial_keeps_completed_trials() {
    let timer = SimulatedTimer::new();
    let mut ui = AbortOnStimulus {
        log: EventLog::default(),
        word_id: 2,
        control: None,
    };
    let (machine, control) = start(
        two_trials(enabled(PartialCapturePolicy::Discard)),
        &timer,
        &mut ui,
        MockCaptureSource::silence(44_100, 4096, 2),
    );
    ui.control = Some(control.clone());
    control.begin();
    let abort = machine.run(&mut ui).unwrap_err();

    assert!(
        matches!(abort.error, SessionError::Aborted { ref reason } if reason == "operator pressed q")
    );
    assert_eq!(abort.partial.results.len(), 1);
    assert_eq!(abort.partial.recordings.len(), 1);
    assert_eq!(timer.total_elapsed(), Duration::from_millis(12_500));
    assert!(ui.log.last_message().unwrap().starts_with("Session stopped"));
}

#[test]
fn abort_before_start_runs_nothing() {
    let timer = SimulatedTimer::new();
    let mut ui = EventLog::default();
    let (machine, control) = start(
        two_trials(CaptureMode::Disabled),
        &timer,
        &mut ui,
        MockCaptureSource::new(44_100),
    );
    control.abort("participant left");
    control.begin();
    let abort = machine.run(&mut ui).unwrap_err();
    assert!(matches!(abort.error, SessionError::Aborted { .. }));
    assert!(abort.partial.results.is_empty());
    assert_eq!(timer.total_elapsed(), Duration::ZERO);
    assert!(ui.stimuli().is_empty());
}

#[test]
fn dropped_control_aborts_the_wait_for_start() {
    let timer = SimulatedTimer::new();
    let mut ui = EventLog::default();
    let (machine, control) = start(
        two_trials(CaptureMode::Disabled),
        &timer,
        &mut ui,
        MockCaptureSource::new(44_100),
    );
    drop(control);
    let abort = machine.run(&mut ui).unwrap_err();
    assert!(matches!(abort.error, SessionError::Aborted { .. }));
}

#[test]
fn full_production_session_for_s001() {
    let timer = SimulatedTimer::new();
    let mut ui = EventLog::default();
    let (machine, control) = start(
        SessionConfig::production(),
        &timer,
        &mut ui,
        MockCaptureSource::silence(44_100, 4096, 1),
    );
    assert_eq!(machine.state, SessionState::Idle);
    control.begin();
    let output = machine.run(&mut ui).unwrap();

    let ids: Vec<u32> = output.results.iter().map(|r| r.word_id).collect();
    assert_eq!(
        ids,
        vec![8, 17, 9, 24, 5, 13, 6, 22, 12, 15, 7, 16, 10, 20, 2, 19, 4, 18, 1, 21, 3, 23, 11, 14]
    );
    assert_eq!(ui.stimuli(), ids);
    assert!(
        output
            .results
            .windows(2)
            .all(|w| w[0].trial_start_epoch_ms <= w[1].trial_start_epoch_ms)
    );
    assert_eq!(output.results[4].recording_file, "S001_sandía.wav");
    assert_eq!(output.results[4].image_file, "sandia.jpg");
    assert_eq!(output.recordings.len(), 24);
    assert_eq!(timer.total_elapsed(), Duration::from_millis(5000 + 24 * 7500 + 5000));
}

#[test]
fn practice_session_records_nothing() {
    let timer = SimulatedTimer::new();
    let mut ui = EventLog::default();
    let (machine, control) = SessionStateMachine::prepare(
        SessionConfig::practice(),
        "S001",
        timer.clone(),
        &mut AcceptAllAssets,
        &mut ui,
        |_, _| Err(CaptureFault::new("practice does not record")),
    )
    .unwrap();
    control.begin();
    let output = machine.run(&mut ui).unwrap();
    assert_eq!(output.results.len(), 4);
    assert_eq!(output.artifacts().count(), 0);
    assert_eq!(ui.stimuli(), vec![101, 102, 103, 104]);
}

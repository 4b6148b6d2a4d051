use super::trial::Trial;
use picnam_audio::WavBlob;
use picnam_core::TrialResult;
use picnam_timing::PacingStats;

/// An encoded capture window and the file name it is exported under.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub file_name: String,
    pub blob: WavBlob,
    /// Cut short by an abort or a capture failure.
    pub partial: bool,
}

/// Everything a session hands to the exporter.
#[derive(Debug, Clone, Default)]
pub struct SessionOutput {
    pub participant_id: String,
    pub results: Vec<TrialResult>,
    pub recordings: Vec<Recording>,
    pub pacing: PacingStats,
}

impl SessionOutput {
    /// (file name, WAV) pairs in trial order.
    pub fn artifacts(&self) -> impl Iterator<Item = (&str, &WavBlob)> {
        self.recordings
            .iter()
            .map(|r| (r.file_name.as_str(), &r.blob))
    }

    pub fn completed_trials(&self) -> usize {
        self.results.len()
    }
}

/// Turns completed trials into flat records, in trial order.
#[derive(Debug)]
pub struct SessionRecordAssembler {
    participant_id: String,
    iti_ms: u64,
    results: Vec<TrialResult>,
    recordings: Vec<Recording>,
}

impl SessionRecordAssembler {
    pub fn new(participant_id: impl Into<String>, iti_ms: u64) -> Self {
        Self {
            participant_id: participant_id.into(),
            iti_ms,
            results: Vec::new(),
            recordings: Vec::new(),
        }
    }

    pub fn record_trial(&mut self, trial: &Trial, recording: Option<Recording>) -> &TrialResult {
        let ts = &trial.timestamps;
        let recording_file = recording
            .as_ref()
            .map(|r| r.file_name.clone())
            .unwrap_or_default();

        self.results.push(TrialResult {
            trial_index: trial.index + 1,
            word: trial.stimulus.word.clone(),
            word_id: trial.stimulus.word_id,
            list_tag: trial.stimulus.list_tag,
            image_file: trial.stimulus.image_file.clone(),
            trial_start_epoch_ms: ts.start_epoch_ms,
            image_onset_ms: ts.relative_ms(ts.stimulus_onset),
            image_onset_epoch_ms: ts.epoch_ms(ts.stimulus_onset),
            recording_start_ms: ts.relative_ms(ts.response_start),
            recording_end_ms: ts.relative_ms(ts.response_end),
            recording_start_epoch_ms: ts.epoch_ms(ts.response_start),
            recording_end_epoch_ms: ts.epoch_ms(ts.response_end),
            iti_ms: self.iti_ms,
            participant_id: self.participant_id.clone(),
            recording_file,
        });
        self.recordings.extend(recording);

        &self.results[self.results.len() - 1]
    }

    /// Keeps the audio of a trial that did not complete. No result row is
    /// written for it.
    pub fn record_partial(&mut self, recording: Recording) {
        self.recordings.push(recording);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn finish(self, pacing: PacingStats) -> SessionOutput {
        SessionOutput {
            participant_id: self.participant_id,
            results: self.results,
            recordings: self.recordings,
            pacing,
        }
    }
}

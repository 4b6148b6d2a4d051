use serde::{Deserialize, Serialize};

/// Flat per-trial record handed to the exporter.
///
/// Field order is the column order of the exported table and must stay
/// stable. Fields ending in `_ms` without `epoch` are milliseconds on the
/// monotonic clock relative to trial start; `*_epoch_ms` are wall-clock
/// milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// 1-based position in the trial order.
    #[serde(rename = "trial")]
    pub trial_index: usize,
    pub word: String,
    pub word_id: u32,
    #[serde(rename = "list")]
    pub list_tag: u32,
    pub image_file: String,
    pub trial_start_epoch_ms: i64,
    pub image_onset_ms: f64,
    pub image_onset_epoch_ms: f64,
    pub recording_start_ms: f64,
    pub recording_end_ms: f64,
    pub recording_start_epoch_ms: f64,
    pub recording_end_epoch_ms: f64,
    pub iti_ms: u64,
    pub participant_id: String,
    /// Empty when the session variant does not record.
    pub recording_file: String,
}

impl TrialResult {
    pub const COLUMNS: [&'static str; 15] = [
        "trial",
        "word",
        "word_id",
        "list",
        "image_file",
        "trial_start_epoch_ms",
        "image_onset_ms",
        "image_onset_epoch_ms",
        "recording_start_ms",
        "recording_end_ms",
        "recording_start_epoch_ms",
        "recording_end_epoch_ms",
        "iti_ms",
        "participant_id",
        "recording_file",
    ];

    pub fn response_window_ms(&self) -> f64 {
        self.recording_end_ms - self.recording_start_ms
    }
}

//! Writes a finished (or aborted) session to disk: a results table as CSV
//! and JSON, plus one WAV file per recording.

use anyhow::{Context, Result};
use picnam_core::TrialResult;
use picnam_experiment::{SessionConfig, SessionOutput};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

fn csv_row(r: &TrialResult) -> String {
    [
        r.trial_index.to_string(),
        csv_field(&r.word).into_owned(),
        r.word_id.to_string(),
        r.list_tag.to_string(),
        csv_field(&r.image_file).into_owned(),
        r.trial_start_epoch_ms.to_string(),
        format!("{:.3}", r.image_onset_ms),
        format!("{:.3}", r.image_onset_epoch_ms),
        format!("{:.3}", r.recording_start_ms),
        format!("{:.3}", r.recording_end_ms),
        format!("{:.3}", r.recording_start_epoch_ms),
        format!("{:.3}", r.recording_end_epoch_ms),
        r.iti_ms.to_string(),
        csv_field(&r.participant_id).into_owned(),
        csv_field(&r.recording_file).into_owned(),
    ]
    .join(",")
}

pub fn results_csv(results: &[TrialResult]) -> String {
    let mut out = TrialResult::COLUMNS.join(",");
    out.push('\n');
    for result in results {
        out.push_str(&csv_row(result));
        out.push('\n');
    }
    out
}

/// Writes everything under `<out>/<archive name>/` and returns that directory.
pub fn write_session(out: &Path, config: &SessionConfig, output: &SessionOutput) -> Result<PathBuf> {
    let dir = out.join(config.archive_name(&output.participant_id));
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let stem = config.results_file_stem(&output.participant_id);
    let csv_path = dir.join(format!("{stem}.csv"));
    fs::write(&csv_path, results_csv(&output.results))
        .with_context(|| format!("writing {}", csv_path.display()))?;

    let json_path = dir.join(format!("{stem}.json"));
    let json = serde_json::to_string_pretty(&output.results)?;
    fs::write(&json_path, json).with_context(|| format!("writing {}", json_path.display()))?;

    for (name, blob) in output.artifacts() {
        let path = dir.join(name);
        blob.write_to(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        debug!(file = %path.display(), bytes = blob.len(), "recording written");
    }

    info!(
        dir = %dir.display(),
        trials = output.results.len(),
        recordings = output.recordings.len(),
        "session exported"
    );
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use picnam_audio::encode;
    use picnam_experiment::Recording;

    fn result(trial: usize, word: &str, file: &str) -> TrialResult {
        TrialResult {
            trial_index: trial,
            word: word.into(),
            word_id: trial as u32,
            list_tag: 1,
            image_file: format!("{word}.jpg"),
            trial_start_epoch_ms: 1_700_000_005_000,
            image_onset_ms: 0.02,
            image_onset_epoch_ms: 1_700_000_005_000.02,
            recording_start_ms: 0.5,
            recording_end_ms: 6000.5,
            recording_start_epoch_ms: 1_700_000_005_000.5,
            recording_end_epoch_ms: 1_700_000_011_000.5,
            iti_ms: 1500,
            participant_id: "S001".into(),
            recording_file: file.into(),
        }
    }

    fn output() -> SessionOutput {
        SessionOutput {
            participant_id: "S001".into(),
            results: vec![result(1, "oso", "S001_oso.wav"), result(2, "pato", "S001_pato.wav")],
            recordings: vec![
                Recording {
                    file_name: "S001_oso.wav".into(),
                    blob: encode(&[vec![0.25f32; 8]], 44_100),
                    partial: false,
                },
                Recording {
                    file_name: "S001_pato.wav".into(),
                    blob: encode(&[vec![0.0f32; 4]], 44_100),
                    partial: false,
                },
            ],
            pacing: Default::default(),
        }
    }

    #[test]
    fn csv_has_header_and_fixed_precision() {
        let csv = results_csv(&output().results);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("trial,word,word_id,list,image_file,"));
        assert!(lines[0].ends_with(",iti_ms,participant_id,recording_file"));
        assert_eq!(
            lines[1],
            "1,oso,1,1,oso.jpg,1700000005000,0.020,1700000005000.020,0.500,6000.500,\
             1700000005000.500,1700000011000.500,1500,S001,S001_oso.wav"
        );
    }

    #[test]
    fn csv_quotes_fields_with_separators() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn writes_tables_and_recordings() {
        let out = tempfile::tempdir().unwrap();
        let config = SessionConfig::production();
        let dir = write_session(out.path(), &config, &output()).unwrap();

        assert_eq!(dir, out.path().join("production_S001"));
        assert!(dir.join("results_S001.csv").is_file());
        let wav = fs::read(dir.join("S001_oso.wav")).unwrap();
        assert_eq!(wav.len(), 44 + 16);
        assert_eq!(&wav[..4], b"RIFF");

        let json = fs::read_to_string(dir.join("results_S001.json")).unwrap();
        let parsed: Vec<TrialResult> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].word, "pato");
        assert_eq!(parsed[1].recording_file, "S001_pato.wav");
        assert!(json.contains("\"trial\": 2"));
    }

    #[test]
    fn empty_session_still_writes_header() {
        let out = tempfile::tempdir().unwrap();
        let config = SessionConfig::practice();
        let empty = SessionOutput {
            participant_id: "P9".into(),
            ..Default::default()
        };
        let dir = write_session(out.path(), &config, &empty).unwrap();
        let csv = fs::read_to_string(dir.join("results_P9.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert!(dir.ends_with("practice_P9"));
    }
}

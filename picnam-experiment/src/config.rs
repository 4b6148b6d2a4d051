use picnam_audio::AudioFrameBuffer;
use picnam_core::{Result, SessionError, StimulusList, TargetWord};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionVariant {
    Practice,
    Production,
}

/// How the first list of an interleaved order is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Odd numeric ids start with the first list, even ids with the second.
    Parity,
    /// One extra generator draw after shuffling picks the starting list.
    RandomDraw,
}

/// What happens to a capture window cut short by an abort or a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialCapturePolicy {
    Discard,
    Encode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CaptureMode {
    /// The response window is a plain timed hold.
    Disabled,
    Enabled {
        sample_rate: u32,
        block_size: usize,
        on_failure: PartialCapturePolicy,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub variant: SessionVariant,
    pub record_duration_ms: u64,
    pub iti_ms: u64,
    pub rest_ms: u64,
    /// Added to `numeric_id * 1000` to seed the order generator.
    pub seed_offset: u32,
    pub start_policy: StartPolicy,
    pub image_ext: String,
    pub capture: CaptureMode,
    /// Granularity of timed holds; abort requests and capture faults are
    /// noticed within one interval.
    pub poll_interval_ms: u64,
    pub archive_prefix: String,
    pub lists: Vec<StimulusList>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl SessionConfig {
    pub fn production() -> Self {
        Self {
            variant: SessionVariant::Production,
            record_duration_ms: 6000,
            iti_ms: 1500,
            rest_ms: 5000,
            seed_offset: 7,
            start_policy: StartPolicy::Parity,
            image_ext: ".jpg".to_string(),
            capture: CaptureMode::Enabled {
                sample_rate: 44_100,
                block_size: 4096,
                on_failure: PartialCapturePolicy::Discard,
            },
            poll_interval_ms: 10,
            archive_prefix: "production".to_string(),
            lists: production_lists(),
        }
    }

    pub fn practice() -> Self {
        Self {
            variant: SessionVariant::Practice,
            seed_offset: 11,
            start_policy: StartPolicy::RandomDraw,
            capture: CaptureMode::Disabled,
            archive_prefix: "practice".to_string(),
            lists: practice_lists(),
            ..Self::production()
        }
    }

    pub fn for_variant(variant: SessionVariant) -> Self {
        match variant {
            SessionVariant::Practice => Self::practice(),
            SessionVariant::Production => Self::production(),
        }
    }

    /// Loads a TOML file. Missing fields fall back to the production preset.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SessionError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| SessionError::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SessionError::config(format!("failed to serialize config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(SessionError::config("poll_interval_ms must be positive"));
        }
        if let CaptureMode::Enabled {
            sample_rate,
            block_size,
            ..
        } = self.capture
        {
            if sample_rate == 0 {
                return Err(SessionError::config("sample_rate must be positive"));
            }
            if block_size == 0 {
                return Err(SessionError::config("block_size must be positive"));
            }
        }
        if self.lists.is_empty() {
            return Err(SessionError::config("at least one stimulus list is required"));
        }
        Ok(())
    }

    pub fn records_audio(&self) -> bool {
        matches!(self.capture, CaptureMode::Enabled { .. })
    }

    pub fn record_duration(&self) -> Duration {
        Duration::from_millis(self.record_duration_ms)
    }

    pub fn iti(&self) -> Duration {
        Duration::from_millis(self.iti_ms)
    }

    pub fn rest(&self) -> Duration {
        Duration::from_millis(self.rest_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Queue size for one capture window; zero when capture is disabled.
    pub fn queue_capacity(&self) -> usize {
        match self.capture {
            CaptureMode::Disabled => 0,
            CaptureMode::Enabled {
                sample_rate,
                block_size,
                ..
            } => AudioFrameBuffer::capacity_for(self.record_duration_ms, sample_rate, block_size),
        }
    }

    pub fn recording_file_name(&self, participant_id: &str, word: &str) -> String {
        format!("{}_{}.wav", participant_id, word)
    }

    pub fn partial_recording_file_name(&self, participant_id: &str, word: &str) -> String {
        format!("{}_{}_partial.wav", participant_id, word)
    }

    pub fn results_file_stem(&self, participant_id: &str) -> String {
        format!("results_{}", participant_id)
    }

    pub fn archive_name(&self, participant_id: &str) -> String {
        format!("{}_{}", self.archive_prefix, participant_id)
    }
}

fn list(name: &str, tag: u32, first_id: u32, words: &[&str]) -> StimulusList {
    let items = words
        .iter()
        .zip(first_id..)
        .map(|(word, id)| TargetWord::new(id, tag, *word))
        .collect();
    StimulusList::new(name, items)
}

pub fn production_lists() -> Vec<StimulusList> {
    vec![
        list(
            "list1",
            1,
            1,
            &[
                "manzana", "oso", "reloj", "tijeras", "sandía", "pato", "grapadora", "cinta",
                "fresas", "tiza", "caballo", "elote",
            ],
        ),
        list(
            "list2",
            2,
            13,
            &[
                "hongos", "cebolla", "cuaderno", "ardilla", "loro", "lechuga", "lápiz", "conejo",
                "gato", "naranja", "basurero", "pez",
            ],
        ),
    ]
}

pub fn practice_lists() -> Vec<StimulusList> {
    vec![list("practice", 0, 101, &["perro", "casa", "sol", "árbol"])]
}

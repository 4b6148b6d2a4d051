use clap::{Parser, Subcommand, ValueEnum};
use picnam_experiment::SessionVariant;
use std::path::PathBuf;

/// Picture naming task with per-trial voice recordings
#[derive(Parser, Debug)]
#[command(name = "picture-naming", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML session configuration; overrides the variant preset
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Preset to use when no configuration file is given
    #[arg(long, global = true, value_enum, default_value_t = Variant::Production)]
    pub variant: Variant,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a session
    Run {
        /// Participant identifier, e.g. S001
        #[arg(long, short)]
        participant: String,

        /// Directory holding the stimulus images
        #[arg(long, value_name = "DIR")]
        assets: Option<PathBuf>,

        /// Where the session directory is written
        #[arg(long, value_name = "DIR", default_value = ".")]
        out: PathBuf,

        /// Input device name; the default input device when omitted
        #[arg(long, value_name = "NAME")]
        device: Option<String>,

        /// Record generated noise instead of the microphone, in real time
        #[arg(long, conflicts_with = "device")]
        synthetic: bool,

        /// Dry run on a simulated clock with silent capture; starts immediately
        #[arg(long, conflicts_with_all = ["device", "synthetic"])]
        simulate: bool,
    },
    /// List audio input devices
    Devices,
    /// Print the trial order for a participant
    Order {
        #[arg(long, short)]
        participant: String,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    Practice,
    Production,
}

impl From<Variant> for SessionVariant {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::Practice => SessionVariant::Practice,
            Variant::Production => SessionVariant::Production,
        }
    }
}

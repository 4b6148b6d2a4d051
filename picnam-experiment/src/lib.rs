pub mod assets;
pub mod config;
pub mod guard;
pub mod order;
pub mod record;
pub mod rng;
pub mod state;
pub mod trial;
pub mod ui;

pub use assets::{AcceptAllAssets, AssetLoader, DirectoryAssets, preload_all};
pub use config::{CaptureMode, PartialCapturePolicy, SessionConfig, SessionVariant, StartPolicy};
pub use guard::SessionGuard;
pub use order::{OrderGenerator, TrialOrder};
pub use record::{Recording, SessionOutput, SessionRecordAssembler};
pub use rng::Mulberry32;
pub use state::{SessionAbort, SessionControl, SessionStateMachine};
pub use trial::{Trial, TrialTimestamps};
pub use ui::{EventLog, UiEvent, UiSink};

pub mod error;
pub mod phase;
pub mod stimulus;
pub mod trial;

pub use error::{Result, SessionError};
pub use phase::SessionState;
pub use stimulus::{StimulusItem, StimulusList, TargetWord, image_file_name, strip_diacritics};
pub use trial::TrialResult;

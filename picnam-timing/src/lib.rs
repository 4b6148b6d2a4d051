pub mod timer;

pub use timer::{HighPrecisionTimer, PacingStats, SimulatedTimer, Timer};

pub mod capture;
#[cfg(feature = "cpal-audio")]
pub mod device;
pub mod frame_buffer;
pub mod synthetic;
pub mod wav;

pub use capture::{CaptureFault, CaptureSource, MockCaptureSource, MockStats};
#[cfg(feature = "cpal-audio")]
pub use device::{CpalCaptureSource, list_input_devices};
pub use frame_buffer::{AudioFrameBuffer, BlockSink, PushOutcome, SampleBlock};
pub use synthetic::SyntheticSource;
pub use wav::{WavBlob, encode, sample_to_i16};

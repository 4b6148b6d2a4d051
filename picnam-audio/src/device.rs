//! Microphone capture through cpal.
//!
//! The input stream runs at the device's native rate and channel count for
//! the whole session. Each callback is mixed down to mono, resampled to the
//! session rate and cut into fixed-size blocks, which go to the sink of the
//! open capture window. Between windows the callback has no sink and the
//! audio is dropped.

use crate::capture::{CaptureFault, CaptureSource};
use crate::frame_buffer::{BlockSink, PushOutcome, SampleBlock};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Names of the input devices the default host reports.
pub fn list_input_devices() -> Result<Vec<String>, CaptureFault> {
    let devices = cpal::default_host()
        .input_devices()
        .map_err(|e| CaptureFault::new(format!("failed to enumerate input devices: {e}")))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Down-mix and rate conversion applied to every callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Conversion {
    channels: u16,
    from_rate: u32,
    to_rate: u32,
}

impl Conversion {
    fn apply(&self, interleaved: &[f32]) -> Vec<f32> {
        let mono = to_mono(interleaved, self.channels);
        resample_linear(&mono, self.from_rate, self.to_rate)
    }
}

fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = usize::from(channels);
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }
    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let out_len = (input.len() as f64 / ratio).floor() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let s0 = input.get(idx).copied().unwrap_or(0.0);
            let s1 = input.get(idx + 1).copied().unwrap_or(s0);
            s0 + frac * (s1 - s0)
        })
        .collect()
}

/// Cuts a sample stream into blocks of exactly `block_size`.
#[derive(Debug)]
struct BlockAssembler {
    block_size: usize,
    pending: Vec<f32>,
}

impl BlockAssembler {
    fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size * 2),
        }
    }

    fn feed(&mut self, samples: &[f32]) -> Vec<SampleBlock> {
        self.pending.extend_from_slice(samples);
        let whole = self.pending.len() / self.block_size * self.block_size;
        let ready: Vec<f32> = self.pending.drain(..whole).collect();
        ready.chunks(self.block_size).map(<[f32]>::to_vec).collect()
    }

    fn clear(&mut self) {
        self.pending.clear();
    }
}

/// State shared with the stream callback.
#[derive(Debug)]
struct Feed {
    sink: Option<BlockSink>,
    blocks: BlockAssembler,
}

impl Feed {
    fn new(block_size: usize) -> Self {
        Self {
            sink: None,
            blocks: BlockAssembler::new(block_size),
        }
    }

    fn attach(&mut self, sink: BlockSink) {
        self.blocks.clear();
        self.sink = Some(sink);
    }

    fn detach(&mut self) {
        self.sink = None;
        self.blocks.clear();
    }

    fn deliver(&mut self, samples: &[f32]) {
        let Some(sink) = &self.sink else {
            return;
        };
        let mut closed = false;
        for block in self.blocks.feed(samples) {
            // overflow is counted on the window side
            if sink.push(block) == PushOutcome::Closed {
                closed = true;
                break;
            }
        }
        if closed {
            self.detach();
        }
    }
}

/// First stream error since the device was opened.
type FaultSlot = Arc<Mutex<Option<String>>>;

struct SendableStream(cpal::Stream);

// SAFETY: the stream is owned by one `CpalCaptureSource` and only touched
// through `&mut self` or on drop, never from two threads at once.
unsafe impl Send for SendableStream {}

/// A live input device.
///
/// The stream is opened and started by [`CpalCaptureSource::open`], so a
/// missing device or a refused permission surfaces before the session
/// starts. `start` and `stop` only attach and detach the window's sink.
pub struct CpalCaptureSource {
    sample_rate: u32,
    device_name: String,
    feed: Arc<Mutex<Feed>>,
    fault: FaultSlot,
    _stream: SendableStream,
}

impl CpalCaptureSource {
    /// Opens `device_name`, or the default input device, delivering mono
    /// blocks of `block_size` samples at `sample_rate`.
    pub fn open(
        device_name: Option<&str>,
        sample_rate: u32,
        block_size: usize,
    ) -> Result<Self, CaptureFault> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| CaptureFault::new(format!("failed to enumerate input devices: {e}")))?
                .find(|d| d.name().is_ok_and(|n| n == name))
                .ok_or_else(|| CaptureFault::new(format!("input device not found: {name}")))?,
            None => host
                .default_input_device()
                .ok_or_else(|| CaptureFault::new("no default input device available"))?,
        };
        let name = device.name().unwrap_or_else(|_| "unknown".into());

        let supported = device
            .default_input_config()
            .map_err(|e| CaptureFault::new(format!("failed to query {name}: {e}")))?;
        let format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let conversion = Conversion {
            channels: config.channels,
            from_rate: config.sample_rate.0,
            to_rate: sample_rate,
        };

        let feed = Arc::new(Mutex::new(Feed::new(block_size)));
        let fault: FaultSlot = Arc::new(Mutex::new(None));
        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, conversion, &feed, &fault),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, conversion, &feed, &fault),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, conversion, &feed, &fault),
            other => Err(CaptureFault::new(format!(
                "unsupported sample format {other:?} on {name}"
            ))),
        }?;
        stream
            .play()
            .map_err(|e| CaptureFault::new(format!("failed to start input on {name}: {e}")))?;

        info!(
            device = %name,
            native_rate = conversion.from_rate,
            channels = conversion.channels,
            sample_rate,
            block_size,
            "audio input opened"
        );
        Ok(Self {
            sample_rate,
            device_name: name,
            feed,
            fault,
            _stream: SendableStream(stream),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn pending_fault(&self) -> Option<String> {
        self.fault.lock().ok().and_then(|slot| slot.clone())
    }

    fn feed(&self) -> Result<std::sync::MutexGuard<'_, Feed>, CaptureFault> {
        self.feed
            .lock()
            .map_err(|_| CaptureFault::new("capture callback panicked"))
    }
}

fn build_stream<S>(
    device: &cpal::Device,
    config: &StreamConfig,
    conversion: Conversion,
    feed: &Arc<Mutex<Feed>>,
    fault: &FaultSlot,
) -> Result<cpal::Stream, CaptureFault>
where
    S: SizedSample,
    f32: FromSample<S>,
{
    let feed = Arc::clone(feed);
    let fault = Arc::clone(fault);
    device
        .build_input_stream(
            config,
            move |data: &[S], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
                let mono = conversion.apply(&samples);
                if let Ok(mut feed) = feed.lock() {
                    feed.deliver(&mono);
                }
            },
            move |err: cpal::StreamError| {
                error!("audio input stream error: {err}");
                if let Ok(mut slot) = fault.lock() {
                    slot.get_or_insert_with(|| err.to_string());
                }
            },
            None,
        )
        .map_err(|e| CaptureFault::new(format!("failed to build input stream: {e}")))
}

impl CaptureSource for CpalCaptureSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, sink: BlockSink) -> Result<(), CaptureFault> {
        if let Some(message) = self.pending_fault() {
            return Err(CaptureFault::new(message));
        }
        self.feed()?.attach(sink);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureFault> {
        self.feed()?.detach();
        Ok(())
    }

    fn check(&mut self) -> Result<(), CaptureFault> {
        match self.pending_fault() {
            Some(message) => {
                warn!(device = %self.device_name, %message, "audio input failed");
                Err(CaptureFault::new(message))
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_buffer::AudioFrameBuffer;

    #[test]
    fn stereo_is_averaged_to_mono() {
        assert_eq!(to_mono(&[0.25, 0.75, -1.0, 1.0], 2), vec![0.5f32, 0.0]);
        assert_eq!(to_mono(&[0.5, 0.25], 1), vec![0.5, 0.25]);
    }

    #[test]
    fn resampling_scales_the_length() {
        let input: Vec<f32> = (0..480).map(|i| i as f32 / 480.0).collect();
        assert_eq!(resample_linear(&input, 48_000, 16_000).len(), 160);
        assert_eq!(resample_linear(&input, 48_000, 48_000), input);
        let up = resample_linear(&[0.0, 1.0], 1, 2);
        assert_eq!(up, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn assembler_emits_only_whole_blocks() {
        let mut blocks = BlockAssembler::new(4);
        assert!(blocks.feed(&[0.1; 3]).is_empty());
        let out = blocks.feed(&[0.2; 6]);
        assert_eq!(out, vec![vec![0.1, 0.1, 0.1, 0.2], vec![0.2; 4]]);
        assert_eq!(blocks.pending.len(), 1);
        blocks.clear();
        assert!(blocks.feed(&[0.3; 3]).is_empty());
    }

    #[test]
    fn feed_without_sink_drops_audio() {
        let mut feed = Feed::new(2);
        feed.deliver(&[0.5; 8]);
        assert!(feed.blocks.pending.is_empty());
    }

    #[test]
    fn feed_delivers_blocks_to_the_open_window() {
        let mut buffer = AudioFrameBuffer::new(8);
        let mut feed = Feed::new(2);
        feed.attach(buffer.start_window().unwrap());
        feed.deliver(&[0.1, 0.2, 0.3]);
        feed.deliver(&[0.4]);
        assert_eq!(buffer.stop_window(), vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn feed_detaches_once_the_window_closes() {
        let mut buffer = AudioFrameBuffer::new(8);
        let mut feed = Feed::new(1);
        feed.attach(buffer.start_window().unwrap());
        buffer.stop_window();
        feed.deliver(&[0.1, 0.2]);
        assert!(feed.sink.is_none());
    }

    #[test]
    fn conversion_mixes_then_resamples() {
        let conversion = Conversion {
            channels: 2,
            from_rate: 32_000,
            to_rate: 16_000,
        };
        let out = conversion.apply(&[0.2, 0.4, 0.6, 0.8, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_device_is_reported() {
        let err = CpalCaptureSource::open(Some("no-such-input-device-1234"), 44_100, 4096)
            .err()
            .unwrap();
        assert!(
            err.message.contains("no-such-input-device-1234")
                || err.message.contains("enumerate")
        );
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn default_device_delivers_blocks() {
        let mut buffer = AudioFrameBuffer::new(64);
        let mut source = CpalCaptureSource::open(None, 16_000, 1600).unwrap();
        source.start(buffer.start_window().unwrap()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(500));
        source.check().unwrap();
        let blocks = buffer.stop_window();
        source.stop().unwrap();
        assert!(!blocks.is_empty());
        assert!(blocks.iter().all(|b| b.len() == 1600));
    }
}

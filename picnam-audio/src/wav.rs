//! RIFF/WAVE encoding of captured float blocks as mono 16-bit PCM.

use std::fs;
use std::io;
use std::path::Path;

pub const HEADER_LEN: usize = 44;

const AUDIO_FORMAT: u16 = 1; // PCM
const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BLOCK_ALIGN: u16 = CHANNELS * (BITS_PER_SAMPLE / 8);

/// A complete, self-contained WAV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavBlob {
    bytes: Vec<u8>,
}

impl WavBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[offset..offset + 4]);
        u32::from_le_bytes(word)
    }

    pub fn sample_rate(&self) -> u32 {
        self.read_u32(24)
    }

    /// Size of the PCM payload in bytes, as stored in the header.
    pub fn data_len(&self) -> u32 {
        self.read_u32(40)
    }

    pub fn sample_count(&self) -> usize {
        self.data_len() as usize / usize::from(BLOCK_ALIGN)
    }

    pub fn duration_ms(&self) -> f64 {
        match self.sample_rate() {
            0 => 0.0,
            rate => self.sample_count() as f64 * 1000.0 / f64::from(rate),
        }
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, &self.bytes)
    }
}

/// Converts one float sample to signed 16-bit PCM.
///
/// The sample is clamped to [-1, 1]; negative values scale by 32768 and
/// non-negative values by 32767, truncating toward zero. Scaling is done
/// in f64.
pub fn sample_to_i16(sample: f32) -> i16 {
    let s = f64::from(sample).clamp(-1.0, 1.0);
    // NaN passes through clamp and `as` maps it to 0
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encodes blocks in order into one WAV file. No blocks yields a valid
/// header-only file.
pub fn encode<B: AsRef<[f32]>>(blocks: &[B], sample_rate: u32) -> WavBlob {
    let total_samples: usize = blocks.iter().map(|b| b.as_ref().len()).sum();
    let data_size = (total_samples * usize::from(BLOCK_ALIGN)) as u32;
    let byte_rate = sample_rate * u32::from(BLOCK_ALIGN);

    let mut bytes = Vec::with_capacity(HEADER_LEN + data_size as usize);

    // RIFF chunk
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_size).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    // fmt subchunk
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&AUDIO_FORMAT.to_le_bytes());
    bytes.extend_from_slice(&CHANNELS.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&BLOCK_ALIGN.to_le_bytes());
    bytes.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data subchunk
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_size.to_le_bytes());

    for block in blocks {
        for &sample in block.as_ref() {
            bytes.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
        }
    }

    WavBlob { bytes }
}

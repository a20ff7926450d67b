//! Uncompressed PCM container encoding
//!
//! Produces canonical 44-byte-header RIFF/WAVE buffers holding little-endian
//! 16-bit samples. Encoding is pure; the same input always yields the same bytes.

use std::{fmt, fs, io, path::Path};

/// Bytes before the first sample.
pub const HEADER_LEN: usize = 44;
/// Download name for saved renders.
pub const FILE_NAME: &str = "glitch.wav";
/// MIME type for saved renders.
pub const MIME_TYPE: &str = "audio/wav";

const FMT_CHUNK_LEN: u32 = 16;
const FORMAT_PCM: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;

/// Convert a normalized sample to 16-bit PCM.
///
/// `round(sample * 32767)` with no clamping: values past full scale wrap
/// around in two's complement. NaN maps to zero.
pub fn quantize(sample: f32) -> i16 {
    (sample * 32767.0).round() as i32 as i16
}

/// Encode interleaved samples into a WAV byte buffer.
///
/// Output length is always `44 + 2 * samples.len()`. Size fields saturate at
/// `u32::MAX` for inputs too large for the format.
pub fn encode(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let data_len = u32::try_from(samples.len() * BYTES_PER_SAMPLE as usize).unwrap_or(u32::MAX);
    let block_align = channels.saturating_mul(BYTES_PER_SAMPLE);
    let byte_rate = sample_rate.saturating_mul(block_align as u32);

    let mut out = Vec::with_capacity(HEADER_LEN + samples.len() * BYTES_PER_SAMPLE as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&data_len.saturating_add(HEADER_LEN as u32 - 8).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }

    out
}

/// A finished, immutable WAV file.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioContainer {
    bytes: Vec<u8>,
}

impl AudioContainer {
    pub fn encode(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        Self {
            bytes: encode(samples, sample_rate, channels),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    pub fn channels(&self) -> u16 {
        self.read_u16(22)
    }

    pub fn sample_rate(&self) -> u32 {
        self.read_u32(24)
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.read_u16(34)
    }

    /// Number of 16-bit samples in the data chunk, across all channels.
    pub fn sample_count(&self) -> usize {
        (self.bytes.len() - HEADER_LEN) / BYTES_PER_SAMPLE as usize
    }

    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.bytes[HEADER_LEN..]
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }

    /// Duration in seconds of the encoded audio.
    pub fn duration_secs(&self) -> f64 {
        let frames = self.sample_count() / self.channels().max(1) as usize;
        frames as f64 / self.sample_rate().max(1) as f64
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        fs::write(path, &self.bytes)
    }

    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.bytes[offset],
            self.bytes[offset + 1],
            self.bytes[offset + 2],
            self.bytes[offset + 3],
        ])
    }
}

impl fmt::Debug for AudioContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioContainer")
            .field("sample_rate", &self.sample_rate())
            .field("channels", &self.channels())
            .field("samples", &self.sample_count())
            .finish()
    }
}

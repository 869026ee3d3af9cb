//! Raw PCM decoding

use radiomark_core::SampleBuffer;
use tracing::warn;

/// Decode signed 16-bit little-endian PCM, down-mixing interleaved channels.
pub fn decode_s16le(bytes: &[u8], channels: usize, sample_rate: u32) -> SampleBuffer {
    if bytes.len() % 2 != 0 {
        warn!(bytes = bytes.len(), "Ignoring trailing odd byte in PCM data");
    }

    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    if channels > 1 && samples.len() % channels != 0 {
        warn!(
            samples = samples.len(),
            channels,
            "Ignoring trailing partial frame in PCM data"
        );
    }

    SampleBuffer::from_interleaved_i16(&samples, channels, sample_rate)
}

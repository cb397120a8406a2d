//! Audio frame decoder
//!
//! Turns a speaker's accumulated raw PCM byte stream back into a typed
//! segment with known duration. The voice driver runs in decode mode, so
//! the bytes are 48kHz interleaved i16 samples serialized little-endian.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("byte stream truncated: {0} bytes do not divide into whole sample frames")]
    Truncated(usize),
    #[error("invalid audio format: {0}")]
    BadFormat(String),
}

/// Sample rate and channel layout carried from intake to decode.
///
/// Discord voice is fixed at 48kHz stereo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const DISCORD: AudioFormat = AudioFormat {
        sample_rate: 48_000,
        channels: 2,
    };

    /// Bytes per interleaved sample frame (one i16 per channel).
    fn frame_bytes(&self) -> usize {
        self.channels as usize * 2
    }
}

/// Decoded audio: interleaved samples plus the format they were decoded at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub samples: Vec<i16>,
    pub format: AudioFormat,
}

impl Segment {
    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        let frames = self.samples.len() as u64 / self.format.channels as u64;
        frames * 1000 / self.format.sample_rate as u64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decode a raw PCM byte stream into a [`Segment`].
///
/// Pure transform, no side effects. Fails on a stream that does not divide
/// into whole interleaved frames (a truncated final write) or on a
/// nonsensical format hint. An empty stream decodes to a zero-length
/// segment.
pub fn decode(bytes: &[u8], format: AudioFormat) -> Result<Segment, DecodeError> {
    if format.sample_rate == 0 {
        return Err(DecodeError::BadFormat("sample rate is zero".into()));
    }
    if format.channels == 0 {
        return Err(DecodeError::BadFormat("channel count is zero".into()));
    }
    if bytes.len() % format.frame_bytes() != 0 {
        return Err(DecodeError::Truncated(bytes.len()));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok(Segment { samples, format })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_interleaved_samples() {
        let bytes = pcm_bytes(&[1, -1, 32767, -32768]);
        let seg = decode(&bytes, AudioFormat::DISCORD).unwrap();
        assert_eq!(seg.samples, vec![1, -1, 32767, -32768]);
    }

    #[test]
    fn empty_stream_is_zero_length_segment() {
        let seg = decode(&[], AudioFormat::DISCORD).unwrap();
        assert!(seg.is_empty());
        assert_eq!(seg.duration_ms(), 0);
    }

    #[test]
    fn truncated_stream_is_rejected() {
        // 3 bytes cannot hold a whole stereo frame
        let err = decode(&[0, 1, 2], AudioFormat::DISCORD).unwrap_err();
        assert_eq!(err, DecodeError::Truncated(3));
    }

    #[test]
    fn zero_channels_is_rejected() {
        let format = AudioFormat {
            sample_rate: 48_000,
            channels: 0,
        };
        assert!(matches!(decode(&[], format), Err(DecodeError::BadFormat(_))));
    }

    #[test]
    fn duration_follows_sample_rate() {
        // 48_000 frames of stereo = 1 second
        let samples = vec![0i16; 48_000 * 2];
        let seg = decode(&pcm_bytes(&samples), AudioFormat::DISCORD).unwrap();
        assert_eq!(seg.duration_ms(), 1000);
    }
}

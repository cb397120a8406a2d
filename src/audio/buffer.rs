//! Per-speaker audio buffer
//!
//! Accumulates one speaker's raw PCM bytes while the session records.
//! Finalizing decodes the stream exactly once and freezes the buffer.

use crate::audio::decoder::{self, AudioFormat, DecodeError, Segment};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer already finalized")]
    Finalized,
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A single speaker's growing byte store.
///
/// Append-only until [`SpeakerBuffer::finalize`], read-only after.
#[derive(Debug)]
pub struct SpeakerBuffer {
    bytes: Vec<u8>,
    segment: Option<Segment>,
}

impl SpeakerBuffer {
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            segment: None,
        }
    }

    /// Append a frame's raw bytes. Rejected once the buffer is finalized.
    pub fn append(&mut self, frame: &[u8]) -> Result<(), BufferError> {
        if self.segment.is_some() {
            return Err(BufferError::Finalized);
        }
        self.bytes.extend_from_slice(frame);
        Ok(())
    }

    /// Decode the accumulated bytes into a segment.
    ///
    /// Decodes exactly once; repeated calls return the cached segment
    /// without touching the byte store again.
    pub fn finalize(&mut self, format: AudioFormat) -> Result<&Segment, BufferError> {
        let segment = match self.segment.take() {
            Some(cached) => cached,
            None => {
                let segment = decoder::decode(&self.bytes, format)?;
                self.bytes = Vec::new();
                segment
            }
        };
        Ok(self.segment.insert(segment))
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

impl Default for SpeakerBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn appends_accumulate() {
        let mut buf = SpeakerBuffer::new();
        buf.append(&pcm_bytes(&[1, 2])).unwrap();
        buf.append(&pcm_bytes(&[3, 4])).unwrap();
        let seg = buf.finalize(AudioFormat::DISCORD).unwrap();
        assert_eq!(seg.samples, vec![1, 2, 3, 4]);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut buf = SpeakerBuffer::new();
        buf.append(&pcm_bytes(&[7, 8, 9, 10])).unwrap();
        let first = buf.finalize(AudioFormat::DISCORD).unwrap().clone();
        let second = buf.finalize(AudioFormat::DISCORD).unwrap().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn append_after_finalize_is_rejected() {
        let mut buf = SpeakerBuffer::new();
        buf.finalize(AudioFormat::DISCORD).unwrap();
        assert_eq!(
            buf.append(&pcm_bytes(&[1, 2])),
            Err(BufferError::Finalized)
        );
    }

    #[test]
    fn empty_buffer_finalizes_to_zero_length_segment() {
        let mut buf = SpeakerBuffer::new();
        let seg = buf.finalize(AudioFormat::DISCORD).unwrap();
        assert!(seg.is_empty());
    }

    #[test]
    fn truncated_bytes_fail_finalize() {
        let mut buf = SpeakerBuffer::new();
        buf.append(&[0x01]).unwrap();
        assert!(matches!(
            buf.finalize(AudioFormat::DISCORD),
            Err(BufferError::Decode(DecodeError::Truncated(1)))
        ));
    }
}

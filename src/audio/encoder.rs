//! WAV encoding for delivered tracks
//!
//! The finished segments are shipped to Discord as WAV attachments,
//! encoded in memory with hound.

use crate::audio::decoder::Segment;
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),
}

/// File extension matching the encoding below.
pub const TRACK_EXTENSION: &str = "wav";

/// Encode a segment as a complete in-memory WAV file.
pub fn encode_wav(segment: &Segment) -> Result<Vec<u8>, EncodeError> {
    let spec = hound::WavSpec {
        channels: segment.format.channels,
        sample_rate: segment.format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for sample in &segment.samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::AudioFormat;

    #[test]
    fn encodes_a_riff_header() {
        let seg = Segment {
            samples: vec![0, 1, -1, 32767],
            format: AudioFormat::DISCORD,
        };
        let bytes = encode_wav(&seg).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 44-byte header + 2 bytes per sample
        assert_eq!(bytes.len(), 44 + seg.samples.len() * 2);
    }

    #[test]
    fn zero_length_segment_still_encodes() {
        let seg = Segment {
            samples: vec![],
            format: AudioFormat::DISCORD,
        };
        let bytes = encode_wav(&seg).unwrap();
        assert_eq!(bytes.len(), 44);
    }
}

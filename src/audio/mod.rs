//! Audio pipeline: decode, buffer, mix, encode
//!
//! Per-speaker PCM accumulates in buffers during the session and is
//! decoded, overlaid and WAV-encoded once the session stops.

pub mod buffer;
pub mod decoder;
pub mod encoder;
pub mod mixer;

pub use buffer::SpeakerBuffer;
pub use decoder::{AudioFormat, DecodeError, Segment};
pub use mixer::{MixError, MixdownResult};

//! Mixdown engine
//!
//! Overlays the finished per-speaker segments into one combined track.
//! The longest segment anchors the timeline and every other segment is
//! summed onto it at offset zero, so the combined duration always equals
//! the longest speaker's duration. Segments are NOT shifted to the wall
//! clock time each speaker actually started talking; this matches the
//! reference behavior and is kept deliberately.

use crate::audio::decoder::Segment;
use serenity::model::id::UserId;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MixError {
    #[error("nothing was recorded")]
    EmptySession,
    #[error("segment for user {0} has mismatched format")]
    FormatMismatch(UserId),
}

/// The finished recording: one combined track plus every speaker's own
/// track in first-seen order. Immutable once produced.
#[derive(Debug, Clone)]
pub struct MixdownResult {
    pub combined: Segment,
    pub tracks: Vec<(UserId, Segment)>,
}

/// Overlay all tracks into one combined segment.
///
/// The base is the maximum-duration segment under strict `>`, so ties keep
/// the earliest-seen speaker. Shorter segments only cover their own length
/// and leave the rest of the base untouched. Zero tracks is an error; one
/// track passes through unchanged.
pub fn combine(tracks: Vec<(UserId, Segment)>) -> Result<MixdownResult, MixError> {
    if tracks.is_empty() {
        return Err(MixError::EmptySession);
    }

    // Strict > keeps the earliest-seen speaker on a duration tie.
    let mut base_idx = 0;
    for (i, (_, seg)) in tracks.iter().enumerate() {
        if seg.samples.len() > tracks[base_idx].1.samples.len() {
            base_idx = i;
        }
    }
    let base = &tracks[base_idx].1;

    for (user_id, seg) in &tracks {
        if seg.format != base.format {
            return Err(MixError::FormatMismatch(*user_id));
        }
    }

    let mut combined = base.clone();
    for (i, (user_id, seg)) in tracks.iter().enumerate() {
        if i == base_idx {
            continue;
        }
        debug!(
            "Overlaying {}ms from user {} onto {}ms base",
            seg.duration_ms(),
            user_id,
            combined.duration_ms()
        );
        for (out, sample) in combined.samples.iter_mut().zip(&seg.samples) {
            *out = out.saturating_add(*sample);
        }
    }

    Ok(MixdownResult { combined, tracks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::AudioFormat;

    fn seg(samples: Vec<i16>) -> Segment {
        Segment {
            samples,
            format: AudioFormat::DISCORD,
        }
    }

    #[test]
    fn empty_session_is_an_error() {
        assert!(matches!(combine(vec![]), Err(MixError::EmptySession)));
    }

    #[test]
    fn single_speaker_passes_through_unchanged() {
        let original = seg(vec![5, -3, 100, 0]);
        let result = combine(vec![(UserId::new(1), original.clone())]).unwrap();
        assert_eq!(result.combined, original);
        assert_eq!(result.tracks.len(), 1);
    }

    #[test]
    fn longest_segment_anchors_the_timeline() {
        let a = seg(vec![10; 8]); // the base
        let b = seg(vec![1; 4]);
        let result = combine(vec![(UserId::new(2), b), (UserId::new(1), a)]).unwrap();
        assert_eq!(result.combined.samples, vec![11, 11, 11, 11, 10, 10, 10, 10]);
    }

    #[test]
    fn combined_duration_is_max_track_duration() {
        let long = seg(vec![0; 48_000 * 2]); // 1000ms
        let short = seg(vec![0; 48_000 / 2]); // 125ms
        let result = combine(vec![
            (UserId::new(1), short),
            (UserId::new(2), long.clone()),
        ])
        .unwrap();
        assert_eq!(result.combined.duration_ms(), long.duration_ms());
    }

    #[test]
    fn equal_length_tie_keeps_first_seen_as_base() {
        // With a strict > comparison the first equal-length segment stays
        // the base, so the second is the one overlaid.
        let a = seg(vec![i16::MAX; 4]);
        let b = seg(vec![1; 4]);
        let result = combine(vec![(UserId::new(1), a), (UserId::new(2), b)]).unwrap();
        // saturating add clamps rather than wrapping
        assert_eq!(result.combined.samples, vec![i16::MAX; 4]);
    }

    #[test]
    fn overlay_saturates_instead_of_clipping_over() {
        let a = seg(vec![i16::MIN, 0]);
        let b = seg(vec![-10, 10]);
        let result = combine(vec![(UserId::new(1), a), (UserId::new(2), b)]).unwrap();
        assert_eq!(result.combined.samples, vec![i16::MIN, 10]);
    }

    #[test]
    fn tracks_keep_first_seen_order_and_zero_length_speakers() {
        let result = combine(vec![
            (UserId::new(9), seg(vec![])),
            (UserId::new(3), seg(vec![1, 2])),
        ])
        .unwrap();
        let ids: Vec<u64> = result.tracks.iter().map(|(id, _)| id.get()).collect();
        assert_eq!(ids, vec![9, 3]);
        assert!(result.tracks[0].1.is_empty());
    }

    #[test]
    fn mismatched_formats_are_rejected() {
        let odd = Segment {
            samples: vec![0; 4],
            format: AudioFormat {
                sample_rate: 44_100,
                channels: 1,
            },
        };
        let err = combine(vec![
            (UserId::new(1), seg(vec![0; 8])),
            (UserId::new(2), odd),
        ])
        .unwrap_err();
        assert_eq!(err, MixError::FormatMismatch(UserId::new(2)));
    }
}

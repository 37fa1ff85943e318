//! Boundary resolution: raw VAD segments → one speech envelope per clip.
//!
//! Segments separated by less than a merge-gap tolerance are fused, then the
//! envelope `[earliest start, latest end]` is taken, clamped to the clip.
//! Two profiles are used in practice: a wide gap for the two-clip alignment
//! path (intra-phrase pauses must not split the envelope) and a narrow one
//! for generic silence detection.

use serde::{Deserialize, Serialize};

use crate::vad::RawSegment;

/// Merge-gap tolerance for the two-clip alignment use case.
pub const ALIGN_MERGE_GAP_SECS: f64 = 0.5;
/// Merge-gap tolerance for generic silence detection.
pub const SILENCE_MERGE_GAP_SECS: f64 = 0.1;

/// A clip whose speech content covers at least this fraction of its duration
/// gets confidence 1.0; sparser speech scales down linearly.
const FULL_CONFIDENCE_SPEECH_RATIO: f64 = 0.8;

/// Resolved speech envelope for one clip.
///
/// Every field is populated on every return path — downstream code never
/// needs to guard against missing members. `vad_failed == true` means
/// "treat the clip as all-speech, do not trim".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechBoundaries {
    /// Speech onset in seconds.
    pub start_time: f64,
    /// Speech end in seconds.
    pub end_time: f64,
    pub start_sample: usize,
    pub end_sample: usize,
    /// Envelope before any caller padding is applied.
    pub original_speech_start: f64,
    pub original_speech_end: f64,
    /// Leading silence duration implied by the envelope.
    pub silence_start: f64,
    /// Trailing silence duration implied by the envelope.
    pub silence_end: f64,
    /// Number of merged segments the envelope spans.
    pub speech_segments: usize,
    /// Heuristic signal in [0, 1], not a probability.
    pub confidence_score: f64,
    pub vad_failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpeechBoundaries {
    /// Full-clip fallback: the whole clip is treated as speech.
    pub fn full_clip(clip_duration: f64, sample_rate: u32, error: Option<String>) -> Self {
        let clip_duration = clip_duration.max(0.0);
        let end_sample = (clip_duration * sample_rate as f64).floor() as usize;
        Self {
            start_time: 0.0,
            end_time: clip_duration,
            start_sample: 0,
            end_sample,
            original_speech_start: 0.0,
            original_speech_end: clip_duration,
            silence_start: 0.0,
            silence_end: 0.0,
            speech_segments: 0,
            confidence_score: 0.0,
            vad_failed: true,
            error,
        }
    }
}

/// Outcome of one boundary-detection pass; callers pattern-match instead of
/// checking sentinel flags.
#[derive(Debug, Clone)]
pub enum BoundaryOutcome {
    Resolved(SpeechBoundaries),
    /// Detector ran but found zero segments.
    NoSpeech,
    /// Detector never became ready or failed mid-run.
    Unavailable,
}

impl BoundaryOutcome {
    /// Materialize the outcome as a full boundary record, substituting the
    /// full-clip fallback for the failure variants.
    pub fn into_boundaries(self, clip_duration: f64, sample_rate: u32) -> SpeechBoundaries {
        match self {
            BoundaryOutcome::Resolved(boundaries) => boundaries,
            BoundaryOutcome::NoSpeech => SpeechBoundaries::full_clip(clip_duration, sample_rate, None),
            BoundaryOutcome::Unavailable => SpeechBoundaries::full_clip(
                clip_duration,
                sample_rate,
                Some("vad unavailable".into()),
            ),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, BoundaryOutcome::Resolved(_))
    }
}

/// Resolve raw segments into one speech envelope.
///
/// Segments are merged in start-time order when the gap to the previous one
/// is at most `merge_gap_secs` (touching segments always merge). A segment
/// starting at t=0 is genuine speech — no "ignore early segments" filtering
/// happens here.
pub fn resolve(
    segments: &[RawSegment],
    clip_duration: f64,
    sample_rate: u32,
    merge_gap_secs: f64,
) -> BoundaryOutcome {
    if segments.is_empty() {
        return BoundaryOutcome::NoSpeech;
    }

    let mut ordered: Vec<RawSegment> = segments.to_vec();
    ordered.sort_by(|a, b| a.start_secs.total_cmp(&b.start_secs));

    let mut merged: Vec<RawSegment> = Vec::with_capacity(ordered.len());
    for segment in ordered {
        match merged.last_mut() {
            Some(current) if segment.start_secs - current.end_secs <= merge_gap_secs => {
                current.end_secs = current.end_secs.max(segment.end_secs);
                current.samples += segment.samples;
            }
            _ => merged.push(segment),
        }
    }

    let clip_duration = clip_duration.max(0.0);
    let start_time = merged[0].start_secs.clamp(0.0, clip_duration);
    let end_time = merged
        .last()
        .map(|s| s.end_secs)
        .unwrap_or(clip_duration)
        .clamp(0.0, clip_duration);

    let total_speech: f64 = merged
        .iter()
        .map(|s| s.end_secs.min(clip_duration) - s.start_secs.max(0.0))
        .filter(|d| *d > 0.0)
        .sum();
    let confidence_score = if clip_duration > 0.0 {
        (total_speech / (clip_duration * FULL_CONFIDENCE_SPEECH_RATIO)).min(1.0)
    } else {
        0.0
    };

    let rate = sample_rate as f64;
    BoundaryOutcome::Resolved(SpeechBoundaries {
        start_time,
        end_time,
        start_sample: (start_time * rate).floor() as usize,
        end_sample: (end_time * rate).floor() as usize,
        original_speech_start: start_time,
        original_speech_end: end_time,
        silence_start: start_time,
        silence_end: (clip_duration - end_time).max(0.0),
        speech_segments: merged.len(),
        confidence_score,
        vad_failed: false,
        error: None,
    })
}

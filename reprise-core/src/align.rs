//! Onset-synchronized two-clip alignment.
//!
//! ## Algorithm
//!
//! 1. **Per-clip normalization** — rebuild each clip as
//!    `padding + speech + padding`, copying the source from its detected
//!    speech onset so the onset lands at exactly `padding_ms` into the new
//!    buffer, wherever it originally sat.
//! 2. **Duration equalization** — append trailing silence to the shorter
//!    clip until both durations match. End-padding only; front-padding
//!    would break the onset alignment just established.
//!
//! All seconds↔samples conversions truncate (`floor`). Channel count and
//! sample rate are preserved per clip — no resampling happens here.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::AudioBuffer;
use crate::bounds::SpeechBoundaries;
use crate::error::{RepriseError, Result};

/// How the aligner arrived at its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMethod {
    /// Durations already matched within tolerance after normalization.
    AlreadyAligned,
    /// Trailing silence was appended to the shorter clip.
    EndPadding,
    /// Alignment failed; the original blobs were passed through.
    ErrorFallback,
}

/// Alignment tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AlignConfig {
    /// Silence placed before/after each clip's speech, milliseconds.
    /// Default: 200.
    pub padding_ms: u32,
    /// Duration differences under this are "already aligned", milliseconds.
    /// Default: 10.
    pub duration_tolerance_ms: u32,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            padding_ms: 200,
            duration_tolerance_ms: 10,
        }
    }
}

impl AlignConfig {
    pub fn normalize(&mut self) {
        self.padding_ms = self.padding_ms.min(2_000);
        self.duration_tolerance_ms = self.duration_tolerance_ms.clamp(1, 500);
    }
}

/// UI-facing summary of one alignment pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentInfo {
    /// Total trailing silence added during equalization, seconds.
    pub padding_added: f64,
    /// Duration both outputs share, seconds.
    pub final_duration: f64,
    pub method: AlignmentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One clip entering the aligner.
#[derive(Debug, Clone)]
pub struct ClipInput {
    pub buffer: AudioBuffer,
    pub boundaries: SpeechBoundaries,
    /// Set when a prior pipeline stage already onset-normalized this clip;
    /// normalization is then skipped to avoid double-processing.
    pub already_normalized: bool,
}

/// Both aligned buffers plus the applied bookkeeping.
#[derive(Debug)]
pub struct AlignedPair {
    pub target: AudioBuffer,
    pub attempt: AudioBuffer,
    pub padding_added: f64,
    pub final_duration: f64,
    pub method: AlignmentMethod,
}

/// Rebuild `buffer` so its speech onset sits at exactly `padding_ms`.
///
/// Output layout: `padding_ms` of silence, then the source samples from
/// `original_speech_start` onward (as many as fit the speech span plus the
/// back padding — natural decay fills the back padding where the source has
/// content), zero-filled past the source's end.
pub fn normalize_onset(
    buffer: &AudioBuffer,
    boundaries: &SpeechBoundaries,
    padding_ms: u32,
) -> Result<AudioBuffer> {
    let rate = buffer.sample_rate();
    let pad_frames = (padding_ms as f64 / 1000.0 * rate as f64).floor() as usize;

    let frames = buffer.frames();
    let speech_start = ((boundaries.original_speech_start * rate as f64).floor() as usize).min(frames);
    let speech_end = ((boundaries.original_speech_end * rate as f64).floor() as usize)
        .clamp(speech_start, frames);
    let speech_frames = speech_end - speech_start;
    if speech_frames == 0 {
        return Err(RepriseError::InvalidBuffer(
            "speech envelope is empty, nothing to normalize".into(),
        ));
    }

    let total = pad_frames + speech_frames + pad_frames;
    let mut channels = Vec::with_capacity(buffer.channel_count());
    for plane in buffer.channels() {
        let mut out = vec![0.0f32; total];
        let copy_len = (total - pad_frames).min(plane.len() - speech_start);
        out[pad_frames..pad_frames + copy_len]
            .copy_from_slice(&plane[speech_start..speech_start + copy_len]);
        channels.push(out);
    }

    debug!(
        speech_start,
        speech_frames, pad_frames, "onset-normalized clip"
    );
    AudioBuffer::new(channels, rate)
}

/// Boundary record describing a clip after [`normalize_onset`].
pub fn normalized_boundaries(
    original: &SpeechBoundaries,
    normalized: &AudioBuffer,
    padding_ms: u32,
) -> SpeechBoundaries {
    let padding_secs = padding_ms as f64 / 1000.0;
    let duration = normalized.duration_secs();
    let rate = normalized.sample_rate() as f64;
    let end_time = (duration - padding_secs).max(padding_secs);
    SpeechBoundaries {
        start_time: padding_secs,
        end_time,
        start_sample: (padding_secs * rate).floor() as usize,
        end_sample: (end_time * rate).floor() as usize,
        original_speech_start: padding_secs,
        original_speech_end: end_time,
        silence_start: padding_secs,
        silence_end: (duration - end_time).max(0.0),
        speech_segments: original.speech_segments,
        confidence_score: original.confidence_score,
        vad_failed: original.vad_failed,
        error: original.error.clone(),
    }
}

/// Align two clips: normalize each onset, then equalize durations.
///
/// Errors from this function are expected to be caught by the caller and
/// converted into an `ErrorFallback` result carrying the original blobs.
pub fn align_clips(
    target: &ClipInput,
    attempt: &ClipInput,
    config: &AlignConfig,
) -> Result<AlignedPair> {
    let normalized_target = if target.already_normalized {
        target.buffer.clone()
    } else {
        normalize_onset(&target.buffer, &target.boundaries, config.padding_ms)?
    };
    let normalized_attempt = if attempt.already_normalized {
        attempt.buffer.clone()
    } else {
        normalize_onset(&attempt.buffer, &attempt.boundaries, config.padding_ms)?
    };

    let target_duration = normalized_target.duration_secs();
    let attempt_duration = normalized_attempt.duration_secs();
    let delta = (target_duration - attempt_duration).abs();
    let tolerance = config.duration_tolerance_ms as f64 / 1000.0;

    if delta < tolerance {
        return Ok(AlignedPair {
            target: normalized_target,
            attempt: normalized_attempt,
            padding_added: 0.0,
            final_duration: target_duration.max(attempt_duration),
            method: AlignmentMethod::AlreadyAligned,
        });
    }

    let final_duration = target_duration.max(attempt_duration);
    let (target, attempt) = if target_duration < attempt_duration {
        (
            pad_end_to(&normalized_target, final_duration)?,
            normalized_attempt,
        )
    } else {
        (
            normalized_target,
            pad_end_to(&normalized_attempt, final_duration)?,
        )
    };

    debug!(
        padding_added = delta,
        final_duration, "aligned pair via end padding"
    );
    Ok(AlignedPair {
        target,
        attempt,
        padding_added: delta,
        final_duration,
        method: AlignmentMethod::EndPadding,
    })
}

/// Append trailing silence until the buffer lasts `duration_secs`.
fn pad_end_to(buffer: &AudioBuffer, duration_secs: f64) -> Result<AudioBuffer> {
    let rate = buffer.sample_rate() as f64;
    let wanted = (duration_secs * rate).round() as usize;
    let current = buffer.frames();
    if wanted <= current {
        return Ok(buffer.clone());
    }
    let channels = buffer
        .channels()
        .iter()
        .map(|plane| {
            let mut out = plane.clone();
            out.resize(wanted, 0.0);
            out
        })
        .collect();
    AudioBuffer::new(channels, buffer.sample_rate())
}

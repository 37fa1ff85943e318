//! Silence trimming with hard safety caps.
//!
//! Trim amounts are derived from resolved boundaries minus a padding
//! allowance, then clamped to per-edge maximums so a misdetected envelope
//! can never eat a whole clip. Cuts are straight sample-boundary cuts — the
//! retained padding is what keeps them click-free.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::AudioBuffer;
use crate::bounds::SpeechBoundaries;
use crate::error::Result;

/// Minimum duration a trim may leave behind; anything shorter aborts the cut.
pub const MIN_RESULT_SECS: f64 = 0.05;
/// Edge silence below this is not worth cutting at all.
pub const MIN_EDGE_SILENCE_SECS: f64 = 0.1;

/// Padding and safety limits for one trim pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct TrimPolicy {
    /// Silence retained before/after the detected envelope, seconds.
    /// Default: 0.2.
    pub padding: f64,
    /// Hard cap on front trimming, seconds, regardless of detected silence.
    /// Default: 3.0.
    pub max_trim_start: f64,
    /// Hard cap on back trimming, seconds. Default: 3.0.
    pub max_trim_end: f64,
}

impl Default for TrimPolicy {
    fn default() -> Self {
        Self {
            padding: 0.2,
            max_trim_start: 3.0,
            max_trim_end: 3.0,
        }
    }
}

impl TrimPolicy {
    /// Clamp every field into a sane range.
    pub fn normalize(&mut self) {
        self.padding = self.padding.clamp(0.0, 1.0);
        self.max_trim_start = self.max_trim_start.clamp(0.0, 30.0);
        self.max_trim_end = self.max_trim_end.clamp(0.0, 30.0);
    }
}

/// What a trim pass decided to do.
#[derive(Debug)]
pub enum TrimOutcome {
    /// Trimming was skipped; the caller should reuse the original blob.
    Unchanged,
    Trimmed {
        buffer: AudioBuffer,
        trimmed_start: f64,
        trimmed_end: f64,
    },
}

/// Metadata record for one trim call, UI-facing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimResult {
    /// Re-encoded 16-bit WAV (the original bytes when nothing was cut).
    #[serde(skip)]
    pub wav: Vec<u8>,
    pub trimmed_start: f64,
    pub trimmed_end: f64,
    pub original_duration: f64,
    pub new_duration: f64,
    pub boundaries: SpeechBoundaries,
}

/// Compute safe trim offsets and produce the retained sample range.
///
/// A `vad_failed` boundary record, a degenerate (≤ 50 ms) result, or edge
/// silences both already under 100 ms all leave the clip untouched.
pub fn trim(
    buffer: &AudioBuffer,
    boundaries: &SpeechBoundaries,
    policy: &TrimPolicy,
) -> Result<TrimOutcome> {
    let duration = buffer.duration_secs();

    if boundaries.vad_failed {
        debug!("trim skipped: vad failed, clip treated as all-speech");
        return Ok(TrimOutcome::Unchanged);
    }

    let start_trim = (boundaries.start_time - policy.padding).clamp(0.0, policy.max_trim_start);
    let end_trim =
        (duration - boundaries.end_time - policy.padding).clamp(0.0, policy.max_trim_end);

    let remaining = duration - start_trim - end_trim;
    if remaining <= MIN_RESULT_SECS {
        debug!(remaining, "trim skipped: result would be degenerate");
        return Ok(TrimOutcome::Unchanged);
    }
    if boundaries.silence_start < MIN_EDGE_SILENCE_SECS
        && boundaries.silence_end < MIN_EDGE_SILENCE_SECS
    {
        debug!("trim skipped: both edge silences already under 100 ms");
        return Ok(TrimOutcome::Unchanged);
    }

    let rate = buffer.sample_rate() as f64;
    let start_frame = (start_trim * rate).floor() as usize;
    let end_frame = buffer
        .frames()
        .saturating_sub((end_trim * rate).floor() as usize);
    let trimmed = buffer.slice_frames(start_frame, end_frame);

    debug!(
        start_trim,
        end_trim,
        new_duration = trimmed.duration_secs(),
        "trimmed clip"
    );
    Ok(TrimOutcome::Trimmed {
        buffer: trimmed,
        trimmed_start: start_trim,
        trimmed_end: end_trim,
    })
}

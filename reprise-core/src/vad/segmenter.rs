//! Frame-probability to utterance-segment state machine.
//!
//! ## Algorithm
//!
//! 1. Score the clip frame by frame (frames of `frame_samples` each; a
//!    trailing partial frame is not scored).
//! 2. A frame at/above `positive_speech_threshold` opens a tentative
//!    utterance; `min_speech_frames` consecutive active frames confirm it.
//! 3. Inside a confirmed utterance, frames below
//!    `negative_speech_threshold` count toward `redemption_frames`; the
//!    utterance closes only once the redemption window is exhausted, so
//!    short intra-utterance pauses are bridged.
//! 4. Confirmed utterances are padded by `pre_speech_pad_frames` /
//!    `speech_pad_frames` of context, clamped to the clip.
//!
//! Frames between the two thresholds are neutral: they neither confirm nor
//! close anything (hysteresis).

use tracing::trace;

use super::{RawSegment, SpeechScorer, VadConfig, SCORER_SAMPLE_RATE};
use crate::error::Result;

/// Tracks one in-progress utterance.
struct Active {
    start_frame: usize,
    confirm_run: usize,
    confirmed: bool,
    last_speech_frame: usize,
    redemption: usize,
}

/// Run `scorer` over `samples` (mono, 16 kHz) and return confirmed segments.
///
/// # Errors
/// Propagates the first scorer failure; partial results are discarded.
pub fn segment_samples(
    scorer: &mut dyn SpeechScorer,
    samples: &[f32],
    config: &VadConfig,
) -> Result<Vec<RawSegment>> {
    let frame_len = config.frame_samples.max(1);
    let mut segments = Vec::new();
    let mut active: Option<Active> = None;

    for (idx, frame) in samples.chunks_exact(frame_len).enumerate() {
        let probability = scorer.score(frame)?;
        trace!(frame = idx, probability, "scored frame");

        match active.as_mut() {
            None => {
                if probability >= config.positive_speech_threshold {
                    let confirmed = config.min_speech_frames <= 1;
                    active = Some(Active {
                        start_frame: idx,
                        confirm_run: 1,
                        confirmed,
                        last_speech_frame: idx,
                        redemption: 0,
                    });
                }
            }
            Some(utterance) if !utterance.confirmed => {
                if probability >= config.positive_speech_threshold {
                    utterance.confirm_run += 1;
                    utterance.last_speech_frame = idx;
                    if utterance.confirm_run >= config.min_speech_frames {
                        utterance.confirmed = true;
                    }
                } else if probability < config.negative_speech_threshold {
                    // Too short to be speech — discard the tentative start.
                    active = None;
                }
            }
            Some(utterance) => {
                if probability >= config.negative_speech_threshold {
                    utterance.redemption = 0;
                    utterance.last_speech_frame = idx;
                } else {
                    utterance.redemption += 1;
                    if utterance.redemption > config.redemption_frames {
                        segments.push(padded_segment(
                            utterance.start_frame,
                            utterance.last_speech_frame,
                            samples.len(),
                            config,
                        ));
                        active = None;
                    }
                }
            }
        }
    }

    // Close an utterance still open at end of clip.
    if let Some(utterance) = active {
        if utterance.confirmed {
            segments.push(padded_segment(
                utterance.start_frame,
                utterance.last_speech_frame,
                samples.len(),
                config,
            ));
        }
    }

    Ok(segments)
}

fn padded_segment(
    start_frame: usize,
    end_frame: usize,
    total_samples: usize,
    config: &VadConfig,
) -> RawSegment {
    let frame_len = config.frame_samples.max(1);
    let start_sample = start_frame.saturating_sub(config.pre_speech_pad_frames) * frame_len;
    let end_sample = ((end_frame + 1 + config.speech_pad_frames) * frame_len).min(total_samples);
    let rate = SCORER_SAMPLE_RATE as f64;
    RawSegment {
        start_secs: start_sample as f64 / rate,
        end_secs: end_sample as f64 / rate,
        samples: end_sample.saturating_sub(start_sample),
    }
}

//! Voice Activity Detection (VAD) abstraction.
//!
//! The `SpeechScorer` trait is the primary extensibility point: the scorer is
//! a black box that rates one fixed-size frame at a time, while the
//! surrounding machinery (frame segmentation, hysteresis, pre-roll
//! correction) is shared. Swap in `EnergyScorer` (default), `SileroScorer`
//! (`onnx` feature), or any future neural scorer without touching the rest of
//! the pipeline.

pub mod adapter;
pub mod energy;
pub mod segmenter;

#[cfg(feature = "onnx")]
pub mod silero;

#[cfg(feature = "onnx")]
pub use silero::SileroScorer;

pub use adapter::{DetectOutcome, VadHandle};
pub use energy::EnergyScorer;

use crate::error::Result;

/// Fixed operating rate of every scorer. Input at other rates is resampled
/// by the adapter before scoring.
pub const SCORER_SAMPLE_RATE: u32 = 16_000;

/// Trait for all frame scorers.
///
/// Implementors may be stateful (RNN hidden states etc.); mutation is
/// serialised through the adapter's mutex.
pub trait SpeechScorer: Send + 'static {
    /// Rate one frame of mono PCM at [`SCORER_SAMPLE_RATE`] and return a
    /// speech probability in [0, 1]. The frame length must equal the
    /// configured `frame_samples`.
    fn score(&mut self, frame: &[f32]) -> Result<f32>;

    /// Reset any internal state between clips.
    fn reset(&mut self);
}

/// One detected utterance, in the caller's clip timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    /// Span in samples at the scorer's operating rate.
    pub samples: usize,
}

/// Detection tunables with documented defaults.
///
/// Frame-count fields are expressed at the scorer's 16 kHz operating rate,
/// where one 512-sample frame is 32 ms.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Probability at or above which a frame opens/continues speech.
    /// Default: 0.3.
    pub positive_speech_threshold: f32,
    /// Probability below which a frame counts toward closing speech.
    /// Must stay below the positive threshold (hysteresis). Default: 0.2.
    pub negative_speech_threshold: f32,
    /// Consecutive active frames required to confirm an utterance.
    /// Default: 3.
    pub min_speech_frames: usize,
    /// Samples per scored frame. Default: 512 (32 ms at 16 kHz).
    pub frame_samples: usize,
    /// Frames of continued silence tolerated before an utterance closes
    /// (gap bridging). Default: 32 (~1 s).
    pub redemption_frames: usize,
    /// Context frames retained before each utterance. Default: 4.
    pub pre_speech_pad_frames: usize,
    /// Context frames retained after each utterance. Default: 8.
    pub speech_pad_frames: usize,
    /// Synthetic leading silence prepended before scoring and subtracted
    /// from every returned boundary. Makes detection invariant to how much
    /// leading silence the original clip carries. Default: 320 ms.
    pub pre_roll_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            positive_speech_threshold: 0.3,
            negative_speech_threshold: 0.2,
            min_speech_frames: 3,
            frame_samples: 512,
            redemption_frames: 32,
            pre_speech_pad_frames: 4,
            speech_pad_frames: 8,
            pre_roll_ms: 320,
        }
    }
}

impl VadConfig {
    /// Clamp every field into a sane range; called at construction sites
    /// that accept caller input.
    pub fn normalize(&mut self) {
        self.positive_speech_threshold = self.positive_speech_threshold.clamp(0.05, 0.95);
        self.negative_speech_threshold = self
            .negative_speech_threshold
            .clamp(0.01, self.positive_speech_threshold - 0.01);
        self.min_speech_frames = self.min_speech_frames.clamp(1, 64);
        self.frame_samples = self.frame_samples.clamp(160, 4096);
        self.redemption_frames = self.redemption_frames.clamp(1, 256);
        self.pre_speech_pad_frames = self.pre_speech_pad_frames.min(32);
        self.speech_pad_frames = self.speech_pad_frames.min(32);
        self.pre_roll_ms = self.pre_roll_ms.min(2_000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_hysteresis_gap() {
        let cfg = VadConfig::default();
        assert!(cfg.negative_speech_threshold < cfg.positive_speech_threshold);
    }

    #[test]
    fn normalize_forces_negative_below_positive() {
        let mut cfg = VadConfig {
            positive_speech_threshold: 0.3,
            negative_speech_threshold: 0.9,
            ..VadConfig::default()
        };
        cfg.normalize();
        assert!(cfg.negative_speech_threshold < cfg.positive_speech_threshold);
    }

    #[test]
    fn normalize_bounds_frame_counts() {
        let mut cfg = VadConfig {
            min_speech_frames: 0,
            redemption_frames: 100_000,
            ..VadConfig::default()
        };
        cfg.normalize();
        assert_eq!(cfg.min_speech_frames, 1);
        assert_eq!(cfg.redemption_frames, 256);
    }
}

//! Energy-based speech scorer.
//!
//! Maps frame RMS to a pseudo-probability via `rms / (rms + pivot)`: silence
//! scores 0, a frame at the pivot level scores 0.5, loud speech approaches 1.
//! Speech/silence decisions (hysteresis, redemption) live in the segmenter —
//! this scorer is stateless.
//!
//! Always available; the fallback when no neural scorer is configured or the
//! ONNX model fails to load.

use super::SpeechScorer;
use crate::error::Result;

/// RMS level at which a frame scores 0.5. Typical quiet-microphone speech
/// sits well above 0.02.
const DEFAULT_PIVOT: f32 = 0.02;

#[derive(Debug, Clone)]
pub struct EnergyScorer {
    pivot: f32,
}

impl EnergyScorer {
    /// Create a scorer with the given RMS pivot, clamped to a usable range.
    pub fn new(pivot: f32) -> Self {
        Self {
            pivot: pivot.clamp(1e-4, 0.5),
        }
    }

    /// Compute the root-mean-square of a sample slice.
    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for EnergyScorer {
    fn default() -> Self {
        Self::new(DEFAULT_PIVOT)
    }
}

impl SpeechScorer for EnergyScorer {
    fn score(&mut self, frame: &[f32]) -> Result<f32> {
        let rms = Self::rms(frame);
        Ok(rms / (rms + self.pivot))
    }

    fn reset(&mut self) {}
}

//! Engine configuration.
//!
//! Two layers: `ProcessorConfig` is the explicit, validated struct the
//! engine runs on; `PracticeSettings` is the flat record the settings store
//! hands over (recognized keys only, camelCase, all defaulted) and converts
//! into a `ProcessorConfig`.

use serde::{Deserialize, Serialize};

use crate::align::AlignConfig;
use crate::bounds::{ALIGN_MERGE_GAP_SECS, SILENCE_MERGE_GAP_SECS};
use crate::level::NormalizationPolicy;
use crate::trim::TrimPolicy;
use crate::vad::{VadConfig, SCORER_SAMPLE_RATE};

/// Full engine configuration with documented defaults.
#[derive(Debug, Clone, Default)]
pub struct ProcessorConfig {
    pub vad: VadConfig,
    pub trim: TrimPolicy,
    pub align: AlignConfig,
    pub gain: NormalizationPolicy,
}

impl ProcessorConfig {
    /// Clamp every numeric field into its documented range.
    pub fn normalize(&mut self) {
        self.vad.normalize();
        self.trim.normalize();
        self.align.normalize();
        self.gain.normalize();
    }

    /// Merge-gap tolerance for the alignment path.
    pub fn align_merge_gap(&self) -> f64 {
        ALIGN_MERGE_GAP_SECS
    }

    /// Merge-gap tolerance for generic silence detection.
    pub fn silence_merge_gap(&self) -> f64 {
        SILENCE_MERGE_GAP_SECS
    }
}

/// Settings-store record. Unknown keys are rejected; missing keys default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default, deny_unknown_fields)]
pub struct PracticeSettings {
    /// Silence retained around speech when trimming, seconds.
    pub padding: f64,
    /// Speech probability threshold (the VAD's positive threshold).
    pub threshold: f32,
    /// Shortest utterance accepted, seconds.
    pub min_speech_duration: f64,
    /// Longest intra-utterance pause bridged, seconds.
    pub max_silence_duration: f64,
    /// Hard cap on front trimming, seconds.
    pub max_trim_start: f64,
    /// Hard cap on back trimming, seconds.
    pub max_trim_end: f64,
}

impl Default for PracticeSettings {
    fn default() -> Self {
        Self {
            padding: 0.2,
            threshold: 0.3,
            min_speech_duration: 0.096,
            max_silence_duration: 1.0,
            max_trim_start: 3.0,
            max_trim_end: 3.0,
        }
    }
}

impl PracticeSettings {
    /// Clamp caller input into usable ranges.
    pub fn normalize(&mut self) {
        self.padding = self.padding.clamp(0.0, 1.0);
        self.threshold = self.threshold.clamp(0.05, 0.95);
        self.min_speech_duration = self.min_speech_duration.clamp(0.02, 2.0);
        self.max_silence_duration = self.max_silence_duration.clamp(0.05, 5.0);
        self.max_trim_start = self.max_trim_start.clamp(0.0, 30.0);
        self.max_trim_end = self.max_trim_end.clamp(0.0, 30.0);
    }

    /// Expand into the full engine configuration.
    ///
    /// Durations become frame counts at the scorer's operating rate. The
    /// negative (release) threshold is derived as ⅔ of the positive one,
    /// preserving the default 0.3/0.2 hysteresis ratio.
    pub fn processor_config(&self) -> ProcessorConfig {
        let mut settings = self.clone();
        settings.normalize();

        let mut vad = VadConfig {
            positive_speech_threshold: settings.threshold,
            negative_speech_threshold: settings.threshold * 2.0 / 3.0,
            min_speech_frames: secs_to_frames(settings.min_speech_duration),
            redemption_frames: secs_to_frames(settings.max_silence_duration),
            ..VadConfig::default()
        };
        vad.normalize();

        let mut trim = TrimPolicy {
            padding: settings.padding,
            max_trim_start: settings.max_trim_start,
            max_trim_end: settings.max_trim_end,
        };
        trim.normalize();

        let mut config = ProcessorConfig {
            vad,
            trim,
            align: AlignConfig::default(),
            gain: NormalizationPolicy::default(),
        };
        config.normalize();
        config
    }
}

fn secs_to_frames(secs: f64) -> usize {
    let frame_secs = VadConfig::default().frame_samples as f64 / SCORER_SAMPLE_RATE as f64;
    ((secs / frame_secs).round() as usize).max(1)
}

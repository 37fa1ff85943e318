//! `VadHandle` — shared adapter around a lazily-initialized scorer.
//!
//! ## Initialization
//!
//! Scorer construction (ONNX model load) can be slow or fail outright, so it
//! happens once, on demand, under a timeout. A failed or timed-out init
//! latches the handle into a permanent unavailable state for the session —
//! every later call reports `DetectOutcome::Unavailable` without retrying
//! the expensive load, and callers fall back to treating the whole clip as
//! speech.
//!
//! ## Pre-roll correction
//!
//! Detectors are less reliable on clips with near-zero leading silence
//! (common in re-encoded MP3 sources), and different decode paths yield
//! different native rates. The adapter therefore resamples to the scorer's
//! 16 kHz operating rate, prepends `pre_roll_ms` of synthetic silence, and
//! subtracts the same amount (clamped at 0) from every returned boundary.
//! Detection behaviour is thus invariant to the clip's own leading silence.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::{energy::EnergyScorer, segmenter, RawSegment, SpeechScorer, VadConfig, SCORER_SAMPLE_RATE};
use crate::audio::{resample::resample, AudioBuffer};
use crate::error::Result;

/// How long a scorer gets to construct itself before the handle gives up.
const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one detection pass.
#[derive(Debug, Clone)]
pub enum DetectOutcome {
    /// Raw utterances in the caller's clip timeline (may be empty).
    Segments(Vec<RawSegment>),
    /// The scorer never became ready or failed mid-run; treat the clip as
    /// all-speech.
    Unavailable,
}

type ScorerFactory = dyn Fn() -> Result<Box<dyn SpeechScorer>> + Send + Sync;

enum ScorerState {
    Uninitialized,
    Ready(Box<dyn SpeechScorer>),
    Unavailable,
}

struct Inner {
    state: Mutex<ScorerState>,
    factory: Box<ScorerFactory>,
    init_timeout: Duration,
}

/// Cloneable handle to one shared scorer instance.
#[derive(Clone)]
pub struct VadHandle {
    inner: Arc<Inner>,
}

impl VadHandle {
    /// Create a handle that builds its scorer with `factory` on first use.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn SpeechScorer>> + Send + Sync + 'static,
    {
        Self::with_timeout(factory, DEFAULT_INIT_TIMEOUT)
    }

    /// As [`VadHandle::new`] with an explicit init timeout.
    pub fn with_timeout<F>(factory: F, init_timeout: Duration) -> Self
    where
        F: Fn() -> Result<Box<dyn SpeechScorer>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ScorerState::Uninitialized),
                factory: Box::new(factory),
                init_timeout,
            }),
        }
    }

    /// Handle backed by the always-available energy scorer.
    pub fn energy() -> Self {
        Self::new(|| Ok(Box::new(EnergyScorer::default())))
    }

    /// Handle backed by the Silero ONNX scorer, falling back to the default
    /// model path when `path` is `None`.
    #[cfg(feature = "onnx")]
    pub fn silero(path: Option<std::path::PathBuf>) -> Self {
        Self::new(move || {
            let path = path
                .clone()
                .unwrap_or_else(super::silero::SileroScorer::default_model_path);
            Ok(Box::new(super::silero::SileroScorer::new(path)?))
        })
    }

    /// Run the one-time scorer initialization if it has not happened yet.
    ///
    /// Returns `true` when a scorer is ready. Idempotent; a failure or
    /// timeout latches `false` permanently.
    pub async fn ensure_ready(&self) -> bool {
        {
            let state = self.inner.state.lock();
            match &*state {
                ScorerState::Ready(_) => return true,
                ScorerState::Unavailable => return false,
                ScorerState::Uninitialized => {}
            }
        }

        let inner = Arc::clone(&self.inner);
        let build = tokio::task::spawn_blocking(move || (inner.factory)());

        let built = match tokio::time::timeout(self.inner.init_timeout, build).await {
            Ok(Ok(Ok(scorer))) => Some(scorer),
            Ok(Ok(Err(e))) => {
                warn!("VAD scorer init failed: {e}");
                None
            }
            Ok(Err(join_err)) => {
                error!("VAD scorer init panicked: {join_err}");
                None
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.inner.init_timeout.as_secs_f64(),
                    "VAD scorer init timed out"
                );
                None
            }
        };

        let mut state = self.inner.state.lock();
        match (&*state, built) {
            (ScorerState::Uninitialized, Some(scorer)) => {
                *state = ScorerState::Ready(scorer);
                true
            }
            (ScorerState::Uninitialized, None) => {
                *state = ScorerState::Unavailable;
                false
            }
            // Another caller won the race; respect its result.
            (ScorerState::Ready(_), _) => true,
            (ScorerState::Unavailable, _) => false,
        }
    }

    /// Whether a scorer is currently ready (does not trigger init).
    pub fn is_available(&self) -> bool {
        matches!(&*self.inner.state.lock(), ScorerState::Ready(_))
    }

    /// Detect raw speech segments in a mono clip at any native rate.
    ///
    /// Requires a prior successful [`VadHandle::ensure_ready`]; every
    /// failure mode degrades to `DetectOutcome::Unavailable` rather than an
    /// error. Concurrent calls are safe — the scorer is serialised through
    /// the handle's mutex.
    pub fn detect_raw_segments(
        &self,
        mono: &[f32],
        sample_rate: u32,
        config: &VadConfig,
    ) -> DetectOutcome {
        if mono.is_empty() {
            return DetectOutcome::Segments(Vec::new());
        }

        // Bring the clip to the scorer's operating rate.
        let scored_samples = if sample_rate == SCORER_SAMPLE_RATE {
            mono.to_vec()
        } else {
            let buffer = match AudioBuffer::mono(mono.to_vec(), sample_rate) {
                Ok(b) => b,
                Err(e) => {
                    error!("VAD input rejected: {e}");
                    return DetectOutcome::Unavailable;
                }
            };
            match resample(&buffer, SCORER_SAMPLE_RATE) {
                Ok(b) => b.channel(0).to_vec(),
                Err(e) => {
                    error!("VAD resample failed: {e}");
                    return DetectOutcome::Unavailable;
                }
            }
        };

        // Pre-roll: synthetic leading silence.
        let pre_roll_samples = config.pre_roll_ms as usize * SCORER_SAMPLE_RATE as usize / 1000;
        let mut padded = Vec::with_capacity(pre_roll_samples + scored_samples.len());
        padded.resize(pre_roll_samples, 0.0);
        padded.extend_from_slice(&scored_samples);

        let segments = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                ScorerState::Ready(scorer) => {
                    scorer.reset();
                    match segmenter::segment_samples(scorer.as_mut(), &padded, config) {
                        Ok(segments) => segments,
                        Err(e) => {
                            error!("VAD scoring failed: {e}");
                            return DetectOutcome::Unavailable;
                        }
                    }
                }
                ScorerState::Uninitialized => {
                    warn!("detect_raw_segments called before ensure_ready");
                    return DetectOutcome::Unavailable;
                }
                ScorerState::Unavailable => return DetectOutcome::Unavailable,
            }
        };

        // Undo the pre-roll offset, clamping at zero.
        let pre_roll_secs = config.pre_roll_ms as f64 / 1000.0;
        let corrected: Vec<RawSegment> = segments
            .into_iter()
            .filter_map(|segment| {
                let start = (segment.start_secs - pre_roll_secs).max(0.0);
                let end = (segment.end_secs - pre_roll_secs).max(0.0);
                if end <= start {
                    return None;
                }
                Some(RawSegment {
                    start_secs: start,
                    end_secs: end,
                    samples: ((end - start) * SCORER_SAMPLE_RATE as f64).round() as usize,
                })
            })
            .collect();

        debug!(segments = corrected.len(), "VAD detection complete");
        DetectOutcome::Segments(corrected)
    }
}

impl std::fmt::Debug for VadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VadHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepriseError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tone_clip(lead_secs: f64, tone_secs: f64, tail_secs: f64) -> Vec<f32> {
        let rate = SCORER_SAMPLE_RATE as f64;
        let mut samples = vec![0.0f32; (lead_secs * rate) as usize];
        let tone_len = (tone_secs * rate) as usize;
        samples.extend((0..tone_len).map(|i| {
            (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin() * 0.5
        }));
        samples.extend(vec![0.0f32; (tail_secs * rate) as usize]);
        samples
    }

    #[tokio::test]
    async fn energy_handle_detects_tone_burst() {
        let handle = VadHandle::energy();
        assert!(handle.ensure_ready().await);

        let clip = tone_clip(1.0, 0.5, 0.5);
        let outcome = handle.detect_raw_segments(&clip, SCORER_SAMPLE_RATE, &VadConfig::default());

        let segments = match outcome {
            DetectOutcome::Segments(s) => s,
            DetectOutcome::Unavailable => panic!("energy scorer should be available"),
        };
        assert_eq!(segments.len(), 1);
        // Pads pull the start earlier by up to pre_speech_pad_frames (128 ms).
        assert!(
            (segments[0].start_secs - 1.0).abs() < 0.2,
            "start={}",
            segments[0].start_secs
        );
        assert!(
            (segments[0].end_secs - 1.5).abs() < 0.3,
            "end={}",
            segments[0].end_secs
        );
    }

    #[tokio::test]
    async fn detection_is_invariant_to_leading_silence() {
        let handle = VadHandle::energy();
        assert!(handle.ensure_ready().await);
        let config = VadConfig::default();

        let no_lead = tone_clip(0.0, 0.5, 0.5);
        let with_lead = tone_clip(1.0, 0.5, 0.5);

        let start_of = |clip: &[f32]| match handle.detect_raw_segments(
            clip,
            SCORER_SAMPLE_RATE,
            &config,
        ) {
            DetectOutcome::Segments(s) => s[0].start_secs,
            DetectOutcome::Unavailable => panic!("unavailable"),
        };

        let start_a = start_of(&no_lead);
        let start_b = start_of(&with_lead);
        // The reported starts differ by exactly the extra lead, within
        // frame + pad tolerance.
        assert!(
            ((start_b - start_a) - 1.0).abs() < 0.2,
            "start_a={start_a} start_b={start_b}"
        );
    }

    #[tokio::test]
    async fn native_rate_input_is_resampled_before_scoring() {
        let handle = VadHandle::energy();
        assert!(handle.ensure_ready().await);

        // Same shape at 48 kHz: boundaries still come back in seconds.
        let rate = 48_000f64;
        let mut clip = vec![0.0f32; (1.0 * rate) as usize];
        clip.extend(
            (0..(0.5 * rate) as usize)
                .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin() * 0.5),
        );
        clip.extend(vec![0.0f32; (0.5 * rate) as usize]);

        let outcome = handle.detect_raw_segments(&clip, 48_000, &VadConfig::default());
        let segments = match outcome {
            DetectOutcome::Segments(s) => s,
            DetectOutcome::Unavailable => panic!("unavailable"),
        };
        assert_eq!(segments.len(), 1);
        assert!((segments[0].start_secs - 1.0).abs() < 0.2);
    }

    #[tokio::test]
    async fn failed_factory_latches_unavailable_without_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_factory = Arc::clone(&calls);
        let handle = VadHandle::new(move || {
            calls_in_factory.fetch_add(1, Ordering::SeqCst);
            Err(RepriseError::VadUnavailable("no model".into()))
        });

        assert!(!handle.ensure_ready().await);
        assert!(!handle.ensure_ready().await);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "factory must not be retried");

        let outcome = handle.detect_raw_segments(&[0.1; 1600], SCORER_SAMPLE_RATE, &VadConfig::default());
        assert!(matches!(outcome, DetectOutcome::Unavailable));
    }

    #[tokio::test]
    async fn slow_factory_times_out_and_latches() {
        let handle = VadHandle::with_timeout(
            || {
                std::thread::sleep(Duration::from_millis(250));
                Ok(Box::new(EnergyScorer::default()) as Box<dyn SpeechScorer>)
            },
            Duration::from_millis(20),
        );
        assert!(!handle.ensure_ready().await);
        assert!(!handle.is_available());
    }

    #[tokio::test]
    async fn silent_clip_yields_empty_segments() {
        let handle = VadHandle::energy();
        assert!(handle.ensure_ready().await);
        let outcome =
            handle.detect_raw_segments(&vec![0.0; 16_000], SCORER_SAMPLE_RATE, &VadConfig::default());
        match outcome {
            DetectOutcome::Segments(s) => assert!(s.is_empty()),
            DetectOutcome::Unavailable => panic!("unavailable"),
        }
    }
}

//! `ClipProcessor` — the explicitly constructed context object tying the
//! pipeline together.
//!
//! ## Pipeline (per clip)
//!
//! ```text
//! bytes ─► decode ─► VAD detect ─► resolve boundaries ─► trim | align ─► encode ─► bytes
//! ```
//!
//! The processor owns the shared `VadHandle`, the validated configuration,
//! and the level cache; the leaf algorithms stay pure functions. Heavy
//! per-sample work runs under `spawn_blocking` so the async executor stays
//! free for the host's I/O.
//!
//! ## Failure policy
//!
//! Decode failures are terminal for that clip and propagate. Everything
//! else degrades to pass-through: an unavailable/failed VAD yields full-clip
//! boundaries, a degenerate trim returns the original blob, and any error
//! inside `align_pair` falls back to both original blobs tagged
//! `error_fallback`. Availability beats trimming quality.

use serde::Serialize;
use tokio::task;
use tracing::{debug, info, warn};

use crate::align::{self, AlignmentInfo, AlignmentMethod, ClipInput};
use crate::audio::{codec, AudioBuffer};
use crate::bounds::{self, BoundaryOutcome, SpeechBoundaries};
use crate::config::ProcessorConfig;
use crate::error::{RepriseError, Result};
use crate::level::{self, AudioLevelInfo, GainPair, LevelCache, LevelCacheKey};
use crate::trim::{self, TrimOutcome, TrimResult};
use crate::vad::{DetectOutcome, VadHandle};

/// Output of one two-clip alignment pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentResult {
    #[serde(skip)]
    pub target_wav: Vec<u8>,
    #[serde(skip)]
    pub attempt_wav: Vec<u8>,
    #[serde(flatten)]
    pub info: AlignmentInfo,
}

/// A clip that already went through a pipeline stage, carried forward so a
/// later `align` call can skip re-normalization.
#[derive(Debug, Clone)]
pub struct PreparedClip {
    pub wav: Vec<u8>,
    pub boundaries: SpeechBoundaries,
    pub already_normalized: bool,
}

/// One engine instance. Host applications construct exactly one and share
/// it; two independent clip pipelines may run on it concurrently and only
/// join at `align_pair`.
pub struct ClipProcessor {
    vad: VadHandle,
    config: ProcessorConfig,
    levels: LevelCache,
}

impl ClipProcessor {
    /// Processor backed by the default energy scorer.
    pub fn new(mut config: ProcessorConfig) -> Self {
        config.normalize();
        Self {
            vad: VadHandle::energy(),
            config,
            levels: LevelCache::default(),
        }
    }

    /// Processor with a caller-supplied VAD handle (e.g. Silero).
    pub fn with_vad(mut config: ProcessorConfig, vad: VadHandle) -> Self {
        config.normalize();
        Self {
            vad,
            config,
            levels: LevelCache::default(),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Decode a blob off the async executor.
    async fn decode(&self, bytes: Vec<u8>) -> Result<AudioBuffer> {
        task::spawn_blocking(move || codec::decode(bytes, None))
            .await
            .map_err(task_died)?
    }

    /// Run detection + resolution for one decoded clip.
    async fn detect_outcome(&self, buffer: &AudioBuffer, merge_gap: f64) -> BoundaryOutcome {
        if !self.vad.ensure_ready().await {
            return BoundaryOutcome::Unavailable;
        }

        let mono = buffer.mono_mixdown();
        let sample_rate = buffer.sample_rate();
        let duration = buffer.duration_secs();
        let vad = self.vad.clone();
        let vad_config = self.config.vad.clone();

        let joined = task::spawn_blocking(move || {
            match vad.detect_raw_segments(&mono, sample_rate, &vad_config) {
                DetectOutcome::Unavailable => BoundaryOutcome::Unavailable,
                DetectOutcome::Segments(segments) => {
                    bounds::resolve(&segments, duration, sample_rate, merge_gap)
                }
            }
        })
        .await;

        match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("VAD task died: {e}");
                BoundaryOutcome::Unavailable
            }
        }
    }

    /// Decode + detect, never failing: decode errors, an unavailable VAD,
    /// and a speechless clip all collapse into a full-clip `vad_failed`
    /// record (decode errors additionally carry their message).
    pub async fn detect_speech_boundaries(&self, bytes: Vec<u8>) -> SpeechBoundaries {
        let buffer = match self.decode(bytes).await {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("decode failed, falling back to full-clip boundaries: {e}");
                return SpeechBoundaries::full_clip(0.0, 0, Some(e.to_string()));
            }
        };
        let outcome = self
            .detect_outcome(&buffer, self.config.align_merge_gap())
            .await;
        outcome.into_boundaries(buffer.duration_secs(), buffer.sample_rate())
    }

    /// Decode + detect, propagating decode failures (terminal per clip).
    pub async fn analyze(&self, bytes: Vec<u8>) -> Result<(AudioBuffer, BoundaryOutcome)> {
        let buffer = self.decode(bytes).await?;
        let outcome = self
            .detect_outcome(&buffer, self.config.silence_merge_gap())
            .await;
        Ok((buffer, outcome))
    }

    /// Trim edge silence within the configured safety caps.
    ///
    /// When nothing is cut the original blob comes back byte-identical with
    /// zero trim amounts.
    pub async fn trim_silence(&self, bytes: Vec<u8>) -> Result<TrimResult> {
        let original = bytes.clone();
        let buffer = self.decode(bytes).await?;
        let outcome = self
            .detect_outcome(&buffer, self.config.silence_merge_gap())
            .await;
        let boundaries = outcome.into_boundaries(buffer.duration_secs(), buffer.sample_rate());

        let policy = self.config.trim.clone();
        let original_duration = buffer.duration_secs();
        task::spawn_blocking(move || match trim::trim(&buffer, &boundaries, &policy)? {
            TrimOutcome::Unchanged => {
                debug!("trim pass left the clip untouched");
                Ok(TrimResult {
                    wav: original,
                    trimmed_start: 0.0,
                    trimmed_end: 0.0,
                    original_duration,
                    new_duration: original_duration,
                    boundaries,
                })
            }
            TrimOutcome::Trimmed {
                buffer: trimmed,
                trimmed_start,
                trimmed_end,
            } => {
                let new_duration = trimmed.duration_secs();
                let wav = codec::encode_wav(&trimmed)?;
                info!(
                    trimmed_start,
                    trimmed_end, new_duration, "trimmed clip re-encoded"
                );
                Ok(TrimResult {
                    wav,
                    trimmed_start,
                    trimmed_end,
                    original_duration,
                    new_duration,
                    boundaries,
                })
            }
        })
        .await
        .map_err(task_died)?
    }

    /// Onset-normalize a single clip so a later `align_prepared` call can
    /// skip re-processing it.
    pub async fn normalize_clip(&self, bytes: Vec<u8>) -> Result<PreparedClip> {
        let buffer = self.decode(bytes).await?;
        let outcome = self
            .detect_outcome(&buffer, self.config.align_merge_gap())
            .await;
        let boundaries = outcome.into_boundaries(buffer.duration_secs(), buffer.sample_rate());

        let padding_ms = self.config.align.padding_ms;
        task::spawn_blocking(move || {
            let normalized = align::normalize_onset(&buffer, &boundaries, padding_ms)?;
            let new_boundaries = align::normalized_boundaries(&boundaries, &normalized, padding_ms);
            let wav = codec::encode_wav(&normalized)?;
            Ok(PreparedClip {
                wav,
                boundaries: new_boundaries,
                already_normalized: true,
            })
        })
        .await
        .map_err(task_died)?
    }

    /// Align a target/attempt pair from raw blobs.
    ///
    /// Infallible by contract: any decode/processing error yields both
    /// original blobs tagged `error_fallback` — alignment failures must
    /// never break playback, only degrade to "unaligned".
    pub async fn align_pair(&self, target: Vec<u8>, attempt: Vec<u8>) -> AlignmentResult {
        let target_original = target.clone();
        let attempt_original = attempt.clone();
        match self.try_align(target, attempt).await {
            Ok(result) => result,
            Err(e) => {
                warn!("alignment failed, passing originals through: {e}");
                fallback_result(target_original, attempt_original, e)
            }
        }
    }

    /// Align clips that earlier stages already detected/normalized.
    pub async fn align_prepared(
        &self,
        target: PreparedClip,
        attempt: PreparedClip,
    ) -> AlignmentResult {
        let target_original = target.wav.clone();
        let attempt_original = attempt.wav.clone();
        match self.try_align_prepared(target, attempt).await {
            Ok(result) => result,
            Err(e) => {
                warn!("alignment failed, passing originals through: {e}");
                fallback_result(target_original, attempt_original, e)
            }
        }
    }

    async fn try_align(&self, target: Vec<u8>, attempt: Vec<u8>) -> Result<AlignmentResult> {
        let target_buffer = self.decode(target).await?;
        let attempt_buffer = self.decode(attempt).await?;

        let merge_gap = self.config.align_merge_gap();
        let target_outcome = self.detect_outcome(&target_buffer, merge_gap).await;
        let attempt_outcome = self.detect_outcome(&attempt_buffer, merge_gap).await;

        let target_clip = ClipInput {
            boundaries: target_outcome
                .into_boundaries(target_buffer.duration_secs(), target_buffer.sample_rate()),
            buffer: target_buffer,
            already_normalized: false,
        };
        let attempt_clip = ClipInput {
            boundaries: attempt_outcome
                .into_boundaries(attempt_buffer.duration_secs(), attempt_buffer.sample_rate()),
            buffer: attempt_buffer,
            already_normalized: false,
        };

        self.run_alignment(target_clip, attempt_clip).await
    }

    async fn try_align_prepared(
        &self,
        target: PreparedClip,
        attempt: PreparedClip,
    ) -> Result<AlignmentResult> {
        let target_clip = ClipInput {
            buffer: codec::decode_wav(&target.wav)?,
            boundaries: target.boundaries,
            already_normalized: target.already_normalized,
        };
        let attempt_clip = ClipInput {
            buffer: codec::decode_wav(&attempt.wav)?,
            boundaries: attempt.boundaries,
            already_normalized: attempt.already_normalized,
        };
        self.run_alignment(target_clip, attempt_clip).await
    }

    async fn run_alignment(
        &self,
        target: ClipInput,
        attempt: ClipInput,
    ) -> Result<AlignmentResult> {
        let align_config = self.config.align.clone();
        task::spawn_blocking(move || {
            let pair = align::align_clips(&target, &attempt, &align_config)?;
            let target_wav = codec::encode_wav(&pair.target)?;
            let attempt_wav = codec::encode_wav(&pair.attempt)?;
            info!(
                method = ?pair.method,
                padding_added = pair.padding_added,
                final_duration = pair.final_duration,
                "aligned pair"
            );
            Ok(AlignmentResult {
                target_wav,
                attempt_wav,
                info: AlignmentInfo {
                    padding_added: pair.padding_added,
                    final_duration: pair.final_duration,
                    method: pair.method,
                    error: None,
                },
            })
        })
        .await
        .map_err(task_died)?
    }

    /// Measure levels, memoized by blob size + kind + timestamp.
    pub async fn measure_levels(
        &self,
        bytes: Vec<u8>,
        kind: &str,
        timestamp_ms: i64,
    ) -> Result<AudioLevelInfo> {
        let key = LevelCacheKey {
            len: bytes.len(),
            kind: kind.to_string(),
            timestamp_ms,
        };
        if let Some(hit) = self.levels.get(&key) {
            debug!(kind, "level cache hit");
            return Ok(hit);
        }

        let buffer = self.decode(bytes).await?;
        let info = task::spawn_blocking(move || level::measure(&buffer, timestamp_ms))
            .await
            .map_err(task_died)?;
        self.levels.insert(key, info.clone());
        Ok(info)
    }

    /// Playback gains steering both clips toward the configured reference.
    pub fn normalization_gains(
        &self,
        target: &AudioLevelInfo,
        user: &AudioLevelInfo,
    ) -> GainPair {
        level::normalization_gains(target, user, &self.config.gain)
    }
}

fn fallback_result(target_wav: Vec<u8>, attempt_wav: Vec<u8>, error: RepriseError) -> AlignmentResult {
    AlignmentResult {
        target_wav,
        attempt_wav,
        info: AlignmentInfo {
            padding_added: 0.0,
            final_duration: 0.0,
            method: AlignmentMethod::ErrorFallback,
            error: Some(error.to_string()),
        },
    }
}

fn task_died(e: tokio::task::JoinError) -> RepriseError {
    RepriseError::Other(anyhow::anyhow!("worker task died: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone_wav(duration_secs: f64, lead_silence_secs: f64) -> Vec<u8> {
        let rate = 16_000u32;
        let mut samples = vec![0.0f32; (lead_silence_secs * rate as f64) as usize];
        let tone_frames = (duration_secs * rate as f64) as usize;
        samples.extend((0..tone_frames).map(|i| {
            (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin() * 0.5
        }));
        let buffer = AudioBuffer::mono(samples, rate).expect("valid");
        codec::encode_wav(&buffer).expect("encode")
    }

    #[tokio::test]
    async fn zero_byte_blob_yields_vad_failed_fallback() {
        let processor = ClipProcessor::new(ProcessorConfig::default());
        let boundaries = processor.detect_speech_boundaries(Vec::new()).await;
        assert!(boundaries.vad_failed);
        assert_eq!(boundaries.start_time, 0.0);
        assert!(boundaries.error.is_some());
    }

    #[tokio::test]
    async fn garbage_blob_fails_trim_with_decode_error() {
        let processor = ClipProcessor::new(ProcessorConfig::default());
        let err = processor
            .trim_silence(vec![1, 2, 3, 4, 5])
            .await
            .unwrap_err();
        assert!(matches!(err, RepriseError::Decode(_)));
    }

    #[tokio::test]
    async fn garbage_blobs_align_to_error_fallback() {
        let processor = ClipProcessor::new(ProcessorConfig::default());
        let target = vec![9u8; 32];
        let attempt = vec![7u8; 16];
        let result = processor.align_pair(target.clone(), attempt.clone()).await;
        assert_eq!(result.info.method, AlignmentMethod::ErrorFallback);
        assert!(result.info.error.is_some());
        assert_eq!(result.target_wav, target);
        assert_eq!(result.attempt_wav, attempt);
    }

    #[tokio::test]
    async fn unavailable_vad_trims_nothing() {
        let vad = VadHandle::new(|| {
            Err(RepriseError::VadUnavailable("forced unavailable".into()))
        });
        let processor = ClipProcessor::with_vad(ProcessorConfig::default(), vad);

        let wav = tone_wav(1.0, 1.0);
        let result = processor.trim_silence(wav.clone()).await.expect("trim");
        assert_eq!(result.trimmed_start, 0.0);
        assert_eq!(result.trimmed_end, 0.0);
        assert!(result.boundaries.vad_failed);
        assert_eq!(result.wav, wav, "original blob must come back untouched");
    }

    #[tokio::test]
    async fn unavailable_vad_reports_full_clip_boundaries() {
        let vad = VadHandle::new(|| {
            Err(RepriseError::VadUnavailable("forced unavailable".into()))
        });
        let processor = ClipProcessor::with_vad(ProcessorConfig::default(), vad);

        let wav = tone_wav(1.0, 0.5);
        let boundaries = processor.detect_speech_boundaries(wav).await;
        assert!(boundaries.vad_failed);
        assert_eq!(boundaries.start_time, 0.0);
        assert!((boundaries.end_time - 1.5).abs() < 1e-3);
    }

    #[tokio::test]
    async fn level_cache_serves_repeat_measurements() {
        let processor = ClipProcessor::new(ProcessorConfig::default());
        let wav = tone_wav(0.5, 0.0);

        let first = processor
            .measure_levels(wav.clone(), "target", 1_000)
            .await
            .expect("measure");
        let second = processor
            .measure_levels(wav, "target", 1_000)
            .await
            .expect("measure");
        assert_eq!(first.rms, second.rms);
        assert_eq!(first.timestamp, second.timestamp);
    }
}

//! Whole-buffer level measurement: RMS, peak, and LUFS-style integrated
//! loudness, plus cross-clip gain normalization.
//!
//! LUFS here is a block-based estimate (400 ms blocks, 75 % overlap),
//! integrated by averaging block energies in the loudness domain — close
//! enough to BS.1770 for matching two practice clips, with no gating beyond
//! dropping digitally silent blocks.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::AudioBuffer;

/// LUFS analysis block length.
pub const LUFS_BLOCK_SECS: f64 = 0.4;
/// Hop between successive blocks (75 % overlap).
pub const LUFS_HOP_SECS: f64 = 0.1;

/// Immutable level snapshot for one clip.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioLevelInfo {
    pub rms: f64,
    pub peak: f64,
    pub duration: f64,
    pub sample_rate: u32,
    /// `-inf` for digital silence.
    pub lufs: f64,
    /// Caller-supplied blob timestamp (milliseconds) used as a cache key
    /// component.
    pub timestamp: i64,
}

/// Root-mean-square over all channels and samples combined.
pub fn rms(buffer: &AudioBuffer) -> f64 {
    let total: usize = buffer.channels().iter().map(Vec::len).sum();
    if total == 0 {
        return 0.0;
    }
    let sum_sq: f64 = buffer
        .channels()
        .iter()
        .flat_map(|plane| plane.iter())
        .map(|s| f64::from(*s) * f64::from(*s))
        .sum();
    (sum_sq / total as f64).sqrt()
}

/// Maximum absolute sample value over all channels.
pub fn peak(buffer: &AudioBuffer) -> f64 {
    buffer
        .channels()
        .iter()
        .flat_map(|plane| plane.iter())
        .map(|s| f64::from(s.abs()))
        .fold(0.0, f64::max)
}

/// Block-based integrated loudness estimate.
///
/// Returns `f64::NEG_INFINITY` when no block carries energy (silence or an
/// empty buffer). Clips shorter than one block are measured as a single
/// whole-clip block.
pub fn lufs(buffer: &AudioBuffer) -> f64 {
    let frames = buffer.frames();
    if frames == 0 {
        return f64::NEG_INFINITY;
    }
    let rate = buffer.sample_rate() as f64;
    let block = ((LUFS_BLOCK_SECS * rate) as usize).max(1);
    let hop = ((LUFS_HOP_SECS * rate) as usize).max(1);

    let mut energies: Vec<f64> = Vec::new();
    let mut push_block = |start: usize, end: usize| {
        let mean_square = block_mean_square(buffer, start, end);
        if mean_square > 0.0 {
            let block_lufs = -0.691 + 10.0 * mean_square.log10();
            energies.push(10f64.powf(block_lufs / 10.0));
        }
    };

    if frames < block {
        push_block(0, frames);
    } else {
        let mut start = 0;
        while start + block <= frames {
            push_block(start, start + block);
            start += hop;
        }
    }

    if energies.is_empty() {
        return f64::NEG_INFINITY;
    }
    let mean_energy = energies.iter().sum::<f64>() / energies.len() as f64;
    10.0 * mean_energy.log10()
}

fn block_mean_square(buffer: &AudioBuffer, start: usize, end: usize) -> f64 {
    let span = end - start;
    if span == 0 {
        return 0.0;
    }
    let count = span * buffer.channel_count();
    let sum_sq: f64 = buffer
        .channels()
        .iter()
        .flat_map(|plane| plane[start..end].iter())
        .map(|s| f64::from(*s) * f64::from(*s))
        .sum();
    sum_sq / count as f64
}

/// Measure everything, stamped with the current wall-clock time. For blobs
/// with a known origin time (file mtime, recorder timestamp) prefer
/// [`measure`] so cache keys stay stable across re-reads.
pub fn measure_now(buffer: &AudioBuffer) -> AudioLevelInfo {
    measure(buffer, chrono::Utc::now().timestamp_millis())
}

/// Measure everything at once.
pub fn measure(buffer: &AudioBuffer, timestamp_ms: i64) -> AudioLevelInfo {
    let info = AudioLevelInfo {
        rms: rms(buffer),
        peak: peak(buffer),
        duration: buffer.duration_secs(),
        sample_rate: buffer.sample_rate(),
        lufs: lufs(buffer),
        timestamp: timestamp_ms,
    };
    debug!(
        rms = info.rms,
        peak = info.peak,
        lufs = info.lufs,
        "measured clip levels"
    );
    info
}

/// Which clip's loudness anchors the shared playback reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceMode {
    /// Anchor on the target (reference) clip.
    Target,
    /// Anchor on the user's attempt.
    User,
    /// Split the difference — unless the clips diverge wildly.
    Average,
}

/// Gain-normalization tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct NormalizationPolicy {
    /// Loudness the pair is steered toward. Default: −18 LUFS.
    pub target_lufs: f64,
    /// Cap on amplification. Attenuation is uncapped downward but floored
    /// at 0.1 (−20 dB). Default: 4.
    pub max_gain: f64,
    pub balance_mode: BalanceMode,
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        Self {
            target_lufs: -18.0,
            max_gain: 4.0,
            balance_mode: BalanceMode::Average,
        }
    }
}

impl NormalizationPolicy {
    pub fn normalize(&mut self) {
        self.target_lufs = self.target_lufs.clamp(-36.0, -6.0);
        self.max_gain = self.max_gain.clamp(1.0, 10.0);
    }
}

/// If the two clips' loudness differs by more than this, `Average` mode pins
/// to `target_lufs` instead of letting one outlier drag the reference.
const AVERAGE_DIVERGENCE_DB: f64 = 12.0;
/// A chosen reference further than this from `target_lufs` is clamped to it.
const REFERENCE_WINDOW_DB: f64 = 6.0;
/// Attenuation floor: never drop a clip below −20 dB of its original level.
const MIN_GAIN: f64 = 0.1;

/// Per-clip playback gains.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GainPair {
    pub target_gain: f64,
    pub user_gain: f64,
}

/// Compute playback gains steering both clips toward one shared reference.
pub fn normalization_gains(
    target: &AudioLevelInfo,
    user: &AudioLevelInfo,
    policy: &NormalizationPolicy,
) -> GainPair {
    let mut reference = match policy.balance_mode {
        BalanceMode::Target => target.lufs,
        BalanceMode::User => user.lufs,
        BalanceMode::Average => {
            if (target.lufs - user.lufs).abs() > AVERAGE_DIVERGENCE_DB {
                policy.target_lufs
            } else {
                (target.lufs + user.lufs) / 2.0
            }
        }
    };
    if !reference.is_finite() {
        reference = policy.target_lufs;
    }
    if (reference - policy.target_lufs).abs() > REFERENCE_WINDOW_DB {
        reference = policy.target_lufs;
    }

    GainPair {
        target_gain: gain_toward(reference, target.lufs, policy.max_gain),
        user_gain: gain_toward(reference, user.lufs, policy.max_gain),
    }
}

fn gain_toward(reference: f64, clip_lufs: f64, max_gain: f64) -> f64 {
    10f64.powf((reference - clip_lufs) / 20.0).clamp(MIN_GAIN, max_gain)
}

/// Best-effort snapshot cache keyed by blob size + kind + timestamp.
///
/// Not content-addressed: a re-recorded blob with identical length, kind and
/// timestamp would collide, which is acceptable for a UI-side memo.
#[derive(Default)]
pub struct LevelCache {
    entries: Mutex<HashMap<LevelCacheKey, AudioLevelInfo>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LevelCacheKey {
    pub len: usize,
    pub kind: String,
    pub timestamp_ms: i64,
}

/// Cache entries kept before the map is dropped wholesale.
const CACHE_CAPACITY: usize = 64;

impl LevelCache {
    pub fn get(&self, key: &LevelCacheKey) -> Option<AudioLevelInfo> {
        self.entries.lock().get(key).cloned()
    }

    pub fn insert(&self, key: LevelCacheKey, info: AudioLevelInfo) {
        let mut entries = self.entries.lock();
        if entries.len() >= CACHE_CAPACITY {
            entries.clear();
        }
        entries.insert(key, info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tone(duration_secs: f64, amplitude: f32) -> AudioBuffer {
        let rate = 48_000u32;
        let frames = (duration_secs * rate as f64) as usize;
        let samples = (0..frames)
            .map(|i| {
                (2.0 * std::f32::consts::PI * 997.0 * i as f32 / rate as f32).sin() * amplitude
            })
            .collect();
        AudioBuffer::mono(samples, rate).expect("valid")
    }

    fn level_with_lufs(lufs: f64) -> AudioLevelInfo {
        AudioLevelInfo {
            rms: 0.1,
            peak: 0.5,
            duration: 1.0,
            sample_rate: 48_000,
            lufs,
            timestamp: 0,
        }
    }

    #[test]
    fn silent_clip_has_negative_infinity_lufs() {
        let silent = AudioBuffer::mono(vec![0.0; 48_000], 48_000).expect("valid");
        assert_eq!(lufs(&silent), f64::NEG_INFINITY);
    }

    #[test]
    fn empty_buffer_has_negative_infinity_lufs() {
        let empty = AudioBuffer::mono(Vec::new(), 48_000).expect("valid");
        assert_eq!(lufs(&empty), f64::NEG_INFINITY);
    }

    #[test]
    fn sine_rms_matches_theory() {
        // RMS of a sine at amplitude a is a/√2.
        let buffer = tone(1.0, 0.5);
        assert_relative_eq!(rms(&buffer), 0.5 / 2f64.sqrt(), epsilon = 1e-3);
    }

    #[test]
    fn peak_finds_largest_magnitude() {
        let buffer = AudioBuffer::new(
            vec![vec![0.1, -0.8, 0.2], vec![0.3, 0.4, -0.5]],
            16_000,
        )
        .expect("valid");
        assert_relative_eq!(peak(&buffer), 0.8);
    }

    #[test]
    fn louder_tone_measures_higher_lufs() {
        let quiet = lufs(&tone(1.0, 0.05));
        let loud = lufs(&tone(1.0, 0.5));
        assert!(loud > quiet);
        // 20 dB apart in amplitude → 20 LU apart in loudness.
        assert_relative_eq!(loud - quiet, 20.0, epsilon = 0.1);
    }

    #[test]
    fn short_clip_is_measured_as_one_block() {
        // 100 ms clip — shorter than one 400 ms block, still finite.
        let short = tone(0.1, 0.3);
        assert!(lufs(&short).is_finite());
    }

    #[test]
    fn gains_stay_within_bounds_for_extreme_inputs() {
        let policy = NormalizationPolicy::default();
        let cases = [
            (level_with_lufs(-60.0), level_with_lufs(-5.0)),
            (level_with_lufs(f64::NEG_INFINITY), level_with_lufs(-18.0)),
            (level_with_lufs(-18.0), level_with_lufs(f64::NEG_INFINITY)),
            (level_with_lufs(-18.0), level_with_lufs(-18.0)),
        ];
        for (a, b) in cases {
            let gains = normalization_gains(&a, &b, &policy);
            assert!(gains.target_gain >= MIN_GAIN && gains.target_gain <= policy.max_gain);
            assert!(gains.user_gain >= MIN_GAIN && gains.user_gain <= policy.max_gain);
        }
    }

    #[test]
    fn matched_clips_get_unity_gains() {
        let policy = NormalizationPolicy::default();
        let gains = normalization_gains(
            &level_with_lufs(-18.0),
            &level_with_lufs(-18.0),
            &policy,
        );
        assert_relative_eq!(gains.target_gain, 1.0, epsilon = 1e-9);
        assert_relative_eq!(gains.user_gain, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn average_mode_pins_to_target_on_wide_divergence() {
        // 20 dB apart: averaging would land at −28; instead the reference
        // pins to target_lufs and both gains steer toward −18.
        let policy = NormalizationPolicy::default();
        let gains = normalization_gains(
            &level_with_lufs(-18.0),
            &level_with_lufs(-38.0),
            &policy,
        );
        assert_relative_eq!(gains.target_gain, 1.0, epsilon = 1e-9);
        assert_relative_eq!(gains.user_gain, policy.max_gain, epsilon = 1e-9);
    }

    #[test]
    fn reference_outside_window_clamps_to_target() {
        // Both clips at −30: average is −30, which is 12 dB below the −18
        // target — outside the ±6 window, so the reference clamps to −18
        // and both clips are boosted.
        let policy = NormalizationPolicy::default();
        let gains = normalization_gains(
            &level_with_lufs(-30.0),
            &level_with_lufs(-30.0),
            &policy,
        );
        assert!(gains.target_gain > 1.0);
        assert_relative_eq!(gains.target_gain, gains.user_gain);
    }

    #[test]
    fn user_mode_anchors_on_attempt() {
        let policy = NormalizationPolicy {
            balance_mode: BalanceMode::User,
            ..NormalizationPolicy::default()
        };
        // User at −20 (within the window): target at −26 gets boosted
        // toward it, user stays at unity.
        let gains = normalization_gains(
            &level_with_lufs(-26.0),
            &level_with_lufs(-20.0),
            &policy,
        );
        assert_relative_eq!(gains.user_gain, 1.0, epsilon = 1e-9);
        assert_relative_eq!(gains.target_gain, 10f64.powf(6.0 / 20.0), epsilon = 1e-9);
    }

    #[test]
    fn cache_round_trips_by_key() {
        let cache = LevelCache::default();
        let key = LevelCacheKey {
            len: 1234,
            kind: "target".into(),
            timestamp_ms: 42,
        };
        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), level_with_lufs(-18.0));
        let hit = cache.get(&key).expect("cache hit");
        assert_relative_eq!(hit.lufs, -18.0);

        let other = LevelCacheKey {
            len: 1234,
            kind: "user".into(),
            timestamp_ms: 42,
        };
        assert!(cache.get(&other).is_none());
    }
}

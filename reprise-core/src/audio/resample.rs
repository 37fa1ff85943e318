//! Offline sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Browser decode paths hand us clips at whatever rate the capture device
//! used (44.1 kHz and 48 kHz being the usual suspects) while the VAD scorer
//! operates at a fixed 16 kHz. This converter runs over a complete buffer in
//! one call: the input is fed to rubato in fixed chunks, the tail is
//! zero-padded, and the output is cut to exactly the expected frame count
//! after dropping the resampler's startup delay. Duration is therefore
//! preserved within one sample.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::audio::AudioBuffer;
use crate::error::{RepriseError, Result};

/// Input frames per rubato call.
const CHUNK: usize = 1024;

/// Resample a whole buffer to `target_rate`, preserving channel count.
///
/// Same-rate input is returned as a plain copy — no rubato session is
/// created at all.
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if target_rate == 0 {
        return Err(RepriseError::Resample("target rate is zero".into()));
    }
    if buffer.sample_rate() == target_rate {
        return Ok(buffer.clone());
    }
    let channel_count = buffer.channel_count();
    if buffer.is_empty() {
        return AudioBuffer::new(vec![Vec::new(); channel_count], target_rate);
    }

    let ratio = target_rate as f64 / buffer.sample_rate() as f64;
    let expected_frames = (buffer.frames() as f64 * ratio).round() as usize;

    let mut resampler = FastFixedIn::<f32>::new(
        ratio,
        1.0, // fixed ratio — no dynamic adjustment
        PolynomialDegree::Cubic,
        CHUNK,
        channel_count,
    )
    .map_err(|e| RepriseError::Resample(format!("resampler init: {e}")))?;

    let delay = resampler.output_delay();
    let needed = expected_frames + delay;
    let max_out = resampler.output_frames_max();
    let mut out_scratch = vec![vec![0f32; max_out]; channel_count];
    let mut collected: Vec<Vec<f32>> = vec![Vec::with_capacity(needed); channel_count];

    // Enough chunks to cover the input plus the startup delay flush.
    let max_iterations = buffer.frames() / CHUNK + delay / CHUNK + 8;
    let mut position = 0usize;
    for _ in 0..max_iterations {
        if collected[0].len() >= needed {
            break;
        }

        let mut input: Vec<Vec<f32>> = Vec::with_capacity(channel_count);
        for ch in 0..channel_count {
            let plane = buffer.channel(ch);
            let mut chunk = if position < plane.len() {
                plane[position..(position + CHUNK).min(plane.len())].to_vec()
            } else {
                Vec::new()
            };
            chunk.resize(CHUNK, 0.0);
            input.push(chunk);
        }
        position += CHUNK;

        let (_consumed, produced) = resampler
            .process_into_buffer(&input, &mut out_scratch, None)
            .map_err(|e| RepriseError::Resample(format!("resampler process: {e}")))?;
        for ch in 0..channel_count {
            collected[ch].extend_from_slice(&out_scratch[ch][..produced]);
        }
    }

    let planes = collected
        .into_iter()
        .map(|plane| {
            let mut trimmed: Vec<f32> = plane.into_iter().skip(delay).take(expected_frames).collect();
            trimmed.resize(expected_frames, 0.0);
            trimmed
        })
        .collect();
    AudioBuffer::new(planes, target_rate)
}

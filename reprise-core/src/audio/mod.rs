//! PCM buffer types shared by every analysis stage.
//!
//! `AudioBuffer` is the unit of exchange between decode, VAD, trim, align and
//! level measurement. Each stage produces a *new* buffer; nothing mutates a
//! buffer another stage still holds.

pub mod codec;
pub mod resample;

use crate::error::{RepriseError, Result};

/// Planar (per-channel) f32 PCM at a known sample rate.
///
/// Invariant: every channel plane has the same length. Samples are nominally
/// in [-1.0, 1.0]; the WAV encoder clamps anything outside that range.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Build a buffer from channel planes, validating the equal-length invariant.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if channels.is_empty() {
            return Err(RepriseError::InvalidBuffer("no channels".into()));
        }
        if sample_rate == 0 {
            return Err(RepriseError::InvalidBuffer("sample rate is zero".into()));
        }
        let frames = channels[0].len();
        if channels.iter().any(|ch| ch.len() != frames) {
            return Err(RepriseError::InvalidBuffer(
                "channel planes have unequal lengths".into(),
            ));
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// A single-channel buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(vec![samples], sample_rate)
    }

    /// An all-zero buffer of `frames` frames.
    pub fn silence(frames: usize, channel_count: usize, sample_rate: u32) -> Result<Self> {
        Self::new(vec![vec![0.0; frames]; channel_count.max(1)], sample_rate)
    }

    /// Deinterleave `samples` into `channel_count` planes.
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        let channel_count = channel_count.max(1);
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, sample) in frame.iter().enumerate() {
                channels[ch].push(*sample);
            }
        }
        Self::new(channels, sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Average all channels into a single mono plane.
    pub fn mono_mixdown(&self) -> Vec<f32> {
        if self.channels.len() == 1 {
            return self.channels[0].clone();
        }
        let frames = self.frames();
        let scale = 1.0 / self.channels.len() as f32;
        let mut mono = vec![0.0f32; frames];
        for plane in &self.channels {
            for (acc, sample) in mono.iter_mut().zip(plane) {
                *acc += *sample;
            }
        }
        for sample in &mut mono {
            *sample *= scale;
        }
        mono
    }

    /// Interleave all channels (frame-major), e.g. for WAV writing.
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let ch = self.channels.len();
        let mut out = Vec::with_capacity(frames * ch);
        for frame in 0..frames {
            for plane in &self.channels {
                out.push(plane[frame]);
            }
        }
        out
    }

    /// Copy of the frame range `[start, end)` across all channels.
    ///
    /// Bounds are clamped to the buffer; an inverted range yields an empty
    /// buffer with the same channel count and rate.
    pub fn slice_frames(&self, start: usize, end: usize) -> Self {
        let frames = self.frames();
        let start = start.min(frames);
        let end = end.clamp(start, frames);
        let channels = self
            .channels
            .iter()
            .map(|plane| plane[start..end].to_vec())
            .collect();
        Self {
            channels,
            sample_rate: self.sample_rate,
        }
    }
}

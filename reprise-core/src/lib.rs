//! # reprise-core
//!
//! Pronunciation-practice audio engine: decode, speech-boundary detection,
//! silence trimming, onset-synchronized alignment, and loudness measurement
//! over complete in-memory clips.
//!
//! ## Architecture
//!
//! ```text
//! bytes ──► codec::decode ──► VadHandle ──► bounds::resolve
//!                                               │
//!                              ┌────────────────┴─────────────┐
//!                         trim::trim                   align::align_clips
//!                              │                               │
//!                              └────────► codec::encode_wav ◄──┘
//!
//! level::measure runs independently, in parallel, on raw or trimmed blobs.
//! ```
//!
//! `ClipProcessor` wires these stages behind an async API; the leaf modules
//! are pure and synchronous. Every failure mode short of a decode error
//! degrades to pass-through — the engine always hands back playable audio.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod align;
pub mod audio;
pub mod bounds;
pub mod config;
pub mod error;
pub mod level;
pub mod processor;
pub mod trim;
pub mod vad;

// Convenience re-exports for downstream crates
pub use align::{AlignConfig, AlignmentInfo, AlignmentMethod};
pub use audio::AudioBuffer;
pub use bounds::{BoundaryOutcome, SpeechBoundaries};
pub use config::{PracticeSettings, ProcessorConfig};
pub use error::{RepriseError, Result};
pub use level::{AudioLevelInfo, BalanceMode, GainPair, NormalizationPolicy};
pub use processor::{AlignmentResult, ClipProcessor, PreparedClip};
pub use trim::{TrimPolicy, TrimResult};
pub use vad::{SpeechScorer, VadConfig, VadHandle};

#[cfg(feature = "onnx")]
pub use vad::SileroScorer;

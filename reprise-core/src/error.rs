use thiserror::Error;

/// All errors produced by reprise-core.
#[derive(Debug, Error)]
pub enum RepriseError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("resample error: {0}")]
    Resample(String),

    #[error("VAD scorer unavailable: {0}")]
    VadUnavailable(String),

    #[error("VAD inference error: {0}")]
    VadInference(String),

    #[error("invalid audio buffer: {0}")]
    InvalidBuffer(String),

    #[error("trim would leave {remaining_secs:.3}s of audio")]
    DegenerateTrim { remaining_secs: f64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RepriseError>;

use thiserror::Error;

/// All errors produced by quietcut-core.
#[derive(Debug, Error)]
pub enum QuietcutError {
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("not found: {path}")]
    NotFound { path: std::path::PathBuf },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid range for piece {piece_index}: start={start_sample} end={end_sample}")]
    InvalidRange {
        piece_index: usize,
        start_sample: usize,
        end_sample: usize,
    },

    #[error("compute failure: {0}")]
    ComputeFailure(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("resampler error: {0}")]
    Resample(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, QuietcutError>;

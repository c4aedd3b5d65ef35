//! Adaptive silence threshold from whole-file loudness.
//!
//! ## Rule
//!
//! 1. `audio_dbfs = 20 * log10(rms)` over the mono signal (`-inf` when the
//!    RMS is zero or not finite).
//! 2. Threshold = `audio_dbfs - 16 dB`, or `-40 dB` for a fully silent file.
//!
//! An explicitly supplied threshold always wins.

/// Margin below the file loudness that counts as silence.
pub const THRESHOLD_MARGIN_DB: f64 = 16.0;

/// Threshold used when the file has no measurable loudness.
pub const FALLBACK_THRESHOLD_DB: f64 = -40.0;

/// Root-mean-square of `samples`, accumulated in f64. `divisor` is the window
/// length the mean is taken over, which may exceed `samples.len()` when the
/// tail is implicitly zero-padded.
pub(crate) fn rms_padded(samples: &[f32], divisor: usize) -> f64 {
    if divisor == 0 {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let s = f64::from(s);
            s * s
        })
        .sum();
    (sum_sq / divisor as f64).sqrt()
}

/// Convert an RMS level to dBFS. Non-positive or non-finite input gives `-inf`.
pub fn rms_to_dbfs(rms: f64) -> f64 {
    if rms <= 0.0 || !rms.is_finite() {
        return f64::NEG_INFINITY;
    }
    20.0 * rms.log10()
}

/// Loudness of a whole signal in dBFS.
pub fn audio_dbfs(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return f64::NEG_INFINITY;
    }
    rms_to_dbfs(rms_padded(samples, samples.len()))
}

/// Computes the working silence threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdEstimator;

impl ThresholdEstimator {
    /// Threshold derived from a file loudness figure.
    pub fn from_dbfs(audio_db: f64) -> f64 {
        if audio_db.is_finite() {
            audio_db - THRESHOLD_MARGIN_DB
        } else {
            FALLBACK_THRESHOLD_DB
        }
    }

    /// `explicit` when given, otherwise the adaptive threshold for `samples`.
    pub fn resolve(explicit: Option<f64>, samples: &[f32]) -> f64 {
        match explicit {
            Some(db) => db,
            None => Self::from_dbfs(audio_dbfs(samples)),
        }
    }
}

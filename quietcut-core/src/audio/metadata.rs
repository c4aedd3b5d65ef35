//! Per-file metadata record (`meta.json`).

use std::path::Path;

use hound::WavReader;
use serde::{Deserialize, Serialize};

use crate::error::{QuietcutError, Result};
use crate::timestamp::{format_secs, round_to};

pub const ANALYSIS_VERSION: &str = "1.0";

/// Header-level facts about a source recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub filename: String,
    /// Volume-relative path of the source file.
    pub file_path: String,
    /// Lowercased extension including the dot, e.g. `".wav"`.
    pub file_extension: String,
    pub file_size_bytes: u64,
    pub file_size_mb: f64,
    pub duration_seconds: f64,
    pub duration_minutes: f64,
    pub duration_formatted: String,
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub channel_type: String,
    pub sample_width_bytes: u16,
    pub sample_width_bits: u16,
    pub total_frames: u32,
    pub bitrate_kbps: f64,
    pub created_at: String,
    pub analysis_version: String,
}

impl AudioMetadata {
    /// Read the WAV header of `path`. `relative_path` is recorded verbatim
    /// as `file_path`.
    pub fn from_file(path: &Path, relative_path: &str, created_at: String) -> Result<Self> {
        if !path.exists() {
            return Err(QuietcutError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        let total_frames = reader.duration();
        drop(reader);

        let file_size_bytes = std::fs::metadata(path)?.len();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        let duration_seconds = if spec.sample_rate > 0 {
            f64::from(total_frames) / f64::from(spec.sample_rate)
        } else {
            0.0
        };
        let bitrate_kbps = if duration_seconds > 0.0 {
            round_to(file_size_bytes as f64 * 8.0 / (duration_seconds * 1000.0), 2)
        } else {
            0.0
        };
        let sample_width_bytes = spec.bits_per_sample.div_ceil(8);

        Ok(Self {
            filename,
            file_path: relative_path.to_string(),
            file_extension,
            file_size_bytes,
            file_size_mb: round_to(file_size_bytes as f64 / (1024.0 * 1024.0), 2),
            duration_seconds: round_to(duration_seconds, 2),
            duration_minutes: round_to(duration_seconds / 60.0, 2),
            duration_formatted: format_secs(duration_seconds),
            sample_rate_hz: spec.sample_rate,
            channels: spec.channels,
            channel_type: channel_type(spec.channels),
            sample_width_bytes,
            sample_width_bits: sample_width_bytes * 8,
            total_frames,
            bitrate_kbps,
            created_at,
            analysis_version: ANALYSIS_VERSION.into(),
        })
    }
}

fn channel_type(channels: u16) -> String {
    match channels {
        1 => "mono".into(),
        2 => "stereo".into(),
        n => format!("{n}-channel"),
    }
}

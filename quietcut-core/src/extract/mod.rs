//! Cutting planned pieces out of the source recording.
//!
//! ## Per piece
//!
//! 1. `start_ms` / `end_ms` / `trim_leading_ms` → sample indices at the output
//!    rate (truncating), trim added to the start.
//! 2. Both indices clamped to `[0, frames]`; an empty or inverted range is
//!    logged and skipped, the remaining pieces are still written.
//! 3. Slices peaking above 1.0 are scaled by `1 / (peak + 1e-9)`.
//! 4. The slice goes to a [`PieceSink`] as 16-bit PCM.

pub mod sink;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audio::resample::RateConverter;
use crate::audio::PlanarAudio;
use crate::error::{QuietcutError, Result};
use crate::plan::Piece;
use crate::timestamp::{round_to, utc_now_stamp};

pub use sink::{MemorySink, PieceSink, WavDirSink, WrittenPiece, OUTPUT_BITS_PER_SAMPLE};

/// Default output rate for pieces.
pub const DEFAULT_TARGET_SAMPLE_RATE: u32 = 48_000;

const PEAK_EPSILON: f32 = 1e-9;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Sample range of one piece after trim and clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRange {
    pub start: usize,
    pub end: usize,
}

/// Result record for one written piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPiece {
    pub piece_index: usize,
    pub filename: String,
    pub file_path: String,
    /// Requested bounds, from the plan.
    pub start_ms: u64,
    pub end_ms: u64,
    /// Bounds actually written, after trim and clamping.
    pub actual_start_ms: u64,
    pub actual_end_ms: u64,
    pub trim_leading_ms: u64,
    pub duration_seconds: f64,
    pub file_size_bytes: u64,
    pub file_size_mb: f64,
    pub sample_rate: u32,
    pub channels: usize,
    pub samples: usize,
}

/// Encoding of every written piece.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: usize,
    pub encoding: String,
    pub bits_per_sample: u16,
    pub format: String,
}

/// Aggregate result of one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub total_pieces: usize,
    pub total_duration_seconds: f64,
    pub total_size_mb: f64,
    pub audio_format: AudioFormat,
    pub pieces: Vec<ExtractedPiece>,
    /// Indices of planned pieces that collapsed to an empty range.
    pub skipped_pieces: Vec<usize>,
    pub strategy: String,
    pub created_at: String,
    pub message: String,
}

/// Slices planned pieces at a fixed output rate.
#[derive(Debug, Clone)]
pub struct PieceExtractor {
    target_sample_rate: u32,
    resample_chunk_size: usize,
}

impl Default for PieceExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_SAMPLE_RATE, 1024)
    }
}

impl PieceExtractor {
    pub fn new(target_sample_rate: u32, resample_chunk_size: usize) -> Self {
        Self {
            target_sample_rate,
            resample_chunk_size,
        }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Convert `audio` to the output rate (passthrough if it already matches).
    pub fn resample(&self, audio: PlanarAudio) -> Result<PlanarAudio> {
        let mut rc = RateConverter::new(
            audio.sample_rate,
            self.target_sample_rate,
            self.resample_chunk_size,
            audio.channel_count(),
        )?;
        Ok(PlanarAudio {
            channels: rc.convert(audio.channels)?,
            sample_rate: self.target_sample_rate,
        })
    }

    /// Sample range of `piece` in a buffer of `total_frames` at the output rate.
    ///
    /// # Errors
    /// `InvalidRange` when the clamped start is not before the clamped end.
    pub fn sample_range(&self, piece: &Piece, total_frames: usize) -> Result<SampleRange> {
        let rate = f64::from(self.target_sample_rate);
        let to_samples = |ms: u64| (ms as f64 / 1000.0 * rate) as usize;

        let mut start = to_samples(piece.start_ms);
        if piece.trim_leading_ms > 0 {
            start = start.saturating_add(to_samples(piece.trim_leading_ms));
        }
        let start = start.min(total_frames);
        let end = to_samples(piece.end_ms).min(total_frames);

        if start >= end {
            return Err(QuietcutError::InvalidRange {
                piece_index: piece.piece_index,
                start_sample: start,
                end_sample: end,
            });
        }
        Ok(SampleRange { start, end })
    }

    /// Write every valid piece of `pieces` from `audio` (already at the output
    /// rate) into `sink`.
    pub fn extract<S: PieceSink>(
        &self,
        audio: &PlanarAudio,
        pieces: &[Piece],
        strategy: &str,
        sink: &mut S,
    ) -> Result<ExtractionReport> {
        if audio.sample_rate != self.target_sample_rate {
            return Err(QuietcutError::InvalidInput(format!(
                "audio is at {} Hz, extractor expects {} Hz",
                audio.sample_rate, self.target_sample_rate
            )));
        }

        let total_frames = audio.frames();
        let rate = f64::from(self.target_sample_rate);
        let mut written = Vec::with_capacity(pieces.len());
        let mut skipped = Vec::new();

        for piece in pieces {
            let range = match self.sample_range(piece, total_frames) {
                Ok(r) => r,
                Err(e) => {
                    warn!(piece = piece.piece_index, error = %e, "skipping piece");
                    skipped.push(piece.piece_index);
                    continue;
                }
            };
            if piece.trim_leading_ms > 0 {
                info!(piece = piece.piece_index, trim_ms = piece.trim_leading_ms, "leading trim applied");
            }

            let mut slice: Vec<Vec<f32>> = audio
                .channels
                .iter()
                .map(|ch| ch[range.start..range.end].to_vec())
                .collect();
            normalize_peak(&mut slice);

            let out = sink.write_piece(piece.piece_index, &slice, self.target_sample_rate)?;
            let frames = range.end - range.start;
            let duration = frames as f64 / rate;

            info!(
                piece = piece.piece_index,
                file = %out.filename,
                secs = round_to(duration, 2),
                bytes = out.file_size_bytes,
                "piece written"
            );

            written.push(ExtractedPiece {
                piece_index: piece.piece_index,
                filename: out.filename,
                file_path: out.file_path,
                start_ms: piece.start_ms,
                end_ms: piece.end_ms,
                actual_start_ms: (range.start as f64 / rate * 1000.0) as u64,
                actual_end_ms: (range.end as f64 / rate * 1000.0) as u64,
                trim_leading_ms: piece.trim_leading_ms,
                duration_seconds: round_to(duration, 2),
                file_size_bytes: out.file_size_bytes,
                file_size_mb: round_to(out.file_size_bytes as f64 / BYTES_PER_MB, 2),
                sample_rate: self.target_sample_rate,
                channels: slice.len(),
                samples: frames,
            });
        }

        let total_duration: f64 = written.iter().map(|p| p.duration_seconds).sum();
        let total_size_mb: f64 = written.iter().map(|p| p.file_size_mb).sum();

        let report = ExtractionReport {
            total_pieces: written.len(),
            total_duration_seconds: round_to(total_duration, 2),
            total_size_mb: round_to(total_size_mb, 2),
            audio_format: AudioFormat {
                sample_rate: self.target_sample_rate,
                channels: audio.channel_count(),
                encoding: "PCM_S".into(),
                bits_per_sample: OUTPUT_BITS_PER_SAMPLE,
                format: "WAV".into(),
            },
            message: format!(
                "{} pieces written ({total_duration:.1}s, {total_size_mb:.1}MB), {} skipped",
                written.len(),
                skipped.len()
            ),
            pieces: written,
            skipped_pieces: skipped,
            strategy: strategy.to_string(),
            created_at: utc_now_stamp(),
        };

        info!(
            pieces = report.total_pieces,
            skipped = report.skipped_pieces.len(),
            secs = report.total_duration_seconds,
            "extraction done"
        );
        Ok(report)
    }
}

/// Scale `channels` down when any sample exceeds full scale.
fn normalize_peak(channels: &mut [Vec<f32>]) {
    let peak = channels
        .iter()
        .flat_map(|ch| ch.iter())
        .fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 1.0 {
        let gain = 1.0 / (peak + PEAK_EPSILON);
        for s in channels.iter_mut().flat_map(|ch| ch.iter_mut()) {
            *s *= gain;
        }
    }
}

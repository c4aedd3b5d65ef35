//! # quietcut-core
//!
//! Silence analysis and silence-guided splitting of long voice recordings.
//!
//! ## Architecture
//!
//! ```text
//! WAV file → WaveformDecoder → Signal (mono f32)
//!                                   │
//!                          SilenceDetector (sequential | parallel workers)
//!                                   │
//!                             SilenceReport
//!                                   │
//!                         SegmentationPlanner → SplitPlan
//!                                   │
//! WAV file → PlanarAudio → RateConverter → PieceExtractor → PieceSink
//! ```
//!
//! `job::JobRunner` wires the stages to the `uploads/<code>/` volume layout
//! and its JSON sidecar files.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod error;
pub mod extract;
pub mod job;
pub mod plan;
pub mod silence;
pub mod timestamp;

// Convenience re-exports for downstream crates
pub use audio::metadata::AudioMetadata;
pub use audio::{PlanarAudio, Signal, WaveformDecoder};
pub use error::{QuietcutError, Result};
pub use extract::{ExtractionReport, PieceExtractor, PieceSink, WavDirSink};
pub use job::{JobConfig, JobOutcome, JobRunner, Stage};
pub use plan::{Piece, SegmentationPlanner, SplitPlan};
pub use silence::{
    DetectionMode, DetectionParams, ProcessingMethod, SilenceDetector, SilenceInterval,
    SilenceReport,
};

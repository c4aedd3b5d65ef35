//! Silence detection over a decoded [`Signal`].
//!
//! `SilenceDetector` is the front door: it validates the signal, resolves the
//! threshold ([`threshold::ThresholdEstimator`]), classifies windows either
//! sequentially or across worker threads ([`parallel`]), and coalesces the
//! flags into [`SilenceInterval`]s ([`window`]).
//!
//! The parallel path returns a typed failure instead of falling back on its
//! own; [`SilenceDetector::detect`] owns the fallback decision.

pub mod parallel;
pub mod threshold;
pub mod window;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audio::Signal;
use crate::error::{QuietcutError, Result};
use crate::timestamp::{format_ms, round_to};

use threshold::ThresholdEstimator;
use window::{classify_range, coalesce_runs, WindowLayout};

/// Minimum window count before `DetectionMode::Auto` goes parallel
/// (5 minutes at the default 20 ms step).
pub const PARALLEL_MIN_WINDOWS: usize = 15_000;

/// Tunable detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Shortest silent run that is reported. Default: 500 ms.
    pub min_silence_len_ms: u32,
    /// Fixed threshold in dBFS. `None` derives one from file loudness.
    pub silence_thresh_db: Option<f64>,
    /// Analysis window length and hop. Default: 20 ms.
    pub seek_step_ms: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            min_silence_len_ms: 500,
            silence_thresh_db: None,
            seek_step_ms: 20,
        }
    }
}

/// How window classification is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    Sequential,
    Parallel {
        workers: usize,
    },
    /// Parallel for long signals on multi-core hosts, otherwise sequential.
    #[default]
    Auto,
}

/// Which path actually produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    Sequential,
    Parallel,
    /// Parallel was attempted, failed, and the sequential path ran instead.
    SequentialFallback,
}

/// One detected silence, 1-based `index`, millisecond bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "SilenceRecord")]
pub struct SilenceInterval {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl SilenceInterval {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    pub fn midpoint_ms(&self) -> f64 {
        (self.start_ms as f64 + self.end_ms as f64) / 2.0
    }
}

/// Serialized form of [`SilenceInterval`] with its derived fields.
#[derive(Debug, Clone, Serialize)]
struct SilenceRecord {
    index: usize,
    start_ms: u64,
    end_ms: u64,
    start: String,
    end: String,
    duration_ms: u64,
    duration: String,
}

impl From<SilenceInterval> for SilenceRecord {
    fn from(s: SilenceInterval) -> Self {
        Self {
            index: s.index,
            start_ms: s.start_ms,
            end_ms: s.end_ms,
            start: format_ms(s.start_ms),
            end: format_ms(s.end_ms),
            duration_ms: s.duration_ms(),
            duration: format_ms(s.duration_ms()),
        }
    }
}

/// Parameters as applied to one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedParams {
    pub min_silence_len_ms: u32,
    /// Resolved threshold, one decimal place.
    pub silence_thresh_dbfs: f64,
    pub seek_step_ms: u32,
    pub sr_hz: u32,
    pub channels: u16,
    pub workers: usize,
}

/// Full result of one detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilenceReport {
    pub silences: Vec<SilenceInterval>,
    pub audio_duration_ms: u64,
    pub audio_duration: String,
    pub total_silence_ms: u64,
    pub speech_ms: u64,
    pub silence_percentage: f64,
    pub speech_percentage: f64,
    pub segment_count: usize,
    pub detection_time_seconds: f64,
    pub processing_method: ProcessingMethod,
    pub params: AppliedParams,
}

impl SilenceReport {
    /// `true` when both reports found the same intervals (timing and method ignored).
    pub fn same_silences(&self, other: &SilenceReport) -> bool {
        self.silences == other.silences
    }
}

/// Sequential-vs-parallel timing comparison on one signal.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionBenchmark {
    pub workers: usize,
    pub sequential_seconds: f64,
    pub parallel_seconds: f64,
    pub speedup_factor: f64,
    pub time_saved_seconds: f64,
    pub time_saved_percentage: f64,
    pub results_identical: bool,
    pub segment_count: usize,
}

/// Everything the classification paths share for one signal.
struct Prepared {
    thresh_db: f64,
    layout: WindowLayout,
    audio_ms: u64,
}

/// Scans a signal for silence intervals.
#[derive(Debug, Clone, Default)]
pub struct SilenceDetector {
    params: DetectionParams,
}

impl SilenceDetector {
    pub fn new(params: DetectionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Detect silence using `mode`. A failed parallel attempt is logged and
    /// replaced by the sequential result.
    ///
    /// # Errors
    /// - `UnsupportedFormat` if the signal's sample width is outside {1, 2, 4}.
    /// - `InvalidInput` for a zero seek step or zero sample rate on a non-empty signal.
    pub fn detect(&self, signal: &Signal, mode: DetectionMode) -> Result<SilenceReport> {
        self.detect_with(signal, mode, parallel::classify_parallel)
    }

    /// `detect` with the parallel classifier supplied by the caller.
    pub(crate) fn detect_with<P>(
        &self,
        signal: &Signal,
        mode: DetectionMode,
        classify_parallel: P,
    ) -> Result<SilenceReport>
    where
        P: FnOnce(&[f32], WindowLayout, f64, usize) -> Result<Vec<bool>>,
    {
        let started = Instant::now();
        let prepared = self.prepare(signal)?;

        let report = match self.resolve_workers(mode, prepared.layout.count) {
            None => {
                let flags = self.classify_sequential(signal, &prepared);
                self.finish(signal, &prepared, &flags, ProcessingMethod::Sequential, 1, started)
            }
            Some(workers) => {
                match classify_parallel(
                    &signal.samples,
                    prepared.layout,
                    prepared.thresh_db,
                    workers,
                ) {
                    Ok(flags) => self.finish(
                        signal,
                        &prepared,
                        &flags,
                        ProcessingMethod::Parallel,
                        workers,
                        started,
                    ),
                    Err(e) => {
                        warn!(error = %e, workers, "parallel detection failed, falling back to sequential");
                        let flags = self.classify_sequential(signal, &prepared);
                        self.finish(
                            signal,
                            &prepared,
                            &flags,
                            ProcessingMethod::SequentialFallback,
                            1,
                            started,
                        )
                    }
                }
            }
        };

        info!(
            segments = report.segment_count,
            silence_pct = report.silence_percentage,
            method = ?report.processing_method,
            secs = report.detection_time_seconds,
            "silence analysis done"
        );
        Ok(report)
    }

    /// Single-threaded reference path.
    pub fn detect_sequential(&self, signal: &Signal) -> Result<SilenceReport> {
        let started = Instant::now();
        let prepared = self.prepare(signal)?;
        let flags = self.classify_sequential(signal, &prepared);
        Ok(self.finish(signal, &prepared, &flags, ProcessingMethod::Sequential, 1, started))
    }

    /// Chunk-parallel path. Fails with `ComputeFailure` rather than falling back.
    pub fn detect_parallel(&self, signal: &Signal, workers: usize) -> Result<SilenceReport> {
        let started = Instant::now();
        let prepared = self.prepare(signal)?;
        let workers = workers.max(1);
        let flags = parallel::classify_parallel(
            &signal.samples,
            prepared.layout,
            prepared.thresh_db,
            workers,
        )?;
        Ok(self.finish(signal, &prepared, &flags, ProcessingMethod::Parallel, workers, started))
    }

    /// Run both paths on `signal` and compare timing and output.
    pub fn benchmark(&self, signal: &Signal, workers: usize) -> Result<DetectionBenchmark> {
        let sequential = self.detect_sequential(signal)?;
        let parallel = self.detect_parallel(signal, workers)?;

        let seq_s = sequential.detection_time_seconds;
        let par_s = parallel.detection_time_seconds;
        let speedup = if par_s > 0.0 { seq_s / par_s } else { 0.0 };
        let saved = seq_s - par_s;
        let saved_pct = if seq_s > 0.0 { saved / seq_s * 100.0 } else { 0.0 };

        Ok(DetectionBenchmark {
            workers: parallel.params.workers,
            sequential_seconds: seq_s,
            parallel_seconds: par_s,
            speedup_factor: round_to(speedup, 2),
            time_saved_seconds: round_to(saved, 3),
            time_saved_percentage: round_to(saved_pct, 1),
            results_identical: sequential.same_silences(&parallel),
            segment_count: sequential.segment_count,
        })
    }

    fn prepare(&self, signal: &Signal) -> Result<Prepared> {
        if !matches!(signal.sample_width, 1 | 2 | 4) {
            return Err(QuietcutError::UnsupportedFormat(format!(
                "sample width {} bytes (supported: 1, 2, 4)",
                signal.sample_width
            )));
        }
        if self.params.seek_step_ms == 0 {
            return Err(QuietcutError::InvalidInput("seek_step_ms must be positive".into()));
        }
        if signal.sample_rate == 0 && !signal.is_empty() {
            return Err(QuietcutError::InvalidInput("sample rate is zero".into()));
        }

        let thresh_db = ThresholdEstimator::resolve(self.params.silence_thresh_db, &signal.samples);
        Ok(Prepared {
            thresh_db,
            layout: WindowLayout::new(signal.frames(), signal.sample_rate, self.params.seek_step_ms),
            audio_ms: signal.duration_ms(),
        })
    }

    /// `None` selects the sequential path, `Some(n)` the parallel path with `n` workers.
    fn resolve_workers(&self, mode: DetectionMode, windows: usize) -> Option<usize> {
        match mode {
            DetectionMode::Sequential => None,
            DetectionMode::Parallel { workers } => Some(workers.max(1)),
            DetectionMode::Auto => {
                let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
                (cores > 1 && windows >= PARALLEL_MIN_WINDOWS).then_some(cores)
            }
        }
    }

    fn classify_sequential(&self, signal: &Signal, prepared: &Prepared) -> Vec<bool> {
        classify_range(
            &signal.samples,
            prepared.layout,
            0..prepared.layout.count,
            prepared.thresh_db,
        )
    }

    fn finish(
        &self,
        signal: &Signal,
        prepared: &Prepared,
        flags: &[bool],
        method: ProcessingMethod,
        workers: usize,
        started: Instant,
    ) -> SilenceReport {
        let spans = coalesce_runs(
            flags,
            self.params.seek_step_ms,
            self.params.min_silence_len_ms,
            prepared.audio_ms,
        );
        let silences: Vec<SilenceInterval> = spans
            .into_iter()
            .enumerate()
            .map(|(i, (start_ms, end_ms))| SilenceInterval {
                index: i + 1,
                start_ms,
                end_ms,
            })
            .collect();

        let total_ms = prepared.audio_ms;
        let total_silence_ms: u64 = silences.iter().map(SilenceInterval::duration_ms).sum();
        let silence_pct = if total_ms > 0 {
            total_silence_ms as f64 / total_ms as f64 * 100.0
        } else {
            0.0
        };

        SilenceReport {
            segment_count: silences.len(),
            silences,
            audio_duration_ms: total_ms,
            audio_duration: format_ms(total_ms),
            total_silence_ms,
            speech_ms: total_ms.saturating_sub(total_silence_ms),
            silence_percentage: round_to(silence_pct, 1),
            speech_percentage: round_to(100.0 - silence_pct, 1),
            detection_time_seconds: round_to(started.elapsed().as_secs_f64(), 3),
            processing_method: method,
            params: AppliedParams {
                min_silence_len_ms: self.params.min_silence_len_ms,
                silence_thresh_dbfs: round_to(prepared.thresh_db, 1),
                seek_step_ms: self.params.seek_step_ms,
                sr_hz: signal.sample_rate,
                channels: signal.channels,
                workers,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 8 kHz mono, 0.5 amplitude with zeroed `silent` ranges (in ms).
    fn synthetic(total_ms: u64, silent: &[(u64, u64)]) -> Signal {
        let sr = 8_000u64;
        let n = (total_ms * sr / 1000) as usize;
        let mut samples = vec![0.5f32; n];
        for &(s, e) in silent {
            let (a, b) = ((s * sr / 1000) as usize, (e * sr / 1000) as usize);
            samples[a..b].fill(0.0);
        }
        Signal {
            samples,
            sample_rate: 8_000,
            channels: 1,
            sample_width: 2,
        }
    }

    #[test]
    fn finds_single_gap_in_30s_signal() {
        let sig = synthetic(30_000, &[(10_000, 12_000)]);
        let report = SilenceDetector::default()
            .detect(&sig, DetectionMode::Sequential)
            .unwrap();

        assert_eq!(report.segment_count, 1);
        let s = report.silences[0];
        assert_eq!(s.index, 1);
        assert!((9_980..=10_020).contains(&s.start_ms), "start={}", s.start_ms);
        assert!((11_980..=12_020).contains(&s.end_ms), "end={}", s.end_ms);
        assert_eq!(report.audio_duration_ms, 30_000);
        assert_eq!(report.total_silence_ms + report.speech_ms, 30_000);
        assert_eq!(report.processing_method, ProcessingMethod::Sequential);
    }

    #[test]
    fn gaps_shorter_than_minimum_are_ignored() {
        let sig = synthetic(5_000, &[(1_000, 1_300), (3_000, 3_600)]);
        let report = SilenceDetector::default()
            .detect(&sig, DetectionMode::Sequential)
            .unwrap();
        assert_eq!(report.segment_count, 1);
        assert_eq!(report.silences[0].start_ms, 3_000);
        assert_eq!(report.silences[0].end_ms, 3_600);
    }

    #[test]
    fn intervals_are_ordered_and_long_enough() {
        let gaps = [(500, 1_200), (2_000, 2_100), (4_000, 5_500), (7_000, 7_520)];
        let sig = synthetic(9_000, &gaps);
        let report = SilenceDetector::default()
            .detect(&sig, DetectionMode::Sequential)
            .unwrap();

        assert_eq!(report.segment_count, 3);
        for pair in report.silences.windows(2) {
            assert!(pair[0].end_ms <= pair[1].start_ms);
        }
        for s in &report.silences {
            assert!(s.duration_ms() >= 500);
            assert!(s.start_ms < s.end_ms);
        }
    }

    #[test]
    fn silent_file_uses_fallback_threshold() {
        let sig = synthetic(2_000, &[(0, 2_000)]);
        let report = SilenceDetector::default()
            .detect(&sig, DetectionMode::Sequential)
            .unwrap();
        assert_eq!(report.params.silence_thresh_dbfs, -40.0);
        assert_eq!(report.silences.len(), 1);
        assert_eq!((report.silences[0].start_ms, report.silences[0].end_ms), (0, 2_000));
        assert_eq!(report.silence_percentage, 100.0);
        assert_eq!(report.speech_percentage, 0.0);
    }

    #[test]
    fn empty_signal_reports_nothing() {
        let sig = Signal {
            samples: Vec::new(),
            sample_rate: 8_000,
            channels: 1,
            sample_width: 2,
        };
        let report = SilenceDetector::default()
            .detect(&sig, DetectionMode::Auto)
            .unwrap();
        assert!(report.silences.is_empty());
        assert_eq!(report.audio_duration_ms, 0);
        assert_eq!(report.silence_percentage, 0.0);
    }

    #[test]
    fn unsupported_width_aborts_detection() {
        let mut sig = synthetic(1_000, &[]);
        sig.sample_width = 3;
        let err = SilenceDetector::default()
            .detect(&sig, DetectionMode::Sequential)
            .unwrap_err();
        assert!(matches!(err, QuietcutError::UnsupportedFormat(_)));
    }

    #[test]
    fn parallel_matches_sequential_exactly() {
        let gaps = [(1_000, 1_700), (3_010, 3_990), (6_000, 8_000), (9_500, 10_000)];
        let sig = synthetic(12_345, &gaps);
        let det = SilenceDetector::default();

        let seq = det.detect_sequential(&sig).unwrap();
        for workers in [1, 2, 3, 7, 64] {
            let par = det.detect_parallel(&sig, workers).unwrap();
            assert_eq!(par.segment_count, seq.segment_count, "workers={workers}");
            assert_eq!(par.silences, seq.silences, "workers={workers}");
            assert_eq!(par.processing_method, ProcessingMethod::Parallel);
        }
    }

    #[test]
    fn run_spanning_chunk_boundary_is_not_split() {
        // 2 s gap in a 4 s signal; two workers split the windows at 2 s.
        let sig = synthetic(4_000, &[(1_000, 3_000)]);
        let par = SilenceDetector::default().detect_parallel(&sig, 2).unwrap();
        assert_eq!(par.silences.len(), 1);
        assert_eq!((par.silences[0].start_ms, par.silences[0].end_ms), (1_000, 3_000));
    }

    #[test]
    fn explicit_mode_reports_worker_count() {
        let sig = synthetic(3_000, &[(1_000, 2_000)]);
        let report = SilenceDetector::default()
            .detect(&sig, DetectionMode::Parallel { workers: 3 })
            .unwrap();
        assert_eq!(report.params.workers, 3);
        assert_eq!(report.processing_method, ProcessingMethod::Parallel);
    }

    #[test]
    fn failed_parallel_attempt_falls_back_to_sequential() {
        let sig = synthetic(5_000, &[(1_000, 2_500), (3_500, 4_200)]);
        let det = SilenceDetector::default();

        let report = det
            .detect_with(&sig, DetectionMode::Parallel { workers: 4 }, |_, layout, _, workers| {
                parallel::classify_parallel_with(layout.count, workers, |range| {
                    if range.start == 0 {
                        panic!("worker lost");
                    }
                    vec![false; range.len()]
                })
            })
            .unwrap();

        assert_eq!(report.processing_method, ProcessingMethod::SequentialFallback);
        assert_eq!(report.params.workers, 1);
        assert_eq!(report.silences, det.detect_sequential(&sig).unwrap().silences);
        assert_eq!(report.segment_count, 2);
    }

    #[test]
    fn auto_mode_stays_sequential_below_window_floor() {
        let det = SilenceDetector::default();
        assert_eq!(det.resolve_workers(DetectionMode::Auto, 0), None);
        assert_eq!(det.resolve_workers(DetectionMode::Auto, PARALLEL_MIN_WINDOWS - 1), None);

        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        let expected = (cores > 1).then_some(cores);
        assert_eq!(det.resolve_workers(DetectionMode::Auto, PARALLEL_MIN_WINDOWS), expected);

        // 30 s at a 20 ms step is 1 500 windows
        let sig = synthetic(30_000, &[(10_000, 12_000)]);
        let report = det.detect(&sig, DetectionMode::Auto).unwrap();
        assert_eq!(report.processing_method, ProcessingMethod::Sequential);
        assert_eq!(report.params.workers, 1);
    }

    #[test]
    fn explicit_modes_ignore_window_count() {
        let det = SilenceDetector::default();
        assert_eq!(det.resolve_workers(DetectionMode::Sequential, 1_000_000), None);
        assert_eq!(det.resolve_workers(DetectionMode::Parallel { workers: 0 }, 1), Some(1));
    }

    #[test]
    fn benchmark_reports_identical_results() {
        let sig = synthetic(6_000, &[(2_000, 3_000)]);
        let bench = SilenceDetector::default().benchmark(&sig, 4).unwrap();
        assert!(bench.results_identical);
        assert_eq!(bench.segment_count, 1);
    }

    #[test]
    fn interval_serializes_derived_fields() {
        let s = SilenceInterval {
            index: 2,
            start_ms: 61_000,
            end_ms: 62_500,
        };
        let json = serde_json::to_value(s).expect("serialize interval");
        assert_eq!(json["index"], 2);
        assert_eq!(json["start"], "00:01:01.000");
        assert_eq!(json["end"], "00:01:02.500");
        assert_eq!(json["duration_ms"], 1_500);
        assert_eq!(json["duration"], "00:00:01.500");

        let back: SilenceInterval = serde_json::from_value(json).expect("deserialize interval");
        assert_eq!(back, s);
    }
}

//! `JobRunner`: runs the analysis stages for one folder code.
//!
//! ## Stages
//!
//! ```text
//! run.json ─► source audio
//!               ├─► Metadata ─► meta.json
//!               ├─► Silence  ─► silence.json
//!               │      └─► Plan ─► parts.json
//!               │                   └─► Extract ─► Parts/<n>.wav
//! ```
//!
//! Stages always run in that order. A stage whose input was produced by an
//! earlier invocation reads it back from its sidecar file, so `Extract` alone
//! works against an existing `parts.json`.
//!
//! `run()` never fails: every error becomes a `JobOutcome` with
//! `success: false`, so one bad folder does not take down a batch.

pub mod sidecar;

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::audio::metadata::AudioMetadata;
use crate::audio::{duration_ms_for, WaveformDecoder};
use crate::error::{QuietcutError, Result};
use crate::extract::{ExtractionReport, PieceExtractor, WavDirSink, DEFAULT_TARGET_SAMPLE_RATE};
use crate::plan::{SegmentationPlanner, SplitPlan};
use crate::silence::{DetectionMode, DetectionParams, SilenceDetector, SilenceInterval, SilenceReport};
use crate::timestamp::utc_now_stamp;

use sidecar::{read_json, write_json, JobLayout, PartsSidecar, RunManifest, SilenceSidecar};

/// One step of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Metadata,
    Silence,
    Plan,
    Extract,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 4] = [Stage::Metadata, Stage::Silence, Stage::Plan, Stage::Extract];
}

/// Configuration for `JobRunner`.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Root of the shared volume holding `uploads/<code>/`.
    pub volume_root: PathBuf,
    /// Output rate of extracted pieces (Hz). Default: 48000.
    pub target_sample_rate: u32,
    /// Silence detection parameters. Default: 500 ms / auto threshold / 20 ms.
    pub detection: DetectionParams,
    /// Sequential, parallel or automatic window classification. Default: Auto.
    pub detection_mode: DetectionMode,
    /// Input frames per resampler call. Default: 1024.
    pub resample_chunk_size: usize,
    /// Stages to run. Default: all of them.
    pub stages: Vec<Stage>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            volume_root: PathBuf::from("/runpod-volume"),
            target_sample_rate: DEFAULT_TARGET_SAMPLE_RATE,
            detection: DetectionParams::default(),
            detection_mode: DetectionMode::Auto,
            resample_chunk_size: 1024,
            stages: Stage::ALL.to_vec(),
        }
    }
}

/// What a successful job produced. Stages that did not run leave `None`.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub filename: String,
    /// Volume-relative path of the source recording.
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_info: Option<AudioMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence_analysis: Option<SilenceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_plan: Option<SplitPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionReport>,
    pub stages: Vec<Stage>,
    pub processing_time_seconds: f64,
    pub message: String,
}

/// Structured result of one job, success or failure.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub success: bool,
    pub special_folder_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub report: Option<JobReport>,
}

/// Runs configured stages against folder codes on the volume.
#[derive(Debug, Clone)]
pub struct JobRunner {
    config: JobConfig,
}

impl JobRunner {
    pub fn new(config: JobConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Run the job for `code`, folding any failure into the outcome.
    pub fn run(&self, code: &str) -> JobOutcome {
        info!(code, "job started");
        match self.try_run(code) {
            Ok(report) => {
                info!(code, secs = report.processing_time_seconds, "job done");
                JobOutcome {
                    success: true,
                    special_folder_code: code.to_string(),
                    error: None,
                    report: Some(report),
                }
            }
            Err(e) => {
                error!(code, error = %e, "job failed");
                JobOutcome {
                    success: false,
                    special_folder_code: code.to_string(),
                    error: Some(e.to_string()),
                    report: None,
                }
            }
        }
    }

    /// Run the job for `code`, returning the first error.
    pub fn try_run(&self, code: &str) -> Result<JobReport> {
        let started = Instant::now();
        let layout = JobLayout::new(&self.config.volume_root, code)?;

        let run: RunManifest = read_json(&layout.run_json())?;
        let filename = run.require_source()?.to_string();
        let audio_path = layout.audio(&filename)?;
        if !audio_path.exists() {
            return Err(QuietcutError::NotFound { path: audio_path });
        }
        info!(code, file = %filename, "source resolved");

        let stages: Vec<Stage> = Stage::ALL
            .into_iter()
            .filter(|s| self.config.stages.contains(s))
            .collect();

        let mut report = JobReport {
            file_path: layout.relative(&filename),
            filename,
            meta_info: None,
            silence_analysis: None,
            split_plan: None,
            extraction: None,
            stages: stages.clone(),
            processing_time_seconds: 0.0,
            message: String::new(),
        };

        for stage in &stages {
            let t = Instant::now();
            match stage {
                Stage::Metadata => {
                    report.meta_info = Some(self.metadata_stage(&layout, &audio_path, &report.filename)?);
                }
                Stage::Silence => {
                    report.silence_analysis = Some(self.silence_stage(&layout, &audio_path)?);
                }
                Stage::Plan => {
                    report.split_plan =
                        Some(self.plan_stage(&layout, &audio_path, report.silence_analysis.as_ref())?);
                }
                Stage::Extract => {
                    report.extraction =
                        Some(self.extract_stage(&layout, &audio_path, report.split_plan.as_ref())?);
                }
            }
            info!(stage = ?stage, secs = t.elapsed().as_secs_f64(), "stage done");
        }

        report.processing_time_seconds = started.elapsed().as_secs_f64();
        report.message = summary_message(&report);
        Ok(report)
    }

    fn metadata_stage(&self, layout: &JobLayout, audio: &Path, filename: &str) -> Result<AudioMetadata> {
        let meta = AudioMetadata::from_file(audio, &layout.relative(filename), utc_now_stamp())?;
        write_json(&layout.meta_json(), &meta)?;
        info!(
            secs = meta.duration_seconds,
            rate = meta.sample_rate_hz,
            channels = meta.channels,
            bits = meta.sample_width_bits,
            "metadata saved"
        );
        Ok(meta)
    }

    fn silence_stage(&self, layout: &JobLayout, audio: &Path) -> Result<SilenceReport> {
        let signal = WaveformDecoder::open(audio)?;
        let report = SilenceDetector::new(self.config.detection).detect(&signal, self.config.detection_mode)?;
        drop(signal);

        write_json(
            &layout.silence_json(),
            &SilenceSidecar::new(report.silences.clone(), utc_now_stamp()),
        )?;
        Ok(report)
    }

    fn plan_stage(
        &self,
        layout: &JobLayout,
        audio: &Path,
        silence: Option<&SilenceReport>,
    ) -> Result<SplitPlan> {
        let (total_ms, silences): (u64, Vec<SilenceInterval>) = match silence {
            Some(r) => (r.audio_duration_ms, r.silences.clone()),
            None => {
                let sidecar: SilenceSidecar = read_json(&layout.silence_json())?;
                (header_duration_ms(audio)?, sidecar.silences)
            }
        };

        let plan = SegmentationPlanner::plan(total_ms, &silences);
        write_json(
            &layout.parts_json(),
            &PartsSidecar {
                split_plan: plan.clone(),
                created_at: utc_now_stamp(),
            },
        )?;
        Ok(plan)
    }

    fn extract_stage(
        &self,
        layout: &JobLayout,
        audio: &Path,
        plan: Option<&SplitPlan>,
    ) -> Result<ExtractionReport> {
        let plan = match plan {
            Some(p) => p.clone(),
            None => read_json::<PartsSidecar>(&layout.parts_json())?.split_plan,
        };
        info!(pieces = plan.pieces.len(), "plan loaded for extraction");

        let extractor = PieceExtractor::new(self.config.target_sample_rate, self.config.resample_chunk_size);
        let source = extractor.resample(WaveformDecoder::open_planar(audio)?)?;
        let mut sink = WavDirSink::create(layout.parts_dir(), layout.parts_label())?;
        extractor.extract(&source, &plan.pieces, &plan.strategy, &mut sink)
    }
}

/// Duration of a WAV file from its header alone.
fn header_duration_ms(path: &Path) -> Result<u64> {
    let reader = hound::WavReader::open(path)?;
    Ok(duration_ms_for(reader.duration() as usize, reader.spec().sample_rate))
}

fn summary_message(report: &JobReport) -> String {
    let mut parts = vec![format!("{} analysed", report.filename)];
    if let Some(s) = &report.silence_analysis {
        parts.push(format!("{} silences ({}% silent)", s.segment_count, s.silence_percentage));
    }
    if let Some(p) = &report.split_plan {
        parts.push(format!("{} planned pieces", p.pieces.len()));
    }
    if let Some(x) = &report.extraction {
        parts.push(format!("{} pieces written", x.total_pieces));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_runs_every_stage() {
        let cfg = JobConfig::default();
        assert_eq!(cfg.stages, Stage::ALL.to_vec());
        assert_eq!(cfg.target_sample_rate, 48_000);
        assert_eq!(cfg.detection.min_silence_len_ms, 500);
        assert_eq!(cfg.detection.seek_step_ms, 20);
        assert_eq!(cfg.detection_mode, DetectionMode::Auto);
    }

    #[test]
    fn invalid_code_becomes_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(JobConfig {
            volume_root: dir.path().to_path_buf(),
            ..JobConfig::default()
        });
        let outcome = runner.run("x");
        assert!(!outcome.success);
        assert!(outcome.report.is_none());
        assert_eq!(outcome.special_folder_code, "x");
    }

    #[test]
    fn missing_run_json_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(JobConfig {
            volume_root: dir.path().to_path_buf(),
            ..JobConfig::default()
        });
        let err = runner.try_run("job-001").unwrap_err();
        assert!(matches!(err, QuietcutError::NotFound { .. }));
    }

    #[test]
    fn failed_outcome_serializes_error_only() {
        let outcome = JobOutcome {
            success: false,
            special_folder_code: "abc".into(),
            error: Some("boom".into()),
            report: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("filename").is_none());
    }

    #[test]
    fn stage_names_are_snake_case() {
        let json = serde_json::to_string(&Stage::ALL).unwrap();
        assert_eq!(json, r#"["metadata","silence","plan","extract"]"#);
    }
}

//! Host settings (JSON file, overlaid by command-line flags).

use std::fs;
use std::path::{Path, PathBuf};

use quietcut_core::{DetectionMode, DetectionParams, JobConfig, Stage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_SETTINGS_FILE: &str = "quietcut.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct Settings {
    pub volume_root: PathBuf,
    pub target_sample_rate: u32,
    pub min_silence_len_ms: u32,
    /// Fixed threshold in dBFS; `None` derives it from the recording.
    pub silence_thresh_db: Option<f64>,
    pub seek_step_ms: u32,
    /// `auto`, `sequential` or `parallel`.
    pub detection_mode: String,
    /// Parallel worker count; 0 uses every available core.
    pub workers: usize,
    pub resample_chunk_size: usize,
    pub stages: Vec<String>,
    /// Jobs processed at the same time.
    pub concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let detection = DetectionParams::default();
        Self {
            volume_root: PathBuf::from("/runpod-volume"),
            target_sample_rate: 48_000,
            min_silence_len_ms: detection.min_silence_len_ms,
            silence_thresh_db: None,
            seek_step_ms: detection.seek_step_ms,
            detection_mode: "auto".into(),
            workers: 0,
            resample_chunk_size: 1024,
            stages: all_stage_names(),
            concurrency: 1,
        }
    }
}

impl Settings {
    /// Bring every field into its supported range. Each adjusted field is
    /// logged and its name returned.
    pub fn normalize(&mut self) -> Vec<&'static str> {
        let mut adjusted = Vec::new();

        let rate = self.target_sample_rate.clamp(1_000, 384_000);
        note(&mut adjusted, "targetSampleRate", self.target_sample_rate, rate);
        self.target_sample_rate = rate;

        let min_len = self.min_silence_len_ms.clamp(1, 600_000);
        note(&mut adjusted, "minSilenceLenMs", self.min_silence_len_ms, min_len);
        self.min_silence_len_ms = min_len;

        let step = self.seek_step_ms.clamp(1, 10_000);
        note(&mut adjusted, "seekStepMs", self.seek_step_ms, step);
        self.seek_step_ms = step;

        let thresh = self
            .silence_thresh_db
            .filter(|t| t.is_finite())
            .map(|t| t.clamp(-120.0, 0.0));
        note(&mut adjusted, "silenceThreshDb", self.silence_thresh_db, thresh);
        self.silence_thresh_db = thresh;

        let mode = normalize_detection_mode(&self.detection_mode);
        if mode == "auto" && !self.detection_mode.trim().eq_ignore_ascii_case("auto") {
            warn!(field = "detectionMode", from = %self.detection_mode, to = "auto", "setting adjusted");
            adjusted.push("detectionMode");
        }
        self.detection_mode = mode;

        let workers = self.workers.min(256);
        note(&mut adjusted, "workers", self.workers, workers);
        self.workers = workers;

        let chunk = self.resample_chunk_size.clamp(64, 65_536);
        note(&mut adjusted, "resampleChunkSize", self.resample_chunk_size, chunk);
        self.resample_chunk_size = chunk;

        let concurrency = self.concurrency.clamp(1, 64);
        note(&mut adjusted, "concurrency", self.concurrency, concurrency);
        self.concurrency = concurrency;

        let mut stages: Vec<String> = Vec::new();
        for raw in &self.stages {
            match normalize_stage(raw) {
                Some(name) if !stages.contains(&name) => stages.push(name),
                Some(_) => {}
                None => {
                    warn!(field = "stages", stage = %raw, "unknown stage ignored");
                    if !adjusted.contains(&"stages") {
                        adjusted.push("stages");
                    }
                }
            }
        }
        let stages = if stages.is_empty() {
            all_stage_names()
        } else {
            stages
        };
        if stages != self.stages {
            debug!(from = ?self.stages, to = ?stages, "stage list normalized");
        }
        self.stages = stages;
        adjusted
    }

    pub fn detection_mode(&self) -> DetectionMode {
        match self.detection_mode.as_str() {
            "sequential" => DetectionMode::Sequential,
            "parallel" => DetectionMode::Parallel {
                workers: if self.workers == 0 {
                    available_workers()
                } else {
                    self.workers
                },
            },
            _ => DetectionMode::Auto,
        }
    }

    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            volume_root: self.volume_root.clone(),
            target_sample_rate: self.target_sample_rate,
            detection: DetectionParams {
                min_silence_len_ms: self.min_silence_len_ms,
                silence_thresh_db: self.silence_thresh_db,
                seek_step_ms: self.seek_step_ms,
            },
            detection_mode: self.detection_mode(),
            resample_chunk_size: self.resample_chunk_size,
            stages: self.stages.iter().filter_map(|s| parse_stage(s)).collect(),
        }
    }
}

fn note<T: PartialEq + std::fmt::Debug>(
    adjusted: &mut Vec<&'static str>,
    field: &'static str,
    from: T,
    to: T,
) {
    if from != to {
        warn!(field, from = ?from, to = ?to, "setting adjusted");
        adjusted.push(field);
    }
}

pub fn normalize_detection_mode(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "sequential" | "seq" | "single" => "sequential".into(),
        "parallel" | "par" | "multiprocessing" => "parallel".into(),
        _ => "auto".into(),
    }
}

pub fn normalize_stage(raw: &str) -> Option<String> {
    let stage = match raw.trim().to_ascii_lowercase().as_str() {
        "metadata" | "meta" => "metadata",
        "silence" | "silences" => "silence",
        "plan" | "split" | "parts" => "plan",
        "extract" | "extraction" | "cut" => "extract",
        _ => return None,
    };
    Some(stage.into())
}

fn parse_stage(name: &str) -> Option<Stage> {
    match name {
        "metadata" => Some(Stage::Metadata),
        "silence" => Some(Stage::Silence),
        "plan" => Some(Stage::Plan),
        "extract" => Some(Stage::Extract),
        _ => None,
    }
}

fn all_stage_names() -> Vec<String> {
    ["metadata", "silence", "plan", "extract"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Missing or unreadable files yield defaults.
pub fn load_settings(path: &Path) -> Settings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Settings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

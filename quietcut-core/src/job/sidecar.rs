//! Volume layout and JSON sidecar files for one folder code.
//!
//! ```text
//! <volume_root>/uploads/<code>/
//!     run.json        ← written by the uploader, names the source audio
//!     <source>.wav
//!     meta.json       ← AudioMetadata
//!     silence.json    ← SilenceSidecar
//!     parts.json      ← PartsSidecar { split_plan }
//!     Parts/<n>.wav   ← extracted pieces
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::metadata::ANALYSIS_VERSION;
use crate::error::{QuietcutError, Result};
use crate::plan::SplitPlan;
use crate::silence::SilenceInterval;

const UPLOADS_DIR: &str = "uploads";
const PARTS_DIR: &str = "Parts";
const MIN_FOLDER_CODE_LEN: usize = 3;

/// Paths for one folder code on the volume.
#[derive(Debug, Clone)]
pub struct JobLayout {
    volume_root: PathBuf,
    code: String,
}

impl JobLayout {
    /// Validates the folder code: non-empty, at least 3 characters, no path
    /// separators.
    pub fn new(volume_root: impl Into<PathBuf>, code: &str) -> Result<Self> {
        let code = code.trim();
        if code.is_empty() {
            return Err(QuietcutError::MissingInput("folder code is empty".into()));
        }
        if code.chars().count() < MIN_FOLDER_CODE_LEN {
            return Err(QuietcutError::InvalidInput(format!(
                "folder code must be at least {MIN_FOLDER_CODE_LEN} characters: {code:?}"
            )));
        }
        if code.contains(|c: char| c == '/' || c == '\\') || code == ".." {
            return Err(QuietcutError::InvalidInput(format!(
                "folder code must not contain path separators: {code:?}"
            )));
        }
        Ok(Self {
            volume_root: volume_root.into(),
            code: code.to_string(),
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn folder(&self) -> PathBuf {
        self.volume_root.join(UPLOADS_DIR).join(&self.code)
    }

    /// Volume-relative form of `name` inside the folder, as recorded in sidecars.
    pub fn relative(&self, name: &str) -> String {
        format!("{UPLOADS_DIR}/{}/{name}", self.code)
    }

    pub fn run_json(&self) -> PathBuf {
        self.folder().join("run.json")
    }

    pub fn meta_json(&self) -> PathBuf {
        self.folder().join("meta.json")
    }

    pub fn silence_json(&self) -> PathBuf {
        self.folder().join("silence.json")
    }

    pub fn parts_json(&self) -> PathBuf {
        self.folder().join("parts.json")
    }

    pub fn parts_dir(&self) -> PathBuf {
        self.folder().join(PARTS_DIR)
    }

    pub fn parts_label(&self) -> String {
        self.relative(PARTS_DIR)
    }

    /// Source audio path. The filename comes from `run.json` and must be a
    /// bare file name.
    pub fn audio(&self, filename: &str) -> Result<PathBuf> {
        let bare = Path::new(filename)
            .file_name()
            .is_some_and(|n| n == std::ffi::OsStr::new(filename));
        if !bare {
            return Err(QuietcutError::InvalidInput(format!(
                "source filename must be a bare file name: {filename:?}"
            )));
        }
        Ok(self.folder().join(filename))
    }
}

/// `run.json`, written by whoever dropped the recording on the volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Name of the unprocessed source recording.
    #[serde(rename = "IslenmemisFileName", default)]
    pub source_filename: Option<String>,
    /// Everything else in the file, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RunManifest {
    /// The source filename, or `MissingInput` when the key is absent or blank.
    pub fn require_source(&self) -> Result<&str> {
        self.source_filename
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                QuietcutError::MissingInput("run.json has no 'IslenmemisFileName' key".into())
            })
    }
}

/// `silence.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SilenceSidecar {
    pub silences: Vec<SilenceInterval>,
    pub total_segments: usize,
    pub created_at: String,
    pub analysis_version: String,
}

impl SilenceSidecar {
    pub fn new(silences: Vec<SilenceInterval>, created_at: String) -> Self {
        Self {
            total_segments: silences.len(),
            silences,
            created_at,
            analysis_version: ANALYSIS_VERSION.into(),
        }
    }
}

/// `parts.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartsSidecar {
    pub split_plan: SplitPlan,
    pub created_at: String,
}

/// Read and parse a JSON sidecar. A missing file is `NotFound`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => QuietcutError::NotFound {
            path: path.to_path_buf(),
        },
        _ => QuietcutError::Io(e),
    })?;
    debug!(path = %path.display(), "sidecar read");
    Ok(serde_json::from_str(&text)?)
}

/// Pretty-print `value` to `path`, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text)?;
    debug!(path = %path.display(), "sidecar written");
    Ok(())
}

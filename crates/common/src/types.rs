//! Core types for Retake

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Status of a single test result within one report-building session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Idle,
    Running,
    Success,
    Fail,
    Error,
    Skipped,
    Updated,
}

impl Default for TestStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl TestStatus {
    /// Non-terminal markers: the test is queued or mid-flight and its
    /// result does not consume an attempt number.
    pub fn is_in_progress(self) -> bool {
        matches!(self, TestStatus::Running | TestStatus::Idle)
    }

    /// Parse a persisted status column; unknown values degrade to IDLE
    pub fn parse(s: &str) -> Self {
        match s {
            "running" => TestStatus::Running,
            "success" => TestStatus::Success,
            "fail" => TestStatus::Fail,
            "error" => TestStatus::Error,
            "skipped" => TestStatus::Skipped,
            "updated" => TestStatus::Updated,
            _ => TestStatus::Idle,
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Idle => write!(f, "idle"),
            TestStatus::Running => write!(f, "running"),
            TestStatus::Success => write!(f, "success"),
            TestStatus::Fail => write!(f, "fail"),
            TestStatus::Error => write!(f, "error"),
            TestStatus::Skipped => write!(f, "skipped"),
            TestStatus::Updated => write!(f, "updated"),
        }
    }
}

/// Pixel dimensions of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// A finalized image: a report-relative path plus its dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    pub path: PathBuf,
    pub size: ImageSize,
}

/// An image reference as it travels through the pipeline.
///
/// Runners hand over either a file they already wrote, raw PNG bytes, or a
/// base64 payload. The artifact pipeline replaces every transient variant
/// with a `File` pointing into the report directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    File(ImageFile),
    Buffer {
        #[serde(with = "base64_bytes")]
        buffer: Vec<u8>,
    },
    Base64 {
        base64: String,
    },
}

impl ImageRef {
    pub fn as_file(&self) -> Option<&ImageFile> {
        match self {
            ImageRef::File(file) => Some(file),
            _ => None,
        }
    }

    /// Dimensions, when the reference already knows them
    pub fn size(&self) -> Option<ImageSize> {
        self.as_file().map(|f| f.size)
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self, ImageRef::File(_))
    }
}

impl From<ImageFile> for ImageRef {
    fn from(file: ImageFile) -> Self {
        ImageRef::File(file)
    }
}

/// Options forwarded to the diff worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffOptions {
    /// Per-channel color tolerance
    pub tolerance: f64,
    /// Extra tolerance applied to anti-aliased pixels
    pub anti_aliasing_tolerance: f64,
    #[serde(default)]
    pub ignore_antialiasing: bool,
    #[serde(default)]
    pub ignore_caret: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            tolerance: 2.3,
            anti_aliasing_tolerance: 4.0,
            ignore_antialiasing: true,
            ignore_caret: true,
        }
    }
}

/// Bounding box of one region of differing pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffCluster {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// Error payload attached to a failed test or assertion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestError {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl TestError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_empty() && self.stack.is_none()
    }
}

/// Structured failure details extracted from a runner error payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub title: String,
    pub data: serde_json::Value,
    /// Report-relative path the details JSON is written to
    pub file_path: PathBuf,
}

/// Per-state image record of one test result.
///
/// Tagged by outcome: the named-state variants carry `state_name`; the two
/// page-screenshot variants are synthetic entries appended after them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageInfo {
    Success {
        state_name: String,
        expected_img: ImageRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        actual_img: Option<ImageRef>,
    },
    Fail {
        state_name: String,
        expected_img: ImageRef,
        actual_img: ImageRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diff_img: Option<ImageRef>,
        #[serde(default)]
        diff_clusters: Vec<DiffCluster>,
        #[serde(default)]
        diff_options: DiffOptions,
    },
    NoRef {
        state_name: String,
        actual_img: ImageRef,
        error: TestError,
    },
    Updated {
        state_name: String,
        expected_img: ImageRef,
        actual_img: ImageRef,
    },
    PageError {
        actual_img: ImageRef,
        error: TestError,
    },
    PageSuccess {
        actual_img: ImageRef,
    },
}

impl ImageInfo {
    /// Name of the visual state, absent for the synthetic page entries
    pub fn state_name(&self) -> Option<&str> {
        match self {
            ImageInfo::Success { state_name, .. }
            | ImageInfo::Fail { state_name, .. }
            | ImageInfo::NoRef { state_name, .. }
            | ImageInfo::Updated { state_name, .. } => Some(state_name),
            ImageInfo::PageError { .. } | ImageInfo::PageSuccess { .. } => None,
        }
    }

    /// The test status this entry maps to
    pub fn status(&self) -> TestStatus {
        match self {
            ImageInfo::Success { .. } | ImageInfo::PageSuccess { .. } => TestStatus::Success,
            ImageInfo::Fail { .. } => TestStatus::Fail,
            ImageInfo::NoRef { .. } | ImageInfo::PageError { .. } => TestStatus::Error,
            ImageInfo::Updated { .. } => TestStatus::Updated,
        }
    }

    pub fn actual_img(&self) -> Option<&ImageRef> {
        match self {
            ImageInfo::Success { actual_img, .. } => actual_img.as_ref(),
            ImageInfo::Fail { actual_img, .. }
            | ImageInfo::NoRef { actual_img, .. }
            | ImageInfo::Updated { actual_img, .. }
            | ImageInfo::PageError { actual_img, .. }
            | ImageInfo::PageSuccess { actual_img } => Some(actual_img),
        }
    }

    pub fn expected_img(&self) -> Option<&ImageRef> {
        match self {
            ImageInfo::Success { expected_img, .. }
            | ImageInfo::Fail { expected_img, .. }
            | ImageInfo::Updated { expected_img, .. } => Some(expected_img),
            ImageInfo::NoRef { .. } | ImageInfo::PageError { .. } | ImageInfo::PageSuccess { .. } => {
                None
            }
        }
    }

    pub fn diff_img(&self) -> Option<&ImageRef> {
        match self {
            ImageInfo::Fail { diff_img, .. } => diff_img.as_ref(),
            _ => None,
        }
    }
}

/// Serde helper for byte payloads stored as base64 strings
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

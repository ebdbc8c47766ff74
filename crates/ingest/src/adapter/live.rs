//! Adapter over a live runner-emitted result payload
//!
//! All parsing and derivation over the raw event shape lives here; the rest
//! of the pipeline only ever sees the `TestResult` contract.

use retake_common::paths;
use retake_common::status::{determine_status, ensure_error_message, TestEventKind};
use retake_common::{
    DiffCluster, DiffOptions, ErrorDetails, ImageFile, ImageInfo, ImageRef, TestError, TestResult,
    TestStatus,
};
use serde::{Deserialize, Serialize};

use super::UNKNOWN_SESSION_ID;

/// Raw per-assertion outcome as emitted by a runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawAssertion {
    /// Screenshot compared against the reference and differences found
    DiffFound {
        state_name: String,
        ref_img: ImageFile,
        curr_img: ImageFile,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diff_img: Option<ImageFile>,
        /// Newer runners hand the rendered diff over inline
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diff_buffer: Option<Vec<u8>>,
        #[serde(default)]
        diff_clusters: Vec<DiffCluster>,
        #[serde(default)]
        diff_options: DiffOptions,
    },
    /// No reference image exists to compare against
    NoReference {
        state_name: String,
        curr_img: ImageFile,
        error: TestError,
    },
    /// Reference accepted from the current run
    Updated {
        state_name: String,
        ref_img: ImageFile,
        curr_img: ImageFile,
    },
    /// Comparison passed
    Captured {
        state_name: String,
        ref_img: ImageFile,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        curr_img: Option<ImageFile>,
    },
}

impl RawAssertion {
    pub fn state_name(&self) -> &str {
        match self {
            RawAssertion::DiffFound { state_name, .. }
            | RawAssertion::NoReference { state_name, .. }
            | RawAssertion::Updated { state_name, .. }
            | RawAssertion::Captured { state_name, .. } => state_name,
        }
    }
}

/// Whether any assertion carries image-diff evidence; this is what
/// separates a visual regression (FAIL) from a plain crash (ERROR).
pub fn has_image_diff(assertions: &[RawAssertion]) -> bool {
    assertions
        .iter()
        .any(|a| matches!(a, RawAssertion::DiffFound { .. }))
}

/// Error payload attached to the raw result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawError {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Full-page screenshot captured at failure time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ImageRef>,
    /// Structured failure details, shape `{title?, data}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// One test result as emitted by a runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTestResult {
    pub title: String,
    /// Enclosing suite titles, outermost first (test title excluded)
    pub suite_path: Vec<String>,
    pub browser_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub meta: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RawError>,
    #[serde(default)]
    pub assertions: Vec<RawAssertion>,
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// `TestResult` view over a live runner payload
pub struct LiveTestResult {
    raw: RawTestResult,
    attempt: usize,
    status: TestStatus,
    timestamp: i64,
}

impl LiveTestResult {
    pub fn new(raw: RawTestResult, attempt: usize, status: TestStatus) -> Self {
        let timestamp = raw
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        Self {
            raw,
            attempt,
            status,
            timestamp,
        }
    }

    /// Construct from a lifecycle event, deriving the canonical status
    pub fn from_event(event: TestEventKind, raw: RawTestResult, attempt: usize) -> Self {
        let status = determine_status(event, has_image_diff(&raw.assertions));
        Self::new(raw, attempt, status)
    }

    pub fn raw(&self) -> &RawTestResult {
        &self.raw
    }

    fn raw_error(&self) -> Option<TestError> {
        self.raw.error.as_ref().map(|err| TestError {
            name: if err.name.is_empty() {
                "Error".to_string()
            } else {
                err.name.clone()
            },
            message: err.message.clone(),
            stack: err.stack.clone(),
        })
    }
}

impl TestResult for LiveTestResult {
    fn test_path(&self) -> Vec<String> {
        let mut path = self.raw.suite_path.clone();
        path.push(self.raw.title.clone());
        path
    }

    fn browser_id(&self) -> &str {
        &self.raw.browser_id
    }

    fn attempt(&self) -> usize {
        self.attempt
    }

    fn status(&self) -> TestStatus {
        self.status
    }

    fn error(&self) -> Option<TestError> {
        let error = self.raw_error();

        match self.status {
            TestStatus::Fail | TestStatus::Error => Some(ensure_error_message(error)),
            _ => error.filter(|err| !err.is_empty()),
        }
    }

    fn error_details(&self) -> Option<ErrorDetails> {
        let details = self.raw.error.as_ref()?.details.as_ref()?;

        let title = details
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or("error details")
            .to_string();
        let data = details.get("data").cloned().unwrap_or_else(|| details.clone());

        Some(ErrorDetails {
            title,
            data,
            file_path: paths::details_path(&self.image_dir(), self.browser_id(), self.attempt),
        })
    }

    fn images_info(&self) -> Vec<ImageInfo> {
        let mut infos: Vec<ImageInfo> = self
            .raw
            .assertions
            .iter()
            .map(|assertion| match assertion {
                RawAssertion::DiffFound {
                    state_name,
                    ref_img,
                    curr_img,
                    diff_img,
                    diff_buffer,
                    diff_clusters,
                    diff_options,
                } => ImageInfo::Fail {
                    state_name: state_name.clone(),
                    expected_img: ImageRef::File(ref_img.clone()),
                    actual_img: ImageRef::File(curr_img.clone()),
                    diff_img: diff_img
                        .clone()
                        .map(ImageRef::File)
                        .or_else(|| diff_buffer.clone().map(|buffer| ImageRef::Buffer { buffer })),
                    diff_clusters: diff_clusters.clone(),
                    diff_options: diff_options.clone(),
                },
                RawAssertion::NoReference {
                    state_name,
                    curr_img,
                    error,
                } => ImageInfo::NoRef {
                    state_name: state_name.clone(),
                    actual_img: ImageRef::File(curr_img.clone()),
                    error: ensure_error_message(Some(error.clone())),
                },
                RawAssertion::Updated {
                    state_name,
                    ref_img,
                    curr_img,
                } => ImageInfo::Updated {
                    state_name: state_name.clone(),
                    expected_img: ImageRef::File(ref_img.clone()),
                    actual_img: ImageRef::File(curr_img.clone()),
                },
                RawAssertion::Captured {
                    state_name,
                    ref_img,
                    curr_img,
                } => ImageInfo::Success {
                    state_name: state_name.clone(),
                    expected_img: ImageRef::File(ref_img.clone()),
                    actual_img: curr_img.clone().map(ImageRef::File),
                },
            })
            .collect();

        // common screenshot on test fail, appended after the named states
        if let Some(screenshot) = self.screenshot() {
            let error = self.raw_error().filter(|err| !err.is_empty());
            infos.push(match error {
                Some(error) => ImageInfo::PageError {
                    actual_img: screenshot,
                    error: ensure_error_message(Some(error)),
                },
                None => ImageInfo::PageSuccess {
                    actual_img: screenshot,
                },
            });
        }

        infos
    }

    fn meta(&self) -> serde_json::Value {
        if self.raw.meta.is_object() {
            self.raw.meta.clone()
        } else {
            serde_json::json!({})
        }
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn session_id(&self) -> String {
        self.raw
            .session_id
            .clone()
            .unwrap_or_else(|| UNKNOWN_SESSION_ID.to_string())
    }

    fn screenshot(&self) -> Option<ImageRef> {
        self.raw.error.as_ref()?.screenshot.clone()
    }

    fn history(&self) -> Vec<String> {
        self.raw.history.clone()
    }

    fn multiple_tabs(&self) -> bool {
        true
    }

    fn skip_reason(&self) -> Option<String> {
        self.raw.skip_reason.clone()
    }

    fn url(&self) -> Option<String> {
        self.raw
            .meta
            .get("url")
            .and_then(|u| u.as_str())
            .map(str::to_owned)
    }
}

//! Adapter that patches fields over another adapter
//!
//! Used to apply attempt numbers and post-save image paths without
//! mutating the original result.

use retake_common::{ErrorDetails, ImageInfo, ImageRef, TestError, TestResult, TestStatus};
use std::sync::Arc;

/// `TestResult` wrapper overriding a subset of fields
#[derive(Clone)]
pub struct PatchedTestResult {
    inner: Arc<dyn TestResult>,
    attempt: Option<usize>,
    status: Option<TestStatus>,
    images_info: Option<Vec<ImageInfo>>,
}

impl PatchedTestResult {
    pub fn new(inner: Arc<dyn TestResult>) -> Self {
        Self {
            inner,
            attempt: None,
            status: None,
            images_info: None,
        }
    }

    pub fn with_attempt(mut self, attempt: usize) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_status(mut self, status: TestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_images_info(mut self, images_info: Vec<ImageInfo>) -> Self {
        self.images_info = Some(images_info);
        self
    }

    pub fn inner(&self) -> &Arc<dyn TestResult> {
        &self.inner
    }
}

impl std::fmt::Debug for PatchedTestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchedTestResult")
            .field("inner", &self.inner.id())
            .field("attempt", &self.attempt)
            .field("status", &self.status)
            .field("images_info", &self.images_info)
            .finish()
    }
}

impl TestResult for PatchedTestResult {
    fn test_path(&self) -> Vec<String> {
        self.inner.test_path()
    }

    fn browser_id(&self) -> &str {
        self.inner.browser_id()
    }

    fn attempt(&self) -> usize {
        self.attempt.unwrap_or_else(|| self.inner.attempt())
    }

    fn status(&self) -> TestStatus {
        self.status.unwrap_or_else(|| self.inner.status())
    }

    fn error(&self) -> Option<TestError> {
        self.inner.error()
    }

    fn error_details(&self) -> Option<ErrorDetails> {
        self.inner.error_details()
    }

    fn images_info(&self) -> Vec<ImageInfo> {
        self.images_info
            .clone()
            .unwrap_or_else(|| self.inner.images_info())
    }

    fn meta(&self) -> serde_json::Value {
        self.inner.meta()
    }

    fn timestamp(&self) -> i64 {
        self.inner.timestamp()
    }

    fn session_id(&self) -> String {
        self.inner.session_id()
    }

    fn screenshot(&self) -> Option<ImageRef> {
        self.inner.screenshot()
    }

    fn history(&self) -> Vec<String> {
        self.inner.history()
    }

    fn multiple_tabs(&self) -> bool {
        self.inner.multiple_tabs()
    }

    fn skip_reason(&self) -> Option<String> {
        self.inner.skip_reason()
    }

    fn url(&self) -> Option<String> {
        self.inner.url()
    }
}

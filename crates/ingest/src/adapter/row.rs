//! Adapter over a persisted result row
//!
//! Columns holding serialized JSON are parsed lazily on first access and
//! memoized per field; an unparseable column degrades to its default shape
//! instead of failing the read.

use once_cell::sync::OnceCell;
use retake_common::{
    ErrorDetails, ImageInfo, ImageRef, TestError, TestResult, TestResultRow, TestStatus,
};
use serde::de::DeserializeOwned;

use super::UNKNOWN_SESSION_ID;

fn try_parse<T: DeserializeOwned>(json: &str) -> Option<T> {
    serde_json::from_str(json).ok()
}

/// `TestResult` view over a stored row
pub struct DbTestResult {
    row: TestResultRow,
    test_path: OnceCell<Vec<String>>,
    images_info: OnceCell<Vec<ImageInfo>>,
    error: OnceCell<Option<TestError>>,
    meta: OnceCell<serde_json::Value>,
    history: OnceCell<Vec<String>>,
}

impl DbTestResult {
    pub fn new(row: TestResultRow) -> Self {
        Self {
            row,
            test_path: OnceCell::new(),
            images_info: OnceCell::new(),
            error: OnceCell::new(),
            meta: OnceCell::new(),
            history: OnceCell::new(),
        }
    }

    pub fn row(&self) -> &TestResultRow {
        &self.row
    }
}

impl TestResult for DbTestResult {
    fn test_path(&self) -> Vec<String> {
        self.test_path
            .get_or_init(|| try_parse(&self.row.suite_path).unwrap_or_default())
            .clone()
    }

    fn browser_id(&self) -> &str {
        &self.row.browser
    }

    fn attempt(&self) -> usize {
        self.row.attempt.max(0) as usize
    }

    fn status(&self) -> TestStatus {
        TestStatus::parse(&self.row.status)
    }

    fn error(&self) -> Option<TestError> {
        self.error
            .get_or_init(|| {
                self.row
                    .error
                    .as_deref()
                    .and_then(|json| try_parse(json))
            })
            .clone()
    }

    fn error_details(&self) -> Option<ErrorDetails> {
        // details payloads are written out at ingest time, not persisted
        None
    }

    fn images_info(&self) -> Vec<ImageInfo> {
        self.images_info
            .get_or_init(|| try_parse(&self.row.images_info).unwrap_or_default())
            .clone()
    }

    fn meta(&self) -> serde_json::Value {
        self.meta
            .get_or_init(|| try_parse(&self.row.meta).unwrap_or_else(|| serde_json::json!({})))
            .clone()
    }

    fn timestamp(&self) -> i64 {
        self.row.timestamp
    }

    fn session_id(&self) -> String {
        self.row
            .session_id
            .clone()
            .unwrap_or_else(|| UNKNOWN_SESSION_ID.to_string())
    }

    fn screenshot(&self) -> Option<ImageRef> {
        None
    }

    fn history(&self) -> Vec<String> {
        self.history
            .get_or_init(|| try_parse(&self.row.history).unwrap_or_default())
            .clone()
    }

    fn multiple_tabs(&self) -> bool {
        self.row.multiple_tabs
    }

    fn skip_reason(&self) -> Option<String> {
        self.row.skip_reason.clone()
    }

    fn url(&self) -> Option<String> {
        self.row.url.clone()
    }
}

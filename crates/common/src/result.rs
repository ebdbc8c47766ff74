//! The canonical test result contract
//!
//! Every raw result shape (live runner payload, persisted row, patched copy)
//! is exposed through the same read-only trait; all format-specific parsing
//! lives inside the implementing adapter.

use crate::hash::short_hash;
use crate::types::{ErrorDetails, ImageInfo, ImageRef, TestError, TestStatus};

/// Delimiter joining suite titles, test title, browser and attempt into ids
pub const TITLE_DELIMITER: &str = " ";

/// Stable id for one (test, browser) pair, attempt-independent
pub fn mk_test_id(full_name: &str, browser_id: &str) -> String {
    format!("{}.{}", full_name, browser_id)
}

/// Read-only view over one normalized test result
pub trait TestResult: Send + Sync {
    /// Suite titles followed by the test title, in order
    fn test_path(&self) -> Vec<String>;

    fn browser_id(&self) -> &str;

    /// Zero-based retry index within the session
    fn attempt(&self) -> usize;

    fn status(&self) -> TestStatus;

    fn error(&self) -> Option<TestError>;

    fn error_details(&self) -> Option<ErrorDetails>;

    /// Per-state image records, synthetic page entries last
    fn images_info(&self) -> Vec<ImageInfo>;

    /// Opaque key-value map attached by the runner
    fn meta(&self) -> serde_json::Value;

    fn timestamp(&self) -> i64;

    fn session_id(&self) -> String;

    /// Full-page screenshot attached to the failure, if any
    fn screenshot(&self) -> Option<ImageRef>;

    fn history(&self) -> Vec<String>;

    fn multiple_tabs(&self) -> bool;

    fn skip_reason(&self) -> Option<String>;

    fn url(&self) -> Option<String>;

    fn full_name(&self) -> String {
        self.test_path().join(TITLE_DELIMITER)
    }

    /// Identity string: test path + browser + attempt
    fn id(&self) -> String {
        let mut components = self.test_path();
        components.push(self.browser_id().to_string());
        components.push(self.attempt().to_string());
        components.join(TITLE_DELIMITER)
    }

    /// Name of the artifact directory holding this test's images
    fn image_dir(&self) -> String {
        short_hash(&mk_test_id(&self.full_name(), self.browser_id()))
    }
}

/// Identifies a test across attempts: suite path plus browser
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestSpec {
    pub test_path: Vec<String>,
    pub browser_id: String,
}

impl TestSpec {
    pub fn of(result: &dyn TestResult) -> Self {
        Self {
            test_path: result.test_path(),
            browser_id: result.browser_id().to_string(),
        }
    }

    pub fn full_name(&self) -> String {
        self.test_path.join(TITLE_DELIMITER)
    }

    pub fn test_id(&self) -> String {
        mk_test_id(&self.full_name(), &self.browser_id)
    }
}

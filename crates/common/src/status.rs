//! Status derivation from raw runner events
//!
//! Pure functions only; adapters call these over their own raw shapes.

use crate::types::{TestError, TestStatus};
use serde::{Deserialize, Serialize};

/// Lifecycle events emitted by the test runners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestEventKind {
    Begin,
    Pass,
    Fail,
    Retry,
    Pending,
}

/// Map a runner event onto a canonical status.
///
/// A failed or retried test counts as FAIL only when at least one of its
/// assertions carries image-diff evidence; a crash without visual evidence
/// is an ERROR.
pub fn determine_status(event: TestEventKind, has_image_diff: bool) -> TestStatus {
    match event {
        TestEventKind::Pass => TestStatus::Success,
        TestEventKind::Pending => TestStatus::Skipped,
        TestEventKind::Begin => TestStatus::Running,
        TestEventKind::Fail | TestEventKind::Retry => {
            if has_image_diff {
                TestStatus::Fail
            } else {
                TestStatus::Error
            }
        }
    }
}

/// Replace a missing or blank failure payload with a synthesized diagnostic.
///
/// Downstream rendering expects every failed result to carry a message.
pub fn ensure_error_message(error: Option<TestError>) -> TestError {
    match error {
        Some(err) if !err.message.is_empty() => err,
        Some(mut err) => {
            err.message = synthesized_message(&err.name);
            err
        }
        None => TestError::new("Error", synthesized_message("Error")),
    }
}

fn synthesized_message(name: &str) -> String {
    format!(
        "{}: the runner reported a failure but provided no readable details",
        name
    )
}

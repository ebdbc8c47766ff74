//! Completion notifications for external sinks
//!
//! The pipeline reports each finished per-test save through an explicit
//! channel handed over at construction time; GUI streaming and static
//! writers consume the receiving end.

use retake_common::ImageInfo;
use serde::Serialize;
use tokio::sync::mpsc;

/// Emitted once per test after all of its images are saved
#[derive(Debug, Clone, Serialize)]
pub struct ScreenshotsSaved {
    /// Attempt-independent test id (`full name.browser`)
    pub test_id: String,
    pub attempt: usize,
    pub images_info: Vec<ImageInfo>,
}

pub type EventSender = mpsc::UnboundedSender<ScreenshotsSaved>;
pub type EventReceiver = mpsc::UnboundedReceiver<ScreenshotsSaved>;

/// Create the completion-event channel pair
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

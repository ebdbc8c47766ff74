//! Retake Ingest
//!
//! Normalizes raw test-runner events into the canonical result model and
//! manages the screenshot artifacts attached to each attempt: result
//! adapters over heterogeneous raw shapes, per-(test, browser) attempt
//! numbering, and the image artifact pipeline with diff dedup and
//! reference-image reuse.

pub mod adapter;
pub mod attempts;
pub mod config;
pub mod error;
pub mod events;
pub mod saver;
pub mod worker;

// Re-export commonly used types
pub use adapter::{
    has_image_diff, DbTestResult, LiveTestResult, PatchedTestResult, RawAssertion, RawError,
    RawTestResult, UNKNOWN_SESSION_ID,
};
pub use attempts::AttemptManager;
pub use config::ReportConfig;
pub use error::{IngestError, IngestResult};
pub use events::{channel, EventReceiver, EventSender, ScreenshotsSaved};
pub use saver::{
    new_diff_images_cache, new_expected_paths_cache, save_error_details, DiffImagesCache,
    ExpectedPathsCache, ImageSaver, ImagesInfoSaver, ImagesInfoSaverOptions, LocalImageSaver,
};
pub use worker::{DiffRequest, DiffWorker, PixelDiffWorker};

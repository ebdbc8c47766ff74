//! Retake Common Library
//!
//! Shared types, status derivation, caching and the persistence contract
//! for the Retake report pipeline.

pub mod cache;
pub mod db;
pub mod error;
pub mod hash;
pub mod paths;
pub mod result;
pub mod status;
pub mod types;

// Re-export commonly used types
pub use cache::Cache;
pub use db::{ImageStore, ResultsDb, TestResultRow};
pub use error::{Error, Result};
pub use result::{mk_test_id, TestResult, TestSpec, TITLE_DELIMITER};
pub use status::{determine_status, ensure_error_message, TestEventKind};
pub use types::*;

/// Retake version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

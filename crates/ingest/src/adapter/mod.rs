//! Result adapters
//!
//! A closed set of variants, each exposing the canonical read-only
//! `TestResult` contract over a different raw source shape: the live
//! runner payload, a persisted database row, and a patched copy that
//! overrides a subset of fields without mutating the original.

pub mod live;
pub mod patched;
pub mod row;

pub use live::{has_image_diff, LiveTestResult, RawAssertion, RawError, RawTestResult};
pub use patched::PatchedTestResult;
pub use row::DbTestResult;

/// Session id reported when the runner did not provide one
pub const UNKNOWN_SESSION_ID: &str = "unknown session id";

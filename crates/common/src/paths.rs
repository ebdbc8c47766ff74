//! Destination-path convention for report artifacts
//!
//! Paths are deterministic functions of (attempt, browser, artifact dir,
//! state name); the report renderer resolves the same convention.

use crate::result::TestResult;
use std::path::{Path, PathBuf};

/// Subdirectory of the report holding all image artifacts
pub const IMAGES_PATH: &str = "images";

/// Subdirectory of the report holding extracted error-details payloads
pub const ERROR_DETAILS_PATH: &str = "error-details";

/// Artifact flavor within one (test, state, attempt)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Reference,
    Current,
    Diff,
}

impl ImageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageKind::Reference => "ref",
            ImageKind::Current => "current",
            ImageKind::Diff => "diff",
        }
    }
}

/// Build the report-relative path for one image artifact:
/// `images/{image_dir}/{state_name}/{browser}~{kind}_{attempt}.png`
pub fn image_path(
    kind: ImageKind,
    image_dir: &str,
    browser_id: &str,
    attempt: usize,
    state_name: Option<&str>,
) -> PathBuf {
    let mut path = PathBuf::from(IMAGES_PATH);
    path.push(image_dir);
    if let Some(state) = state_name {
        path.push(state);
    }
    path.push(format!("{}~{}_{}.png", browser_id, kind.as_str(), attempt));
    path
}

pub fn reference_path(result: &dyn TestResult, state_name: Option<&str>) -> PathBuf {
    result_image_path(ImageKind::Reference, result, state_name)
}

pub fn current_path(result: &dyn TestResult, state_name: Option<&str>) -> PathBuf {
    result_image_path(ImageKind::Current, result, state_name)
}

pub fn diff_path(result: &dyn TestResult, state_name: Option<&str>) -> PathBuf {
    result_image_path(ImageKind::Diff, result, state_name)
}

fn result_image_path(
    kind: ImageKind,
    result: &dyn TestResult,
    state_name: Option<&str>,
) -> PathBuf {
    image_path(
        kind,
        &result.image_dir(),
        result.browser_id(),
        result.attempt(),
        state_name,
    )
}

/// Staging location mirroring a report-relative destination under the
/// system temp dir
pub fn temp_path(dest: &Path) -> PathBuf {
    std::env::temp_dir().join(dest)
}

/// Report-relative path for an extracted error-details payload
pub fn details_path(image_dir: &str, browser_id: &str, attempt: usize) -> PathBuf {
    PathBuf::from(ERROR_DETAILS_PATH).join(format!(
        "{}-{}_{}.json",
        image_dir, browser_id, attempt
    ))
}

//! Image artifact pipeline
//!
//! Takes a normalized result with zero or more visual assertions and
//! produces final persisted image files for each of them, returning a
//! patched result whose image references point at the final paths.
//!
//! Per assertion, the actual, diff and expected sub-operations run
//! concurrently and are joined; assertions of one test are fanned out the
//! same way. Diff computation is dedup'd through a content-hash cache, and
//! unchanged reference images are reused across retries and runs instead
//! of being rewritten.

use crate::adapter::PatchedTestResult;
use crate::error::{IngestError, IngestResult};
use crate::events::{EventSender, ScreenshotsSaved};
use crate::worker::{DiffRequest, DiffWorker};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use futures::future::try_join_all;
use retake_common::hash::{content_hash, short_hash};
use retake_common::{
    mk_test_id, paths, Cache, DiffOptions, ImageFile, ImageInfo, ImageRef, ImageSize, ImageStore,
    TestResult, TestSpec, TestStatus,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Reference paths resolved earlier in the session, keyed by
/// (test identity, state name)
pub type ExpectedPathsCache = Cache<(TestSpec, Option<String>), PathBuf>;

/// Generated diff paths keyed by the content hash of
/// (actual bytes ++ expected bytes)
pub type DiffImagesCache = Cache<String, PathBuf>;

pub fn new_expected_paths_cache() -> ExpectedPathsCache {
    Cache::new(|(spec, state): &(TestSpec, Option<String>)| {
        format!(
            "{}#{}",
            short_hash(&spec.test_id()),
            state.as_deref().unwrap_or_default()
        )
    })
}

pub fn new_diff_images_cache() -> DiffImagesCache {
    Cache::new(|hash: &String| hash.clone())
}

/// Boundary placing a source file at its report-relative destination.
///
/// The local implementation copies into the report directory; substitutes
/// may upload elsewhere and return the path they served it from.
#[async_trait]
pub trait ImageSaver: Send + Sync {
    async fn save_img(
        &self,
        source: &Path,
        dest: &Path,
        report_dir: &Path,
    ) -> IngestResult<PathBuf>;
}

/// Default saver writing into the report directory on local disk
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalImageSaver;

#[async_trait]
impl ImageSaver for LocalImageSaver {
    async fn save_img(
        &self,
        source: &Path,
        dest: &Path,
        report_dir: &Path,
    ) -> IngestResult<PathBuf> {
        let resolved = report_dir.join(dest);
        make_dir_for(&resolved).await?;
        tokio::fs::copy(source, &resolved).await?;
        Ok(dest.to_path_buf())
    }
}

/// Construction inputs for [`ImagesInfoSaver`]
pub struct ImagesInfoSaverOptions {
    pub report_path: PathBuf,
    /// Persistence boundary used to reuse reference images from prior runs
    pub image_store: Arc<dyn ImageStore>,
    pub expected_paths: Arc<ExpectedPathsCache>,
    pub diff_images: Arc<DiffImagesCache>,
    /// Defaults to [`LocalImageSaver`]
    pub image_saver: Option<Arc<dyn ImageSaver>>,
    /// Completion events, one per test, once its images are saved
    pub events: Option<EventSender>,
}

/// The per-test image artifact pipeline
pub struct ImagesInfoSaver {
    report_path: PathBuf,
    image_store: Arc<dyn ImageStore>,
    expected_paths: Arc<ExpectedPathsCache>,
    diff_images: Arc<DiffImagesCache>,
    image_saver: Arc<dyn ImageSaver>,
    events: Option<EventSender>,
}

impl ImagesInfoSaver {
    pub fn new(options: ImagesInfoSaverOptions) -> Self {
        Self {
            report_path: options.report_path,
            image_store: options.image_store,
            expected_paths: options.expected_paths,
            diff_images: options.diff_images,
            image_saver: options
                .image_saver
                .unwrap_or_else(|| Arc::new(LocalImageSaver)),
            events: options.events,
        }
    }

    /// Save every image of `result`, returning a patched copy whose image
    /// list points at the final report-relative paths.
    ///
    /// Assertions are processed concurrently; one failing sub-operation
    /// fails the whole per-test save. Callers are expected to isolate one
    /// test's failure from other tests.
    pub async fn save(
        &self,
        result: Arc<dyn TestResult>,
        worker: Option<Arc<dyn DiffWorker>>,
    ) -> IngestResult<PatchedTestResult> {
        debug!("Saving images of {}", result.id());

        let worker = worker.as_deref();
        let new_images_info = try_join_all(
            result
                .images_info()
                .into_iter()
                .map(|info| self.process_images_info(result.as_ref(), info, worker)),
        )
        .await?;

        if let Some(events) = &self.events {
            let event = ScreenshotsSaved {
                test_id: mk_test_id(&result.full_name(), result.browser_id()),
                attempt: result.attempt(),
                images_info: new_images_info.clone(),
            };
            if events.send(event).is_err() {
                debug!("Screenshots-saved listener is gone");
            }
        }

        Ok(PatchedTestResult::new(result).with_images_info(new_images_info))
    }

    async fn process_images_info(
        &self,
        result: &dyn TestResult,
        info: ImageInfo,
        worker: Option<&dyn DiffWorker>,
    ) -> IngestResult<ImageInfo> {
        let state_name = info.state_name().map(str::to_owned);
        let state = state_name.as_deref();

        let (actual, diff, expected) = tokio::try_join!(
            self.save_actual_image(result, &info, state),
            self.save_diff_image(result, &info, state, worker),
            self.save_expected_image(result, &info, state),
        )?;

        Ok(merge_images_info(info, actual, diff, expected))
    }

    async fn save_actual_image(
        &self,
        result: &dyn TestResult,
        info: &ImageInfo,
        state_name: Option<&str>,
    ) -> IngestResult<Option<ImageFile>> {
        let actual = match info.actual_img() {
            Some(actual) => actual,
            None => return Ok(None),
        };

        let dest = paths::current_path(result, state_name);
        self.save_image(actual, &dest).await.map(Some)
    }

    async fn save_diff_image(
        &self,
        result: &dyn TestResult,
        info: &ImageInfo,
        state_name: Option<&str>,
        worker: Option<&dyn DiffWorker>,
    ) -> IngestResult<Option<ImageFile>> {
        if info.status() != TestStatus::Fail {
            return Ok(None);
        }

        let dest = paths::diff_path(result, state_name);

        if let Some(diff) = info.diff_img() {
            return self.save_image(diff, &dest).await.map(Some);
        }

        let (actual, expected) = match (info.actual_img(), info.expected_img()) {
            (Some(actual), Some(expected)) => (actual, expected),
            _ => return Ok(None),
        };
        let options = match info {
            ImageInfo::Fail { diff_options, .. } => diff_options.clone(),
            _ => DiffOptions::default(),
        };

        self.create_diff(result, actual, expected, options, &dest, worker)
            .await
            .map(Some)
    }

    /// Compute (or reuse) a diff for an assertion that did not supply one
    async fn create_diff(
        &self,
        result: &dyn TestResult,
        actual: &ImageRef,
        expected: &ImageRef,
        options: DiffOptions,
        dest_rel: &Path,
        worker: Option<&dyn DiffWorker>,
    ) -> IngestResult<ImageFile> {
        let (actual_path, expected_path) = tokio::try_join!(
            self.source_path(actual, dest_rel, "actual"),
            self.source_path(expected, dest_rel, "expected"),
        )?;
        let (actual_bytes, expected_bytes) = tokio::try_join!(
            image_bytes(actual, &actual_path),
            image_bytes(expected, &expected_path),
        )?;

        let hash = format!(
            "{}{}",
            content_hash(&actual_bytes),
            content_hash(&expected_bytes)
        );
        let dest_abs = self.report_path.join(dest_rel);

        if let Some(cached) = self.diff_images.get(&hash) {
            debug!("Diff cache hit for {}", result.id());
            make_dir_for(&dest_abs).await?;
            tokio::fs::copy(&cached, &dest_abs).await?;
        } else {
            let worker = worker.ok_or_else(|| IngestError::NoDiffWorker {
                test_id: result.id(),
            })?;

            make_dir_for(&dest_abs).await?;
            worker
                .save_diff_to(
                    DiffRequest {
                        options,
                        reference: expected_path,
                        current: actual_path,
                    },
                    &dest_abs,
                )
                .await?;
            debug!("Created new diff in file {:?}", dest_abs);

            self.diff_images.set(&hash, Some(dest_abs.clone()));
        }

        let size = read_image_size(&dest_abs).await?;
        Ok(ImageFile {
            path: dest_rel.to_path_buf(),
            size,
        })
    }

    async fn save_expected_image(
        &self,
        result: &dyn TestResult,
        info: &ImageInfo,
        state_name: Option<&str>,
    ) -> IngestResult<Option<ImageFile>> {
        let expected = match info.expected_img() {
            Some(expected) => expected,
            None => return Ok(None),
        };

        let key = (TestSpec::of(result), state_name.map(str::to_owned));

        // an accepted update always creates a new reference; past reuse
        // must not apply
        if info.status() != TestStatus::Updated {
            if let Some(reused) = self.reused_expected_path(&key) {
                debug!("Reused expected image from {:?}", reused);
                let size = match expected.size() {
                    Some(size) => size,
                    None => read_image_size(&self.report_path.join(&reused)).await?,
                };
                return Ok(Some(ImageFile { path: reused, size }));
            }
        }

        let dest = paths::reference_path(result, state_name);
        let saved = self.save_image(expected, &dest).await?;

        if info.status() == TestStatus::Updated {
            self.expected_paths.set(&key, Some(saved.path.clone()));
        }

        Ok(Some(saved))
    }

    /// Cheapest source first: the session cache, then the most recent
    /// stored result for the same suite path and browser
    fn reused_expected_path(&self, key: &(TestSpec, Option<String>)) -> Option<PathBuf> {
        if let Some(path) = self.expected_paths.get(key) {
            return Some(path);
        }

        let info = self.image_store.last_image_info(&key.0, key.1.as_deref())?;
        let file = info.expected_img()?.as_file()?.clone();

        self.expected_paths.set(key, Some(file.path.clone()));
        Some(file.path)
    }

    /// Place one image at its report-relative destination
    async fn save_image(&self, image: &ImageRef, dest_rel: &Path) -> IngestResult<ImageFile> {
        let source = self.source_path(image, dest_rel, "staged").await?;
        let saved = self
            .image_saver
            .save_img(&source, dest_rel, &self.report_path)
            .await?;
        debug!("Saved image from {:?} to {:?}", source, saved);

        let size = match image.size() {
            Some(size) => size,
            None => read_image_size(&self.report_path.join(&saved)).await?,
        };

        Ok(ImageFile { path: saved, size })
    }

    /// Path of an on-disk file backing the reference; transient payloads
    /// are materialized under the temp staging mirror first
    async fn source_path(
        &self,
        image: &ImageRef,
        dest_rel: &Path,
        label: &str,
    ) -> IngestResult<PathBuf> {
        match image {
            ImageRef::File(file) => Ok(file.path.clone()),
            ImageRef::Buffer { buffer } => write_staged(buffer, dest_rel, label).await,
            ImageRef::Base64 { base64 } => {
                let bytes = STANDARD.decode(base64)?;
                write_staged(&bytes, dest_rel, label).await
            }
        }
    }
}

/// Write error-details payloads extracted from the failure into the report
pub async fn save_error_details(
    result: &dyn TestResult,
    report_path: &Path,
) -> IngestResult<()> {
    let details = match result.error_details() {
        Some(details) => details,
        None => return Ok(()),
    };

    let dest = report_path.join(&details.file_path);
    make_dir_for(&dest).await?;
    tokio::fs::write(&dest, serde_json::to_vec_pretty(&details.data)?).await?;

    debug!("Saved error details of {} to {:?}", result.id(), dest);
    Ok(())
}

/// Keep only the image fields the sub-operations actually produced
fn merge_images_info(
    info: ImageInfo,
    actual: Option<ImageFile>,
    diff: Option<ImageFile>,
    expected: Option<ImageFile>,
) -> ImageInfo {
    match info {
        ImageInfo::Success {
            state_name,
            expected_img,
            ..
        } => ImageInfo::Success {
            state_name,
            expected_img: expected.map(ImageRef::File).unwrap_or(expected_img),
            actual_img: actual.map(ImageRef::File),
        },
        ImageInfo::Fail {
            state_name,
            expected_img,
            actual_img,
            diff_clusters,
            diff_options,
            ..
        } => ImageInfo::Fail {
            state_name,
            expected_img: expected.map(ImageRef::File).unwrap_or(expected_img),
            actual_img: actual.map(ImageRef::File).unwrap_or(actual_img),
            diff_img: diff.map(ImageRef::File),
            diff_clusters,
            diff_options,
        },
        ImageInfo::NoRef {
            state_name,
            actual_img,
            error,
        } => ImageInfo::NoRef {
            state_name,
            actual_img: actual.map(ImageRef::File).unwrap_or(actual_img),
            error,
        },
        ImageInfo::Updated {
            state_name,
            expected_img,
            actual_img,
        } => ImageInfo::Updated {
            state_name,
            expected_img: expected.map(ImageRef::File).unwrap_or(expected_img),
            actual_img: actual.map(ImageRef::File).unwrap_or(actual_img),
        },
        ImageInfo::PageError { actual_img, error } => ImageInfo::PageError {
            actual_img: actual.map(ImageRef::File).unwrap_or(actual_img),
            error,
        },
        ImageInfo::PageSuccess { actual_img } => ImageInfo::PageSuccess {
            actual_img: actual.map(ImageRef::File).unwrap_or(actual_img),
        },
    }
}

async fn write_staged(bytes: &[u8], dest_rel: &Path, label: &str) -> IngestResult<PathBuf> {
    let mirror = paths::temp_path(dest_rel);
    let file_name = mirror
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("image.png");
    let staged = mirror.with_file_name(format!("{}~{}", label, file_name));

    make_dir_for(&staged).await?;
    tokio::fs::write(&staged, bytes).await?;
    Ok(staged)
}

async fn image_bytes(image: &ImageRef, source: &Path) -> IngestResult<Vec<u8>> {
    match image {
        ImageRef::File(_) => Ok(tokio::fs::read(source).await?),
        ImageRef::Buffer { buffer } => Ok(buffer.clone()),
        ImageRef::Base64 { base64 } => Ok(STANDARD.decode(base64)?),
    }
}

async fn make_dir_for(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

async fn read_image_size(path: &Path) -> IngestResult<ImageSize> {
    let path = path.to_path_buf();
    let (width, height) = tokio::task::spawn_blocking(move || image::image_dimensions(&path))
        .await
        .map_err(|e| IngestError::Worker(e.to_string()))??;

    Ok(ImageSize { width, height })
}

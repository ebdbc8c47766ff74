//! Diff-generation worker boundary
//!
//! The pipeline only depends on the `DiffWorker` call contract; where the
//! pixels are actually compared (in-process pool, separate processes) is a
//! deployment choice. `PixelDiffWorker` is the in-process provider.

use crate::error::{IngestError, IngestResult};
use async_trait::async_trait;
use image::RgbaImage;
use retake_common::DiffOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Inputs for one diff computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffRequest {
    pub options: DiffOptions,
    /// Path of the reference (expected) image
    pub reference: PathBuf,
    /// Path of the current (actual) image
    pub current: PathBuf,
}

/// Compute boundary producing diff images
#[async_trait]
pub trait DiffWorker: Send + Sync {
    /// Generate the diff for `request` and write it at `dest`
    async fn save_diff_to(&self, request: DiffRequest, dest: &Path) -> IngestResult<()>;
}

/// In-process diff provider running on the blocking pool.
///
/// Differing pixels are rendered opaque red over a dimmed copy of the
/// current image; regions present in only one of the images count as
/// differing.
#[derive(Debug, Default, Clone, Copy)]
pub struct PixelDiffWorker;

#[async_trait]
impl DiffWorker for PixelDiffWorker {
    async fn save_diff_to(&self, request: DiffRequest, dest: &Path) -> IngestResult<()> {
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || render_diff(&request, &dest))
            .await
            .map_err(|e| IngestError::Worker(e.to_string()))?
    }
}

fn render_diff(request: &DiffRequest, dest: &Path) -> IngestResult<()> {
    let reference = image::open(&request.reference)?.to_rgba8();
    let current = image::open(&request.current)?.to_rgba8();

    let width = current.width().max(reference.width());
    let height = current.height().max(reference.height());
    let tolerance = request.options.tolerance.ceil() as i32;

    let mut diff_img = RgbaImage::new(width, height);
    let mut diff_pixels = 0u64;

    for y in 0..height {
        for x in 0..width {
            let curr = pixel_at(&current, x, y);
            let refp = pixel_at(&reference, x, y);

            match (curr, refp) {
                (Some(c), Some(r)) if !pixels_differ(c, r, tolerance) => {
                    // keep the matching pixel but dim it
                    diff_img.put_pixel(
                        x,
                        y,
                        image::Rgba([c[0] / 2, c[1] / 2, c[2] / 2, 128]),
                    );
                }
                _ => {
                    diff_pixels += 1;
                    diff_img.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
                }
            }
        }
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    diff_img.save(dest)?;

    debug!(
        "Rendered diff to {:?} ({} differing pixels)",
        dest, diff_pixels
    );
    Ok(())
}

fn pixel_at(img: &RgbaImage, x: u32, y: u32) -> Option<&image::Rgba<u8>> {
    if x < img.width() && y < img.height() {
        Some(img.get_pixel(x, y))
    } else {
        None
    }
}

fn pixels_differ(a: &image::Rgba<u8>, b: &image::Rgba<u8>, tolerance: i32) -> bool {
    for i in 0..4 {
        let diff = (a[i] as i32 - b[i] as i32).abs();
        if diff > tolerance {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_png(path: &Path, color: [u8; 4]) {
        let img = RgbaImage::from_pixel(4, 2, image::Rgba(color));
        img.save(path).unwrap();
    }

    #[tokio::test]
    async fn renders_diff_at_destination() {
        let tmp = TempDir::new().unwrap();
        let reference = tmp.path().join("ref.png");
        let current = tmp.path().join("curr.png");
        write_png(&reference, [0, 0, 0, 255]);
        write_png(&current, [255, 255, 255, 255]);

        let dest = tmp.path().join("nested/diff.png");
        PixelDiffWorker
            .save_diff_to(
                DiffRequest {
                    options: DiffOptions::default(),
                    reference,
                    current,
                },
                &dest,
            )
            .await
            .unwrap();

        let diff = image::open(&dest).unwrap().to_rgba8();
        assert_eq!(diff.dimensions(), (4, 2));
        assert_eq!(diff.get_pixel(0, 0), &image::Rgba([255, 0, 0, 255]));
    }

    #[tokio::test]
    async fn identical_images_yield_no_marked_pixels() {
        let tmp = TempDir::new().unwrap();
        let reference = tmp.path().join("ref.png");
        let current = tmp.path().join("curr.png");
        write_png(&reference, [10, 20, 30, 255]);
        write_png(&current, [10, 20, 30, 255]);

        let dest = tmp.path().join("diff.png");
        PixelDiffWorker
            .save_diff_to(
                DiffRequest {
                    options: DiffOptions::default(),
                    reference,
                    current,
                },
                &dest,
            )
            .await
            .unwrap();

        let diff = image::open(&dest).unwrap().to_rgba8();
        assert_eq!(diff.get_pixel(0, 0), &image::Rgba([5, 10, 15, 128]));
    }
}

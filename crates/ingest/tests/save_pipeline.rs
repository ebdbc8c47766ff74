//! End-to-end tests of the image artifact pipeline

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;
use retake_common::paths;
use retake_common::{
    DiffOptions, ImageFile, ImageSize, ResultsDb, TestEventKind, TestResult, TestStatus,
};
use retake_ingest::{
    channel, new_diff_images_cache, new_expected_paths_cache, DiffRequest, DiffWorker,
    EventSender, ImagesInfoSaver, ImagesInfoSaverOptions, IngestError, IngestResult,
    LiveTestResult, PatchedTestResult, RawAssertion, RawTestResult,
};
use tempfile::TempDir;

/// Stub worker writing a fixed image at the requested destination
#[derive(Default)]
struct CountingWorker {
    calls: AtomicUsize,
}

#[async_trait]
impl DiffWorker for CountingWorker {
    async fn save_diff_to(&self, _request: DiffRequest, dest: &Path) -> IngestResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        RgbaImage::from_pixel(4, 2, image::Rgba([255, 0, 255, 255]))
            .save(dest)
            .map_err(IngestError::from)?;
        Ok(())
    }
}

fn png_file(dir: &Path, name: &str, color: [u8; 4]) -> ImageFile {
    let path = dir.join(name);
    RgbaImage::from_pixel(4, 2, image::Rgba(color))
        .save(&path)
        .unwrap();
    ImageFile {
        path,
        size: ImageSize {
            width: 4,
            height: 2,
        },
    }
}

fn raw_result(title: &str, assertions: Vec<RawAssertion>) -> RawTestResult {
    RawTestResult {
        title: title.to_string(),
        suite_path: vec!["app".to_string()],
        browser_id: "chrome".to_string(),
        session_id: Some("session-1".to_string()),
        meta: serde_json::json!({}),
        error: None,
        assertions,
        history: Vec::new(),
        skip_reason: None,
        timestamp: Some(1_000),
    }
}

fn fail_result(
    title: &str,
    state: &str,
    actual: ImageFile,
    expected: ImageFile,
    attempt: usize,
) -> Arc<dyn TestResult> {
    Arc::new(LiveTestResult::from_event(
        TestEventKind::Fail,
        raw_result(
            title,
            vec![RawAssertion::DiffFound {
                state_name: state.to_string(),
                ref_img: expected,
                curr_img: actual,
                diff_img: None,
                diff_buffer: None,
                diff_clusters: Vec::new(),
                diff_options: DiffOptions::default(),
            }],
        ),
        attempt,
    ))
}

fn new_saver(report: &Path, db: &ResultsDb, events: Option<EventSender>) -> ImagesInfoSaver {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    ImagesInfoSaver::new(ImagesInfoSaverOptions {
        report_path: report.to_path_buf(),
        image_store: Arc::new(db.clone()),
        expected_paths: Arc::new(new_expected_paths_cache()),
        diff_images: Arc::new(new_diff_images_cache()),
        image_saver: None,
        events,
    })
}

#[tokio::test]
async fn diff_lands_at_conventional_path_and_is_dedup_d() {
    let report = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let db = ResultsDb::open_memory().unwrap();
    let saver = new_saver(report.path(), &db, None);
    let worker = Arc::new(CountingWorker::default());

    let result_a = fail_result(
        "A",
        "main",
        png_file(src.path(), "a-actual.png", [255, 255, 255, 255]),
        png_file(src.path(), "a-expected.png", [0, 0, 0, 255]),
        0,
    );
    let expected_diff_path = paths::diff_path(result_a.as_ref(), Some("main"));

    let saved = saver
        .save(result_a.clone(), Some(worker.clone()))
        .await
        .unwrap();

    let infos = saved.images_info();
    assert_eq!(infos.len(), 1);
    let diff = infos[0].diff_img().unwrap().as_file().unwrap().clone();
    assert_eq!(diff.path, expected_diff_path);
    assert!(report.path().join(&diff.path).exists());
    assert_eq!(worker.calls.load(Ordering::SeqCst), 1);

    // a second test with byte-identical actual/expected images reuses the
    // generated diff instead of recomputing it
    let result_b = fail_result(
        "B",
        "main",
        png_file(src.path(), "b-actual.png", [255, 255, 255, 255]),
        png_file(src.path(), "b-expected.png", [0, 0, 0, 255]),
        0,
    );

    let saved_b = saver.save(result_b, Some(worker.clone())).await.unwrap();
    assert_eq!(worker.calls.load(Ordering::SeqCst), 1);

    let diff_b = saved_b.images_info()[0]
        .diff_img()
        .unwrap()
        .as_file()
        .unwrap()
        .clone();
    assert_ne!(diff_b.path, diff.path);

    let bytes_a = std::fs::read(report.path().join(&diff.path)).unwrap();
    let bytes_b = std::fs::read(report.path().join(&diff_b.path)).unwrap();
    assert_eq!(bytes_a, bytes_b);
}

#[tokio::test]
async fn missing_worker_is_fatal_and_leaves_no_partial_file() {
    let report = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let db = ResultsDb::open_memory().unwrap();
    let saver = new_saver(report.path(), &db, None);

    let result = fail_result(
        "C",
        "main",
        png_file(src.path(), "c-actual.png", [200, 0, 0, 255]),
        png_file(src.path(), "c-expected.png", [0, 200, 0, 255]),
        0,
    );
    let diff_path = paths::diff_path(result.as_ref(), Some("main"));

    let err = saver.save(result, None).await.unwrap_err();
    assert!(matches!(&err, IngestError::NoDiffWorker { .. }));
    assert!(err.to_string().contains("diff worker"));
    assert!(!report.path().join(diff_path).exists());
}

#[tokio::test]
async fn supplied_diff_bytes_need_no_worker() {
    let report = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let db = ResultsDb::open_memory().unwrap();
    let saver = new_saver(report.path(), &db, None);

    let mut diff_bytes = Vec::new();
    RgbaImage::from_pixel(4, 2, image::Rgba([1, 2, 3, 255]))
        .write_to(
            &mut std::io::Cursor::new(&mut diff_bytes),
            image::ImageOutputFormat::Png,
        )
        .unwrap();

    let result: Arc<dyn TestResult> = Arc::new(LiveTestResult::from_event(
        TestEventKind::Fail,
        raw_result(
            "D",
            vec![RawAssertion::DiffFound {
                state_name: "main".to_string(),
                ref_img: png_file(src.path(), "d-expected.png", [9, 9, 9, 255]),
                curr_img: png_file(src.path(), "d-actual.png", [7, 7, 7, 255]),
                diff_img: None,
                diff_buffer: Some(diff_bytes),
                diff_clusters: Vec::new(),
                diff_options: DiffOptions::default(),
            }],
        ),
        0,
    ));

    let saved = saver.save(result.clone(), None).await.unwrap();
    let diff = saved.images_info()[0]
        .diff_img()
        .unwrap()
        .as_file()
        .unwrap()
        .clone();

    assert_eq!(diff.path, paths::diff_path(result.as_ref(), Some("main")));
    assert!(report.path().join(&diff.path).exists());
    assert_eq!(
        diff.size,
        ImageSize {
            width: 4,
            height: 2
        }
    );
}

#[tokio::test]
async fn expected_image_is_reused_from_prior_stored_result() {
    let report = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let db = ResultsDb::open_memory().unwrap();
    let saver = new_saver(report.path(), &db, None);
    let worker = Arc::new(CountingWorker::default());

    // a prior run already stored a reference for (app E, chrome, "main")
    let prior_ref = ImageFile {
        path: PathBuf::from("images/prior/main/chrome~ref_0.png"),
        size: ImageSize {
            width: 4,
            height: 2,
        },
    };
    let prior: Arc<dyn TestResult> = Arc::new(LiveTestResult::from_event(
        TestEventKind::Pass,
        raw_result(
            "E",
            vec![RawAssertion::Captured {
                state_name: "main".to_string(),
                ref_img: prior_ref.clone(),
                curr_img: None,
            }],
        ),
        0,
    ));
    db.write(&PatchedTestResult::new(prior).with_images_info(vec![
        retake_common::ImageInfo::Success {
            state_name: "main".to_string(),
            expected_img: prior_ref.clone().into(),
            actual_img: None,
        },
    ]))
    .unwrap();

    let retry = fail_result(
        "E",
        "main",
        png_file(src.path(), "e-actual.png", [255, 255, 0, 255]),
        png_file(src.path(), "e-expected.png", [0, 255, 255, 255]),
        1,
    );
    let fresh_ref_path = paths::reference_path(retry.as_ref(), Some("main"));

    let saved = saver.save(retry, Some(worker)).await.unwrap();
    let expected = saved.images_info()[0]
        .expected_img()
        .unwrap()
        .as_file()
        .unwrap()
        .clone();

    // the stored path is reused exactly; no fresh reference is written
    assert_eq!(expected.path, prior_ref.path);
    assert!(!report.path().join(fresh_ref_path).exists());
}

#[tokio::test]
async fn accepted_update_writes_a_new_reference_and_primes_reuse() {
    let report = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let db = ResultsDb::open_memory().unwrap();
    let saver = new_saver(report.path(), &db, None);
    let worker = Arc::new(CountingWorker::default());

    let updated: Arc<dyn TestResult> = Arc::new(LiveTestResult::new(
        raw_result(
            "F",
            vec![RawAssertion::Updated {
                state_name: "main".to_string(),
                ref_img: png_file(src.path(), "f-ref.png", [5, 5, 5, 255]),
                curr_img: png_file(src.path(), "f-curr.png", [5, 5, 5, 255]),
            }],
        ),
        0,
        TestStatus::Updated,
    ));
    let updated_ref_path = paths::reference_path(updated.as_ref(), Some("main"));

    let saved = saver.save(updated, None).await.unwrap();
    let expected = saved.images_info()[0]
        .expected_img()
        .unwrap()
        .as_file()
        .unwrap()
        .clone();
    assert_eq!(expected.path, updated_ref_path);
    assert!(report.path().join(&updated_ref_path).exists());

    // a later retry of the same state reuses the accepted reference
    let retry = fail_result(
        "F",
        "main",
        png_file(src.path(), "f-actual.png", [50, 5, 5, 255]),
        png_file(src.path(), "f-expected.png", [5, 5, 5, 255]),
        1,
    );
    let retry_ref_path = paths::reference_path(retry.as_ref(), Some("main"));

    let saved = saver.save(retry, Some(worker)).await.unwrap();
    let reused = saved.images_info()[0]
        .expected_img()
        .unwrap()
        .as_file()
        .unwrap()
        .clone();

    assert_eq!(reused.path, updated_ref_path);
    assert!(!report.path().join(retry_ref_path).exists());
}

#[tokio::test]
async fn completion_event_is_emitted_once_per_test() {
    let report = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let db = ResultsDb::open_memory().unwrap();
    let (tx, mut rx) = channel();
    let saver = new_saver(report.path(), &db, Some(tx));

    let result = fail_result(
        "G",
        "main",
        png_file(src.path(), "g-actual.png", [255, 255, 255, 255]),
        png_file(src.path(), "g-expected.png", [0, 0, 0, 255]),
        2,
    );

    saver
        .save(result, Some(Arc::new(CountingWorker::default())))
        .await
        .unwrap();

    let event = rx.try_recv().unwrap();
    assert_eq!(event.test_id, "app G.chrome");
    assert_eq!(event.attempt, 2);
    assert_eq!(event.images_info.len(), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn actual_image_is_placed_at_conventional_path() {
    let report = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let db = ResultsDb::open_memory().unwrap();
    let saver = new_saver(report.path(), &db, None);

    let result = fail_result(
        "H",
        "main",
        png_file(src.path(), "h-actual.png", [1, 1, 1, 255]),
        png_file(src.path(), "h-expected.png", [2, 2, 2, 255]),
        0,
    );
    let current_path = paths::current_path(result.as_ref(), Some("main"));

    let saved = saver
        .save(result, Some(Arc::new(CountingWorker::default())))
        .await
        .unwrap();
    let actual = saved.images_info()[0]
        .actual_img()
        .unwrap()
        .as_file()
        .unwrap()
        .clone();

    assert_eq!(actual.path, current_path);
    assert!(report.path().join(&actual.path).exists());
}

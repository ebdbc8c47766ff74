//! SQLite persistence for normalized test results
//!
//! Only the query/write contract the pipeline depends on lives here; the
//! report database engine, wider schema and migrations are external.

use crate::result::{TestResult, TestSpec};
use crate::types::ImageInfo;
use crate::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Query boundary the artifact pipeline resolves prior reference images
/// through
pub trait ImageStore: Send + Sync {
    /// Image info of the given state in the most recent stored result for
    /// (suite path, browser), by timestamp descending. Only the latest row
    /// is inspected; an older row carrying the state is not consulted.
    fn last_image_info(&self, spec: &TestSpec, state_name: Option<&str>) -> Option<ImageInfo>;
}

/// Database wrapper for result persistence
#[derive(Clone)]
pub struct ResultsDb {
    conn: Arc<Mutex<Connection>>,
}

impl ResultsDb {
    /// Open or create database at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        info!("Opened results database at {:?}", path.as_ref());
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS test_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                suite_path TEXT NOT NULL,
                browser TEXT NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                images_info TEXT NOT NULL DEFAULT '[]',
                meta TEXT NOT NULL DEFAULT '{}',
                history TEXT NOT NULL DEFAULT '[]',
                skip_reason TEXT,
                url TEXT,
                session_id TEXT,
                multiple_tabs INTEGER NOT NULL DEFAULT 1,
                attempt INTEGER NOT NULL DEFAULT 0,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_test_results_suite
                ON test_results(suite_path, browser);
            "#,
        )?;

        debug!("Results schema initialized");
        Ok(())
    }

    /// Persist one normalized result
    pub fn write(&self, result: &dyn TestResult) -> Result<()> {
        let suite_path = serde_json::to_string(&result.test_path())?;
        let error = result
            .error()
            .map(|err| serde_json::to_string(&err))
            .transpose()?;
        let images_info = serde_json::to_string(&result.images_info())?;
        let meta = serde_json::to_string(&result.meta())?;
        let history = serde_json::to_string(&result.history())?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO test_results (suite_path, browser, status, error, images_info, \
             meta, history, skip_reason, url, session_id, multiple_tabs, attempt, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                suite_path,
                result.browser_id(),
                result.status().to_string(),
                error,
                images_info,
                meta,
                history,
                result.skip_reason(),
                result.url(),
                result.session_id(),
                result.multiple_tabs(),
                result.attempt() as i64,
                result.timestamp(),
            ],
        )?;

        debug!("Wrote result {}", result.id());
        Ok(())
    }

    /// All stored rows for a (suite path, browser) pair, oldest first
    pub fn rows_for(&self, spec: &TestSpec) -> Result<Vec<TestResultRow>> {
        let suite_path = serde_json::to_string(&spec.test_path)?;
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT suite_path, browser, status, error, images_info, meta, history, \
             skip_reason, url, session_id, multiple_tabs, attempt, timestamp \
             FROM test_results WHERE suite_path = ?1 AND browser = ?2 \
             ORDER BY timestamp ASC",
        )?;

        let rows = stmt.query_map(params![suite_path, spec.browser_id], TestResultRow::from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }

    /// Serialized images-info column of the most recent row for the pair
    fn last_images_info_json(&self, spec: &TestSpec) -> Result<Option<String>> {
        let suite_path = serde_json::to_string(&spec.test_path)?;
        let conn = self.conn.lock();

        let json = conn
            .query_row(
                "SELECT images_info FROM test_results \
                 WHERE suite_path = ?1 AND browser = ?2 \
                 ORDER BY timestamp DESC LIMIT 1",
                params![suite_path, spec.browser_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(json)
    }

    /// Highest attempt number stored for the pair
    pub fn last_attempt(&self, spec: &TestSpec) -> Result<Option<usize>> {
        let suite_path = serde_json::to_string(&spec.test_path)?;
        let conn = self.conn.lock();

        let attempt: Option<i64> = conn
            .query_row(
                "SELECT MAX(attempt) FROM test_results \
                 WHERE suite_path = ?1 AND browser = ?2",
                params![suite_path, spec.browser_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        Ok(attempt.map(|a| a as usize))
    }

    /// Delete every stored result for the pair, returning the row count
    pub fn delete(&self, spec: &TestSpec) -> Result<usize> {
        let suite_path = serde_json::to_string(&spec.test_path)?;
        let conn = self.conn.lock();

        let rows = conn.execute(
            "DELETE FROM test_results WHERE suite_path = ?1 AND browser = ?2",
            params![suite_path, spec.browser_id],
        )?;

        if rows > 0 {
            debug!("Deleted {} results for {}", rows, spec.test_id());
        }

        Ok(rows)
    }

    fn last_image_info_inner(
        &self,
        spec: &TestSpec,
        state_name: Option<&str>,
    ) -> Result<Option<ImageInfo>> {
        let json = match self.last_images_info_json(spec)? {
            Some(json) => json,
            None => return Ok(None),
        };

        let images_info: Vec<ImageInfo> = serde_json::from_str(&json)?;

        Ok(images_info
            .into_iter()
            .find(|info| info.state_name() == state_name))
    }
}

impl ImageStore for ResultsDb {
    fn last_image_info(&self, spec: &TestSpec, state_name: Option<&str>) -> Option<ImageInfo> {
        match self.last_image_info_inner(spec, state_name) {
            Ok(info) => info,
            Err(e) => {
                warn!("Failed to read prior image info for {}: {}", spec.test_id(), e);
                None
            }
        }
    }
}

/// Raw persisted row; columns are JSON strings parsed lazily by the row
/// adapter
#[derive(Debug, Clone)]
pub struct TestResultRow {
    pub suite_path: String,
    pub browser: String,
    pub status: String,
    pub error: Option<String>,
    pub images_info: String,
    pub meta: String,
    pub history: String,
    pub skip_reason: Option<String>,
    pub url: Option<String>,
    pub session_id: Option<String>,
    pub multiple_tabs: bool,
    pub attempt: i64,
    pub timestamp: i64,
}

impl TestResultRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            suite_path: row.get(0)?,
            browser: row.get(1)?,
            status: row.get(2)?,
            error: row.get(3)?,
            images_info: row.get(4)?,
            meta: row.get(5)?,
            history: row.get(6)?,
            skip_reason: row.get(7)?,
            url: row.get(8)?,
            session_id: row.get(9)?,
            multiple_tabs: row.get(10)?,
            attempt: row.get(11)?,
            timestamp: row.get(12)?,
        })
    }
}

/// Convenience constructor for callers holding only path components
pub fn spec_for(test_path: &[&str], browser_id: &str) -> TestSpec {
    TestSpec {
        test_path: test_path.iter().map(|s| s.to_string()).collect(),
        browser_id: browser_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageFile, ImageRef, ImageSize, TestError, TestStatus};
    use crate::ErrorDetails;
    use std::path::PathBuf;

    struct FakeResult {
        attempt: usize,
        timestamp: i64,
        images_info: Vec<ImageInfo>,
    }

    impl TestResult for FakeResult {
        fn test_path(&self) -> Vec<String> {
            vec!["suite".to_string(), "test".to_string()]
        }
        fn browser_id(&self) -> &str {
            "chrome"
        }
        fn attempt(&self) -> usize {
            self.attempt
        }
        fn status(&self) -> TestStatus {
            TestStatus::Fail
        }
        fn error(&self) -> Option<TestError> {
            Some(TestError::new("Error", "images differ"))
        }
        fn error_details(&self) -> Option<ErrorDetails> {
            None
        }
        fn images_info(&self) -> Vec<ImageInfo> {
            self.images_info.clone()
        }
        fn meta(&self) -> serde_json::Value {
            serde_json::json!({"browserVersion": "120"})
        }
        fn timestamp(&self) -> i64 {
            self.timestamp
        }
        fn session_id(&self) -> String {
            "session-1".to_string()
        }
        fn screenshot(&self) -> Option<ImageRef> {
            None
        }
        fn history(&self) -> Vec<String> {
            vec!["click".to_string()]
        }
        fn multiple_tabs(&self) -> bool {
            true
        }
        fn skip_reason(&self) -> Option<String> {
            None
        }
        fn url(&self) -> Option<String> {
            Some("http://localhost/page".to_string())
        }
    }

    fn success_info(state: &str, path: &str) -> ImageInfo {
        ImageInfo::Success {
            state_name: state.to_string(),
            expected_img: ImageRef::File(ImageFile {
                path: PathBuf::from(path),
                size: ImageSize {
                    width: 4,
                    height: 2,
                },
            }),
            actual_img: None,
        }
    }

    #[test]
    fn write_then_read_rows() {
        let db = ResultsDb::open_memory().unwrap();
        let result = FakeResult {
            attempt: 0,
            timestamp: 100,
            images_info: vec![success_info("plain", "images/abc/plain/chrome~ref_0.png")],
        };

        db.write(&result).unwrap();

        let spec = spec_for(&["suite", "test"], "chrome");
        let rows = db.rows_for(&spec).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].browser, "chrome");
        assert_eq!(rows[0].status, "fail");
        assert_eq!(rows[0].attempt, 0);

        assert_eq!(db.last_attempt(&spec).unwrap(), Some(0));
        assert_eq!(db.rows_for(&spec_for(&["other"], "chrome")).unwrap().len(), 0);
    }

    #[test]
    fn last_image_info_picks_latest_row_only() {
        let db = ResultsDb::open_memory().unwrap();
        let spec = spec_for(&["suite", "test"], "chrome");

        db.write(&FakeResult {
            attempt: 0,
            timestamp: 100,
            images_info: vec![success_info("plain", "images/abc/plain/chrome~ref_0.png")],
        })
        .unwrap();
        db.write(&FakeResult {
            attempt: 1,
            timestamp: 200,
            images_info: vec![success_info("header", "images/abc/header/chrome~ref_1.png")],
        })
        .unwrap();

        let info = db.last_image_info(&spec, Some("header")).unwrap();
        assert_eq!(info.state_name(), Some("header"));

        // "plain" exists only in the older row, which is not consulted
        assert!(db.last_image_info(&spec, Some("plain")).is_none());
    }

    #[test]
    fn delete_by_selector() {
        let db = ResultsDb::open_memory().unwrap();
        let spec = spec_for(&["suite", "test"], "chrome");

        db.write(&FakeResult {
            attempt: 0,
            timestamp: 100,
            images_info: Vec::new(),
        })
        .unwrap();

        assert_eq!(db.delete(&spec).unwrap(), 1);
        assert!(db.rows_for(&spec).unwrap().is_empty());
        assert_eq!(db.last_attempt(&spec).unwrap(), None);
    }
}

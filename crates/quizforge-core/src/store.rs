//! Persistence collaborator implementations.
//!
//! An in-memory store for tests and embedded use, and a JSON-file store
//! for real deployments. Both treat missing or unreadable state as
//! absence, never as an error; a stored report for a different test id
//! is also absence.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::report::TestReport;
use crate::session::Session;
use crate::traits::SessionStore;

/// In-memory session store.
#[derive(Default)]
pub struct MemoryStore {
    session: Mutex<Option<Session>>,
    result: Mutex<Option<TestReport>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn load_session(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    fn save_session(&self, session: &Session) -> anyhow::Result<()> {
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    fn clear_session(&self) {
        *self.session.lock().unwrap() = None;
    }

    fn load_result(&self, test_id: &str) -> Option<TestReport> {
        self.result
            .lock()
            .unwrap()
            .clone()
            .filter(|r| r.test_id == test_id)
    }

    fn save_result(&self, _test_id: &str, report: &TestReport) -> anyhow::Result<()> {
        *self.result.lock().unwrap() = Some(report.clone());
        Ok(())
    }

    fn clear_result(&self) {
        *self.result.lock().unwrap() = None;
    }
}

/// JSON-file session store: one file per key under a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join("session.json")
    }

    fn result_path(&self) -> PathBuf {
        self.dir.join("result.json")
    }

    fn read<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(
                    path = %path.display(),
                    "discarding unparsable stored state: {e}"
                );
                None
            }
        }
    }

    fn write<T: Serialize>(&self, path: &Path, value: &T) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn remove(path: &Path) {
        let _ = std::fs::remove_file(path);
    }
}

impl SessionStore for JsonFileStore {
    fn load_session(&self) -> Option<Session> {
        self.read(&self.session_path())
    }

    fn save_session(&self, session: &Session) -> anyhow::Result<()> {
        self.write(&self.session_path(), session)
    }

    fn clear_session(&self) {
        Self::remove(&self.session_path());
    }

    fn load_result(&self, test_id: &str) -> Option<TestReport> {
        self.read::<TestReport>(&self.result_path())
            .filter(|r| r.test_id == test_id)
    }

    fn save_result(&self, _test_id: &str, report: &TestReport) -> anyhow::Result<()> {
        self.write(&self.result_path(), report)
    }

    fn clear_result(&self) {
        Self::remove(&self.result_path());
    }
}

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use alarmvault_core::storage::{ConfigStore, ConfigStoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::instrument;

/// Config store backed by a single JSON object on disk. Every `set` rewrites
/// the whole file through a temp file so a crash never leaves it half written.
pub struct JsonFileConfigStore {
    path: PathBuf,
    // Serializes read-modify-write of the file within this process.
    lock: Mutex<()>,
}

impl JsonFileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for JsonFileConfigStore {
    #[instrument(skip_all, fields(key = %key))]
    async fn get(&self, key: &str) -> Result<Option<Value>, ConfigStoreError> {
        let _guard = self.lock.lock().map_err(|err| ConfigStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        let mut doc = read_document(&self.path)?;
        Ok(doc.remove(key))
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn set(&self, key: &str, value: Value) -> Result<(), ConfigStoreError> {
        let _guard = self.lock.lock().map_err(|err| ConfigStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        let mut doc = read_document(&self.path)?;
        doc.insert(key.to_string(), value);
        write_document(&self.path, &doc)
    }
}

fn read_document(path: &Path) -> Result<Map<String, Value>, ConfigStoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(err) => return Err(storage_err(err)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    match serde_json::from_slice(&bytes).map_err(storage_err)? {
        Value::Object(map) => Ok(map),
        other => Err(ConfigStoreError::Storage {
            reason: format!("expected a JSON object in {}, found {other}", path.display()),
        }),
    }
}

fn write_document(path: &Path, doc: &Map<String, Value>) -> Result<(), ConfigStoreError> {
    let parent = path.parent().ok_or_else(|| ConfigStoreError::Storage {
        reason: "invalid config store path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    let json = serde_json::to_vec_pretty(doc).map_err(storage_err)?;
    tmp.write_all(&json).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn storage_err<E: ToString>(err: E) -> ConfigStoreError {
    ConfigStoreError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tracing_subscriber::fmt::format::FmtSpan;

    use super::*;

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .expect("capture lock")
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("capture lock")).into_owned()
        }
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileConfigStore::new(dir.path().join("store.json"));
        assert_eq!(store.get("scheduledAlarms").await.expect("get"), None);
    }

    #[tokio::test]
    async fn values_survive_a_new_instance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileConfigStore::new(&path);
        store
            .set("pushEncSessionKeys", json!({"pid1": {"cipherTextB64": "c", "ivB64": "i"}}))
            .await
            .expect("set");
        store.set("scheduledAlarms", json!([])).await.expect("set");

        let reopened = JsonFileConfigStore::new(&path);
        assert_eq!(
            reopened.get("pushEncSessionKeys").await.expect("get"),
            Some(json!({"pid1": {"cipherTextB64": "c", "ivB64": "i"}}))
        );
        assert_eq!(
            reopened.get("scheduledAlarms").await.expect("get"),
            Some(json!([]))
        );
    }

    #[tokio::test]
    async fn rejects_non_object_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        fs::write(&path, "[1, 2, 3]").expect("write");

        let store = JsonFileConfigStore::new(&path);
        let err = store.get("k").await.expect_err("should fail");
        assert!(matches!(err, ConfigStoreError::Storage { .. }));
    }

    #[tokio::test]
    async fn spans_record_the_key() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileConfigStore::new(dir.path().join("store.json"));
        store.set("scheduledAlarms", json!([])).await.expect("set");
        store.get("pushEncSessionKeys").await.expect("get");

        let output = captured.text();
        assert!(output.contains("key=scheduledAlarms"), "{output}");
        assert!(output.contains("key=pushEncSessionKeys"), "{output}");
    }
}

//! Append-only JSON lines store.
//!
//! One [`NewsRecord`] per line. The whole file is read once at open to build
//! the fingerprint index; afterwards records are only appended. Lines that do
//! not parse are skipped with a warning so a torn final write does not lock
//! the store.
//!
//! A write that fails partway is cut back off the file before the error is
//! returned. If that is not possible the next append starts on a fresh line,
//! so only the failed record is lost.

use crate::error::StoreError;
use crate::models::NewsRecord;
use crate::store::NewsStore;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

struct FileInner {
    file: File,
    index: HashSet<String>,
    records: Vec<NewsRecord>,
    /// File length after the last complete record.
    len: u64,
    /// The file may end in a partial line.
    torn: bool,
}

pub struct JsonFileStore {
    path: PathBuf,
    inner: Mutex<FileInner>,
}

impl std::fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileStore").field("path", &self.path).finish()
    }
}

impl JsonFileStore {
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let mut index = HashSet::new();
        let mut records = Vec::new();
        let mut needs_newline = false;
        match fs::read_to_string(path).await {
            Ok(contents) => {
                needs_newline = !contents.is_empty() && !contents.ends_with('\n');
                for (lineno, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<NewsRecord>(line) {
                        Ok(record) => {
                            if index.insert(record.fingerprint.clone()) {
                                records.push(record);
                            }
                        }
                        Err(e) => warn!(line = lineno + 1, error = %e, "Skipping unreadable record"),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        // A torn last line must not swallow the next append.
        if needs_newline {
            file.write_all(b"\n").await?;
            file.flush().await?;
        }
        let len = file.metadata().await?.len();
        debug!(records = records.len(), bytes = len, "Loaded records file");

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileInner {
                file,
                index,
                records,
                len,
                torn: false,
            }),
        })
    }

    async fn write_flushed(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
        file.write_all(bytes).await?;
        file.flush().await
    }

    /// Cut the file back to the last complete record. When that fails, mark
    /// the tail as torn so the next append starts a new line.
    async fn discard_partial(inner: &mut FileInner) {
        match inner.file.set_len(inner.len).await {
            Ok(()) => debug!(bytes = inner.len, "Truncated partial write"),
            Err(e) => {
                warn!(error = %e, "Could not truncate partial write");
                inner.torn = true;
                if let Ok(meta) = inner.file.metadata().await {
                    inner.len = meta.len();
                }
            }
        }
    }

    async fn append(inner: &mut FileInner, batch: Vec<&NewsRecord>) -> Result<usize, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut buf = String::new();
        if inner.torn {
            buf.push('\n');
        }
        for record in &batch {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }
        if let Err(e) = Self::write_flushed(&mut inner.file, buf.as_bytes()).await {
            warn!(error = %e, "Append failed; discarding partial write");
            Self::discard_partial(inner).await;
            return Err(e.into());
        }
        inner.len += buf.len() as u64;
        inner.torn = false;
        // Index only after the write succeeded.
        for record in &batch {
            inner.index.insert(record.fingerprint.clone());
            inner.records.push((*record).clone());
        }
        Ok(batch.len())
    }
}

#[async_trait]
impl NewsStore for JsonFileStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let meta = fs::metadata(&self.path).await?;
        if meta.is_file() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "{} is not a regular file",
                self.path.display()
            )))
        }
    }

    async fn contains(&self, fingerprint: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.index.contains(fingerprint))
    }

    async fn insert_if_absent(&self, record: &NewsRecord) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.index.contains(&record.fingerprint) {
            return Ok(false);
        }
        Ok(Self::append(&mut inner, vec![record]).await? == 1)
    }

    async fn insert_many(&self, records: &[NewsRecord]) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut batch_keys = HashSet::new();
        let batch: Vec<&NewsRecord> = records
            .iter()
            .filter(|r| {
                !inner.index.contains(&r.fingerprint) && batch_keys.insert(r.fingerprint.as_str())
            })
            .collect();
        Self::append(&mut inner, batch).await
    }

    async fn all(&self) -> Result<Vec<NewsRecord>, StoreError> {
        Ok(self.inner.lock().await.records.clone())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.lock().await.records.len())
    }
}

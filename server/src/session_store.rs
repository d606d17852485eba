use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use system::{bincode, Background, SessionId};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

const SESSION_FILE_EXTENSION: &str = "session";

/// Persisted part of a session: who joined and the background snapshot.
/// Drawing history is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub users: Vec<String>,
    pub image: Background,
}

impl SessionRecord {
    pub fn new(creator: String, image: Background) -> Self {
        Self {
            users: vec![creator],
            image,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupted session record: {0}")]
    Encoding(#[from] bincode::Error),
}

pub type UpdateFn = Box<dyn FnOnce(&mut SessionRecord) + Send>;

/// Blob store of session records, keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, record: SessionRecord) -> Result<SessionId, StoreError>;

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Applies `update` under the store's write lock and returns the result.
    async fn update(&self, session_id: &str, update: UpdateFn)
        -> Result<SessionRecord, StoreError>;

    async fn list(&self) -> Result<Vec<(SessionId, SessionRecord)>, StoreError>;

    /// Deleting a missing record is not an error.
    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;
}

/// One bincode file per session under a directory.
pub struct FileSessionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub async fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    // Only uuids are accepted so a session id can never name a path outside `dir`.
    fn file_name(&self, session_id: &str) -> Option<PathBuf> {
        let id = Uuid::parse_str(session_id).ok()?;
        Some(
            self.dir
                .join(format!("{}.{}", id.hyphenated(), SESSION_FILE_EXTENSION)),
        )
    }

    async fn read(path: &Path) -> Result<Option<SessionRecord>, StoreError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(path: &Path, record: &SessionRecord) -> Result<(), StoreError> {
        let bytes = bincode::serialize(record)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, record: SessionRecord) -> Result<SessionId, StoreError> {
        let session_id = Uuid::new_v4().hyphenated().to_string();
        let path = self
            .file_name(&session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.clone()))?;
        let _guard = self.write_lock.lock().await;
        Self::write(&path, &record).await?;
        Ok(session_id)
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        match self.file_name(session_id) {
            Some(path) => Self::read(&path).await,
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        session_id: &str,
        update: UpdateFn,
    ) -> Result<SessionRecord, StoreError> {
        let not_found = || StoreError::NotFound(session_id.to_owned());
        let path = self.file_name(session_id).ok_or_else(not_found)?;
        let _guard = self.write_lock.lock().await;
        let mut record = Self::read(&path).await?.ok_or_else(not_found)?;
        update(&mut record);
        Self::write(&path, &record).await?;
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<(SessionId, SessionRecord)>, StoreError> {
        let mut result = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SESSION_FILE_EXTENSION) {
                continue;
            }
            let session_id = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if Uuid::parse_str(stem).is_ok() => stem.to_owned(),
                _ => continue,
            };
            match Self::read(&path).await {
                Ok(Some(record)) => result.push((session_id, record)),
                // deleted between read_dir and read
                Ok(None) => {}
                Err(err) => log::warn!("skipping session file {:?}: {}", path, err),
            }
        }
        result.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(result)
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        let path = match self.file_name(session_id) {
            Some(path) => path,
            None => return Ok(()),
        };
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Keeps records in memory. Used by tests and throwaway servers.
#[derive(Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<SessionId, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` under a caller-chosen id.
    pub async fn insert(&self, session_id: impl Into<SessionId>, record: SessionRecord) {
        self.records.lock().await.insert(session_id.into(), record);
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.records.lock().await.contains_key(session_id)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: SessionRecord) -> Result<SessionId, StoreError> {
        let session_id = Uuid::new_v4().hyphenated().to_string();
        self.records.lock().await.insert(session_id.clone(), record);
        Ok(session_id)
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.records.lock().await.get(session_id).cloned())
    }

    async fn update(
        &self,
        session_id: &str,
        update: UpdateFn,
    ) -> Result<SessionRecord, StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_owned()))?;
        update(record);
        Ok(record.clone())
    }

    async fn list(&self) -> Result<Vec<(SessionId, SessionRecord)>, StoreError> {
        let mut result: Vec<_> = self
            .records
            .lock()
            .await
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        result.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(result)
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.records.lock().await.remove(session_id);
        Ok(())
    }
}

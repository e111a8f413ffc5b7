// JSON-document data store with an in-memory cache and serialized writes

use crate::error::ChatError;
use crate::types::AppData;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

/// File name of the persisted data document
pub const DATA_FILE_NAME: &str = "no-skills-data.json";

/// Single source of truth for the application data.
///
/// The store owns the on-disk representation exclusively: reads come from an
/// in-memory cache populated on first use, and every write replaces the whole
/// document ("last full write wins"). Writes are serialized under one mutex
/// so two saves never interleave partial file contents. Concurrent processes
/// sharing the same file are out of scope.
pub struct DataStore {
    path: PathBuf,
    cache: RwLock<Option<AppData>>,
    write_gate: Mutex<()>,
}

impl DataStore {
    /// Create a store backed by `<data_dir>/no-skills-data.json`
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(DATA_FILE_NAME),
            cache: RwLock::new(None),
            write_gate: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return a snapshot of the current document, reading the backing file on
    /// first call and initializing it with the empty default when absent.
    pub async fn load(&self) -> Result<AppData, ChatError> {
        if let Some(data) = self.cache.read().await.as_ref() {
            return Ok(data.clone());
        }

        let mut cache = self.cache.write().await;
        // Another task may have populated the cache while we waited
        if let Some(data) = cache.as_ref() {
            return Ok(data.clone());
        }

        let data = self.read_or_init().await?;
        *cache = Some(data.clone());
        Ok(data)
    }

    /// Replace the cache and persist the entire document.
    ///
    /// The cache is updated before the file write completes; a failed write
    /// leaves the cache pointing at the attempted state, which is an accepted
    /// inconsistency for this scope.
    pub async fn save(&self, data: AppData) -> Result<(), ChatError> {
        {
            let mut cache = self.cache.write().await;
            *cache = Some(data.clone());
        }

        let _gate = self.write_gate.lock().await;
        self.write_file(&data).await
    }

    /// Standard write path: snapshot the document, run the mutator on the
    /// clone, and persist only when it succeeds. An error from the mutator
    /// aborts the persist, so no partial mutation becomes visible.
    pub async fn with_mutation<T, F>(&self, mutate: F) -> Result<T, ChatError>
    where
        F: FnOnce(&mut AppData) -> Result<T, ChatError>,
    {
        let mut working = self.load().await?;
        let result = mutate(&mut working)?;
        self.save(working).await?;
        Ok(result)
    }

    async fn read_or_init(&self) -> Result<AppData, ChatError> {
        match fs::read(&self.path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let data = AppData::default();
                self.write_file(&data).await?;
                Ok(data)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn write_file(&self, data: &AppData) -> Result<(), ChatError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let raw = serde_json::to_vec_pretty(data)?;
        fs::write(&self.path, raw).await?;
        Ok(())
    }
}

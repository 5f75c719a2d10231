use async_trait::async_trait;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

use super::RegistrationRepository;
use crate::error::{AppError, AppResult};
use crate::registration::Registration;

/// Key-value store of JSON documents
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn keys(&self) -> AppResult<Vec<String>>;

    async fn get(&self, key: &str) -> AppResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> AppResult<()>;

    /// No existence check
    async fn delete(&self, key: &str) -> AppResult<()>;
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Value>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn keys(&self) -> AppResult<Vec<String>> {
        Ok(self.blobs.read().await.keys().cloned().collect())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> AppResult<()> {
        self.blobs.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}

/// One `{key}.json` file per blob under a directory.
///
/// Keys are escaped so that any id maps to a single file name inside the
/// directory.
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub async fn open(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(FsBlobStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn keys(&self) -> AppResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(".json") {
                if let Some(key) = decode_key(stem) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        match tokio::fs::read(self.blob_path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Value) -> AppResult<()> {
        let path = self.blob_path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&value)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        match tokio::fs::remove_file(self.blob_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Percent-encoded key; `/` never survives so a key cannot leave the directory.
fn encode_key(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

fn decode_key(encoded: &str) -> Option<String> {
    urlencoding::decode(encoded).ok().map(Cow::into_owned)
}

/// Registrations keyed by id in a [`BlobStore`]
pub struct BlobRepository<S> {
    store: S,
    // update is check-then-write
    write_lock: Mutex<()>,
}

impl<S: BlobStore> BlobRepository<S> {
    pub fn new(store: S) -> Self {
        BlobRepository {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: BlobStore> RegistrationRepository for BlobRepository<S> {
    async fn insert(&self, registration: &Registration) -> AppResult<()> {
        self.store
            .set(&registration.id, serde_json::to_value(registration)?)
            .await
    }

    async fn list(&self) -> AppResult<Vec<Registration>> {
        let mut registrations = Vec::new();
        for key in self.store.keys().await? {
            // a key may vanish between keys() and get()
            if let Some(value) = self.store.get(&key).await? {
                match serde_json::from_value::<Registration>(value) {
                    Ok(registration) => registrations.push(registration),
                    Err(e) => log::warn!("skipping unreadable registration blob {}: {}", key, e),
                }
            }
        }
        Ok(registrations)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Registration>> {
        match self.store.get(id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, registration: &Registration) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        if self.store.get(&registration.id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Registration {} not found",
                registration.id
            )));
        }
        self.store
            .set(&registration.id, serde_json::to_value(registration)?)
            .await
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        self.store.delete(id).await
    }
}

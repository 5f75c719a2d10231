//! Registration persistence.
//!
//! Two strategies, never combined:
//! - [`ListStore`]: the whole list in one JSON document, read-modify-write
//! - [`BlobRepository`]: one JSON document per registration id on top of a
//!   [`BlobStore`]

mod blob;
mod list;

pub use blob::{BlobRepository, BlobStore, FsBlobStore, MemoryBlobStore};
pub use list::ListStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{AppConfig, StoreBackend};
use crate::error::AppResult;
use crate::registration::Registration;

#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    async fn insert(&self, registration: &Registration) -> AppResult<()>;

    async fn list(&self) -> AppResult<Vec<Registration>>;

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Registration>>;

    /// Overwrite an existing record. `NotFound` when the id is unknown.
    async fn update(&self, registration: &Registration) -> AppResult<()>;

    /// Remove by id. Removing an unknown id is not an error.
    async fn delete(&self, id: &str) -> AppResult<()>;
}

/// Open the repository selected by `STORE_BACKEND` under `DATA_DIR`.
///
/// # Arguments
/// * `config` - Application configuration
///
/// # Returns
/// * `AppResult<Arc<dyn RegistrationRepository>>` - The list or blob store;
///   the data directory is created when missing
pub async fn open_repository(config: &AppConfig) -> AppResult<Arc<dyn RegistrationRepository>> {
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let repository: Arc<dyn RegistrationRepository> = match config.store_backend {
        StoreBackend::List => {
            let path = config.data_dir.join("registrations.json");
            log::info!("using list store at {}", path.display());
            Arc::new(ListStore::new(path))
        }
        StoreBackend::Blob => {
            let dir = config.data_dir.join("registrations");
            log::info!("using blob store at {}", dir.display());
            Arc::new(BlobRepository::new(FsBlobStore::open(dir).await?))
        }
    };

    Ok(repository)
}

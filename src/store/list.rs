use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::RegistrationRepository;
use crate::error::{AppError, AppResult};
use crate::registration::Registration;

/// Keeps every registration in a single JSON array document.
///
/// Each mutation reads the whole list, changes it and writes it back. The
/// mutex only serializes access from this process.
pub struct ListStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ListStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ListStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> AppResult<Vec<Registration>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(Vec::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, registrations: &[Registration]) -> AppResult<()> {
        let json = serde_json::to_string_pretty(registrations)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RegistrationRepository for ListStore {
    async fn insert(&self, registration: &Registration) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut registrations = self.read_all().await?;
        registrations.push(registration.clone());
        self.write_all(&registrations).await
    }

    /// An unreadable document lists as empty, it is not repaired.
    async fn list(&self) -> AppResult<Vec<Registration>> {
        let _guard = self.lock.lock().await;
        match self.read_all().await {
            Ok(registrations) => Ok(registrations),
            Err(AppError::Serialization(e)) => {
                log::error!(
                    "failed to parse registrations from {}: {}",
                    self.path.display(),
                    e
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Registration>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.into_iter().find(|r| r.id == id))
    }

    async fn update(&self, registration: &Registration) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut registrations = self.read_all().await?;

        let slot = registrations
            .iter_mut()
            .find(|r| r.id == registration.id)
            .ok_or_else(|| {
                AppError::NotFound(format!("Registration {} not found", registration.id))
            })?;
        *slot = registration.clone();

        self.write_all(&registrations).await
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut registrations = self.read_all().await?;
        let before = registrations.len();
        registrations.retain(|r| r.id != id);

        if registrations.len() != before {
            self.write_all(&registrations).await?;
        }
        Ok(())
    }
}

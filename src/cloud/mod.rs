//! Cloud archiving of submitted attachments.
//!
//! Exactly one [`CloudStorage`] implementation is active. It is built from
//! [`AppConfig`] at startup and shared through the application state.

mod gdrive;
mod onedrive;
mod token;

pub use gdrive::DriveStorage;
pub use onedrive::GraphStorage;
pub use token::{RefreshCredentials, TokenProvider, TokenSource};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, CloudProvider, GoogleDriveAuth, OneDriveAuth};
use crate::error::{AppError, AppResult};
use crate::registration::Attachment;

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/Files.ReadWrite offline_access";

#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    #[error("Invalid folder name provided")]
    InvalidFolderName,

    #[error("The specified root folder \"{0}\" was not found")]
    RootFolderNotFound(String),

    #[error("Token request failed: {0}")]
    Token(String),

    #[error("{provider} request failed with {status}: {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CloudError {
    /// Failures an administrator has to fix by reconnecting the account
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            CloudError::Token(_) | CloudError::Api { status: 401, .. }
        )
    }
}

#[async_trait]
pub trait CloudStorage: Send + Sync {
    fn provider(&self) -> &'static str;

    /// Upload `files` into a new folder named after `folder_name` and return
    /// a shareable link to the folder. `None` means uploads are disabled.
    async fn upload_batch(
        &self,
        files: &[Attachment],
        folder_name: &str,
    ) -> Result<Option<String>, CloudError>;
}

/// Used when no provider is configured; never touches the network.
pub struct DisabledStorage;

#[async_trait]
impl CloudStorage for DisabledStorage {
    fn provider(&self) -> &'static str {
        "none"
    }

    async fn upload_batch(
        &self,
        _files: &[Attachment],
        _folder_name: &str,
    ) -> Result<Option<String>, CloudError> {
        Ok(None)
    }
}

lazy_static! {
    static ref FORBIDDEN_FOLDER_CHARS: Regex = Regex::new(r#"[\\/:*?"<>|#%]"#).unwrap();
}

/// Replace characters drive services refuse in folder names with `-`.
///
/// # Arguments
/// * `name` - Folder name, usually the registrant's full name
///
/// # Returns
/// * `Result<String, CloudError>` - The trimmed name, or `InvalidFolderName`
///   when nothing is left
///
/// # Examples
/// ```
/// use registration_desk::cloud::sanitize_folder_name;
///
/// assert_eq!(sanitize_folder_name(" Jane/Doe ").unwrap(), "Jane-Doe");
/// assert!(sanitize_folder_name("  ").is_err());
/// ```
pub fn sanitize_folder_name(name: &str) -> Result<String, CloudError> {
    let sanitized = FORBIDDEN_FOLDER_CHARS.replace_all(name, "-");
    let sanitized = sanitized.trim();

    if sanitized.is_empty() {
        return Err(CloudError::InvalidFolderName);
    }
    Ok(sanitized.to_string())
}

/// Name a file is stored under inside the registrant's folder.
///
/// Path separators become `-` so a submitted name can neither create
/// subfolders nor climb out of the folder, and a name made only of dots is
/// replaced by `attachment`.
///
/// # Arguments
/// * `name` - File name as submitted by the browser
/// * `prefix_at` - When set, the name is prefixed with `{unix-millis}_`
///
/// # Returns
/// * `String` - A single path segment, not yet percent-encoded
pub fn stored_file_name(name: &str, prefix_at: Option<DateTime<Utc>>) -> String {
    let flat = name.replace(['/', '\\'], "-");
    let flat = if flat.trim().trim_matches('.').is_empty() {
        "attachment".to_string()
    } else {
        flat
    };

    match prefix_at {
        Some(at) => format!("{}_{}", at.timestamp_millis(), flat),
        None => flat,
    }
}

/// Percent-encode each `/`-separated segment of a drive path.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Turn a non-2xx provider response into a [`CloudError::Api`], keeping the
/// provider's `error.code` when there is one.
pub(crate) async fn api_error(
    provider: &'static str,
    response: reqwest::Response,
) -> (CloudError, Option<String>) {
    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or_default();

    let code = body["error"]["code"].as_str().map(str::to_string);
    let message = body["error"]["message"]
        .as_str()
        .or_else(|| body["error_description"].as_str())
        .or_else(|| body["error"].as_str())
        .or_else(|| status.canonical_reason())
        .unwrap_or("unknown error")
        .to_string();

    log::error!("{} returned {}: {}", provider, status, message);

    (
        CloudError::Api {
            provider,
            status: status.as_u16(),
            message,
        },
        code,
    )
}

pub fn http_client() -> AppResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// Build the adapter selected by the configuration.
///
/// Each adapter owns its token provider, so two adapters never share a
/// token cache.
///
/// # Arguments
/// * `config` - Application configuration; only `cloud` is read
///
/// # Returns
/// * `AppResult<Arc<dyn CloudStorage>>` - The adapter, or `DisabledStorage`
///   when uploads are turned off
pub fn build_storage(config: &AppConfig) -> AppResult<Arc<dyn CloudStorage>> {
    let storage: Arc<dyn CloudStorage> = match &config.cloud {
        CloudProvider::None => {
            log::info!("cloud upload disabled");
            Arc::new(DisabledStorage)
        }
        CloudProvider::OneDrive(settings) => {
            let http = http_client()?;
            let source = match &settings.auth {
                OneDriveAuth::AccessToken(token) => TokenSource::Static(token.clone()),
                OneDriveAuth::RefreshToken {
                    client_id,
                    client_secret,
                    refresh_token,
                    ..
                } => TokenSource::Refresh(RefreshCredentials {
                    token_url: settings.token_url().unwrap_or_default(),
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    refresh_token: refresh_token.clone(),
                    scope: Some(GRAPH_SCOPE.to_string()),
                }),
            };
            log::info!(
                "uploading attachments to OneDrive (root folder: {})",
                settings.root_folder.as_deref().unwrap_or("/")
            );
            Arc::new(GraphStorage::new(
                http.clone(),
                TokenProvider::new(source, http),
                settings.api_url.clone(),
                settings.root_folder.clone(),
                config.timestamp_prefix,
            ))
        }
        CloudProvider::GoogleDrive(settings) => {
            let http = http_client()?;
            let source = match &settings.auth {
                GoogleDriveAuth::AccessToken(token) => TokenSource::Static(token.clone()),
                GoogleDriveAuth::RefreshToken {
                    client_id,
                    client_secret,
                    refresh_token,
                } => TokenSource::Refresh(RefreshCredentials {
                    token_url: settings.token_url.clone(),
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    refresh_token: refresh_token.clone(),
                    scope: None,
                }),
            };
            log::info!("uploading attachments to Google Drive");
            Arc::new(DriveStorage::new(
                http.clone(),
                TokenProvider::new(source, http),
                settings.api_url.clone(),
                settings.root_folder_id.clone(),
                config.timestamp_prefix,
            ))
        }
    };

    Ok(storage)
}

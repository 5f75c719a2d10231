//! Environment-driven configuration.
//!
//! Every setting has a default so the server starts with nothing but a data
//! directory: list store off, blob store on, no cloud upload, no admin gate.

use std::env;
use std::path::PathBuf;

use crate::error::{AppError, AppResult};
use crate::i18n::Language;

pub const DEFAULT_GRAPH_API_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_DRIVE_API_URL: &str = "https://www.googleapis.com";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// One JSON document per registration
    Blob,
    /// The whole list in a single JSON document
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudProvider {
    None,
    OneDrive(OneDriveSettings),
    GoogleDrive(GoogleDriveSettings),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneDriveAuth {
    /// Static bearer token (`ONEDRIVE_ACCESS_TOKEN`)
    AccessToken(String),
    /// Refresh-token exchange against the tenant's token endpoint
    RefreshToken {
        tenant_id: String,
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneDriveSettings {
    pub auth: OneDriveAuth,
    pub root_folder: Option<String>,
    pub api_url: String,
    /// Token endpoint override, defaults to login.microsoftonline.com
    pub token_url: Option<String>,
}

impl OneDriveSettings {
    pub fn token_url(&self) -> Option<String> {
        match &self.auth {
            OneDriveAuth::AccessToken(_) => None,
            OneDriveAuth::RefreshToken { tenant_id, .. } => Some(
                self.token_url.clone().unwrap_or_else(|| {
                    format!(
                        "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                        tenant_id
                    )
                }),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoogleDriveAuth {
    AccessToken(String),
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleDriveSettings {
    pub auth: GoogleDriveAuth,
    pub root_folder_id: Option<String>,
    pub api_url: String,
    pub token_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub store_backend: StoreBackend,
    pub cloud: CloudProvider,
    /// Prefix uploaded filenames with `{unix-millis}_`
    pub timestamp_prefix: bool,
    pub require_national_id: bool,
    pub default_language: Language,
    pub admin_password: Option<String>,
    pub smtp: Option<SmtpSettings>,
    /// Front-end bundle served at `/` when set
    pub static_dir: Option<PathBuf>,
    pub max_body_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            data_dir: PathBuf::from("database"),
            store_backend: StoreBackend::Blob,
            cloud: CloudProvider::None,
            timestamp_prefix: false,
            require_national_id: true,
            default_language: Language::Ar,
            admin_password: None,
            smtp: None,
            static_dir: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl AppConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = AppConfig::default();

        let store_backend = match var("STORE_BACKEND").as_deref() {
            None | Some("blob") => StoreBackend::Blob,
            Some("list") => StoreBackend::List,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "STORE_BACKEND must be 'blob' or 'list', got '{}'",
                    other
                )));
            }
        };

        let default_language = match var("DEFAULT_LANGUAGE") {
            Some(code) => code.parse::<Language>().map_err(AppError::Config)?,
            None => defaults.default_language,
        };

        let max_body_bytes = match var("MAX_BODY_BYTES") {
            Some(v) => v
                .parse()
                .map_err(|_| AppError::Config(format!("MAX_BODY_BYTES is not a number: {}", v)))?,
            None => defaults.max_body_bytes,
        };

        let smtp = match (var("SMTP_HOST"), var("SMTP_USERNAME"), var("SMTP_PASSWORD")) {
            (Some(host), Some(username), Some(password)) => Some(SmtpSettings {
                from: var("SMTP_FROM").unwrap_or_else(|| username.clone()),
                host,
                username,
                password,
            }),
            _ => None,
        };

        Ok(AppConfig {
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            store_backend,
            cloud: cloud_from_lookup(&var)?,
            timestamp_prefix: flag(var("UPLOAD_TIMESTAMP_PREFIX"), defaults.timestamp_prefix)?,
            require_national_id: flag(var("REQUIRE_NATIONAL_ID"), defaults.require_national_id)?,
            default_language,
            admin_password: var("ADMIN_PASSWORD"),
            smtp,
            static_dir: var("STATIC_DIR").map(PathBuf::from),
            max_body_bytes,
        })
    }
}

fn cloud_from_lookup<F>(var: &F) -> AppResult<CloudProvider>
where
    F: Fn(&str) -> Option<String>,
{
    let onedrive_configured =
        var("ONEDRIVE_ACCESS_TOKEN").is_some() || var("ONEDRIVE_REFRESH_TOKEN").is_some();

    let provider = match var("CLOUD_STORAGE") {
        Some(p) => p.to_lowercase(),
        None if onedrive_configured => "onedrive".to_string(),
        None => "none".to_string(),
    };

    match provider.as_str() {
        "none" => Ok(CloudProvider::None),
        "onedrive" => {
            let auth = match var("ONEDRIVE_REFRESH_TOKEN") {
                Some(refresh_token) => OneDriveAuth::RefreshToken {
                    tenant_id: var("ONEDRIVE_TENANT_ID").unwrap_or_else(|| "common".to_string()),
                    client_id: required(var, "ONEDRIVE_CLIENT_ID")?,
                    client_secret: required(var, "ONEDRIVE_CLIENT_SECRET")?,
                    refresh_token,
                },
                None => OneDriveAuth::AccessToken(required(var, "ONEDRIVE_ACCESS_TOKEN")?),
            };
            Ok(CloudProvider::OneDrive(OneDriveSettings {
                auth,
                root_folder: var("ONEDRIVE_ROOT_FOLDER"),
                api_url: var("GRAPH_API_URL").unwrap_or_else(|| DEFAULT_GRAPH_API_URL.to_string()),
                token_url: var("ONEDRIVE_TOKEN_URL"),
            }))
        }
        "gdrive" | "googledrive" => {
            let auth = match var("GDRIVE_REFRESH_TOKEN") {
                Some(refresh_token) => GoogleDriveAuth::RefreshToken {
                    client_id: required(var, "GDRIVE_CLIENT_ID")?,
                    client_secret: required(var, "GDRIVE_CLIENT_SECRET")?,
                    refresh_token,
                },
                None => GoogleDriveAuth::AccessToken(required(var, "GDRIVE_ACCESS_TOKEN")?),
            };
            Ok(CloudProvider::GoogleDrive(GoogleDriveSettings {
                auth,
                root_folder_id: var("GDRIVE_ROOT_FOLDER_ID"),
                api_url: var("DRIVE_API_URL").unwrap_or_else(|| DEFAULT_DRIVE_API_URL.to_string()),
                token_url: var("GDRIVE_TOKEN_URL").unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
            }))
        }
        other => Err(AppError::Config(format!(
            "CLOUD_STORAGE must be 'none', 'onedrive' or 'gdrive', got '{}'",
            other
        ))),
    }
}

fn required<F>(var: &F, name: &str) -> AppResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    var(name).ok_or_else(|| AppError::Config(format!("{} is not set", name)))
}

fn flag(value: Option<String>, default: bool) -> AppResult<bool> {
    match value.as_deref().map(str::to_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(AppError::Config(format!("not a boolean: {}", other))),
    }
}

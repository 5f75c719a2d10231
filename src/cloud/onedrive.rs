use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use reqwest::Client;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;

use super::{
    CloudError, CloudStorage, TokenProvider, api_error, encode_path, sanitize_folder_name,
    stored_file_name,
};
use crate::registration::Attachment;

const PROVIDER: &str = "OneDrive";

/// Simple PUT uploads are limited to 4 MiB by Graph
const SIMPLE_UPLOAD_LIMIT: usize = 4 * 1024 * 1024;

/// Upload-session chunks must be a multiple of 320 KiB
const CHUNK_SIZE: usize = 10 * 320 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    name: String,
    web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSession {
    upload_url: String,
}

/// Microsoft Graph drive client (`/me/drive`)
pub struct GraphStorage {
    http: Client,
    tokens: TokenProvider,
    api_url: String,
    root_folder: Option<String>,
    timestamp_prefix: bool,
}

impl GraphStorage {
    pub fn new(
        http: Client,
        tokens: TokenProvider,
        api_url: impl Into<String>,
        root_folder: Option<String>,
        timestamp_prefix: bool,
    ) -> Self {
        GraphStorage {
            http,
            tokens,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            root_folder: root_folder.filter(|r| !r.trim_matches('/').is_empty()),
            timestamp_prefix,
        }
    }

    /// `/me/drive/root:/{root}/{folder}/{file}`. The root may span several
    /// segments; the folder and the file name are always one segment each.
    fn item_path(&self, folder: &str, file_name: &str) -> String {
        let root = match &self.root_folder {
            Some(root) => format!("{}/", encode_path(root)),
            None => String::new(),
        };
        format!(
            "{}/me/drive/root:/{}{}/{}",
            self.api_url,
            root,
            urlencoding::encode(folder),
            urlencoding::encode(file_name)
        )
    }

    async fn create_folder(&self, token: &str, name: &str) -> Result<DriveItem, CloudError> {
        let url = match &self.root_folder {
            Some(root) => format!(
                "{}/me/drive/root:/{}:/children",
                self.api_url,
                encode_path(root)
            ),
            None => format!("{}/me/drive/root/children", self.api_url),
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({
                "name": name,
                "folder": {},
                "@microsoft.graph.conflictBehavior": "rename",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let (error, code) = api_error(PROVIDER, response).await;
            return Err(match (&self.root_folder, code.as_deref()) {
                (Some(root), Some("itemNotFound")) => CloudError::RootFolderNotFound(root.clone()),
                _ => error,
            });
        }

        Ok(response.json().await?)
    }

    async fn upload_file(
        &self,
        token: &str,
        folder: &str,
        file: &Attachment,
        file_name: &str,
    ) -> Result<(), CloudError> {
        let item = self.item_path(folder, file_name);

        if file.data.len() > SIMPLE_UPLOAD_LIMIT {
            return self.upload_large_file(token, &item, file).await;
        }

        let response = self
            .http
            .put(format!("{}:/content", item))
            .bearer_auth(token)
            .header(CONTENT_TYPE, &file.content_type)
            .body(file.data.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(PROVIDER, response).await.0);
        }

        log::debug!("uploaded {}/{} ({} bytes)", folder, file_name, file.data.len());
        Ok(())
    }

    async fn upload_large_file(
        &self,
        token: &str,
        item: &str,
        file: &Attachment,
    ) -> Result<(), CloudError> {
        let response = self
            .http
            .post(format!("{}:/createUploadSession", item))
            .bearer_auth(token)
            .json(&json!({
                "item": { "@microsoft.graph.conflictBehavior": "rename" }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(PROVIDER, response).await.0);
        }
        let session: UploadSession = response.json().await?;

        let total = file.data.len();
        for (index, chunk) in file.data.chunks(CHUNK_SIZE).enumerate() {
            let start = index * CHUNK_SIZE;
            let end = start + chunk.len() - 1;

            // the upload URL is pre-authenticated
            let response = self
                .http
                .put(&session.upload_url)
                .header(CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, total))
                .body(chunk.to_vec())
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(api_error(PROVIDER, response).await.0);
            }
        }

        log::debug!("uploaded {} in a session ({} bytes)", file.name, total);
        Ok(())
    }
}

#[async_trait]
impl CloudStorage for GraphStorage {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn upload_batch(
        &self,
        files: &[Attachment],
        folder_name: &str,
    ) -> Result<Option<String>, CloudError> {
        let folder_name = sanitize_folder_name(folder_name)?;
        let token = self.tokens.access_token().await?;

        // Graph may rename the folder on conflict; upload into the name it chose
        let folder = self.create_folder(&token, &folder_name).await?;
        log::info!("created OneDrive folder {}", folder.name);

        let prefix_at = self.timestamp_prefix.then(Utc::now);
        let names: Vec<String> = files
            .iter()
            .map(|file| stored_file_name(&file.name, prefix_at))
            .collect();

        try_join_all(
            files
                .iter()
                .zip(&names)
                .map(|(file, name)| self.upload_file(&token, &folder.name, file, name)),
        )
        .await?;

        log::info!("uploaded {} file(s) to {}", files.len(), folder.name);
        Ok(folder.web_url)
    }
}

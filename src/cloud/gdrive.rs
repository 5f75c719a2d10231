use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;

use super::{
    CloudError, CloudStorage, TokenProvider, api_error, sanitize_folder_name, stored_file_name,
};
use crate::registration::Attachment;

const PROVIDER: &str = "Google Drive";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    web_view_link: Option<String>,
}

/// Google Drive v3 client
pub struct DriveStorage {
    http: Client,
    tokens: TokenProvider,
    api_url: String,
    root_folder_id: Option<String>,
    timestamp_prefix: bool,
}

impl DriveStorage {
    pub fn new(
        http: Client,
        tokens: TokenProvider,
        api_url: impl Into<String>,
        root_folder_id: Option<String>,
        timestamp_prefix: bool,
    ) -> Self {
        DriveStorage {
            http,
            tokens,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            root_folder_id,
            timestamp_prefix,
        }
    }

    async fn create_folder(&self, token: &str, name: &str) -> Result<DriveFile, CloudError> {
        let mut metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent) = &self.root_folder_id {
            metadata["parents"] = json!([parent]);
        }

        let response = self
            .http
            .post(format!("{}/drive/v3/files", self.api_url))
            .query(&[("fields", "id,webViewLink")])
            .bearer_auth(token)
            .json(&metadata)
            .send()
            .await?;

        if !response.status().is_success() {
            let (error, _) = api_error(PROVIDER, response).await;
            return Err(match (&self.root_folder_id, &error) {
                (Some(root), CloudError::Api { status: 404, .. }) => {
                    CloudError::RootFolderNotFound(root.clone())
                }
                _ => error,
            });
        }

        Ok(response.json().await?)
    }

    async fn upload_file(
        &self,
        token: &str,
        folder_id: &str,
        file: &Attachment,
        file_name: &str,
    ) -> Result<(), CloudError> {
        let metadata = json!({
            "name": file_name,
            "parents": [folder_id],
        });
        let boundary = format!("upload-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related(&boundary, &metadata, file);

        let response = self
            .http
            .post(format!("{}/upload/drive/v3/files", self.api_url))
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .bearer_auth(token)
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(PROVIDER, response).await.0);
        }

        log::debug!("uploaded {} ({} bytes)", file_name, file.data.len());
        Ok(())
    }
}

/// `multipart/related` body: JSON metadata part followed by the media part.
fn multipart_related(boundary: &str, metadata: &serde_json::Value, file: &Attachment) -> Vec<u8> {
    let mut body = Vec::with_capacity(file.data.len() + 512);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{}\r\n",
            boundary, metadata
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{}\r\nContent-Type: {}\r\n\r\n", boundary, file.content_type).as_bytes(),
    );
    body.extend_from_slice(&file.data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[async_trait]
impl CloudStorage for DriveStorage {
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

        let folder = self.create_folder(&token, &folder_name).await?;
        log::info!("created Google Drive folder {} ({})", folder_name, folder.id);

        let prefix_at = self.timestamp_prefix.then(Utc::now);
        let names: Vec<String> = files
            .iter()
            .map(|file| stored_file_name(&file.name, prefix_at))
            .collect();

        try_join_all(
            files
                .iter()
                .zip(&names)
                .map(|(file, name)| self.upload_file(&token, &folder.id, file, name)),
        )
        .await?;

        let link = folder
            .web_view_link
            .unwrap_or_else(|| format!("https://drive.google.com/drive/folders/{}", folder.id));
        Ok(Some(link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_multipart_related_body() {
        let file = Attachment::new("cv.txt", "text/plain", b"hello".to_vec());
        let body = multipart_related("b1", &json!({"name": "cv.txt"}), &file);
        let text = String::from_utf8(body).unwrap();

        assert!(text.starts_with("--b1\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n"));
        assert!(text.contains(r#"{"name":"cv.txt"}"#));
        assert!(text.contains("--b1\r\nContent-Type: text/plain\r\n\r\nhello\r\n--b1--\r\n"));
    }
}

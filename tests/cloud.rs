use axum::Router;
use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::{Arc, Mutex};

use registration_desk::cloud::{
    CloudError, CloudStorage, DriveStorage, GraphStorage, RefreshCredentials, TokenProvider,
    TokenSource,
};
use registration_desk::registration::Attachment;

#[derive(Debug, Clone)]
struct Seen {
    method: Method,
    path: String,
    query: String,
    authorization: String,
    content_type: String,
    content_range: String,
    body: String,
    body_len: usize,
}

type Log = Arc<Mutex<Vec<Seen>>>;

/// Stand-in for Graph, Drive and the token endpoints.
async fn fake_api(State(log): State<Log>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().unwrap_or_default().to_string();
    let header_str = |name: header::HeaderName| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let authorization = header_str(header::AUTHORIZATION);
    let content_type = header_str(header::CONTENT_TYPE);
    let content_range = header_str(header::CONTENT_RANGE);
    let host = header_str(header::HOST);
    let body = to_bytes(body, usize::MAX).await.unwrap();
    let body_len = body.len();
    let body = String::from_utf8_lossy(&body).to_string();

    log.lock().unwrap().push(Seen {
        method: method.clone(),
        path: path.clone(),
        query,
        authorization,
        content_type,
        content_range,
        body,
        body_len,
    });

    if path.starts_with("/token") {
        let expires_in = if path == "/token-forever" { u64::MAX } else { 3600 };
        return Json(json!({
            "access_token": "fresh",
            "expires_in": expires_in,
            "refresh_token": "rotated",
        }))
        .into_response();
    }
    if path.contains("Missing") {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": "itemNotFound", "message": "not here" } })),
        )
            .into_response();
    }
    if path.contains("broken") {
        return (
            StatusCode::INSUFFICIENT_STORAGE,
            Json(json!({ "error": { "code": "quotaLimitReached", "message": "drive full" } })),
        )
            .into_response();
    }
    if path.ends_with("/children") {
        return (
            StatusCode::CREATED,
            Json(json!({
                "id": "F1",
                "name": "Jane Doe",
                "webUrl": "https://onedrive.example/Jane%20Doe",
            })),
        )
            .into_response();
    }
    if path.ends_with(":/createUploadSession") {
        let session = if path.contains("flaky") { "flaky" } else { "ok" };
        return Json(json!({
            "uploadUrl": format!("http://{}/upload-session/{}", host, session),
        }))
        .into_response();
    }
    if path == "/upload-session/flaky" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "code": "generalException", "message": "chunk rejected" } })),
        )
            .into_response();
    }
    if path == "/upload-session/ok" {
        return (StatusCode::ACCEPTED, Json(json!({ "nextExpectedRanges": [] }))).into_response();
    }
    if path.ends_with(":/content") {
        return (StatusCode::CREATED, Json(json!({ "id": "x", "name": "file" }))).into_response();
    }
    if path == "/drive/v3/files" {
        return Json(json!({ "id": "D1", "webViewLink": "https://drive.example/D1" })).into_response();
    }
    if path == "/upload/drive/v3/files" {
        return Json(json!({ "id": "D2" })).into_response();
    }

    StatusCode::NOT_FOUND.into_response()
}

async fn start_fake() -> (String, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(fake_api).with_state(log.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), log)
}

fn files() -> Vec<Attachment> {
    vec![
        Attachment::new("cv.pdf", "application/pdf", b"%PDF".to_vec()),
        Attachment::new("photo d'identité.jpg", "image/jpeg", vec![0xFF, 0xD8]),
    ]
}

fn graph(base: &str, source: TokenSource, root: Option<&str>) -> GraphStorage {
    let http = reqwest::Client::new();
    GraphStorage::new(
        http.clone(),
        TokenProvider::new(source, http),
        base,
        root.map(str::to_string),
        false,
    )
}

#[tokio::test]
async fn graph_creates_one_folder_and_one_put_per_file() {
    let (base, log) = start_fake().await;
    let storage = graph(&base, TokenSource::Static("static".to_string()), Some("Inscriptions"));

    let link = storage.upload_batch(&files(), "Jane/Doe").await.unwrap();
    assert_eq!(link.as_deref(), Some("https://onedrive.example/Jane%20Doe"));

    let seen = log.lock().unwrap().clone();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|s| s.authorization == "Bearer static"));

    let create = &seen[0];
    assert_eq!(create.method, Method::POST);
    assert_eq!(create.path, "/me/drive/root:/Inscriptions:/children");
    let body: serde_json::Value = serde_json::from_str(&create.body).unwrap();
    assert_eq!(body["name"], "Jane-Doe");
    assert_eq!(body["@microsoft.graph.conflictBehavior"], "rename");

    // uploads go into the folder name Graph answered with
    let mut puts: Vec<&str> = seen[1..]
        .iter()
        .filter(|s| s.method == Method::PUT)
        .map(|s| s.path.as_str())
        .collect();
    puts.sort();
    assert_eq!(
        puts,
        vec![
            "/me/drive/root:/Inscriptions/Jane%20Doe/cv.pdf:/content",
            "/me/drive/root:/Inscriptions/Jane%20Doe/photo%20d%27identit%C3%A9.jpg:/content",
        ]
    );
}

#[tokio::test]
async fn graph_without_root_posts_to_drive_root() {
    let (base, log) = start_fake().await;
    let storage = graph(&base, TokenSource::Static("t".to_string()), None);

    storage.upload_batch(&files()[..1], "Jane Doe").await.unwrap();

    let seen = log.lock().unwrap().clone();
    assert_eq!(seen[0].path, "/me/drive/root/children");
    assert_eq!(seen[1].path, "/me/drive/root:/Jane%20Doe/cv.pdf:/content");
    assert_eq!(seen[1].content_type, "application/pdf");
}

#[tokio::test]
async fn refresh_token_is_exchanged_once_and_cached() {
    let (base, log) = start_fake().await;
    let source = TokenSource::Refresh(RefreshCredentials {
        token_url: format!("{}/token", base),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        refresh_token: "r0".to_string(),
        scope: Some("Files.ReadWrite offline_access".to_string()),
    });
    let storage = graph(&base, source, Some("Inscriptions"));

    storage.upload_batch(&files(), "Jane Doe").await.unwrap();
    storage.upload_batch(&files(), "Jane Doe").await.unwrap();

    let seen = log.lock().unwrap().clone();
    let token_calls: Vec<&Seen> = seen.iter().filter(|s| s.path == "/token").collect();
    assert_eq!(token_calls.len(), 1);
    assert!(token_calls[0].body.contains("grant_type=refresh_token"));
    assert!(token_calls[0].body.contains("refresh_token=r0"));
    assert!(
        seen.iter()
            .filter(|s| s.path != "/token")
            .all(|s| s.authorization == "Bearer fresh")
    );
}

#[tokio::test]
async fn attachment_names_cannot_leave_the_registrant_folder() {
    let (base, log) = start_fake().await;
    let storage = graph(&base, TokenSource::Static("t".to_string()), Some("Inscriptions"));
    let files = vec![
        Attachment::new("../../escape.pdf", "application/pdf", vec![1]),
        Attachment::new("sub/dir.pdf", "application/pdf", vec![2]),
    ];

    storage.upload_batch(&files, "Jane Doe").await.unwrap();

    let mut puts: Vec<String> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|s| s.method == Method::PUT)
        .map(|s| s.path.clone())
        .collect();
    puts.sort();
    assert_eq!(
        puts,
        vec![
            "/me/drive/root:/Inscriptions/Jane%20Doe/..-..-escape.pdf:/content".to_string(),
            "/me/drive/root:/Inscriptions/Jane%20Doe/sub-dir.pdf:/content".to_string(),
        ]
    );
}

#[tokio::test]
async fn large_file_goes_through_an_upload_session() {
    let (base, log) = start_fake().await;
    let storage = graph(&base, TokenSource::Static("t".to_string()), Some("Inscriptions"));
    let size = 4 * 1024 * 1024 + 1;
    let files = vec![Attachment::new("big.bin", "application/octet-stream", vec![7; size])];

    storage.upload_batch(&files, "Jane Doe").await.unwrap();

    let seen = log.lock().unwrap().clone();
    assert!(seen.iter().all(|s| !s.path.ends_with(":/content")));

    let session = seen
        .iter()
        .find(|s| s.path.ends_with(":/createUploadSession"))
        .unwrap();
    assert_eq!(session.method, Method::POST);
    assert_eq!(
        session.path,
        "/me/drive/root:/Inscriptions/Jane%20Doe/big.bin:/createUploadSession"
    );

    let chunks: Vec<&Seen> = seen
        .iter()
        .filter(|s| s.path == "/upload-session/ok")
        .collect();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content_range, "bytes 0-3276799/4194305");
    assert_eq!(chunks[0].body_len, 3_276_800);
    assert_eq!(chunks[1].content_range, "bytes 3276800-4194304/4194305");
    assert_eq!(chunks[1].body_len, 917_505);
    // the session URL carries its own authorization
    assert!(chunks.iter().all(|c| c.authorization.is_empty()));
}

#[tokio::test]
async fn rejected_chunk_fails_the_upload() {
    let (base, log) = start_fake().await;
    let storage = graph(&base, TokenSource::Static("t".to_string()), None);
    let files = vec![Attachment::new(
        "flaky.bin",
        "application/octet-stream",
        vec![0; 4 * 1024 * 1024 + 1],
    )];

    match storage.upload_batch(&files, "Jane Doe").await {
        Err(CloudError::Api {
            status, message, ..
        }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "chunk rejected");
        }
        other => panic!("expected API error, got {:?}", other),
    }

    let attempts = log
        .lock()
        .unwrap()
        .iter()
        .filter(|s| s.path == "/upload-session/flaky")
        .count();
    assert_eq!(attempts, 1);
}

#[tokio::test]
async fn oversized_token_lifetime_is_still_cached() {
    let (base, log) = start_fake().await;
    let tokens = TokenProvider::new(
        TokenSource::Refresh(RefreshCredentials {
            token_url: format!("{}/token-forever", base),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "r0".to_string(),
            scope: None,
        }),
        reqwest::Client::new(),
    );

    assert_eq!(tokens.access_token().await.unwrap(), "fresh");
    assert_eq!(tokens.access_token().await.unwrap(), "fresh");
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_upload_fails_the_batch() {
    let (base, _) = start_fake().await;
    let storage = graph(&base, TokenSource::Static("t".to_string()), Some("Inscriptions"));
    let files = vec![
        Attachment::new("cv.pdf", "application/pdf", vec![1]),
        Attachment::new("broken.txt", "text/plain", vec![2]),
    ];

    match storage.upload_batch(&files, "Jane Doe").await {
        Err(CloudError::Api {
            status, message, ..
        }) => {
            assert_eq!(status, 507);
            assert_eq!(message, "drive full");
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_root_folder_has_its_own_error() {
    let (base, _) = start_fake().await;
    let storage = graph(&base, TokenSource::Static("t".to_string()), Some("Missing"));

    match storage.upload_batch(&files(), "Jane Doe").await {
        Err(CloudError::RootFolderNotFound(root)) => assert_eq!(root, "Missing"),
        other => panic!("expected RootFolderNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn blank_folder_name_is_refused_before_any_request() {
    let (base, log) = start_fake().await;
    let storage = graph(&base, TokenSource::Static("t".to_string()), None);

    assert!(matches!(
        storage.upload_batch(&files(), "   ").await,
        Err(CloudError::InvalidFolderName)
    ));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn drive_creates_folder_then_multipart_uploads() {
    let (base, log) = start_fake().await;
    let http = reqwest::Client::new();
    let storage = DriveStorage::new(
        http.clone(),
        TokenProvider::new(TokenSource::Static("g".to_string()), http),
        base.as_str(),
        Some("ROOT".to_string()),
        false,
    );

    let link = storage.upload_batch(&files(), "Jane Doe").await.unwrap();
    assert_eq!(link.as_deref(), Some("https://drive.example/D1"));

    let seen = log.lock().unwrap().clone();
    assert_eq!(seen[0].path, "/drive/v3/files");
    let folder: serde_json::Value = serde_json::from_str(&seen[0].body).unwrap();
    assert_eq!(folder["mimeType"], "application/vnd.google-apps.folder");
    assert_eq!(folder["parents"], json!(["ROOT"]));

    let uploads: Vec<&Seen> = seen
        .iter()
        .filter(|s| s.path == "/upload/drive/v3/files")
        .collect();
    assert_eq!(uploads.len(), 2);
    for upload in uploads {
        assert!(upload.query.contains("uploadType=multipart"));
        assert!(upload.content_type.starts_with("multipart/related; boundary="));
        assert!(upload.body.contains("\"parents\":[\"D1\"]"));
        assert_eq!(upload.authorization, "Bearer g");
    }
}

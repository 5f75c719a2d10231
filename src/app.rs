use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Path, Query, Request, State, rejection::JsonRejection,
    },
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::auth::{self, AdminGate};
use crate::cloud::{self, CloudStorage};
use crate::config::AppConfig;
use crate::dashboard::{Dashboard, DashboardView, SortConfig};
use crate::error::{AppError, AppResult};
use crate::export;
use crate::i18n::{Language, TranslationKey, t};
use crate::notify::Notifier;
use crate::pipeline::SubmissionPipeline;
use crate::registration::{Attachment, Category, RegistrationForm, RegistrationPatch, RegistrationStatus};
use crate::store::{self, RegistrationRepository};

/// Shared by every handler; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: SubmissionPipeline,
    pub dashboard: Dashboard,
    pub notifier: Notifier,
    pub gate: Arc<AdminGate>,
    pub default_language: Language,
    pub max_body_bytes: usize,
    pub static_dir: Option<PathBuf>,
}

impl AppState {
    /// Open the configured repository and cloud adapter.
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let repository = store::open_repository(config).await?;
        let storage = cloud::build_storage(config)?;
        Self::from_parts(config, storage, repository)
    }

    /// Build the state around an already constructed adapter and repository.
    pub fn from_parts(
        config: &AppConfig,
        storage: Arc<dyn CloudStorage>,
        repository: Arc<dyn RegistrationRepository>,
    ) -> AppResult<Self> {
        Ok(AppState {
            pipeline: SubmissionPipeline::new(storage, repository.clone(), config.require_national_id),
            dashboard: Dashboard::new(repository),
            notifier: Notifier::new(config.smtp.as_ref())?,
            gate: Arc::new(AdminGate::new(config.admin_password.as_deref())?),
            default_language: config.default_language,
            max_body_bytes: config.max_body_bytes,
            static_dir: config.static_dir.clone(),
        })
    }

    /// `lang` when it names a supported language, the default otherwise
    pub fn language(&self, lang: Option<&str>) -> Language {
        lang.and_then(|code| code.parse().ok())
            .unwrap_or(self.default_language)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LanguageQuery {
    pub lang: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub q: Option<String>,
    pub lang: Option<String>,
}

impl ListQuery {
    fn view(&self, state: &AppState) -> AppResult<DashboardView> {
        let defaults = SortConfig::default();
        let key = match &self.sort {
            Some(s) => s.parse().map_err(AppError::Validation)?,
            None => defaults.key,
        };
        let direction = match &self.direction {
            Some(d) => d.parse().map_err(AppError::Validation)?,
            None => defaults.direction,
        };

        Ok(DashboardView {
            sort: SortConfig::new(key, direction),
            filter: self.q.clone(),
            language: state.language(self.lang.as_deref()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct FilePayload {
    name: String,
    #[serde(default, rename = "type")]
    content_type: String,
    /// base64, optionally as a `data:` URL
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitPayload {
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    national_id: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    category: Category,
    #[serde(default)]
    attachments: Vec<FilePayload>,
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    id: Option<String>,
    #[serde(flatten)]
    patch: RegistrationPatch,
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: RegistrationStatus,
}

/// Map a JSON body rejection to a 400 with a JSON error body.
pub fn bad_json(rejection: JsonRejection) -> AppError {
    AppError::Validation(rejection.body_text())
}

/// Build the application router.
///
/// Dashboard routes sit behind [`auth::require_admin`]; submission and login
/// routes are public. When `static_dir` is set the front end is served as the
/// fallback.
///
/// # Arguments
/// * `state` - Shared application state
///
/// # Returns
/// * `Router` - Ready to serve
pub fn router(state: AppState) -> Router {
    // Dashboard endpoints sit behind the admin gate
    let admin = Router::new()
        .route("/api/registrations", get(list_registrations))
        .route("/api/update", post(update_registration).fallback(method_not_allowed))
        .route("/api/delete", post(delete_registration).fallback(method_not_allowed))
        .route("/api/registrations/:id/status", post(set_status))
        .route("/api/export.xlsx", get(export_xlsx))
        .route("/api/export.csv", get(export_csv))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin));

    let mut app = Router::new()
        .route("/api/submit", post(submit_json).fallback(method_not_allowed))
        .route("/api/register", post(submit_multipart).fallback(method_not_allowed))
        .route("/admin/login", post(auth::handle_login))
        .route("/admin/logout", post(auth::handle_logout))
        .merge(admin);

    if let Some(dir) = &state.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Bind `config.bind_addr` and serve until the process stops.
pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::from_config(&config).await?;
    let app = router(state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    log::info!("Listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    log::info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "message": "Method Not Allowed" })),
    )
        .into_response()
}

fn decode_attachment(file: FilePayload, language: Language) -> AppResult<Attachment> {
    let encoded = match file.data.split_once("base64,") {
        Some((_, rest)) if file.data.starts_with("data:") => rest,
        _ => file.data.as_str(),
    };

    let data = general_purpose::STANDARD.decode(encoded.trim()).map_err(|e| {
        log::warn!("attachment {} is not valid base64: {}", file.name, e);
        AppError::Validation(t(TranslationKey::ValidationErrorAllFields, language).to_string())
    })?;

    Ok(Attachment::new(file.name, file.content_type, data))
}

/// `POST /api/submit`: JSON body with base64 attachments
async fn submit_json(
    State(state): State<AppState>,
    Query(query): Query<LanguageQuery>,
    payload: Result<Json<SubmitPayload>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let language = state.language(query.lang.as_deref());
    let Json(payload) = payload.map_err(bad_json)?;

    let mut form = RegistrationForm {
        full_name: payload.full_name,
        email: payload.email,
        national_id: payload.national_id,
        phone: payload.phone,
        category: payload.category,
        attachments: Vec::new(),
    };
    let attachments = payload
        .attachments
        .into_iter()
        .map(|file| decode_attachment(file, language))
        .collect::<AppResult<Vec<_>>>()?;
    form.add_attachments(attachments);

    let registration = state.pipeline.submit(form, language).await?;

    Ok(Json(json!({
        "message": t(TranslationKey::SuccessMessage, language),
        "id": registration.id,
    })))
}

/// `POST /api/register`: the browser form as multipart
async fn submit_multipart(
    State(state): State<AppState>,
    Query(query): Query<LanguageQuery>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let language = state.language(query.lang.as_deref());
    let invalid = |e: axum::extract::multipart::MultipartError| {
        AppError::Validation(format!("Malformed form data: {}", e))
    };

    let mut form = RegistrationForm::default();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(invalid)?;
            if !file_name.is_empty() {
                files.push(Attachment::new(file_name, content_type, data.to_vec()));
            }
            continue;
        }

        let value = field.text().await.map_err(invalid)?;
        match name.as_str() {
            "fullName" => form.full_name = value,
            "email" => form.email = value,
            "nationalId" => form.national_id = value,
            "phone" => form.phone = value,
            "category" => {
                form.category = value.parse().map_err(|e: String| {
                    log::warn!("rejected multipart submission: {}", e);
                    AppError::Validation(
                        t(TranslationKey::ValidationErrorAllFields, language).to_string(),
                    )
                })?;
            }
            other => log::debug!("ignoring form field {}", other),
        }
    }
    form.add_attachments(files);

    let registration = state.pipeline.submit(form, language).await?;

    Ok(Json(json!({
        "message": t(TranslationKey::SuccessMessage, language),
        "id": registration.id,
    })))
}

/// `GET /api/registrations`
async fn list_registrations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let view = query.view(&state)?;
    let registrations = state.dashboard.list(&view).await?;
    Ok(Json(json!({ "registrations": registrations })))
}

fn require_id(id: Option<String>) -> AppResult<String> {
    id.filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Bad Request: Missing registration ID.".to_string()))
}

/// `POST /api/update`
async fn update_registration(
    State(state): State<AppState>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload.map_err(bad_json)?;
    let id = require_id(request.id)?;

    let registration = state.dashboard.edit(&id, &request.patch).await?;
    Ok(Json(json!({
        "message": "Update successful",
        "registration": registration,
    })))
}

/// `POST /api/delete`; deleting an unknown id succeeds
async fn delete_registration(
    State(state): State<AppState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload.map_err(bad_json)?;
    let id = require_id(request.id)?;

    state.dashboard.delete(&id).await?;
    Ok(Json(json!({ "message": "Delete successful" })))
}

/// `POST /api/registrations/:id/status`
async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LanguageQuery>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let language = state.language(query.lang.as_deref());
    let Json(request) = payload.map_err(bad_json)?;

    let registration = state.dashboard.set_status(&id, request.status).await?;
    let notification = state.notifier.status_changed(&registration, language).await;

    Ok(Json(json!({
        "registration": registration,
        "notification": notification,
    })))
}

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// `GET /api/export.xlsx`, following the same sort / filter query as the list
async fn export_xlsx(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let view = query.view(&state)?;
    let registrations = state.dashboard.list(&view).await?;
    let buffer = export::to_xlsx(&registrations, view.language)?;

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"registrations.xlsx\"",
            ),
        ],
        buffer,
    )
        .into_response())
}

/// `GET /api/export.csv`
async fn export_csv(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let view = query.view(&state)?;
    let registrations = state.dashboard.list(&view).await?;
    let csv = export::to_csv(&registrations, view.language)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"registrations.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

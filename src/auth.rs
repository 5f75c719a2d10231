#![cfg(not(tarpaulin_include))]

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{Query, Request, State, rejection::JsonRejection},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::app::{AppState, LanguageQuery, bad_json};
use crate::error::{AppError, AppResult};
use crate::i18n::{Language, TranslationKey, t};

/// Name of the cookie carrying the admin session id
pub const SESSION_COOKIE: &str = "admin_session";
const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds

/// Password gate in front of the dashboard endpoints.
///
/// The password is only kept as an Argon2 hash. Sessions live in memory and
/// are lost on restart.
pub struct AdminGate {
    password_hash: Option<String>,
    sessions: RwLock<HashMap<String, SystemTime>>,
}

impl AdminGate {
    /// A gate for `password`, or an open gate when there is none.
    pub fn new(password: Option<&str>) -> AppResult<Self> {
        let password_hash = match password {
            Some(password) => Some(hash_password(password)?),
            None => {
                log::warn!("ADMIN_PASSWORD is not set, dashboard endpoints are open");
                None
            }
        };

        Ok(AdminGate {
            password_hash,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Check the password and open a session.
    ///
    /// # Arguments
    /// * `password` - The plaintext password to verify
    /// * `language` - Language of the error message
    ///
    /// # Returns
    /// * `AppResult<String>` - A new session id, or `Unauthorized`
    pub fn login(&self, password: &str, language: Language) -> AppResult<String> {
        if let Some(hash) = &self.password_hash {
            if !verify_password(password, hash)? {
                log::warn!("rejected admin login");
                return Err(AppError::Unauthorized(
                    t(TranslationKey::LoginError, language).to_string(),
                ));
            }
        }

        let session_id = Uuid::new_v4().to_string();
        let expires_at = SystemTime::now() + Duration::from_secs(SESSION_DURATION);

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, expiry| *expiry > SystemTime::now());
        sessions.insert(session_id.clone(), expires_at);

        log::info!("admin session opened");
        Ok(session_id)
    }

    pub fn validate_session(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(session_id)
            .is_some_and(|expires_at| *expires_at > SystemTime::now())
    }

    pub fn logout(&self, session_id: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AppError::Internal("Password hashing failed".to_string()))
}

fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash format".to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: String,
}

/// `POST /admin/login`
pub async fn handle_login(
    State(state): State<AppState>,
    Query(query): Query<LanguageQuery>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let language = state.language(query.lang.as_deref());
    let Json(credentials) = payload.map_err(bad_json)?;

    let session_id = state.gate.login(&credentials.password, language)?;
    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .build();

    Ok((jar.add(cookie), Json(json!({ "message": "ok" }))))
}

/// `POST /admin/logout`
pub async fn handle_logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.gate.logout(cookie.value());
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(json!({ "message": "ok" })))
}

/// Lets the request through when the gate is open or the session cookie is
/// valid; 401 otherwise.
pub async fn require_admin(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    if !state.gate.is_enabled() {
        return next.run(request).await;
    }

    if let Some(session_cookie) = jar.get(SESSION_COOKIE) {
        if state.gate.validate_session(session_cookie.value()) {
            return next.run(request).await;
        }
    }

    AppError::Unauthorized("Admin session required".to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_gate_issues_sessions() {
        let gate = AdminGate::new(Some("s3cret")).unwrap();
        assert!(gate.is_enabled());

        match gate.login("1234", Language::Fr) {
            Err(AppError::Unauthorized(msg)) => {
                assert_eq!(msg, "Mot de passe incorrect. Veuillez réessayer.")
            }
            other => panic!("expected Unauthorized, got {:?}", other),
        }

        let session = gate.login("s3cret", Language::Fr).unwrap();
        assert!(gate.validate_session(&session));
        assert!(!gate.validate_session("forged"));

        gate.logout(&session);
        assert!(!gate.validate_session(&session));
    }

    #[test]
    fn open_gate_accepts_anything() {
        let gate = AdminGate::new(None).unwrap();
        assert!(!gate.is_enabled());
        assert!(gate.login("", Language::Ar).is_ok());
    }

    #[test]
    fn hash_is_not_the_password() {
        let hash = hash_password("s3cret").unwrap();
        assert!(!hash.contains("s3cret"));
        assert!(verify_password("s3cret", &hash).unwrap());
        assert!(!verify_password("other", &hash).unwrap());
    }
}

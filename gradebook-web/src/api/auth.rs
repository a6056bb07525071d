//! Login, logout, password change and the session middleware
//!
//! Sessions are opaque tokens stored server-side (see gradebook_common::auth)
//! and transported in an HttpOnly cookie. The middleware resolves the cookie
//! to a SessionUser and injects it as a request extension for handlers.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use gradebook_common::auth::{self, SessionUser, SESSION_COOKIE};

use crate::{
    error::{ApiError, ApiResult},
    AppState,
};

/// POST /api/auth/login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /api/auth/login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
}

/// POST /api/auth/change-password request
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// POST /api/auth/login
///
/// Verifies credentials and issues a session cookie. Unknown usernames and
/// wrong passwords produce the same 401 response.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Response> {
    let row: Option<(i64, String, String)> =
        sqlx::query_as("SELECT id, username, password_hash FROM users WHERE username = ?")
            .bind(&request.username)
            .fetch_optional(&state.db)
            .await?;

    let (user_id, username, password_hash) = match row {
        Some(row) => row,
        None => {
            warn!("Login failed: unknown username '{}'", request.username);
            return Err(ApiError::Unauthorized(
                "Invalid username or password".to_string(),
            ));
        }
    };

    if !auth::verify_password(&request.password, &password_hash)? {
        warn!("Login failed: wrong password for '{}'", username);
        return Err(ApiError::Unauthorized(
            "Invalid username or password".to_string(),
        ));
    }

    let session = auth::create_session(&state.db, user_id).await?;
    info!("User '{}' logged in", username);

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, session.token, session.max_age_seconds
    );

    let mut response = Json(LoginResponse { user_id, username }).into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, cookie_header_value(&cookie)?);
    Ok(response)
}

/// POST /api/auth/logout
///
/// Deletes the session and expires the cookie.
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<Response> {
    auth::delete_session(&state.db, &user.token).await?;
    info!("User '{}' logged out", user.username);

    let cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE);

    let mut response = Json(json!({ "status": "logged_out" })).into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, cookie_header_value(&cookie)?);
    Ok(response)
}

/// POST /api/auth/change-password
///
/// Requires the old password; the new password must be non-empty and match
/// its confirmation.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let stored_hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
        .bind(user.user_id)
        .fetch_one(&state.db)
        .await?;

    if !auth::verify_password(&request.old_password, &stored_hash)? {
        return Err(ApiError::BadRequest("Old password is incorrect".to_string()));
    }
    if request.new_password.is_empty() {
        return Err(ApiError::BadRequest(
            "New password must not be empty".to_string(),
        ));
    }
    if request.new_password != request.confirm_password {
        return Err(ApiError::BadRequest(
            "New password and confirmation do not match".to_string(),
        ));
    }

    let new_hash = auth::hash_password(&request.new_password)?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(&new_hash)
        .bind(user.user_id)
        .execute(&state.db)
        .await?;

    info!("User '{}' changed their password", user.username);
    Ok(Json(json!({ "status": "password_changed" })))
}

/// Session middleware for protected routes
///
/// Resolves the session cookie to a user and stores it as a request
/// extension. Requests without a valid, unexpired session get 401.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token_from_headers(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("Login required".to_string()))?;

    let user = auth::lookup_session(&state.db, &token)
        .await?
        .ok_or_else(|| {
            warn!("Rejected invalid or expired session token");
            ApiError::Unauthorized("Session invalid or expired".to_string())
        })?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Extract the session token from the Cookie header, if present
fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(SESSION_COOKIE))
        .and_then(|rest| rest.strip_prefix('='))
        .map(str::to_string)
}

fn cookie_header_value(cookie: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(cookie)
        .map_err(|e| ApiError::Internal(format!("Invalid cookie header: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_token_extracted_from_single_cookie() {
        let headers = headers_with_cookie("gradebook_session=abc123");
        assert_eq!(session_token_from_headers(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_token_extracted_among_other_cookies() {
        let headers = headers_with_cookie("theme=dark; gradebook_session=abc123; lang=en");
        assert_eq!(session_token_from_headers(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_similarly_named_cookie_not_matched() {
        let headers = headers_with_cookie("xgradebook_session=abc123");
        assert_eq!(session_token_from_headers(&headers), None);
    }

    #[test]
    fn test_no_cookie_header() {
        assert_eq!(session_token_from_headers(&HeaderMap::new()), None);
    }
}

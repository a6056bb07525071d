//! Password hashing and database-backed session management
//!
//! Passwords are stored as Argon2 PHC strings. Sessions are opaque random
//! tokens held in the `sessions` table with an absolute expiry; the web
//! service transports them in an HttpOnly cookie.
//!
//! This module contains only pure functions and database operations.
//! No HTTP framework dependencies (Axum, etc.) - those are in the web crate.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db, Error, Result};

/// Cookie name carrying the session token
pub const SESSION_COOKIE: &str = "gradebook_session";

/// Session lifetime used when the setting is missing or unparsable (7 days)
pub const DEFAULT_SESSION_TIMEOUT_SECONDS: i64 = 604_800;

/// Freshly created session, ready to be handed to the client
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub token: String,
    pub max_age_seconds: i64,
}

/// Authenticated user resolved from a session token
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: i64,
    pub username: String,
    pub token: String,
}

/// Hash a password into an Argon2 PHC string for storage
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC string
///
/// Returns Ok(false) for a wrong password; Err only when the stored hash
/// itself cannot be parsed.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| Error::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Create a session for the user and persist it
///
/// The lifetime comes from the `session_timeout_seconds` setting.
pub async fn create_session(db: &SqlitePool, user_id: i64) -> Result<SessionHandle> {
    let timeout = db::get_setting_i64(db, "session_timeout_seconds", DEFAULT_SESSION_TIMEOUT_SECONDS)
        .await?;
    let token = Uuid::new_v4().simple().to_string();
    let expires_at = chrono::Utc::now().timestamp() + timeout;

    sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(expires_at)
        .execute(db)
        .await?;

    Ok(SessionHandle {
        token,
        max_age_seconds: timeout,
    })
}

/// Resolve a session token to its user, ignoring expired sessions
pub async fn lookup_session(db: &SqlitePool, token: &str) -> Result<Option<SessionUser>> {
    let now = chrono::Utc::now().timestamp();

    let row: Option<(i64, String)> = sqlx::query_as(
        "SELECT u.id, u.username
         FROM sessions s
         JOIN users u ON u.id = s.user_id
         WHERE s.token = ? AND s.expires_at > ?",
    )
    .bind(token)
    .bind(now)
    .fetch_optional(db)
    .await?;

    Ok(row.map(|(user_id, username)| SessionUser {
        user_id,
        username,
        token: token.to_string(),
    }))
}

/// Remove a session (logout)
pub async fn delete_session(db: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(db)
        .await?;
    Ok(())
}

/// Delete all expired sessions, returning how many were removed
///
/// Called at startup; expired rows are otherwise only filtered on lookup.
pub async fn purge_expired_sessions(db: &SqlitePool) -> Result<u64> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("secret123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("secret123", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_stored_hash_rejected() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }
}

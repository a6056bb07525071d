//! Subject management API
//!
//! Subjects are a flat list; deleting one cascades to its scores. Names are
//! unique case-insensitively, matching the duplicate checks on create/rename.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;

use gradebook_common::db::models::Subject;

use crate::{
    error::{ApiError, ApiResult},
    AppState,
};

/// Request body for creating or renaming a subject
#[derive(Debug, Deserialize)]
pub struct SubjectPayload {
    pub name: String,
}

/// GET /api/subjects
///
/// All subjects ordered by id.
pub async fn list_subjects(State(state): State<AppState>) -> ApiResult<Json<Vec<Subject>>> {
    Ok(Json(fetch_subjects(&state.db).await?))
}

/// POST /api/subjects
pub async fn create_subject(
    State(state): State<AppState>,
    Json(payload): Json<SubjectPayload>,
) -> ApiResult<impl IntoResponse> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest(
            "Subject name must not be empty".to_string(),
        ));
    }
    if find_subject_by_name(&state.db, &name).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "Subject '{}' already exists",
            name
        )));
    }

    let id = sqlx::query("INSERT INTO subjects (name) VALUES (?)")
        .bind(&name)
        .execute(&state.db)
        .await?
        .last_insert_rowid();

    info!("Created subject '{}' (id {})", name, id);
    Ok((StatusCode::CREATED, Json(Subject { id, name })))
}

/// PUT /api/subjects/:id
///
/// Renames a subject. The new name may only collide with the subject itself
/// (case-insensitive), never with another subject.
pub async fn update_subject(
    State(state): State<AppState>,
    Path(subject_id): Path<i64>,
    Json(payload): Json<SubjectPayload>,
) -> ApiResult<Json<Subject>> {
    let exists: Option<String> = sqlx::query_scalar("SELECT name FROM subjects WHERE id = ?")
        .bind(subject_id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(ApiError::NotFound(format!("Subject {}", subject_id)));
    }

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest(
            "Subject name must not be empty".to_string(),
        ));
    }

    if let Some(other) = find_subject_by_name(&state.db, &name).await? {
        if other.id != subject_id {
            return Err(ApiError::Conflict(format!(
                "Subject name '{}' is already used by another subject",
                name
            )));
        }
    }

    sqlx::query("UPDATE subjects SET name = ? WHERE id = ?")
        .bind(&name)
        .bind(subject_id)
        .execute(&state.db)
        .await?;

    Ok(Json(Subject {
        id: subject_id,
        name,
    }))
}

/// DELETE /api/subjects/:id
///
/// Removes the subject and, via foreign key cascade, every score for it.
pub async fn delete_subject(
    State(state): State<AppState>,
    Path(subject_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let name: Option<String> = sqlx::query_scalar("SELECT name FROM subjects WHERE id = ?")
        .bind(subject_id)
        .fetch_optional(&state.db)
        .await?;
    let name = name.ok_or_else(|| ApiError::NotFound(format!("Subject {}", subject_id)))?;

    sqlx::query("DELETE FROM subjects WHERE id = ?")
        .bind(subject_id)
        .execute(&state.db)
        .await?;

    info!("Deleted subject '{}' (id {}) and its scores", name, subject_id);
    Ok(Json(json!({ "deleted": subject_id, "name": name })))
}

/// All subjects ordered by id (shared with the student and CSV handlers)
pub(crate) async fn fetch_subjects(db: &SqlitePool) -> Result<Vec<Subject>, sqlx::Error> {
    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM subjects ORDER BY id")
        .fetch_all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(id, name)| Subject { id, name })
        .collect())
}

/// Case-insensitive lookup by name
async fn find_subject_by_name(db: &SqlitePool, name: &str) -> Result<Option<Subject>, sqlx::Error> {
    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT id, name FROM subjects WHERE lower(name) = lower(?)")
            .bind(name)
            .fetch_optional(db)
            .await?;
    Ok(row.map(|(id, name)| Subject { id, name }))
}

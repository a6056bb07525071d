//! Student management API: CRUD, search and sorting
//!
//! Listing supports substring search on the name, exact search on the id,
//! and three sort orders: by id (default), by one subject's score, or by
//! total score. Subject-score sorting happens in SQL; total-score sorting
//! falls back to an in-memory sort because the total is computed per student.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;

use gradebook_common::db::models::Subject;

use crate::{
    error::{ApiError, ApiResult},
    AppState,
};

use super::subjects::fetch_subjects;

/// Query parameters for the student list
#[derive(Debug, Deserialize)]
pub struct StudentListQuery {
    /// Substring match on the student name
    pub search_name: Option<String>,

    /// Exact match on the student id (string so non-numeric input can be
    /// rejected with a useful message)
    pub search_id: Option<String>,

    /// Sort order: "id", "total" or "subject"
    #[serde(default = "default_sort")]
    pub sort_by: String,

    /// Subject to sort by (required when sort_by=subject)
    pub subject_id: Option<i64>,
}

fn default_sort() -> String {
    "id".to_string()
}

/// One student with their scores keyed by subject id
#[derive(Debug, Serialize)]
pub struct StudentRow {
    pub id: i64,
    pub name: String,
    pub class_name: String,
    pub scores: BTreeMap<i64, f64>,
    pub total: f64,
}

/// GET /api/students response
#[derive(Debug, Serialize)]
pub struct StudentListResponse {
    pub students: Vec<StudentRow>,
    pub subjects: Vec<Subject>,
}

/// POST /api/students request
#[derive(Debug, Deserialize)]
pub struct NewStudent {
    pub name: String,
    pub class_name: String,
    /// Initial scores keyed by subject id
    #[serde(default)]
    pub scores: BTreeMap<i64, f64>,
}

/// PUT /api/students/:id request
///
/// Score entries: a value upserts, an explicit null deletes, an absent
/// subject is left untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateStudent {
    pub name: String,
    pub class_name: String,
    #[serde(default)]
    pub scores: BTreeMap<i64, Option<f64>>,
}

/// PUT /api/students/:id response
#[derive(Debug, Serialize)]
pub struct UpdateStudentResponse {
    pub student: StudentRow,
    /// Score entries that were skipped (unknown subject, negative value)
    pub warnings: Vec<String>,
}

#[derive(Clone, Copy)]
enum SortOrder {
    Id,
    Total,
    Subject(i64),
}

/// GET /api/students
pub async fn list_students(
    State(state): State<AppState>,
    Query(query): Query<StudentListQuery>,
) -> ApiResult<Json<StudentListResponse>> {
    let search_name = query
        .search_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let search_id = match query.search_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            ApiError::BadRequest("Student ID search term must be a number".to_string())
        })?),
        None => None,
    };

    let sort = match query.sort_by.as_str() {
        "id" => SortOrder::Id,
        "total" => SortOrder::Total,
        "subject" => {
            let subject_id = query.subject_id.ok_or_else(|| {
                ApiError::BadRequest("subject_id is required when sort_by=subject".to_string())
            })?;
            SortOrder::Subject(subject_id)
        }
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unknown sort_by value '{}' (expected id, total or subject)",
                other
            )))
        }
    };

    // Build the student query; the subject sort joins that subject's scores
    // so missing scores order as zero.
    let mut sql = String::from("SELECT st.id, st.name, st.class_name FROM students st");
    if matches!(sort, SortOrder::Subject(_)) {
        sql.push_str(" LEFT JOIN scores sc ON sc.student_id = st.id AND sc.subject_id = ?");
    }

    let mut conditions = Vec::new();
    if search_name.is_some() {
        conditions.push("st.name LIKE ?");
    }
    if search_id.is_some() {
        conditions.push("st.id = ?");
    }
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    match sort {
        SortOrder::Subject(_) => sql.push_str(" ORDER BY COALESCE(sc.score, 0) DESC, st.id"),
        _ => sql.push_str(" ORDER BY st.id"),
    }

    let mut db_query = sqlx::query_as::<_, (i64, String, String)>(&sql);
    if let SortOrder::Subject(subject_id) = sort {
        db_query = db_query.bind(subject_id);
    }
    if let Some(name) = search_name {
        db_query = db_query.bind(format!("%{}%", name));
    }
    if let Some(id) = search_id {
        db_query = db_query.bind(id);
    }

    let student_rows = db_query.fetch_all(&state.db).await?;
    let mut scores_by_student = fetch_all_scores(&state.db).await?;

    let mut students: Vec<StudentRow> = student_rows
        .into_iter()
        .map(|(id, name, class_name)| {
            build_row(id, name, class_name, scores_by_student.remove(&id).unwrap_or_default())
        })
        .collect();

    if matches!(sort, SortOrder::Total) {
        sort_by_total_desc(&mut students);
    }

    let subjects = fetch_subjects(&state.db).await?;
    Ok(Json(StudentListResponse { students, subjects }))
}

/// GET /api/students/:id
pub async fn get_student(
    State(state): State<AppState>,
    Path(student_id): Path<i64>,
) -> ApiResult<Json<StudentRow>> {
    let row: Option<(i64, String, String)> =
        sqlx::query_as("SELECT id, name, class_name FROM students WHERE id = ?")
            .bind(student_id)
            .fetch_optional(&state.db)
            .await?;
    let (id, name, class_name) =
        row.ok_or_else(|| ApiError::NotFound(format!("Student {}", student_id)))?;

    let scores = fetch_student_scores(&state.db, id).await?;
    Ok(Json(build_row(id, name, class_name, scores)))
}

/// POST /api/students
///
/// Creates the student and any provided scores in one transaction. Any
/// invalid score (unknown subject, negative value) fails the whole request
/// and nothing is persisted.
pub async fn create_student(
    State(state): State<AppState>,
    Json(payload): Json<NewStudent>,
) -> ApiResult<impl IntoResponse> {
    let name = payload.name.trim().to_string();
    let class_name = payload.class_name.trim().to_string();
    if name.is_empty() || class_name.is_empty() {
        return Err(ApiError::BadRequest(
            "Student name and class must not be empty".to_string(),
        ));
    }

    let subject_names = subject_name_map(&state.db).await?;
    for (&subject_id, &value) in &payload.scores {
        let subject_name = subject_names.get(&subject_id).ok_or_else(|| {
            ApiError::BadRequest(format!("Unknown subject id {}", subject_id))
        })?;
        if value < 0.0 {
            return Err(ApiError::BadRequest(format!(
                "Score for subject '{}' must not be negative",
                subject_name
            )));
        }
    }

    let mut tx = state.db.begin().await?;
    let student_id = sqlx::query("INSERT INTO students (name, class_name) VALUES (?, ?)")
        .bind(&name)
        .bind(&class_name)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    for (&subject_id, &value) in &payload.scores {
        sqlx::query("INSERT INTO scores (student_id, subject_id, score) VALUES (?, ?, ?)")
            .bind(student_id)
            .bind(subject_id)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!("Created student '{}' (id {})", name, student_id);
    let row = build_row(student_id, name, class_name, payload.scores);
    Ok((StatusCode::CREATED, Json(row)))
}

/// PUT /api/students/:id
///
/// Name and class are validated strictly; score entries are applied with
/// partial tolerance: invalid entries are skipped and reported as warnings
/// while the rest of the update goes through.
pub async fn update_student(
    State(state): State<AppState>,
    Path(student_id): Path<i64>,
    Json(payload): Json<UpdateStudent>,
) -> ApiResult<Json<UpdateStudentResponse>> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM students WHERE id = ?")
        .bind(student_id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(ApiError::NotFound(format!("Student {}", student_id)));
    }

    let name = payload.name.trim().to_string();
    let class_name = payload.class_name.trim().to_string();
    if name.is_empty() || class_name.is_empty() {
        return Err(ApiError::BadRequest(
            "Student name and class must not be empty".to_string(),
        ));
    }

    let subject_names = subject_name_map(&state.db).await?;
    let mut warnings = Vec::new();

    let mut tx = state.db.begin().await?;
    sqlx::query(
        "UPDATE students SET name = ?, class_name = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(&name)
    .bind(&class_name)
    .bind(student_id)
    .execute(&mut *tx)
    .await?;

    for (&subject_id, value) in &payload.scores {
        let subject_name = match subject_names.get(&subject_id) {
            Some(subject_name) => subject_name,
            None => {
                warnings.push(format!("Unknown subject id {}, entry skipped", subject_id));
                continue;
            }
        };

        match value {
            Some(score) if *score < 0.0 => {
                warnings.push(format!(
                    "Score for subject '{}' must not be negative, left unchanged",
                    subject_name
                ));
            }
            Some(score) => {
                sqlx::query(
                    "INSERT INTO scores (student_id, subject_id, score) VALUES (?, ?, ?)
                     ON CONFLICT(student_id, subject_id)
                     DO UPDATE SET score = excluded.score, updated_at = CURRENT_TIMESTAMP",
                )
                .bind(student_id)
                .bind(subject_id)
                .bind(*score)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM scores WHERE student_id = ? AND subject_id = ?")
                    .bind(student_id)
                    .bind(subject_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
    }
    tx.commit().await?;

    let scores = fetch_student_scores(&state.db, student_id).await?;
    Ok(Json(UpdateStudentResponse {
        student: build_row(student_id, name, class_name, scores),
        warnings,
    }))
}

/// DELETE /api/students/:id
pub async fn delete_student(
    State(state): State<AppState>,
    Path(student_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let name: Option<String> = sqlx::query_scalar("SELECT name FROM students WHERE id = ?")
        .bind(student_id)
        .fetch_optional(&state.db)
        .await?;
    let name = name.ok_or_else(|| ApiError::NotFound(format!("Student {}", student_id)))?;

    sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(student_id)
        .execute(&state.db)
        .await?;

    info!("Deleted student '{}' (id {}) and their scores", name, student_id);
    Ok(Json(json!({ "deleted": student_id, "name": name })))
}

/// Sort students by total score, highest first; ties keep their id order
/// (the input is already id-ordered and the sort is stable)
fn sort_by_total_desc(students: &mut [StudentRow]) {
    students.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(Ordering::Equal));
}

fn build_row(id: i64, name: String, class_name: String, scores: BTreeMap<i64, f64>) -> StudentRow {
    let total = scores.values().sum();
    StudentRow {
        id,
        name,
        class_name,
        scores,
        total,
    }
}

/// All scores grouped by student
async fn fetch_all_scores(
    db: &SqlitePool,
) -> Result<HashMap<i64, BTreeMap<i64, f64>>, sqlx::Error> {
    let rows: Vec<(i64, i64, f64)> =
        sqlx::query_as("SELECT student_id, subject_id, score FROM scores")
            .fetch_all(db)
            .await?;

    let mut by_student: HashMap<i64, BTreeMap<i64, f64>> = HashMap::new();
    for (student_id, subject_id, score) in rows {
        by_student.entry(student_id).or_default().insert(subject_id, score);
    }
    Ok(by_student)
}

async fn fetch_student_scores(
    db: &SqlitePool,
    student_id: i64,
) -> Result<BTreeMap<i64, f64>, sqlx::Error> {
    let rows: Vec<(i64, f64)> =
        sqlx::query_as("SELECT subject_id, score FROM scores WHERE student_id = ?")
            .bind(student_id)
            .fetch_all(db)
            .await?;
    Ok(rows.into_iter().collect())
}

/// Map of subject id to name, for validation and warning messages
async fn subject_name_map(db: &SqlitePool) -> Result<HashMap<i64, String>, sqlx::Error> {
    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM subjects")
        .fetch_all(db)
        .await?;
    Ok(rows.into_iter().collect())
}

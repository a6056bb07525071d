//! CSV export and import
//!
//! Export writes one row per student with a column per subject and a trailing
//! total, prefixed with a UTF-8 BOM so spreadsheet tools detect the encoding.
//!
//! Import is tolerant: the file may be UTF-8 (with or without BOM) or
//! GBK/GB2312 encoded; header names are matched case-insensitively; unknown
//! columns are ignored and reported; each valid row is committed on its own
//! so one bad row never poisons the rest. Skipped rows are reported with
//! their line number and reason.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use gradebook_common::db::models::Subject;
use gradebook_common::db::get_setting_i64;

use crate::{
    error::{ApiError, ApiResult},
    AppState,
};

use super::subjects::fetch_subjects;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Fallback upload limit when the setting is missing (10 MB)
const DEFAULT_IMPORT_MAX_BYTES: i64 = 10 * 1024 * 1024;

/// GET /api/export
///
/// Streams all students as a CSV attachment: id, name, class, one column per
/// subject (id order), and the total. Scores are formatted with one decimal
/// place; absent scores are empty cells.
pub async fn export_students(State(state): State<AppState>) -> ApiResult<Response> {
    let subjects = fetch_subjects(&state.db).await?;
    let students: Vec<(i64, String, String)> =
        sqlx::query_as("SELECT id, name, class_name FROM students ORDER BY id")
            .fetch_all(&state.db)
            .await?;
    let scores: Vec<(i64, i64, f64)> =
        sqlx::query_as("SELECT student_id, subject_id, score FROM scores")
            .fetch_all(&state.db)
            .await?;

    let mut by_student: HashMap<i64, HashMap<i64, f64>> = HashMap::new();
    for (student_id, subject_id, score) in scores {
        by_student.entry(student_id).or_default().insert(subject_id, score);
    }

    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header_row: Vec<String> = vec!["id".into(), "name".into(), "class".into()];
    header_row.extend(subjects.iter().map(|s| s.name.clone()));
    header_row.push("total".into());
    writer.write_record(&header_row)?;

    for (id, name, class_name) in &students {
        let student_scores = by_student.get(id);
        let mut row: Vec<String> = vec![id.to_string(), name.clone(), class_name.clone()];
        let mut total = 0.0;
        for subject in &subjects {
            match student_scores.and_then(|m| m.get(&subject.id)) {
                Some(&score) => {
                    row.push(format!("{:.1}", score));
                    total += score;
                }
                None => row.push(String::new()),
            }
        }
        row.push(format!("{:.1}", total));
        writer.write_record(&row)?;
    }

    let csv_bytes = writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV buffer error: {}", e)))?;

    let mut body = Vec::with_capacity(csv_bytes.len() + UTF8_BOM.len());
    body.extend_from_slice(&UTF8_BOM);
    body.extend_from_slice(&csv_bytes);

    info!("Exported {} student(s) as CSV", students.len());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"students_export.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}

/// Import summary returned to the client
#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: Vec<SkippedRow>,
    /// Header columns that matched no subject and were ignored
    pub ignored_columns: Vec<String>,
}

/// One skipped CSV row with its 1-based line number
#[derive(Debug, Serialize)]
pub struct SkippedRow {
    pub line: usize,
    pub reason: String,
}

/// POST /api/import
///
/// Takes the raw CSV file as the request body.
pub async fn import_students(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<ImportReport>> {
    let max_bytes =
        get_setting_i64(&state.db, "import_max_bytes", DEFAULT_IMPORT_MAX_BYTES).await?;
    if body.len() as i64 > max_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "CSV file exceeds the {} byte import limit",
            max_bytes
        )));
    }

    let (text, encoding) = decode_csv_bytes(&body).ok_or_else(|| {
        ApiError::BadRequest(
            "File content is neither valid UTF-8 nor GBK/GB2312 encoded text".to_string(),
        )
    })?;
    info!("CSV file decoded using {}", encoding);

    let subjects = fetch_subjects(&state.db).await?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ApiError::BadRequest(format!("Cannot read CSV header row: {}", e)))?
        .clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ApiError::BadRequest(
            "CSV file is empty or has no header row".to_string(),
        ));
    }

    let columns = map_columns(&headers, &subjects).map_err(ApiError::BadRequest)?;

    let mut imported = 0usize;
    let mut skipped = Vec::new();

    // Line numbers come from the reader position (1-based, header is line 1);
    // the enumerate index is only a fallback when no position is available
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line() as usize).unwrap_or(index + 2);
                skipped.push(SkippedRow {
                    line,
                    reason: format!("unreadable row: {}", e),
                });
                continue;
            }
        };
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 2);

        match parse_row(&record, &columns) {
            RowOutcome::Blank => continue,
            RowOutcome::Skip(reason) => skipped.push(SkippedRow { line, reason }),
            RowOutcome::Student(parsed) => {
                // Per-student commit: one failing row leaves earlier rows in place
                match insert_imported_student(&state.db, &parsed).await {
                    Ok(()) => imported += 1,
                    Err(e) => skipped.push(SkippedRow {
                        line,
                        reason: format!("database error: {}", e),
                    }),
                }
            }
        }
    }

    info!(
        "CSV import finished: {} imported, {} skipped, {} column(s) ignored",
        imported,
        skipped.len(),
        columns.ignored.len()
    );

    Ok(Json(ImportReport {
        imported,
        skipped,
        ignored_columns: columns.ignored,
    }))
}

/// Decode CSV bytes, trying UTF-8 (with or without BOM) first, then GBK
/// (which also covers GB2312). Returns the text and the matched encoding.
fn decode_csv_bytes(bytes: &[u8]) -> Option<(String, &'static str)> {
    if let Some(rest) = bytes.strip_prefix(&UTF8_BOM) {
        if let Ok(text) = std::str::from_utf8(rest) {
            return Some((text.to_string(), "utf-8 (BOM)"));
        }
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some((text.to_string(), "utf-8"));
    }
    let (decoded, _, had_errors) = encoding_rs::GBK.decode(bytes);
    if !had_errors {
        return Some((decoded.into_owned(), "gbk"));
    }
    None
}

/// Where each interesting column lives in the CSV
#[derive(Debug)]
struct ColumnMap {
    name_idx: usize,
    class_idx: usize,
    subject_cols: Vec<SubjectColumn>,
    ignored: Vec<String>,
}

#[derive(Debug)]
struct SubjectColumn {
    index: usize,
    subject_id: i64,
    /// Original header text, used in skip reasons
    header: String,
}

/// Match the header row against the required columns and the subject list.
/// Header names are trimmed and matched case-insensitively.
fn map_columns(headers: &csv::StringRecord, subjects: &[Subject]) -> Result<ColumnMap, String> {
    let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

    let name_idx = normalized
        .iter()
        .position(|h| h == "name")
        .ok_or_else(|| "CSV header must contain 'name' and 'class' columns".to_string())?;
    let class_idx = normalized
        .iter()
        .position(|h| h == "class")
        .ok_or_else(|| "CSV header must contain 'name' and 'class' columns".to_string())?;

    let subjects_by_name: HashMap<String, i64> = subjects
        .iter()
        .map(|s| (s.name.trim().to_lowercase(), s.id))
        .collect();

    let mut subject_cols = Vec::new();
    let mut ignored = Vec::new();
    for (index, raw_header) in headers.iter().enumerate() {
        if index == name_idx || index == class_idx {
            continue;
        }
        let header = raw_header.trim();
        if header.is_empty() {
            continue;
        }
        match subjects_by_name.get(&header.to_lowercase()) {
            Some(&subject_id) => subject_cols.push(SubjectColumn {
                index,
                subject_id,
                header: header.to_string(),
            }),
            None => ignored.push(header.to_string()),
        }
    }

    Ok(ColumnMap {
        name_idx,
        class_idx,
        subject_cols,
        ignored,
    })
}

/// A student parsed from one CSV row
struct ParsedStudent {
    name: String,
    class_name: String,
    scores: Vec<(i64, f64)>,
}

enum RowOutcome {
    /// Blank or truncated row, skipped without reporting
    Blank,
    /// Row skipped for the given reason
    Skip(String),
    Student(ParsedStudent),
}

/// Validate one CSV row. Any invalid score cell rejects the whole row so a
/// student is never imported with partial scores.
fn parse_row(record: &csv::StringRecord, columns: &ColumnMap) -> RowOutcome {
    if record.len() <= columns.name_idx.max(columns.class_idx) {
        return RowOutcome::Blank;
    }
    if record.iter().all(|cell| cell.trim().is_empty()) {
        return RowOutcome::Blank;
    }

    let name = record.get(columns.name_idx).unwrap_or("").trim();
    let class_name = record.get(columns.class_idx).unwrap_or("").trim();
    if name.is_empty() || class_name.is_empty() {
        return RowOutcome::Skip(format!(
            "empty name ('{}') or class ('{}')",
            name, class_name
        ));
    }

    let mut scores: Vec<(i64, f64)> = Vec::new();
    for col in &columns.subject_cols {
        let cell = match record.get(col.index) {
            Some(cell) => cell.trim(),
            None => continue,
        };
        if cell.is_empty() {
            continue;
        }
        // Two header columns can map to the same subject; first one wins
        if scores.iter().any(|(subject_id, _)| *subject_id == col.subject_id) {
            continue;
        }
        let value: f64 = match cell.parse() {
            Ok(value) => value,
            Err(_) => {
                return RowOutcome::Skip(format!(
                    "invalid score '{}' in column '{}'",
                    cell, col.header
                ))
            }
        };
        if value < 0.0 {
            return RowOutcome::Skip(format!(
                "negative score '{}' in column '{}'",
                cell, col.header
            ));
        }
        scores.push((col.subject_id, value));
    }

    RowOutcome::Student(ParsedStudent {
        name: name.to_string(),
        class_name: class_name.to_string(),
        scores,
    })
}

/// Insert one imported student and their scores in a single transaction
async fn insert_imported_student(
    db: &SqlitePool,
    parsed: &ParsedStudent,
) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;
    let student_id = sqlx::query("INSERT INTO students (name, class_name) VALUES (?, ?)")
        .bind(&parsed.name)
        .bind(&parsed.class_name)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    for (subject_id, value) in &parsed.scores {
        sqlx::query("INSERT INTO scores (student_id, subject_id, score) VALUES (?, ?, ?)")
            .bind(student_id)
            .bind(subject_id)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await
}

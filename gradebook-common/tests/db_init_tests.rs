//! Tests for database initialization, seeding and graceful re-open

use gradebook_common::auth;
use gradebook_common::db::init_database;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("gradebook.db");

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("gradebook.db");

    let pool1 = init_database(&db_path).await;
    assert!(pool1.is_ok());
    drop(pool1);

    // Second open must succeed and must not duplicate seeded rows
    let pool2 = init_database(&db_path).await.unwrap();
    let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = 'admin'")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(admins, 1);

    let subjects: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subjects")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(subjects, 5, "Default subjects seeded exactly once");
}

#[tokio::test]
async fn test_default_admin_password_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("gradebook.db")).await.unwrap();

    let hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE username = 'admin'")
        .fetch_one(&pool)
        .await
        .unwrap();

    assert!(auth::verify_password("admin", &hash).unwrap());
    assert!(!auth::verify_password("hunter2", &hash).unwrap());
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("gradebook.db")).await.unwrap();

    let timeout: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'session_timeout_seconds'")
            .fetch_optional(&pool)
            .await
            .unwrap();
    assert_eq!(timeout.as_deref(), Some("604800"));

    let max_bytes: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'import_max_bytes'")
            .fetch_optional(&pool)
            .await
            .unwrap();
    assert_eq!(max_bytes.as_deref(), Some("10485760"));
}

#[tokio::test]
async fn test_score_cascade_on_student_delete() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("gradebook.db")).await.unwrap();

    let student = sqlx::query("INSERT INTO students (name, class_name) VALUES ('Ada', '1A')")
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

    sqlx::query("INSERT INTO scores (student_id, subject_id, score) VALUES (?, 1, 95.0)")
        .bind(student)
        .execute(&pool)
        .await
        .unwrap();

    sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(student)
        .execute(&pool)
        .await
        .unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scores WHERE student_id = ?")
        .bind(student)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0, "Deleting a student must cascade to its scores");
}

#[tokio::test]
async fn test_duplicate_score_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("gradebook.db")).await.unwrap();

    let student = sqlx::query("INSERT INTO students (name, class_name) VALUES ('Ada', '1A')")
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

    sqlx::query("INSERT INTO scores (student_id, subject_id, score) VALUES (?, 1, 95.0)")
        .bind(student)
        .execute(&pool)
        .await
        .unwrap();

    let dup = sqlx::query("INSERT INTO scores (student_id, subject_id, score) VALUES (?, 1, 80.0)")
        .bind(student)
        .execute(&pool)
        .await;
    assert!(dup.is_err(), "One score per (student, subject) pair");
}

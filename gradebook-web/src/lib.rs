//! gradebook-web library - HTTP service for the gradebook
//!
//! JSON API over the gradebook database: login-gated subject and student
//! management, per-subject scores, CSV import/export.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;

/// Transport-level cap on CSV uploads; the effective limit is the
/// `import_max_bytes` setting, enforced in the import handler
const IMPORT_BODY_CAP: usize = 64 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

/// Build application router
///
/// Everything except /health and the login endpoint requires a session.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post, put};

    // Protected routes (require a valid session cookie)
    let protected = Router::new()
        .route("/api/auth/logout", post(api::logout))
        .route("/api/auth/change-password", post(api::change_password))
        .route("/api/subjects", get(api::list_subjects).post(api::create_subject))
        .route(
            "/api/subjects/:id",
            put(api::update_subject).delete(api::delete_subject),
        )
        .route("/api/students", get(api::list_students).post(api::create_student))
        .route(
            "/api/students/:id",
            get(api::get_student)
                .put(api::update_student)
                .delete(api::delete_student),
        )
        .route("/api/export", get(api::export_students))
        .route(
            "/api/import",
            post(api::import_students).layer(DefaultBodyLimit::max(IMPORT_BODY_CAP)),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::require_session,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/api/auth/login", post(api::login))
        .merge(api::health_routes());

    // Combine routers
    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! HTTP API handlers for gradebook-web

pub mod auth;
pub mod csv_io;
pub mod health;
pub mod students;
pub mod subjects;

pub use auth::{change_password, login, logout, require_session};
pub use csv_io::{export_students, import_students};
pub use health::health_routes;
pub use students::{
    create_student, delete_student, get_student, list_students, update_student,
};
pub use subjects::{create_subject, delete_subject, list_subjects, update_subject};

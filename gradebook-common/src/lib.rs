//! # Gradebook Common Library
//!
//! Shared code for the gradebook service including:
//! - Database initialization, models and queries
//! - Configuration loading and root folder resolution
//! - Password hashing and session management
//! - Common error types

pub mod auth;
pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};

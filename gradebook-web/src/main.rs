//! gradebook-web - Student score recording service
//!
//! Login-gated JSON API for recording students, subjects and per-subject
//! scores, with CSV import/export. Zero-config startup: first run creates
//! the database, the default admin account and the default subject list.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gradebook_common::auth::purge_expired_sessions;
use gradebook_common::config::AppConfig;
use gradebook_common::db::init_database;
use gradebook_web::{build_router, AppState};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "gradebook-web", version, about = "Gradebook web service")]
struct Cli {
    /// Folder holding the database (created if missing)
    #[arg(long, env = "GRADEBOOK_ROOT")]
    root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, env = "GRADEBOOK_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately for instant startup feedback
    info!(
        "Starting gradebook-web v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();
    let config = AppConfig::load(cli.root_folder.as_deref(), cli.port)?;
    config.ensure_root_exists()?;

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path).await?;

    let purged = purge_expired_sessions(&pool).await?;
    if purged > 0 {
        info!("Purged {} expired session(s)", purged);
    }

    let state = AppState::new(pool);
    let app = build_router(state);

    let bind = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("gradebook-web listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await?;

    Ok(())
}

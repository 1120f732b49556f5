use anyhow::Result;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use upload_store::config;
use upload_store::routes;
use upload_store::services::admission::AdmissionController;
use upload_store::services::chunk_store::FsChunkStore;
use upload_store::services::session_store::SqliteSessionStore;
use upload_store::services::upload_service::UploadService;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting upload-store with config: {:?}", cfg);

    // --- Ensure storage directories exist ---
    let chunk_dir = cfg.storage_dir.join("chunks");
    let completed_dir = cfg.storage_dir.join("completed");
    fs::create_dir_all(&chunk_dir)?;
    fs::create_dir_all(&completed_dir)?;

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use and make sure its parent
    // directory exists before connecting.
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    // Schema statements are idempotent; apply them on every start.
    SqliteSessionStore::migrate(&db).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core service ---
    let admission = AdmissionController::new(
        cfg.max_concurrent_ops,
        Duration::from_secs(cfg.admission_timeout_secs),
    );
    let service = UploadService::new(
        SqliteSessionStore::new(db.clone()),
        FsChunkStore::new(chunk_dir),
        admission,
        completed_dir,
    );

    // --- Stale-session sweep ---
    if cfg.session_ttl_secs > 0 {
        let ttl = Duration::from_secs(cfg.session_ttl_secs);
        let sweeper = service.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(ttl.min(Duration::from_secs(15 * 60)));
            loop {
                tick.tick().await;
                match sweeper.purge_stale(ttl).await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!("Purged {} stale upload session(s)", count),
                    Err(err) => tracing::warn!("Stale-session sweep failed: {}", err),
                }
            }
        });
    }

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

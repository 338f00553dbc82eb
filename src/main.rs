use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::{fs, net::TcpListener};
use tracing_subscriber::EnvFilter;
use video_ingest::{
    AppState, LocalDownloads,
    config::{AppConfig, StorageBackend},
    routes::routes::routes,
    services::{
        auth::JwtAuthenticator,
        local_store::LocalObjectStore,
        pipeline::UploadPipeline,
        probe::FfprobeClassifier,
        publisher::{ObjectPublisher, S3Publisher, build_s3_client},
        remux::FfmpegNormalizer,
        signer::{LinkSigner, LocalLinkSigner, S3LinkSigner},
        video_store::{SqliteVideoStore, VideoStore, run_migrations},
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting video-ingest with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database URL `{}`", db_url))?
        .create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    // --- Handle migration mode ---
    if migrate {
        run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }
    // Schema statements are idempotent.
    run_migrations(&db).await?;

    // --- Ensure scratch directory exists ---
    if !cfg.temp_dir.exists() {
        fs::create_dir_all(&cfg.temp_dir).await?;
        tracing::info!("Created temp directory at {}", cfg.temp_dir.display());
    }

    // --- Object storage backend ---
    let (publisher, signer, local_objects): (
        Arc<dyn ObjectPublisher>,
        Arc<dyn LinkSigner>,
        Option<LocalDownloads>,
    ) = match cfg.backend {
        StorageBackend::S3 => {
            let client = build_s3_client(
                &cfg.s3_region,
                cfg.s3_endpoint.as_deref(),
                cfg.s3_force_path_style,
            )
            .await;
            (
                Arc::new(S3Publisher::new(client.clone())),
                Arc::new(S3LinkSigner::new(client)),
                None,
            )
        }
        StorageBackend::Local => {
            if !cfg.storage_dir.exists() {
                fs::create_dir_all(&cfg.storage_dir).await?;
                tracing::info!("Created storage directory at {}", cfg.storage_dir.display());
            }
            let store = LocalObjectStore::new(cfg.storage_dir.clone());
            let links = LocalLinkSigner::new(cfg.public_base_url.clone(), cfg.link_secret.clone());
            (
                Arc::new(store.clone()),
                Arc::new(links.clone()),
                Some(LocalDownloads { store, links }),
            )
        }
    };

    // --- Initialize core services ---
    let videos: Arc<dyn VideoStore> = Arc::new(SqliteVideoStore::new(db.clone()));
    let pipeline = UploadPipeline::new(
        Arc::new(FfmpegNormalizer::new(cfg.ffmpeg_path.clone(), cfg.tool_timeout)),
        Arc::new(FfprobeClassifier::new(cfg.ffprobe_path.clone(), cfg.tool_timeout)),
        publisher,
        videos.clone(),
        cfg.bucket.clone(),
        cfg.temp_dir.clone(),
    );

    let state = AppState {
        db,
        videos,
        pipeline,
        signer,
        auth: JwtAuthenticator::new(cfg.jwt_secret.as_bytes()),
        local_objects,
        temp_dir: cfg.temp_dir.clone(),
        signed_url_ttl: cfg.signed_url_ttl,
    };

    // --- Build router ---
    let app: Router = routes(cfg.max_upload_bytes).with_state(state);

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

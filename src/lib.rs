//! Video upload ingestion service.
//!
//! Uploads are staged to disk, remuxed for fast start, classified by aspect
//! ratio, published to object storage under `<category>/<random-id><ext>`
//! and recorded on the owning video as a `bucket,key` reference. Reads turn
//! that reference into a short-lived signed URL.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

use services::{
    auth::JwtAuthenticator,
    local_store::LocalObjectStore,
    pipeline::UploadPipeline,
    signer::{LinkSigner, LocalLinkSigner},
    video_store::VideoStore,
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc, time::Duration};

/// Local-backend pieces needed to serve signed download links.
#[derive(Clone)]
pub struct LocalDownloads {
    pub store: LocalObjectStore,
    pub links: LocalLinkSigner,
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub videos: Arc<dyn VideoStore>,
    pub pipeline: UploadPipeline,
    pub signer: Arc<dyn LinkSigner>,
    pub auth: JwtAuthenticator,
    /// Present only when objects are stored on this host.
    pub local_objects: Option<LocalDownloads>,
    pub temp_dir: PathBuf,
    pub signed_url_ttl: Duration,
}

//! Defines the HTTP routes of the ingest service.
//!
//! ## Structure
//! - **Video endpoints** (bearer token required)
//!   - `POST /api/videos` — create a draft video
//!   - `GET  /api/videos/{video_id}` — fetch a video with a signed playback URL
//!   - `POST /api/video_upload/{video_id}` — multipart upload (field `video`)
//!
//! - **Local object downloads**
//!   - `GET /objects/{bucket}/{*key}?expires=&signature=` — signed link target
//!
//! The wildcard `*key` allows nested keys like `landscape/<id>.mp4`.

use crate::{
    AppState,
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::get_object,
        video_handlers::{create_video, get_video, upload_video},
    },
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router; uploads may carry up to `max_upload_bytes` of body.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/videos", post(create_video))
        .route("/api/videos/{video_id}", get(get_video))
        .route(
            "/api/video_upload/{video_id}",
            post(upload_video).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/objects/{bucket}/{*key}", get(get_object))
}

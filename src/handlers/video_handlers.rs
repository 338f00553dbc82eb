//! HTTP handlers for video records and their uploads.
//!
//! Every route acts on behalf of the bearer-token identity and only on
//! videos that identity owns. Responses never expose the stored
//! `bucket,key` reference; it is swapped for a signed URL first.

use crate::{
    AppState,
    errors::AppError,
    models::video::{CreateVideoReq, Video},
    services::{
        pipeline::{UploadRequest, VIDEO_FORM_FIELD},
        signer::sign_video,
    },
};
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use futures::StreamExt;
use std::io;
use tracing::{info, warn};
use uuid::Uuid;

fn parse_video_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::bad_request(format!("invalid video id `{}`", raw)))
}

/// Load `video_id` and confirm the caller owns it.
async fn owned_video(state: &AppState, headers: &HeaderMap, video_id: &str) -> Result<Video, AppError> {
    let video_id = parse_video_id(video_id)?;
    let user_id = state.auth.authenticate(headers)?;
    let video = state.videos.get(video_id).await?;
    if video.user_id != user_id {
        return Err(AppError::unauthorized("you do not own this video"));
    }
    Ok(video)
}

fn bad_multipart(err: MultipartError) -> AppError {
    AppError::new(err.status(), format!("malformed multipart body: {}", err.body_text()))
}

/// `POST /api/videos` — create an empty draft owned by the caller.
pub async fn create_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateVideoReq>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = state.auth.authenticate(&headers)?;
    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let video = Video::draft(user_id, title, req.description);
    state.videos.create(&video).await?;
    info!(video_id = %video.id, user_id = %user_id, "created video draft");

    Ok((StatusCode::CREATED, Json(video)))
}

/// `GET /api/videos/{video_id}`
pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Video>, AppError> {
    let video = owned_video(&state, &headers, &video_id).await?;
    let signed = sign_video(state.signer.as_ref(), video, state.signed_url_ttl).await?;
    Ok(Json(signed))
}

/// `POST /api/video_upload/{video_id}` — multipart upload in field `video`.
///
/// Ownership is settled before any of the multipart body is read. The first
/// `video` field is handed to the pipeline as a stream; other fields are
/// skipped.
pub async fn upload_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Video>, AppError> {
    let video = owned_video(&state, &headers, &video_id).await?;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some(VIDEO_FORM_FIELD) {
            continue;
        }

        let upload = UploadRequest {
            content_type: field.content_type().unwrap_or_default().to_string(),
            file_name: field.file_name().unwrap_or_default().to_string(),
            body: field.map(|chunk| chunk.map_err(io::Error::other)),
        };
        let updated = state.pipeline.ingest(video, upload).await?;

        // Already recorded: answer without a link if signing fails.
        let video_id = updated.id;
        let response = match sign_video(state.signer.as_ref(), updated.clone(), state.signed_url_ttl).await {
            Ok(signed) => signed,
            Err(err) => {
                warn!(%video_id, "could not sign playback link after upload: {}", err);
                Video {
                    video_url: None,
                    ..updated
                }
            }
        };
        return Ok(Json(response));
    }

    Err(AppError::bad_request(format!(
        "multipart field `{}` is required",
        VIDEO_FORM_FIELD
    )))
}

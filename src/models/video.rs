//! Represents a video's metadata record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A video owned by a single user.
///
/// The record is created as a draft before any media exists; the upload
/// pipeline fills in `video_url` once the file has been published.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Video {
    pub id: Uuid,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub title: String,

    pub description: Option<String>,

    pub thumbnail_url: Option<String>,

    /// Stored as an encoded `StorageReference` (`bucket,key`). Handlers replace
    /// it with a signed URL before it leaves the service.
    pub video_url: Option<String>,

    /// ID of the user allowed to modify this video.
    pub user_id: Uuid,
}

impl Video {
    /// Build a fresh draft with no media attached.
    pub fn draft(user_id: Uuid, title: impl Into<String>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            title: title.into(),
            description,
            thumbnail_url: None,
            video_url: None,
            user_id,
        }
    }
}

/// Request body for `POST /api/videos`.
#[derive(Debug, Deserialize)]
pub struct CreateVideoReq {
    pub title: String,
    pub description: Option<String>,
}

//! Video metadata persistence backed by SQLite.

use crate::models::video::Video;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const INIT_MIGRATION: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("video `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read/write access to video records.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn create(&self, video: &Video) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Video>;
    /// Overwrite the mutable fields of an existing record.
    async fn update(&self, video: &Video) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct SqliteVideoStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteVideoStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VideoStore for SqliteVideoStore {
    async fn create(&self, video: &Video) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO videos (id, created_at, updated_at, title, description,
                                 thumbnail_url, video_url, user_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(video.id)
        .bind(video.created_at)
        .bind(video.updated_at)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.thumbnail_url)
        .bind(&video.video_url)
        .bind(video.user_id)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Video> {
        sqlx::query_as::<_, Video>(
            "SELECT id, created_at, updated_at, title, description,
                    thumbnail_url, video_url, user_id
             FROM videos WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(id),
            other => StoreError::Sqlx(other),
        })
    }

    async fn update(&self, video: &Video) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE videos
             SET updated_at = ?, title = ?, description = ?, thumbnail_url = ?, video_url = ?
             WHERE id = ?",
        )
        .bind(video.updated_at)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.thumbnail_url)
        .bind(&video.video_url)
        .bind(video.id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(video.id));
        }
        Ok(())
    }
}

/// Apply the embedded schema, one statement at a time.
pub async fn run_migrations(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements = INIT_MIGRATION
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    debug!("Running {} migration statements...", statements.len());

    for stmt in statements {
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

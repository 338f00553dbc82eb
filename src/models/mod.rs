//! Core data models for the video ingest service.
//!
//! `video` maps to the SQLite `videos` table via `sqlx::FromRow`; `media`
//! holds the value types produced while processing an upload.

pub mod media;
pub mod object;
pub mod video;

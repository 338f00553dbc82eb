//! Download handler for the local object backend.
//! Streams object bodies to avoid buffering in memory; access requires a
//! link minted by `LocalLinkSigner` that has not yet expired.

use crate::{
    AppState,
    errors::AppError,
    models::object::StoredObject,
    services::{local_store::LocalStoreError, signer::LinkRejected},
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Query string carried by a signed local link.
#[derive(Debug, Deserialize)]
pub struct SignedLinkQuery {
    pub expires: i64,
    pub signature: String,
}

impl From<LinkRejected> for AppError {
    fn from(err: LinkRejected) -> Self {
        AppError::forbidden(err.to_string())
    }
}

impl From<LocalStoreError> for AppError {
    fn from(err: LocalStoreError) -> Self {
        match err {
            LocalStoreError::ObjectNotFound { .. } => AppError::not_found(err.to_string()),
            LocalStoreError::InvalidBucketName { .. } | LocalStoreError::InvalidObjectKey => {
                AppError::bad_request(err.to_string())
            }
            other => AppError::internal(other.to_string()),
        }
    }
}

/// Download `/objects/{bucket}/{*key}` as a streaming response.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(link): Query<SignedLinkQuery>,
) -> Result<Response, AppError> {
    let local = state
        .local_objects
        .as_ref()
        .ok_or_else(|| AppError::not_found("objects are not served by this instance"))?;

    local
        .links
        .verify(&bucket, &key, link.expires, &link.signature)?;

    let (meta, file) = local.store.open_object(&bucket, &key).await?;
    debug!(%bucket, %key, size = meta.size_bytes, "serving object");

    let body = Body::from_stream(ReaderStream::new(file));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &StoredObject) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", meta.etag)) {
        headers.insert(header::ETAG, value);
    }

    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    // Must not be cached past link expiry.
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, no-store"));
}

//! Represents an object held by the local filesystem backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata written next to each payload by `LocalObjectStore`.
///
/// The struct describes the object, not its bytes; it is serialized as a
/// JSON sidecar so downloads can restore the original content type.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoredObject {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type (MIME type) recorded at publish time.
    pub content_type: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the payload.
    pub etag: String,

    /// Timestamp when the object was last written.
    pub last_modified: DateTime<Utc>,
}

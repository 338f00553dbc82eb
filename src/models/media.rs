//! Value types shared by the ingest pipeline and the read path.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Integer width/height ratio (×100, truncated) of a 16:9 frame.
const LANDSCAPE_RATIO: u64 = 177;
/// Integer width/height ratio (×100, truncated) of a 9:16 frame.
const PORTRAIT_RATIO: u64 = 56;

/// Coarse orientation of a video, used as the storage key prefix.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AspectCategory {
    Landscape,
    Portrait,
    Other,
}

impl AspectCategory {
    /// Classify a frame size.
    ///
    /// The ratio is compared as `width * 100 / height` in integer arithmetic,
    /// so sizes that differ slightly from the nominal one but truncate to the
    /// same value share a category. Returns `None` for a zero height.
    pub fn from_dimensions(width: u32, height: u32) -> Option<Self> {
        if height == 0 {
            return None;
        }
        let ratio = u64::from(width) * 100 / u64::from(height);
        Some(match ratio {
            LANDSCAPE_RATIO => Self::Landscape,
            PORTRAIT_RATIO => Self::Portrait,
            _ => Self::Other,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AspectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed storage reference `{0}`: expected `bucket,key`")]
pub struct MalformedReference(pub String);

/// Location of a published object, persisted on the video record as `bucket,key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageReference {
    pub bucket: String,
    pub key: String,
}

impl StorageReference {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.bucket, self.key)
    }
}

impl FromStr for StorageReference {
    type Err = MalformedReference;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = raw.split(',').collect();
        match fields.as_slice() {
            [bucket, key] if !bucket.is_empty() && !key.is_empty() => {
                Ok(Self::new(*bucket, *key))
            }
            _ => Err(MalformedReference(raw.to_string())),
        }
    }
}

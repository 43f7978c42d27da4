//! Row models for the object index and batch upload sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geo::Location;

/// Owner identity of an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub provider: String,
}

/// One regular file of an object tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
}

/// Fields shared by every object kind
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectFields {
    pub owner: Owner,
    pub name: String,
    pub description: String,
    /// Cover image reference, resolved to a blob-store URL at commit time
    pub cover_image_uri: String,
    /// Creation time declared by the document (`metadata.createdAt`)
    pub created_at: DateTime<Utc>,
    /// Index document exactly as submitted
    pub body: String,
    pub files: Option<Vec<FileEntry>>,
}

/// Stored arc
#[derive(Debug, Clone, PartialEq)]
pub struct ArcRecord {
    pub id: i64,
    pub cid: String,
    pub fields: ObjectFields,
}

/// Stored pin
#[derive(Debug, Clone, PartialEq)]
pub struct PinRecord {
    pub id: i64,
    pub cid: String,
    pub fields: ObjectFields,
    pub location: Location,
}

/// Stored pinned arc (links one arc to one pin)
#[derive(Debug, Clone, PartialEq)]
pub struct PinnedArcRecord {
    pub id: i64,
    pub cid: String,
    pub fields: ObjectFields,
    pub arc_id: i64,
    pub pin_id: i64,
}

/// Batch upload session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaUploadStatus {
    Enabled,
    Disabled,
}

impl MediaUploadStatus {
    /// Persisted representation
    pub fn as_i64(self) -> i64 {
        match self {
            MediaUploadStatus::Enabled => 1,
            MediaUploadStatus::Disabled => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(MediaUploadStatus::Enabled),
            2 => Some(MediaUploadStatus::Disabled),
            _ => None,
        }
    }
}

impl fmt::Display for MediaUploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaUploadStatus::Enabled => f.write_str("enabled"),
            MediaUploadStatus::Disabled => f.write_str("disabled"),
        }
    }
}

/// Batch upload session row
#[derive(Debug, Clone, PartialEq)]
pub struct MediaUpload {
    pub id: i64,
    pub session_id: String,
    /// Absolute path of the session's staging directory
    pub path: String,
    pub status: MediaUploadStatus,
    pub metadata: Option<serde_json::Value>,
}

/// Map layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub uid: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_upload_status_round_trip() {
        for status in [MediaUploadStatus::Enabled, MediaUploadStatus::Disabled] {
            assert_eq!(MediaUploadStatus::from_i64(status.as_i64()), Some(status));
        }
        assert_eq!(MediaUploadStatus::from_i64(0), None);
    }
}

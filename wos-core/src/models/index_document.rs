//! Index document parsing
//!
//! An index document describes one object. `kind` selects between arc, pin
//! and pinned arc; the shared metadata is common to all three and the
//! kind-specific part lives under `spec`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use wos_common::db::{FileEntry, ObjectFields, Owner};
use wos_common::{Error, Location, Result};

use super::Cid;

const KIND_ARC: &str = "arc";
const KIND_PIN: &str = "pin";
const KIND_PINNED_ARC: &str = "pinnedArc";

/// `metadata.owner`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocumentOwner {
    pub id: String,
    pub provider: String,
    #[serde(default)]
    pub extra: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RawLocation {
    lat: f64,
    lon: f64,
}

/// `metadata` block shared by every object kind
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    pub owner: DocumentOwner,
    #[serde(default)]
    pub privacy: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub fidelity: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    api_version: String,
    metadata: Value,
    kind: String,
    spec: Value,
}

#[derive(Debug, Deserialize)]
struct Selector {
    cid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PinnedArcSelectors {
    arc_selector: Selector,
    pin_selector: Selector,
}

/// Kind-specific part of an index document
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Arc,
    Pin { location: Location },
    PinnedArc { arc_selector: Cid, pin_selector: Cid },
}

impl ObjectKind {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectKind::Arc => KIND_ARC,
            ObjectKind::Pin { .. } => KIND_PIN,
            ObjectKind::PinnedArc { .. } => KIND_PINNED_ARC,
        }
    }
}

/// Parsed index document
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub api_version: String,
    pub metadata: DocumentMetadata,
    pub kind: ObjectKind,
    /// `spec.coverImageUri` as written in the document
    pub cover_image_uri: Option<String>,
    /// Document text exactly as submitted
    pub body: String,
}

impl IndexDocument {
    /// Parse and validate an index document
    ///
    /// Every failure (malformed JSON, missing required field, unknown kind,
    /// pin without location) is a validation error.
    pub fn parse(body: &str) -> Result<Self> {
        let raw: RawDocument = serde_json::from_str(body)
            .map_err(|e| Error::Validation(format!("malformed index document: {}", e)))?;

        let location = raw
            .metadata
            .get("location")
            .filter(|v| !v.is_null())
            .cloned()
            .map(serde_json::from_value::<RawLocation>)
            .transpose()
            .map_err(|e| Error::Validation(format!("malformed metadata.location: {}", e)))?;

        let metadata: DocumentMetadata = serde_json::from_value(raw.metadata)
            .map_err(|e| Error::Validation(format!("malformed metadata: {}", e)))?;

        require_non_empty("metadata.name", &metadata.name)?;
        require_non_empty("metadata.owner.id", &metadata.owner.id)?;
        require_non_empty("metadata.owner.provider", &metadata.owner.provider)?;

        if !raw.spec.is_object() {
            return Err(Error::Validation("spec must be an object".to_string()));
        }

        let kind = match raw.kind.as_str() {
            KIND_ARC => ObjectKind::Arc,
            KIND_PIN => {
                let point = location.ok_or_else(|| {
                    Error::Validation("pin requires metadata.location".to_string())
                })?;
                ObjectKind::Pin {
                    location: Location::new(point.lat, point.lon)?,
                }
            }
            KIND_PINNED_ARC => {
                let selectors: PinnedArcSelectors = serde_json::from_value(raw.spec.clone())
                    .map_err(|e| Error::Validation(format!("malformed pinnedArc spec: {}", e)))?;
                ObjectKind::PinnedArc {
                    arc_selector: Cid::parse(&selectors.arc_selector.cid)?,
                    pin_selector: Cid::parse(&selectors.pin_selector.cid)?,
                }
            }
            other => {
                return Err(Error::Validation(format!("unknown object kind: {}", other)));
            }
        };

        let cover_image_uri = raw
            .spec
            .get("coverImageUri")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            api_version: raw.api_version,
            metadata,
            kind,
            cover_image_uri,
            body: body.to_string(),
        })
    }

    /// Shared columns of the row this document becomes
    pub fn to_fields(&self, cover_image_uri: String, files: Option<Vec<FileEntry>>) -> ObjectFields {
        ObjectFields {
            owner: Owner {
                id: self.metadata.owner.id.clone(),
                provider: self.metadata.owner.provider.clone(),
            },
            name: self.metadata.name.clone(),
            description: self.metadata.description.clone(),
            cover_image_uri,
            created_at: self.metadata.created_at,
            body: self.body.clone(),
            files,
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(())
}

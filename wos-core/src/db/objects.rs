//! Object index persistence (arcs, pins, pinned arcs)
//!
//! CID columns are not unique. Lookups by CID return the oldest row.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use wos_common::db::{ArcRecord, FileEntry, ObjectFields, Owner, PinRecord, PinnedArcRecord};
use wos_common::geo::BoundingBox;
use wos_common::{Error, Location, Result};

use crate::models::Cid;

const FIELD_COLUMNS: &str =
    "cid, owner_uid, owner_provider, name, description, cover_image_uri, created_at_inner, body, files";

/// Save an arc and return its row id
pub async fn insert_arc(pool: &SqlitePool, cid: &Cid, fields: &ObjectFields) -> Result<i64> {
    let files = encode_files(&fields.files)?;
    let result = sqlx::query(&format!(
        "INSERT INTO arcs ({FIELD_COLUMNS}, name_folded) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(cid.as_str())
    .bind(&fields.owner.id)
    .bind(&fields.owner.provider)
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(&fields.cover_image_uri)
    .bind(fields.created_at.to_rfc3339())
    .bind(&fields.body)
    .bind(files)
    .bind(fold_case(&fields.name))
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Save a pin and return its row id
pub async fn insert_pin(
    pool: &SqlitePool,
    cid: &Cid,
    fields: &ObjectFields,
    location: &Location,
) -> Result<i64> {
    let files = encode_files(&fields.files)?;
    let result = sqlx::query(&format!(
        "INSERT INTO pins ({FIELD_COLUMNS}, location, lat, lon) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(cid.as_str())
    .bind(&fields.owner.id)
    .bind(&fields.owner.provider)
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(&fields.cover_image_uri)
    .bind(fields.created_at.to_rfc3339())
    .bind(&fields.body)
    .bind(files)
    .bind(location.to_ewkt())
    .bind(location.lat)
    .bind(location.lon)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Save a pinned arc referencing existing arc and pin rows
pub async fn insert_pinned_arc(
    pool: &SqlitePool,
    cid: &Cid,
    fields: &ObjectFields,
    arc_id: i64,
    pin_id: i64,
) -> Result<i64> {
    let files = encode_files(&fields.files)?;
    let result = sqlx::query(&format!(
        "INSERT INTO pinned_arcs ({FIELD_COLUMNS}, arc_id, pin_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(cid.as_str())
    .bind(&fields.owner.id)
    .bind(&fields.owner.provider)
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(&fields.cover_image_uri)
    .bind(fields.created_at.to_rfc3339())
    .bind(&fields.body)
    .bind(files)
    .bind(arc_id)
    .bind(pin_id)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find_arc_by_cid(pool: &SqlitePool, cid: &Cid) -> Result<Option<ArcRecord>> {
    let row = sqlx::query(&format!(
        "SELECT id, {FIELD_COLUMNS} FROM arcs WHERE cid = ? ORDER BY id LIMIT 1"
    ))
    .bind(cid.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(|row| arc_from_row(&row, "")).transpose()
}

pub async fn find_pin_by_cid(pool: &SqlitePool, cid: &Cid) -> Result<Option<PinRecord>> {
    let row = sqlx::query(&format!(
        "SELECT id, {FIELD_COLUMNS}, lat, lon FROM pins WHERE cid = ? ORDER BY id LIMIT 1"
    ))
    .bind(cid.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(|row| pin_from_row(&row, "")).transpose()
}

pub async fn find_pinned_arc_by_cid(
    pool: &SqlitePool,
    cid: &Cid,
) -> Result<Option<PinnedArcRecord>> {
    let row = sqlx::query(&format!(
        "SELECT id, {FIELD_COLUMNS}, arc_id, pin_id FROM pinned_arcs WHERE cid = ? ORDER BY id LIMIT 1"
    ))
    .bind(cid.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(|row| -> Result<PinnedArcRecord> {
        Ok(PinnedArcRecord {
            id: row.try_get("id")?,
            cid: row.try_get("cid")?,
            fields: fields_from_row(&row, "")?,
            arc_id: row.try_get("arc_id")?,
            pin_id: row.try_get("pin_id")?,
        })
    })
    .transpose()
}

/// Stored index document for a CID
///
/// Arcs are consulted first, then pins, then pinned arcs.
pub async fn find_index_body(pool: &SqlitePool, cid: &Cid) -> Result<Option<String>> {
    for table in ["arcs", "pins", "pinned_arcs"] {
        let body: Option<String> = sqlx::query_scalar(&format!(
            "SELECT body FROM {table} WHERE cid = ? ORDER BY id LIMIT 1"
        ))
        .bind(cid.as_str())
        .fetch_optional(pool)
        .await?;

        if body.is_some() {
            return Ok(body);
        }
    }
    Ok(None)
}

/// Arcs whose name contains `needle` (case-insensitive, literal match)
///
/// SQLite's LIKE only folds ASCII, so both sides are folded here instead and
/// matched against `name_folded`.
pub async fn search_arcs_by_name(pool: &SqlitePool, needle: &str) -> Result<Vec<ArcRecord>> {
    let pattern = format!("%{}%", escape_like(&fold_case(needle)));
    let rows = sqlx::query(&format!(
        "SELECT id, {FIELD_COLUMNS} FROM arcs WHERE name_folded LIKE ? ESCAPE '\\' ORDER BY id"
    ))
    .bind(pattern)
    .fetch_all(pool)
    .await?;

    rows.iter().map(|row| arc_from_row(row, "")).collect()
}

/// Pinned arcs whose pin lies inside `bbox`, joined with their arc and pin
pub async fn pinned_arcs_in_box(
    pool: &SqlitePool,
    bbox: &BoundingBox,
) -> Result<Vec<(ArcRecord, PinRecord)>> {
    let (min_lon, max_lon) = bbox.lon_range.unwrap_or((-180.0, 180.0));
    let rows = sqlx::query(
        r#"
        SELECT
            a.id AS a_id, a.cid AS a_cid, a.owner_uid AS a_owner_uid,
            a.owner_provider AS a_owner_provider, a.name AS a_name,
            a.description AS a_description, a.cover_image_uri AS a_cover_image_uri,
            a.created_at_inner AS a_created_at_inner, a.body AS a_body, a.files AS a_files,
            p.id AS p_id, p.cid AS p_cid, p.owner_uid AS p_owner_uid,
            p.owner_provider AS p_owner_provider, p.name AS p_name,
            p.description AS p_description, p.cover_image_uri AS p_cover_image_uri,
            p.created_at_inner AS p_created_at_inner, p.body AS p_body, p.files AS p_files,
            p.lat AS p_lat, p.lon AS p_lon
        FROM pinned_arcs pa
        JOIN pins p ON p.id = pa.pin_id
        JOIN arcs a ON a.id = pa.arc_id
        WHERE p.lat BETWEEN ? AND ?
          AND p.lon BETWEEN ? AND ?
        ORDER BY pa.id
        "#,
    )
    .bind(bbox.min_lat)
    .bind(bbox.max_lat)
    .bind(min_lon)
    .bind(max_lon)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<(ArcRecord, PinRecord)> {
            Ok((arc_from_row(row, "a_")?, pin_from_row(row, "p_")?))
        })
        .collect()
}

pub async fn count_rows(pool: &SqlitePool, table: ObjectTable) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table.name()))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Object tables, for row counting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectTable {
    Arcs,
    Pins,
    PinnedArcs,
}

impl ObjectTable {
    fn name(self) -> &'static str {
        match self {
            ObjectTable::Arcs => "arcs",
            ObjectTable::Pins => "pins",
            ObjectTable::PinnedArcs => "pinned_arcs",
        }
    }
}

fn arc_from_row(row: &SqliteRow, prefix: &str) -> Result<ArcRecord> {
    Ok(ArcRecord {
        id: row.try_get(format!("{prefix}id").as_str())?,
        cid: row.try_get(format!("{prefix}cid").as_str())?,
        fields: fields_from_row(row, prefix)?,
    })
}

fn pin_from_row(row: &SqliteRow, prefix: &str) -> Result<PinRecord> {
    let lat: f64 = row.try_get(format!("{prefix}lat").as_str())?;
    let lon: f64 = row.try_get(format!("{prefix}lon").as_str())?;
    Ok(PinRecord {
        id: row.try_get(format!("{prefix}id").as_str())?,
        cid: row.try_get(format!("{prefix}cid").as_str())?,
        fields: fields_from_row(row, prefix)?,
        location: Location::new(lat, lon)?,
    })
}

fn fields_from_row(row: &SqliteRow, prefix: &str) -> Result<ObjectFields> {
    let column = |name: &str| format!("{prefix}{name}");

    let created_at_str: String = row.try_get(column("created_at_inner").as_str())?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_err(|e| Error::Internal(format!("corrupt created_at_inner {}: {}", created_at_str, e)))?
        .with_timezone(&Utc);

    let files_json: Option<String> = row.try_get(column("files").as_str())?;
    let files = files_json
        .map(|json| serde_json::from_str::<Vec<FileEntry>>(&json))
        .transpose()
        .map_err(|e| Error::Internal(format!("corrupt files manifest: {}", e)))?;

    Ok(ObjectFields {
        owner: Owner {
            id: row.try_get(column("owner_uid").as_str())?,
            provider: row.try_get(column("owner_provider").as_str())?,
        },
        name: row.try_get(column("name").as_str())?,
        description: row.try_get(column("description").as_str())?,
        cover_image_uri: row.try_get(column("cover_image_uri").as_str())?,
        created_at,
        body: row.try_get(column("body").as_str())?,
        files,
    })
}

fn encode_files(files: &Option<Vec<FileEntry>>) -> Result<Option<String>> {
    files
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("cannot encode files manifest: {}", e)))
}

fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Escape LIKE wildcards so the needle matches literally
fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

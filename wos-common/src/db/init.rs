//! Database initialization
//!
//! Opens (or creates) the SQLite index database and creates every table
//! idempotently. Safe to call on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Foreign keys, WAL and busy timeout are per-connection settings, so they
    // are applied through the connect options rather than one-off PRAGMAs
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_arcs_table(pool).await?;
    create_pins_table(pool).await?;
    create_pinned_arcs_table(pool).await?;
    create_media_uploads_table(pool).await?;
    create_layers_table(pool).await?;

    info!("Database tables initialized (arcs, pins, pinned_arcs, media_uploads, layers)");
    Ok(())
}

/// Create arcs table
///
/// `cid` is indexed but not unique: concurrent ingestion of identical content
/// may legitimately produce two rows sharing a CID. `name_folded` holds the
/// lowercased name for case-insensitive search.
pub async fn create_arcs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS arcs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cid TEXT NOT NULL,
            owner_uid TEXT NOT NULL,
            owner_provider TEXT NOT NULL,
            name TEXT NOT NULL,
            name_folded TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            cover_image_uri TEXT NOT NULL DEFAULT '',
            created_at_inner TEXT NOT NULL,
            body TEXT NOT NULL,
            files TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_arcs_cid ON arcs(cid)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_arcs_name_folded ON arcs(name_folded)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_arcs_owner ON arcs(owner_uid, owner_provider)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create pins table
///
/// `location` holds EWKT; `lat`/`lon` duplicate it numerically for the
/// bounding-box prefilter of proximity queries.
pub async fn create_pins_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pins (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cid TEXT NOT NULL,
            owner_uid TEXT NOT NULL,
            owner_provider TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            cover_image_uri TEXT NOT NULL DEFAULT '',
            created_at_inner TEXT NOT NULL,
            body TEXT NOT NULL,
            files TEXT,
            location TEXT NOT NULL,
            lat REAL NOT NULL CHECK (lat >= -90.0 AND lat <= 90.0),
            lon REAL NOT NULL CHECK (lon >= -180.0 AND lon <= 180.0),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pins_cid ON pins(cid)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pins_lat_lon ON pins(lat, lon)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create pinned_arcs table
pub async fn create_pinned_arcs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pinned_arcs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cid TEXT NOT NULL,
            owner_uid TEXT NOT NULL,
            owner_provider TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            cover_image_uri TEXT NOT NULL DEFAULT '',
            created_at_inner TEXT NOT NULL,
            body TEXT NOT NULL,
            files TEXT,
            arc_id INTEGER NOT NULL REFERENCES arcs(id) ON UPDATE CASCADE ON DELETE CASCADE,
            pin_id INTEGER NOT NULL REFERENCES pins(id) ON UPDATE CASCADE ON DELETE CASCADE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pinned_arcs_cid ON pinned_arcs(cid)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pinned_arcs_arc ON pinned_arcs(arc_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pinned_arcs_pin ON pinned_arcs(pin_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create media_uploads table (batch upload sessions)
pub async fn create_media_uploads_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_uploads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL UNIQUE,
            path TEXT NOT NULL,
            status INTEGER NOT NULL CHECK (status IN (1, 2)),
            metadata TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_media_uploads_path ON media_uploads(path)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create layers table
pub async fn create_layers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS layers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uid TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_layers_uid ON layers(uid)")
        .execute(pool)
        .await?;

    Ok(())
}

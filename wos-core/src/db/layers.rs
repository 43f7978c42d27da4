//! Map layer listing

use sqlx::{Row, SqlitePool};
use wos_common::db::Layer;
use wos_common::Result;

pub async fn list_layers(pool: &SqlitePool) -> Result<Vec<Layer>> {
    let rows = sqlx::query("SELECT uid, name FROM layers ORDER BY id")
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| -> Result<Layer> {
            Ok(Layer {
                uid: row.try_get("uid")?,
                name: row.try_get("name")?,
            })
        })
        .collect()
}

/// Seed a layer row
///
/// Layers are provisioned out of band; no HTTP route writes them.
pub async fn insert_layer(pool: &SqlitePool, layer: &Layer) -> Result<i64> {
    let result = sqlx::query("INSERT INTO layers (uid, name) VALUES (?, ?)")
        .bind(&layer.uid)
        .bind(&layer.name)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

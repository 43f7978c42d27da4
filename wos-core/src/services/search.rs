//! Search over the object index
//!
//! Only the first match expression is evaluated. Its `operator` is accepted
//! for wire compatibility and not interpreted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, warn};
use wos_common::db::{ArcRecord, Owner};
use wos_common::{Error, Location, Result};

use crate::db::objects;

/// Radius of a location search
pub const SEARCH_RADIUS_METERS: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatchExpression {
    pub key: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultOwner {
    pub id: String,
    pub provider: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PinLocation {
    pub lat: f64,
    pub lon: f64,
}

/// One search hit, projected from an arc
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub cid: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub owner: ResultOwner,
    pub cover_image_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_location: Option<PinLocation>,
}

impl SearchResult {
    fn from_arc(arc: ArcRecord, pin_location: Option<PinLocation>) -> Self {
        let Owner { id, provider } = arc.fields.owner;
        Self {
            cid: arc.cid,
            name: arc.fields.name,
            description: arc.fields.description,
            created_at: arc.fields.created_at,
            owner: ResultOwner { id, provider },
            cover_image_uri: arc.fields.cover_image_uri,
            pin_location,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchEvaluator {
    pool: SqlitePool,
}

impl SearchEvaluator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn search(&self, expressions: &[MatchExpression]) -> Result<Vec<SearchResult>> {
        let Some(first) = expressions.first() else {
            return Err(Error::Validation("at least one match expression is required".to_string()));
        };
        if expressions.len() > 1 {
            debug!(ignored = expressions.len() - 1, "Evaluating first match expression only");
        }

        match first.key.as_str() {
            "name" => self.by_name(first).await,
            "location" => self.by_location(first).await,
            other => {
                warn!(key = other, "Unrecognized search key");
                Ok(Vec::new())
            }
        }
    }

    async fn by_name(&self, expression: &MatchExpression) -> Result<Vec<SearchResult>> {
        let needle = expression
            .values
            .first()
            .ok_or_else(|| Error::Validation("name search requires a value".to_string()))?;

        let arcs = objects::search_arcs_by_name(&self.pool, needle).await?;
        Ok(arcs
            .into_iter()
            .map(|arc| SearchResult::from_arc(arc, None))
            .collect())
    }

    async fn by_location(&self, expression: &MatchExpression) -> Result<Vec<SearchResult>> {
        let point = parse_point(&expression.values)?;
        let bbox = point.bounding_box(SEARCH_RADIUS_METERS);

        let candidates = objects::pinned_arcs_in_box(&self.pool, &bbox).await?;
        Ok(candidates
            .into_iter()
            .filter(|(_, pin)| pin.location.within(&point, SEARCH_RADIUS_METERS))
            .map(|(arc, pin)| {
                let location = PinLocation {
                    lat: pin.location.lat,
                    lon: pin.location.lon,
                };
                SearchResult::from_arc(arc, Some(location))
            })
            .collect())
    }
}

/// `[lat, lon]` as strings
fn parse_point(values: &[String]) -> Result<Location> {
    let [lat, lon] = values else {
        return Err(Error::Validation(format!(
            "location search requires exactly two values, got {}",
            values.len()
        )));
    };
    let parse = |value: &str| {
        value
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::Validation(format!("not a coordinate: {:?}", value)))
    };
    Location::new(parse(lat)?, parse(lon)?)
}

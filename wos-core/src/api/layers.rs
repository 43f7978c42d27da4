//! Map layer listing

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use wos_common::db::Layer;

use crate::db::layers;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LayersResponse {
    pub layers: Vec<Layer>,
}

/// GET /layers
pub async fn list_layers(State(state): State<AppState>) -> ApiResult<Json<LayersResponse>> {
    let layers = layers::list_layers(&state.db).await?;
    Ok(Json(LayersResponse { layers }))
}

pub fn layer_routes() -> Router<AppState> {
    Router::new().route("/layers", get(list_layers))
}

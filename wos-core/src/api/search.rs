//! Search endpoint

use axum::{body::Bytes, extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::services::{MatchExpression, SearchResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub match_expressions: Vec<MatchExpression>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

/// GET|POST /object/search
///
/// The body is parsed by hand so malformed JSON is a 400 like every other
/// validation failure.
pub async fn search_objects(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<SearchResponse>> {
    let request: SearchRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed search request: {}", e)))?;

    let results = state.search.search(&request.match_expressions).await?;
    Ok(Json(SearchResponse { results }))
}

/// Build search routes
pub fn search_routes() -> Router<AppState> {
    Router::new().route("/object/search", get(search_objects).post(search_objects))
}

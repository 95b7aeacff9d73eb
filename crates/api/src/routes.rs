use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    pub state: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResearchResponse {
    pub answer: String,
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Agentic Research Tool" }))
}

pub async fn generate_research(
    State(app): State<AppState>,
    Json(body): Json<ResearchRequest>,
) -> ApiResult<Json<ResearchResponse>> {
    info!(state = %body.state, "Research requested");

    let report = app.generator.generate(&body.state).await?;

    Ok(Json(ResearchResponse {
        answer: report.to_markdown(),
    }))
}

use crate::{
    errors::ServiceError,
    services::insights::{self, Insight},
    ApiResponse, ApiResult, AppState,
};
use axum::{extract::State, response::Json};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct InsightRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,
    /// Inventory as CSV text, same format as an assessment upload
    pub inventory_csv: String,
}

/// Ask the AI collaborator a question about an inventory upload
pub async fn ask_inventory_question(
    State(state): State<AppState>,
    Json(payload): Json<InsightRequest>,
) -> ApiResult<Insight> {
    payload.validate()?;

    let provider = state
        .insights
        .clone()
        .ok_or_else(|| ServiceError::NotConfigured("AI insights (no API key)".to_string()))?;

    let evaluation = state
        .waste_guard
        .evaluate(payload.inventory_csv.as_bytes())?;
    let insight =
        insights::ask_question(provider.as_ref(), &payload.question, &evaluation.batch).await?;

    Ok(Json(ApiResponse::success(insight)))
}

use crate::{
    errors::ServiceError,
    models::{DeliveryReport, InventoryRow, NormalizationWarning},
    services::{
        report::{self, DEFAULT_REPORT_FILE},
        waste_guard::{AlertRecord, AlertSession, UploadOutcome},
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct AssessmentQuery {
    /// Send an alert when risky rows are found
    #[serde(default)]
    pub notify: bool,
}

/// Warning with both the machine-readable kind and a readable message
#[derive(Debug, Serialize)]
pub struct WarningView {
    pub message: String,
    #[serde(flatten)]
    pub detail: NormalizationWarning,
}

impl From<NormalizationWarning> for WarningView {
    fn from(detail: NormalizationWarning) -> Self {
        Self {
            message: detail.to_string(),
            detail,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AssessmentResponse {
    pub batch_id: Uuid,
    pub total_items: usize,
    pub risky_count: usize,
    pub risk_score: u8,
    pub risky_items: Vec<InventoryRow>,
    pub warnings: Vec<WarningView>,
    /// Empty unless an alert was requested and sent
    pub deliveries: Vec<DeliveryReport>,
    /// The session's most recent alert, `null` when none went out
    pub last_alert: Option<AlertRecord>,
}

impl AssessmentResponse {
    pub fn new(outcome: UploadOutcome, session: &AlertSession) -> Self {
        let UploadOutcome {
            batch,
            assessment,
            deliveries,
        } = outcome;
        Self {
            batch_id: batch.id,
            total_items: assessment.total_count,
            risky_count: assessment.risky_count(),
            risk_score: assessment.risk_score,
            risky_items: assessment.risky_rows,
            warnings: batch.warnings.into_iter().map(WarningView::from).collect(),
            deliveries,
            last_alert: session.last_alert().cloned(),
        }
    }
}

/// Assess an uploaded CSV document
pub async fn create_assessment(
    State(state): State<AppState>,
    Query(query): Query<AssessmentQuery>,
    body: Bytes,
) -> ApiResult<AssessmentResponse> {
    // Each request is its own interaction
    let mut session = AlertSession::new();
    let outcome = state
        .waste_guard
        .process_upload(body.as_ref(), query.notify, &mut session)
        .await?;

    let response = AssessmentResponse::new(outcome, &session);
    info!(
        batch_id = %response.batch_id,
        risk_score = response.risk_score,
        deliveries = response.deliveries.len(),
        alerted = response.last_alert.is_some(),
        "assessment served"
    );

    let warning_count = response.warnings.len();
    let mut envelope = ApiResponse::success(response);
    if warning_count > 0 {
        envelope = envelope.with_message(format!("{} data warning(s)", warning_count));
    }
    Ok(Json(envelope))
}

/// Download the risky-subset report for an uploaded CSV document
pub async fn download_report(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let evaluation = state.waste_guard.evaluate(body.as_ref())?;
    let csv = report::risky_report_csv(&evaluation.batch, &evaluation.assessment)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", DEFAULT_REPORT_FILE),
            ),
        ],
        csv,
    ))
}

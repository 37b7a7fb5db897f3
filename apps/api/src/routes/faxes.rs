use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::AuditEvent;
use crate::pipeline::PipelineJob;
use crate::state::AppState;

pub const STATUS_AUDIT_EVENT: &str = "fax_delivery_status";

static E164: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("static regex"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFax {
    pub fax_id: String,
    pub from_number: String,
    pub media_url: String,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

impl InboundFax {
    fn validate(&self) -> Result<(), AppError> {
        if self.fax_id.trim().is_empty() {
            return Err(AppError::Validation("faxId must not be empty".into()));
        }
        if !E164.is_match(&self.from_number) {
            return Err(AppError::Validation(format!(
                "fromNumber '{}' is not an E.164 number",
                self.from_number
            )));
        }
        if !(self.media_url.starts_with("https://") || self.media_url.starts_with("http://")) {
            return Err(AppError::Validation("mediaUrl must be an http(s) URL".into()));
        }
        Ok(())
    }
}

/// POST /api/v1/faxes/inbound
/// Validates the gateway notification and queues one pipeline job for it.
pub async fn handle_inbound(
    State(state): State<AppState>,
    Json(body): Json<InboundFax>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    body.validate()?;

    let job = PipelineJob {
        fax_id: body.fax_id.trim().to_string(),
        from_number: body.from_number,
        media_url: body.media_url,
        user_id: None,
        received_at: Some(body.received_at.unwrap_or_else(Utc::now)),
    };
    state.queue.enqueue(&job).await?;
    info!(job_id = %job.fax_id, from = %job.from_number, "Inbound fax queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "queued", "faxId": job.fax_id })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatusUpdate {
    #[serde(alias = "id")]
    pub external_id: String,
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// POST /api/v1/faxes/status
/// Delivery webhook: recorded in the audit log, no state changes.
pub async fn handle_status(
    State(state): State<AppState>,
    Json(body): Json<DeliveryStatusUpdate>,
) -> Json<Value> {
    let failed = body.error_message.is_some() || body.status.eq_ignore_ascii_case("failed");
    if failed {
        warn!(
            external_id = %body.external_id,
            status = %body.status,
            error = body.error_message.as_deref().unwrap_or(""),
            "Gateway reported failed delivery"
        );
    } else {
        info!(external_id = %body.external_id, status = %body.status, "Delivery status update");
    }

    let mut event = AuditEvent::new(STATUS_AUDIT_EVENT, body.status.clone())
        .details(json!({ "externalId": body.external_id }));
    if let Some(message) = body.error_message {
        event = event.error(message);
    }
    state.audit.record(event);

    Json(json!({ "received": true }))
}

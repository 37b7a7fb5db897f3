use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, warn};

use super::{
    outbound_key, Deliverer, DeliveryError, DeliveryReceipt, DeliveryRequest, FaxTransmitter,
    RetryPolicy, SendRequest, TransmitError, AUDIT_EVENT,
};
use crate::document::reference::ReferenceId;
use crate::models::AuditEvent;
use crate::repository::AuditLog;
use crate::storage::ObjectStore;

/// Static transmission settings.
#[derive(Debug, Clone)]
pub struct FaxSettings {
    pub from_number: String,
    pub webhook_url: String,
    pub url_ttl: Duration,
}

/// Real delivery: upload, presign, send. Only the send is retried.
pub struct FaxDelivery {
    store: Arc<dyn ObjectStore>,
    transmitter: Arc<dyn FaxTransmitter>,
    audit: Arc<dyn AuditLog>,
    settings: FaxSettings,
    retry: RetryPolicy,
}

impl FaxDelivery {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transmitter: Arc<dyn FaxTransmitter>,
        audit: Arc<dyn AuditLog>,
        settings: FaxSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            transmitter,
            audit,
            settings,
            retry,
        }
    }

    fn event(&self, job_id: &str, reference: &ReferenceId, status: &str, attempt: u32) -> AuditEvent {
        AuditEvent::new(AUDIT_EVENT, status)
            .job(job_id)
            .stage("upload_and_deliver")
            .reference(reference.as_str())
            .attempt(attempt)
    }
}

#[async_trait]
impl Deliverer for FaxDelivery {
    async fn deliver(&self, request: DeliveryRequest<'_>) -> Result<DeliveryReceipt, DeliveryError> {
        let DeliveryRequest {
            pdf,
            to,
            reference,
            job_id,
        } = request;
        let key = outbound_key(reference);
        let locator = match self.store.put(&key, pdf, "application/pdf").await {
            Ok(locator) => locator,
            Err(e) => {
                self.audit
                    .record(self.event(job_id, reference, "failed_upload", 0).error(e.to_string()));
                return Err(e.into());
            }
        };
        let media_url = match self.store.presigned_url(&locator, self.settings.url_ttl).await {
            Ok(url) => url,
            Err(e) => {
                error!(reference_id = %reference, "Could not presign uploaded fax: {e}");
                self.audit
                    .record(self.event(job_id, reference, "failed_presign", 0).error(e.to_string()));
                return Err(e.into());
            }
        };

        let send = SendRequest {
            to: to.to_string(),
            from: self.settings.from_number.clone(),
            media_url: media_url.clone(),
            webhook_url: self.settings.webhook_url.clone(),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transmitter.send(&send).await {
                Ok(response) => {
                    info!(
                        reference_id = %reference,
                        external_id = %response.external_id,
                        attempt,
                        "Fax handed to gateway"
                    );
                    self.audit.record(
                        self.event(job_id, reference, "sent", attempt)
                            .details(json!({
                                "externalId": response.external_id,
                                "gatewayStatus": response.status,
                            })),
                    );
                    return Ok(DeliveryReceipt {
                        delivery_id: response.external_id,
                        attempts: attempt,
                        media_url,
                    });
                }
                Err(TransmitError::Client { status, message }) => {
                    error!(reference_id = %reference, status, "Fax gateway rejected request: {message}");
                    self.audit.record(
                        self.event(job_id, reference, "failed_client", attempt)
                            .error(message.clone())
                            .details(json!({ "httpStatus": status })),
                    );
                    return Err(DeliveryError::Client { status, message });
                }
                Err(e @ TransmitError::Transient { .. }) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        reference_id = %reference,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Fax send failed, retrying: {e}"
                    );
                    self.audit
                        .record(self.event(job_id, reference, "retrying", attempt).error(e.to_string()));
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(reference_id = %reference, attempt, "Fax send failed for good: {e}");
                    self.audit
                        .record(self.event(job_id, reference, "failed_final", attempt).error(e.to_string()));
                    return Err(DeliveryError::Exhausted {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryAuditLog, MemoryStore, ScriptedTransmitter};

    fn settings() -> FaxSettings {
        FaxSettings {
            from_number: "+15559990000".into(),
            webhook_url: "https://api.example/api/v1/faxes/status".into(),
            url_ttl: Duration::from_secs(3600),
        }
    }

    fn transient() -> TransmitError {
        TransmitError::Transient {
            status: Some(503),
            message: "unavailable".into(),
        }
    }

    struct Harness {
        delivery: FaxDelivery,
        transmitter: Arc<ScriptedTransmitter>,
        audit: Arc<MemoryAuditLog>,
        store: Arc<MemoryStore>,
    }

    fn harness(script: Vec<Result<&str, TransmitError>>) -> Harness {
        let transmitter = Arc::new(ScriptedTransmitter::new(script));
        let audit = Arc::new(MemoryAuditLog::default());
        let store = Arc::new(MemoryStore::default());
        let delivery = FaxDelivery::new(
            store.clone(),
            transmitter.clone(),
            audit.clone(),
            settings(),
            RetryPolicy::new(3, Duration::from_secs(1)),
        );
        Harness {
            delivery,
            transmitter,
            audit,
            store,
        }
    }

    fn request(reference: &ReferenceId) -> DeliveryRequest<'_> {
        DeliveryRequest {
            pdf: b"%PDF-1.5".to_vec(),
            to: "+15551230000",
            reference,
            job_id: "fax-1",
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let h = harness(vec![Ok("EXT-1")]);
        let reference = ReferenceId::new(2025, 1).unwrap();
        let receipt = h.delivery.deliver(request(&reference)).await.unwrap();

        assert_eq!(receipt.delivery_id, "EXT-1");
        assert_eq!(receipt.attempts, 1);
        assert!(h.store.contains("outbound/FX-2025-000001.pdf"));
        let sent = h.transmitter.requests();
        assert_eq!(sent[0].media_url, receipt.media_url);
        assert_eq!(sent[0].to, "+15551230000");
        assert_eq!(h.audit.statuses(), vec!["sent"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success_backs_off() {
        let h = harness(vec![Err(transient()), Err(transient()), Ok("EXT-2")]);
        let reference = ReferenceId::new(2025, 2).unwrap();
        let started = tokio::time::Instant::now();
        let receipt = h.delivery.deliver(request(&reference)).await.unwrap();

        assert_eq!(receipt.attempts, 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4), "{waited:?}");
        assert_eq!(h.audit.statuses(), vec!["retrying", "retrying", "sent"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_transient_stops_at_max_attempts() {
        let h = harness(vec![Err(transient()); 10]);
        let reference = ReferenceId::new(2025, 3).unwrap();
        let err = h.delivery.deliver(request(&reference)).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Exhausted { attempts: 3, .. }));
        assert_eq!(h.transmitter.calls(), 3);
        let events = h.audit.events();
        let last = events.last().unwrap();
        assert_eq!(last.status, "failed_final");
        assert_eq!(last.attempt, Some(3));
        assert!(last.error.as_deref().unwrap().contains("unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_presign_failure_is_audited_and_nothing_sent() {
        let h = harness(vec![Ok("never")]);
        h.store.break_presigning();
        let reference = ReferenceId::new(2025, 5).unwrap();
        let err = h.delivery.deliver(request(&reference)).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Storage(_)));
        assert_eq!(h.transmitter.calls(), 0);
        assert!(h.store.contains("outbound/FX-2025-000005.pdf"));
        assert_eq!(h.audit.statuses(), vec!["failed_presign"]);
        let events = h.audit.events();
        assert!(events[0].error.as_deref().unwrap().contains("presigning"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let h = harness(vec![
            Err(TransmitError::Client {
                status: 400,
                message: "invalid number".into(),
            }),
            Ok("never"),
        ]);
        let reference = ReferenceId::new(2025, 4).unwrap();
        let err = h.delivery.deliver(request(&reference)).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Client { status: 400, .. }));
        assert_eq!(h.transmitter.calls(), 1);
        assert_eq!(h.audit.statuses(), vec!["failed_client"]);
    }
}

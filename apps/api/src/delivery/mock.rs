use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{outbound_key, Deliverer, DeliveryError, DeliveryReceipt, DeliveryRequest, AUDIT_EVENT};
use crate::models::AuditEvent;
use crate::repository::AuditLog;
use crate::storage::ObjectStore;

/// Non-production delivery: keeps the PDF in a local store and never calls the gateway.
pub struct MockDelivery {
    store: Arc<dyn ObjectStore>,
    audit: Arc<dyn AuditLog>,
}

impl MockDelivery {
    pub fn new(store: Arc<dyn ObjectStore>, audit: Arc<dyn AuditLog>) -> Self {
        Self { store, audit }
    }

    pub fn delivery_id(reference: &str) -> String {
        format!("mock-{reference}")
    }
}

#[async_trait]
impl Deliverer for MockDelivery {
    async fn deliver(&self, request: DeliveryRequest<'_>) -> Result<DeliveryReceipt, DeliveryError> {
        let key = outbound_key(request.reference);
        let locator = self.store.put(&key, request.pdf, "application/pdf").await?;
        let delivery_id = Self::delivery_id(request.reference.as_str());

        info!(
            reference_id = %request.reference,
            to = request.to,
            locator = %locator,
            "Mock delivery stored fax"
        );
        self.audit.record(
            AuditEvent::new(AUDIT_EVENT, "sent")
                .job(request.job_id)
                .stage("upload_and_deliver")
                .reference(request.reference.as_str())
                .attempt(1)
                .details(json!({ "externalId": delivery_id, "gatewayStatus": "mock" })),
        );

        Ok(DeliveryReceipt {
            delivery_id,
            attempts: 1,
            media_url: locator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::reference::ReferenceId;
    use crate::storage::LocalStore;
    use crate::testing::MemoryAuditLog;

    #[tokio::test]
    async fn test_mock_delivery_is_deterministic_and_audited() {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(MemoryAuditLog::default());
        let delivery = MockDelivery::new(Arc::new(LocalStore::new(dir.path())), audit.clone());
        let reference = ReferenceId::new(2025, 77).unwrap();

        let receipt = delivery
            .deliver(DeliveryRequest {
                pdf: b"%PDF".to_vec(),
                to: "+15551230000",
                reference: &reference,
                job_id: "fax-7",
            })
            .await
            .unwrap();

        assert_eq!(receipt.delivery_id, "mock-FX-2025-000077");
        assert!(dir.path().join("outbound/FX-2025-000077.pdf").exists());
        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AUDIT_EVENT);
        assert_eq!(events[0].status, "sent");
        assert_eq!(events[0].job_id.as_deref(), Some("fax-7"));
    }
}

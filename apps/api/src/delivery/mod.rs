// Delivery stage: rendered PDF → retrievable storage → outbound fax API.
//
// `FaxDelivery` is the real path, `MockDelivery` the local one. Both write the same
// audit events (event_type "fax_delivery"); only the delivery id prefix differs.

pub mod fax;
pub mod mock;
pub mod transmitter;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::document::reference::ReferenceId;
use crate::storage::StorageError;

pub use fax::FaxDelivery;
pub use mock::MockDelivery;
pub use transmitter::{FaxTransmitter, HttpFaxTransmitter, SendRequest, SendResponse, TransmitError};

pub const AUDIT_EVENT: &str = "fax_delivery";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("fax API rejected the request (status {status}): {message}")]
    Client { status: u16, message: String },

    #[error("fax API still failing after {attempts} attempts: {message}")]
    Exhausted { attempts: u32, message: String },
}

pub struct DeliveryRequest<'a> {
    pub pdf: Vec<u8>,
    /// E.164 destination.
    pub to: &'a str,
    pub reference: &'a ReferenceId,
    pub job_id: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    pub delivery_id: String,
    pub attempts: u32,
    pub media_url: String,
}

#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, request: DeliveryRequest<'_>) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Storage key for an outbound document.
pub fn outbound_key(reference: &ReferenceId) -> String {
    format!("outbound/{reference}.pdf")
}

/// Bounded exponential backoff: attempt `n` failing waits `base * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after failed `attempt` (1-based) before the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

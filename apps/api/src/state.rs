use std::sync::Arc;

use crate::config::Config;
use crate::repository::AuditLog;
use crate::worker::JobQueue;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Inbound faxes are queued here and picked up by the worker.
    pub queue: Arc<dyn JobQueue>,
    pub audit: Arc<dyn AuditLog>,
}

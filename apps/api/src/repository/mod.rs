// Narrow persistence contracts the pipeline depends on. Implementations live in
// `postgres`; in-memory fakes for tests live in `crate::testing`.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::document::reference::ReferenceId;
use crate::models::{AuditEvent, ConversationContext, NewContext, User};

pub use postgres::PgRepository;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored data is invalid: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Returns the user for `phone_number`, creating one if needed.
    /// The flag is `true` when the user was created by this call.
    async fn find_or_create_by_phone(&self, phone_number: &str) -> Result<(User, bool), RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError>;
}

#[async_trait]
pub trait ContextRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ConversationContext>, RepoError>;

    async fn find_by_reference(
        &self,
        reference: &ReferenceId,
    ) -> Result<Option<ConversationContext>, RepoError>;

    /// Contexts for `user_id` created at or after `since`, newest first.
    async fn recent_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConversationContext>, RepoError>;

    /// Hands out a reference code that has never been issued before.
    async fn allocate_reference(&self, year: i32) -> Result<ReferenceId, RepoError>;

    async fn create(&self, context: NewContext) -> Result<ConversationContext, RepoError>;
}

/// Append-only audit trail. `record` must return immediately and must never fail
/// the caller; implementations log their own write errors.
pub trait AuditLog: Send + Sync {
    fn record(&self, event: AuditEvent);
}

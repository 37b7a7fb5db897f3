use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use super::{AuditLog, ContextRepository, RepoError, UserRepository};
use crate::document::reference::ReferenceId;
use crate::models::{AuditEvent, ConversationContext, NewContext, User};

/// Postgres-backed implementation of every repository contract.
/// Schema: `migrations/0001_init.sql`.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgRepository {
    async fn find_or_create_by_phone(&self, phone_number: &str) -> Result<(User, bool), RepoError> {
        // ON CONFLICT keeps two concurrent first faxes from creating two users.
        let inserted: Option<User> = sqlx::query_as(
            r#"
            INSERT INTO users (id, phone_number)
            VALUES ($1, $2)
            ON CONFLICT (phone_number) DO NOTHING
            RETURNING id, phone_number, display_name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(user) = inserted {
            info!("Created user {} for a new sender", user.id);
            return Ok((user, true));
        }

        let user: User = sqlx::query_as(
            "SELECT id, phone_number, display_name, created_at FROM users WHERE phone_number = $1",
        )
        .bind(phone_number)
        .fetch_one(&self.pool)
        .await?;
        Ok((user, false))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let user: Option<User> = sqlx::query_as(
            "SELECT id, phone_number, display_name, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

const CONTEXT_COLUMNS: &str = "id, reference_id, user_id, context_data, created_at";

#[async_trait]
impl ContextRepository for PgRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ConversationContext>, RepoError> {
        let row = sqlx::query_as(&format!(
            "SELECT {CONTEXT_COLUMNS} FROM conversation_contexts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_reference(
        &self,
        reference: &ReferenceId,
    ) -> Result<Option<ConversationContext>, RepoError> {
        let row = sqlx::query_as(&format!(
            "SELECT {CONTEXT_COLUMNS} FROM conversation_contexts WHERE reference_id = $1"
        ))
        .bind(reference.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn recent_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConversationContext>, RepoError> {
        let rows = sqlx::query_as(&format!(
            r#"
            SELECT {CONTEXT_COLUMNS} FROM conversation_contexts
            WHERE user_id = $1 AND created_at >= $2
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn allocate_reference(&self, year: i32) -> Result<ReferenceId, RepoError> {
        let next: i64 = sqlx::query_scalar("SELECT nextval('reference_number_seq')")
            .fetch_one(&self.pool)
            .await?;
        let number = u32::try_from(next)
            .map_err(|_| RepoError::Corrupt(format!("reference sequence returned {next}")))?;
        ReferenceId::new(year, number).map_err(|e| RepoError::Corrupt(e.to_string()))
    }

    async fn create(&self, context: NewContext) -> Result<ConversationContext, RepoError> {
        let row: ConversationContext = sqlx::query_as(&format!(
            r#"
            INSERT INTO conversation_contexts (id, reference_id, user_id, context_data)
            VALUES ($1, $2, $3, $4)
            RETURNING {CONTEXT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&context.reference_id)
        .bind(context.user_id)
        .bind(&context.context_data)
        .fetch_one(&self.pool)
        .await?;

        info!(
            "Stored context {} for reference {}",
            row.id, row.reference_id
        );
        Ok(row)
    }
}

impl AuditLog for PgRepository {
    fn record(&self, event: AuditEvent) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO audit_events
                    (event_type, status, job_id, stage, attempt, reference_id, error, details, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&event.event_type)
            .bind(&event.status)
            .bind(&event.job_id)
            .bind(&event.stage)
            .bind(event.attempt)
            .bind(&event.reference_id)
            .bind(&event.error)
            .bind(&event.details)
            .bind(event.created_at)
            .execute(&pool)
            .await;

            if let Err(e) = result {
                error!(
                    event_type = %event.event_type,
                    status = %event.status,
                    "Failed to write audit event: {e}"
                );
            }
        });
    }
}

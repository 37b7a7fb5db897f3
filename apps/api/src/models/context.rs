use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// State attached to one outbound document, keyed by the reference code printed on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub id: Uuid,
    pub reference_id: String,
    pub user_id: Uuid,
    pub context_data: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewContext {
    pub reference_id: String,
    pub user_id: Uuid,
    pub context_data: Value,
}

// External collaborators: the vision interpreter and the action agent.
// Only their wire contracts live here; what they do internally is not our concern.

pub mod client;
pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::document::blocks::ContentBlock;

pub use client::{ServiceClient, ServiceError};
pub use http::{HttpActionAgent, HttpInterpreter};

/// How an inbound page was tied to an earlier outbound document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMethod {
    Interpreter,
    ReferenceCode,
    TemporalProximity,
}

impl RecoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryMethod::Interpreter => "interpreter",
            RecoveryMethod::ReferenceCode => "reference_code",
            RecoveryMethod::TemporalProximity => "temporal_proximity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMatch {
    pub context_id: Uuid,
    pub method: RecoveryMethod,
    pub confidence: f64,
}

/// A recent context offered back to the user when we will not guess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextCandidate {
    pub context_id: Uuid,
    pub reference_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interpretation {
    pub intent: String,
    /// 0.0 to 1.0.
    pub confidence: f64,
    #[serde(default)]
    pub extracted_text: String,
    #[serde(default)]
    pub parameters: Value,
    /// Reference code as read off the page, possibly noisy.
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub requires_clarification: bool,
    #[serde(default)]
    pub clarification_question: Option<String>,
    #[serde(default)]
    pub context_recovery: Option<ContextMatch>,
    /// Stored context data of the recovered conversation, if any.
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ambiguous_contexts: Vec<ContextCandidate>,
}

impl Interpretation {
    pub fn is_reply(&self) -> bool {
        matches!(self.intent.as_str(), "reply" | "selection" | "continue")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStep {
    pub action: String,
    pub status: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Content the agent wants on the response fax.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSpec {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
    /// Persisted with the reference code so a reply can pick up where this left off.
    #[serde(default)]
    pub context_data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    pub success: bool,
    #[serde(default)]
    pub steps: Vec<AgentStep>,
    #[serde(default)]
    pub final_result: Value,
    pub response_type: String,
    #[serde(default)]
    pub document_spec: DocumentSpec,
    #[serde(default)]
    pub user_message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest<'a> {
    pub interpretation: &'a Interpretation,
    pub user_id: Uuid,
    pub job_id: &'a str,
    pub user_name: Option<&'a str>,
}

#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret(&self, image: &[u8], user_id: Uuid) -> Result<Interpretation, ServiceError>;
}

#[async_trait]
pub trait ActionAgent: Send + Sync {
    async fn execute(&self, request: AgentRequest<'_>) -> Result<AgentResult, ServiceError>;
}

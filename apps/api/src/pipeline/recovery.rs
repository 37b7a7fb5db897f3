//! Context recovery: decide which earlier outbound document, if any, an inbound page
//! continues. Priority order:
//!
//! 1. a match the interpreter already made,
//! 2. a reference code that belongs to this user, from the interpreter's reference
//!    field or else found in the page text,
//! 3. for bare replies or low-confidence reads, the user's contexts from the trailing
//!    window: one is assumed, several trigger a clarification sheet.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::PipelineError;
use crate::collaborators::{ContextCandidate, ContextMatch, Interpretation, RecoveryMethod};
use crate::document::reference::ReferenceId;
use crate::models::ConversationContext;
use crate::repository::ContextRepository;

pub const LOW_CONFIDENCE: f64 = 0.5;
pub const REFERENCE_CODE_CONFIDENCE: f64 = 0.95;
pub const TEMPORAL_CONFIDENCE: f64 = 0.6;

pub struct ContextRecovery {
    contexts: Arc<dyn ContextRepository>,
    window: Duration,
}

impl ContextRecovery {
    pub fn new(contexts: Arc<dyn ContextRepository>, window_days: i64) -> Self {
        Self {
            contexts,
            window: Duration::days(window_days.max(1)),
        }
    }

    /// Returns `interpretation` with `context_recovery`, `context` and, when ambiguous,
    /// `requires_clarification` / `ambiguous_contexts` filled in.
    pub async fn recover(
        &self,
        mut interpretation: Interpretation,
        user_id: Uuid,
    ) -> Result<Interpretation, PipelineError> {
        let repo_err = |e: crate::repository::RepoError| PipelineError::ContextRecovery(e.to_string());

        if let Some(existing) = interpretation.context_recovery.clone() {
            debug!(context_id = %existing.context_id, "Using interpreter-supplied context match");
            if interpretation.context.is_none() {
                let stored = self.contexts.find_by_id(existing.context_id).await.map_err(repo_err)?;
                interpretation.context = stored.map(|c| c.context_data);
            }
            return Ok(interpretation);
        }

        let reference = interpretation
            .reference_id
            .as_deref()
            .and_then(ReferenceId::find_in_text)
            .or_else(|| ReferenceId::find_in_text(&interpretation.extracted_text));
        if let Some(reference) = reference {
            match self.contexts.find_by_reference(&reference).await.map_err(repo_err)? {
                Some(context) if context.user_id == user_id => {
                    info!(reference_id = %reference, "Recovered context from reference code");
                    attach(&mut interpretation, context, RecoveryMethod::ReferenceCode, REFERENCE_CODE_CONFIDENCE);
                    return Ok(interpretation);
                }
                Some(_) => warn!(
                    reference_id = %reference,
                    "Reference code belongs to another user, ignoring it"
                ),
                None => debug!(reference_id = %reference, "Reference code not found"),
            }
        }

        if !(interpretation.is_reply() || interpretation.confidence < LOW_CONFIDENCE) {
            return Ok(interpretation);
        }

        let since = Utc::now() - self.window;
        let mut recent = self
            .contexts
            .recent_for_user(user_id, since)
            .await
            .map_err(repo_err)?;

        match recent.len() {
            0 => debug!("No recent contexts, treating page as standalone"),
            1 => {
                if let Some(context) = recent.pop() {
                    info!(reference_id = %context.reference_id, "Assuming reply to the only recent context");
                    attach(&mut interpretation, context, RecoveryMethod::TemporalProximity, TEMPORAL_CONFIDENCE);
                }
            }
            n => {
                info!(candidates = n, "Several recent contexts, asking the user to choose");
                interpretation.requires_clarification = true;
                interpretation.context_recovery = None;
                interpretation.context = None;
                if interpretation.clarification_question.is_none() {
                    interpretation.clarification_question = Some(
                        "You have several open requests with us. Which one is this page about?"
                            .to_string(),
                    );
                }
                interpretation.ambiguous_contexts = recent.into_iter().map(candidate).collect();
            }
        }
        Ok(interpretation)
    }
}

fn attach(
    interpretation: &mut Interpretation,
    context: ConversationContext,
    method: RecoveryMethod,
    confidence: f64,
) {
    interpretation.context_recovery = Some(ContextMatch {
        context_id: context.id,
        method,
        confidence,
    });
    interpretation.context = Some(context.context_data);
}

fn candidate(context: ConversationContext) -> ContextCandidate {
    let summary = ["summary", "title", "responseType"]
        .iter()
        .find_map(|key| context.context_data.get(*key).and_then(Value::as_str))
        .map(str::to_string);
    ContextCandidate {
        context_id: context.id,
        reference_id: context.reference_id,
        created_at: context.created_at,
        summary,
    }
}

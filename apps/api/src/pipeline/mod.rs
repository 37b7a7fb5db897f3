//! Processing pipeline: one inbound fax page in, one (or more) response faxes out.
//!
//! Stages run strictly in order for a job; each is wrapped by `StageRunner`, which
//! applies the error taxonomy (retry / terminal / skip) and writes the audit trail.

pub mod error;
pub mod post_actions;
pub mod recovery;
pub mod runner;

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::collaborators::{ActionAgent, AgentRequest, AgentResult, Interpretation, Interpreter};
use crate::delivery::{Deliverer, DeliveryReceipt, DeliveryRequest};
use crate::document::builder::{response_draft, DocumentDraft};
use crate::document::reference::ReferenceId;
use crate::media::ImageFetcher;
use crate::models::{AuditEvent, NewContext, User};
use crate::render::{RenderedDocument, Renderer};
use crate::repository::{AuditLog, ContextRepository, UserRepository};
use crate::storage::ObjectStore;

pub use error::{Disposition, PipelineError};
pub use post_actions::PostAction;
pub use recovery::ContextRecovery;
pub use runner::StageRunner;

/// One inbound page, as handed over by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineJob {
    pub fax_id: String,
    pub from_number: String,
    pub media_url: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DownloadImage,
    ResolveUser,
    Interpret,
    RecoverContext,
    InvokeAgent,
    BuildDocument,
    RenderAndPaginate,
    UploadAndDeliver,
    PostActions,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::DownloadImage => "download_image",
            Stage::ResolveUser => "resolve_user",
            Stage::Interpret => "interpret",
            Stage::RecoverContext => "recover_context",
            Stage::InvokeAgent => "invoke_agent",
            Stage::BuildDocument => "build_document",
            Stage::RenderAndPaginate => "render_and_paginate",
            Stage::UploadAndDeliver => "upload_and_deliver",
            Stage::PostActions => "post_actions",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub reference_id: ReferenceId,
    pub delivery_id: String,
    pub pages: usize,
    pub post_actions_sent: Vec<PostAction>,
}

/// Storage key of the inbound image for a fax.
pub fn inbound_key(fax_id: &str) -> String {
    format!("inbound/{fax_id}")
}

/// Everything the pipeline talks to, built once at the composition root.
pub struct PipelineDeps {
    pub store: Arc<dyn ObjectStore>,
    pub inbound: Arc<dyn ImageFetcher>,
    pub users: Arc<dyn UserRepository>,
    pub contexts: Arc<dyn ContextRepository>,
    pub audit: Arc<dyn AuditLog>,
    pub interpreter: Arc<dyn Interpreter>,
    pub agent: Arc<dyn ActionAgent>,
    pub renderer: Arc<Renderer>,
    pub deliverer: Arc<dyn Deliverer>,
    pub runner: StageRunner,
    pub recovery: ContextRecovery,
}

pub struct Pipeline {
    deps: PipelineDeps,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }

    pub async fn process(&self, job: PipelineJob) -> Result<PipelineOutcome, PipelineError> {
        let span = info_span!("job", job_id = %job.fax_id);
        self.process_inner(job).instrument(span).await
    }

    async fn process_inner(&self, job: PipelineJob) -> Result<PipelineOutcome, PipelineError> {
        let d = &self.deps;
        let job = &job;
        let job_id = job.fax_id.as_str();
        info!(from = %job.from_number, "Processing inbound fax");

        let image = d
            .runner
            .run(job_id, Stage::DownloadImage, move || self.download_image(job))
            .await?;
        let image = image.as_slice();

        let (user, is_new_user) = d
            .runner
            .run(job_id, Stage::ResolveUser, move || self.resolve_user(job))
            .await?;
        let user = &user;

        let interpretation = d
            .runner
            .run(job_id, Stage::Interpret, move || async move {
                d.interpreter
                    .interpret(image, user.id)
                    .await
                    .map_err(|e| PipelineError::Interpretation(e.to_string()))
            })
            .await?;
        info!(
            intent = %interpretation.intent,
            confidence = interpretation.confidence,
            "Page interpreted"
        );

        // Recovery failures never abort the job.
        let read = &interpretation;
        let recovered = d
            .runner
            .run(job_id, Stage::RecoverContext, move || {
                d.recovery.recover(read.clone(), user.id)
            })
            .await;
        let interpretation = recovered.unwrap_or(interpretation);
        let interpretation = &interpretation;

        let result = d
            .runner
            .run(job_id, Stage::InvokeAgent, move || async move {
                d.agent
                    .execute(AgentRequest {
                        interpretation,
                        user_id: user.id,
                        job_id,
                        user_name: user.display_name.as_deref(),
                    })
                    .await
                    .map_err(|e| PipelineError::Agent(e.to_string()))
            })
            .await?;
        let result = &result;

        let (draft, reference) = d
            .runner
            .run(job_id, Stage::BuildDocument, move || {
                self.build_document(job_id, user, interpretation, result)
            })
            .await?;

        let draft = &draft;
        let issued = &reference;
        let rendered = d
            .runner
            .run(job_id, Stage::RenderAndPaginate, move || async move {
                d.renderer
                    .render(draft.clone(), issued.clone())
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;

        let to = job.from_number.as_str();
        let rendered_ref = &rendered;
        let receipt = d
            .runner
            .run(job_id, Stage::UploadAndDeliver, move || {
                self.deliver(job_id, to, rendered_ref)
            })
            .await?;

        let post_actions_sent = self
            .post_actions(job_id, to, user, is_new_user, interpretation, result)
            .await;

        let pages = rendered.document.page_count();
        info!(
            reference_id = %reference,
            delivery_id = %receipt.delivery_id,
            pages,
            "Job complete"
        );
        d.audit.record(
            AuditEvent::new("pipeline", "completed")
                .job(job_id)
                .reference(reference.as_str())
                .details(json!({
                    "deliveryId": receipt.delivery_id,
                    "pages": pages,
                    "kind": rendered.document.kind.as_str(),
                    "postActions": post_actions_sent.iter().map(|a| a.as_str()).collect::<Vec<_>>(),
                })),
        );

        Ok(PipelineOutcome {
            reference_id: reference,
            delivery_id: receipt.delivery_id,
            pages,
            post_actions_sent,
        })
    }

    /// Reuses an already stored image for the fax, otherwise fetches and stores it.
    async fn download_image(&self, job: &PipelineJob) -> Result<Vec<u8>, PipelineError> {
        let key = inbound_key(&job.fax_id);
        let store_err = |e: crate::storage::StorageError| PipelineError::InputFetch(e.to_string());

        if let Some(bytes) = self.deps.store.get(&key).await.map_err(store_err)? {
            debug!(key = %key, bytes = bytes.len(), "Reusing stored inbound image");
            return Ok(bytes);
        }

        let bytes = self
            .deps
            .inbound
            .fetch(&job.media_url)
            .await
            .map_err(|e| PipelineError::InputFetch(e.to_string()))?;
        if bytes.is_empty() {
            return Err(PipelineError::InputFetch("inbound image is empty".to_string()));
        }
        self.deps
            .store
            .put(&key, bytes.clone(), "application/octet-stream")
            .await
            .map_err(store_err)?;
        Ok(bytes)
    }

    /// A user id carried on the job wins over the sender lookup; an unknown id falls
    /// back to the phone number.
    async fn resolve_user(&self, job: &PipelineJob) -> Result<(User, bool), PipelineError> {
        let repo_err = |e: crate::repository::RepoError| PipelineError::Repository(e.to_string());

        if let Some(id) = job.user_id {
            if let Some(user) = self.deps.users.find_by_id(id).await.map_err(repo_err)? {
                debug!(user_id = %user.id, "Using user id from job");
                return Ok((user, false));
            }
            warn!(user_id = %id, "Job names an unknown user, resolving by sender");
        }

        self.deps
            .users
            .find_or_create_by_phone(&job.from_number)
            .await
            .map_err(repo_err)
    }

    /// Builds the draft, issues a reference code and stores the context behind it.
    async fn build_document(
        &self,
        job_id: &str,
        user: &User,
        interpretation: &Interpretation,
        result: &AgentResult,
    ) -> Result<(DocumentDraft, ReferenceId), PipelineError> {
        let draft = response_draft(result, interpretation).map_err(|e| {
            tracing::error!(job_id, "Agent output produced an invalid document: {e}");
            PipelineError::Render(e.to_string())
        })?;

        let mut context_data = draft.context_data.clone();
        if let Value::Object(map) = &mut context_data {
            map.insert("jobId".into(), json!(job_id));
            if let Some(previous) = &interpretation.context_recovery {
                map.insert("previousContextId".into(), json!(previous.context_id));
            }
        }

        let reference = self.issue_reference(user, context_data).await?;
        Ok((draft, reference))
    }

    async fn issue_reference(&self, user: &User, context_data: Value) -> Result<ReferenceId, PipelineError> {
        let repo_err = |e: crate::repository::RepoError| PipelineError::Repository(e.to_string());
        let reference = self
            .deps
            .contexts
            .allocate_reference(Utc::now().year())
            .await
            .map_err(repo_err)?;
        self.deps
            .contexts
            .create(NewContext {
                reference_id: reference.to_string(),
                user_id: user.id,
                context_data,
            })
            .await
            .map_err(repo_err)?;
        Ok(reference)
    }

    async fn deliver(
        &self,
        job_id: &str,
        to: &str,
        rendered: &RenderedDocument,
    ) -> Result<DeliveryReceipt, PipelineError> {
        self.deps
            .deliverer
            .deliver(DeliveryRequest {
                pdf: rendered.pdf.clone(),
                to,
                reference: &rendered.document.reference_id,
                job_id,
            })
            .await
            .map_err(PipelineError::from)
    }

    async fn post_actions(
        &self,
        job_id: &str,
        to: &str,
        user: &User,
        is_new_user: bool,
        interpretation: &Interpretation,
        result: &AgentResult,
    ) -> Vec<PostAction> {
        let mut sent = Vec::new();
        for action in post_actions::plan(is_new_user, interpretation, result) {
            let outcome = self
                .deps
                .runner
                .run(job_id, Stage::PostActions, move || async move {
                    // Welcome and help sheets get a footer code but no stored context.
                    let draft = action.draft(user);
                    let reference = self
                        .deps
                        .contexts
                        .allocate_reference(Utc::now().year())
                        .await
                        .map_err(|e| PipelineError::PostAction(e.to_string()))?;
                    let rendered = self
                        .deps
                        .renderer
                        .render(draft, reference)
                        .await
                        .map_err(|e| PipelineError::PostAction(e.to_string()))?;
                    self.deliver(job_id, to, &rendered)
                        .await
                        .map_err(|e| PipelineError::PostAction(e.to_string()))
                })
                .await;
            if let Ok(receipt) = outcome {
                info!(action = action.as_str(), delivery_id = %receipt.delivery_id, "Post-action sent");
                sent.push(action);
            }
        }
        sent
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

use thiserror::Error;

use crate::delivery::DeliveryError;
use crate::render::RenderError;

/// Every stage failure, already classified.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("inbound image unavailable: {0}")]
    InputFetch(String),

    #[error("repository failure: {0}")]
    Repository(String),

    #[error("interpretation failed: {0}")]
    Interpretation(String),

    #[error("agent failed: {0}")]
    Agent(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("delivery rejected (status {status}): {message}")]
    DeliveryClient { status: u16, message: String },

    #[error("delivery failed: {0}")]
    DeliveryTransient(String),

    #[error("context recovery failed: {0}")]
    ContextRecovery(String),

    #[error("post-action failed: {0}")]
    PostAction(String),
}

/// What the stage runner does with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Run the same stage again, within the attempt budget.
    Retry,
    /// Abort the job.
    Terminal,
    /// Log and carry on without the stage's result.
    Skip,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Retry => "retry",
            Disposition::Terminal => "terminal",
            Disposition::Skip => "skip",
        }
    }
}

impl PipelineError {
    pub fn disposition(&self) -> Disposition {
        match self {
            PipelineError::InputFetch(_)
            | PipelineError::Repository(_)
            | PipelineError::Interpretation(_)
            | PipelineError::Agent(_)
            | PipelineError::DeliveryTransient(_) => Disposition::Retry,
            PipelineError::Render(_) | PipelineError::DeliveryClient { .. } => Disposition::Terminal,
            PipelineError::ContextRecovery(_) | PipelineError::PostAction(_) => Disposition::Skip,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InputFetch(_) => "input_fetch",
            PipelineError::Repository(_) => "repository",
            PipelineError::Interpretation(_) => "interpretation",
            PipelineError::Agent(_) => "agent",
            PipelineError::Render(_) => "render",
            PipelineError::DeliveryClient { .. } => "delivery_client",
            PipelineError::DeliveryTransient(_) => "delivery_transient",
            PipelineError::ContextRecovery(_) => "context_recovery",
            PipelineError::PostAction(_) => "post_action",
        }
    }
}

impl From<RenderError> for PipelineError {
    fn from(e: RenderError) -> Self {
        PipelineError::Render(e.to_string())
    }
}

impl From<DeliveryError> for PipelineError {
    fn from(e: DeliveryError) -> Self {
        match e {
            DeliveryError::Client { status, message } => {
                PipelineError::DeliveryClient { status, message }
            }
            other => PipelineError::DeliveryTransient(other.to_string()),
        }
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use super::{Disposition, PipelineError, Stage};
use crate::models::AuditEvent;
use crate::repository::AuditLog;

pub const AUDIT_EVENT: &str = "pipeline_stage";

/// The single place that retries stages and records stage failures.
pub struct StageRunner {
    max_attempts: u32,
    retry_delay: Duration,
    audit: Arc<dyn AuditLog>,
}

impl StageRunner {
    pub fn new(max_attempts: u32, retry_delay: Duration, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            audit,
        }
    }

    /// Attempt budget for `stage`. Delivery retries inside the deliverer with its own
    /// backoff, so the runner gives it one shot.
    pub fn attempts_for(&self, stage: Stage) -> u32 {
        match stage {
            Stage::UploadAndDeliver | Stage::RenderAndPaginate | Stage::PostActions => 1,
            _ => self.max_attempts,
        }
    }

    pub async fn run<T, F, Fut>(&self, job_id: &str, stage: Stage, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let max = self.attempts_for(stage);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let disposition = match err.disposition() {
                Disposition::Retry if attempt >= max => Disposition::Terminal,
                other => other,
            };
            let status = match disposition {
                Disposition::Retry => "retrying",
                Disposition::Skip => "skipped",
                Disposition::Terminal => "failed",
            };

            match disposition {
                Disposition::Retry => warn!(
                    job_id,
                    stage = stage.as_str(),
                    attempt,
                    "Stage failed, retrying: {err}"
                ),
                Disposition::Skip => warn!(
                    job_id,
                    stage = stage.as_str(),
                    "Stage failed, continuing without it: {err}"
                ),
                Disposition::Terminal => error!(
                    job_id,
                    stage = stage.as_str(),
                    attempt,
                    error_kind = err.kind(),
                    "Stage failed, aborting job: {err}"
                ),
            }
            self.audit.record(
                AuditEvent::new(AUDIT_EVENT, status)
                    .job(job_id)
                    .stage(stage.as_str())
                    .attempt(attempt)
                    .error(err.to_string())
                    .details(serde_json::json!({ "errorKind": err.kind() })),
            );

            if disposition != Disposition::Retry {
                return Err(err);
            }
            if !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryAuditLog;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn runner(audit: Arc<MemoryAuditLog>) -> StageRunner {
        StageRunner::new(3, Duration::from_millis(500), audit)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_succeeds_on_second_attempt() {
        let audit = Arc::new(MemoryAuditLog::default());
        let calls = AtomicU32::new(0);
        let out = runner(audit.clone())
            .run("job", Stage::Interpret, || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(PipelineError::Interpretation("timeout".into()))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(audit.statuses(), vec!["retrying"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_become_terminal() {
        let audit = Arc::new(MemoryAuditLog::default());
        let calls = AtomicU32::new(0);
        let err = runner(audit.clone())
            .run("job", Stage::InvokeAgent, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(PipelineError::Agent("boom".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Agent(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(audit.statuses(), vec!["retrying", "retrying", "failed"]);
        assert_eq!(audit.events().last().unwrap().stage.as_deref(), Some("invoke_agent"));
    }

    #[tokio::test]
    async fn test_terminal_is_not_retried() {
        let audit = Arc::new(MemoryAuditLog::default());
        let calls = AtomicU32::new(0);
        let _ = runner(audit.clone())
            .run("job", Stage::BuildDocument, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(PipelineError::Render("bad block".into()))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(audit.statuses(), vec!["failed"]);
    }

    #[tokio::test]
    async fn test_skip_is_reported_once() {
        let audit = Arc::new(MemoryAuditLog::default());
        let result = runner(audit.clone())
            .run("job", Stage::RecoverContext, || async {
                Err::<(), _>(PipelineError::ContextRecovery("db down".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(audit.statuses(), vec!["skipped"]);
    }

    #[tokio::test]
    async fn test_delivery_stage_gets_single_attempt() {
        let audit = Arc::new(MemoryAuditLog::default());
        let calls = AtomicU32::new(0);
        let _ = runner(audit.clone())
            .run("job", Stage::UploadAndDeliver, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(PipelineError::DeliveryTransient("503".into()))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(audit.statuses(), vec!["failed"]);
    }
}

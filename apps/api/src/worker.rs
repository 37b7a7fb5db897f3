//! Job queue: the inbound route pushes `PipelineJob`s onto a Redis list, the worker
//! pops them and runs each through the pipeline with bounded concurrency.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::pipeline::{Pipeline, PipelineJob};

pub const QUEUE_KEY: &str = "faxback:jobs";

/// Seconds a BRPOP waits before looping, so shutdown and reconnects stay responsive.
const POP_TIMEOUT_SECS: u64 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("job payload is not valid: {0}")]
    Payload(#[from] serde_json::Error),
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &PipelineJob) -> Result<(), QueueError>;
}

pub fn encode_job(job: &PipelineJob) -> Result<String, QueueError> {
    Ok(serde_json::to_string(job)?)
}

pub fn decode_job(payload: &str) -> Result<PipelineJob, QueueError> {
    Ok(serde_json::from_str(payload)?)
}

#[derive(Clone)]
pub struct RedisQueue {
    client: redis::Client,
    key: String,
}

impl RedisQueue {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            key: QUEUE_KEY.to_string(),
        }
    }

    async fn connect(&self) -> Result<MultiplexedConnection, QueueError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Blocks for up to `POP_TIMEOUT_SECS`; `Ok(None)` when the list stayed empty.
    async fn pop(&self, conn: &mut MultiplexedConnection) -> Result<Option<String>, QueueError> {
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(POP_TIMEOUT_SECS)
            .query_async(conn)
            .await?;
        Ok(popped.map(|(_, payload)| payload))
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: &PipelineJob) -> Result<(), QueueError> {
        let payload = encode_job(job)?;
        let mut conn = self.connect().await?;
        conn.lpush::<_, _, ()>(&self.key, payload).await?;
        Ok(())
    }
}

/// Consumes the queue forever. At most `concurrency` jobs run at once; a job slot is
/// taken before popping so nothing is dequeued that cannot start right away.
pub async fn run(queue: RedisQueue, pipeline: Arc<Pipeline>, concurrency: usize) {
    let slots = Arc::new(Semaphore::new(concurrency.max(1)));
    info!(concurrency, queue = %queue.key, "Job worker started");

    loop {
        let mut conn = match queue.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Queue connection failed, retrying: {e}");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        loop {
            let Ok(slot) = slots.clone().acquire_owned().await else {
                return;
            };
            let payload = match queue.pop(&mut conn).await {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Queue pop failed, reconnecting: {e}");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    break;
                }
            };

            let job = match decode_job(&payload) {
                Ok(job) => job,
                Err(e) => {
                    error!(payload = %payload, "Dropping malformed job: {e}");
                    continue;
                }
            };

            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let _slot = slot;
                let fax_id = job.fax_id.clone();
                match pipeline.process(job).await {
                    Ok(outcome) => info!(
                        job_id = %fax_id,
                        reference_id = %outcome.reference_id,
                        pages = outcome.pages,
                        "Job finished"
                    ),
                    Err(e) => error!(
                        job_id = %fax_id,
                        error_kind = e.kind(),
                        "Job failed: {e}"
                    ),
                }
            });
        }
    }
}

//! In-memory fakes for every trait seam, shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::collaborators::{
    ActionAgent, AgentRequest, AgentResult, Interpretation, Interpreter, ServiceError,
};
use crate::delivery::{FaxTransmitter, SendRequest, SendResponse, TransmitError};
use crate::document::reference::ReferenceId;
use crate::media::{ImageFetcher, MediaError};
use crate::models::{AuditEvent, ConversationContext, NewContext, User};
use crate::repository::{AuditLog, ContextRepository, RepoError, UserRepository};
use crate::pipeline::PipelineJob;
use crate::storage::{ObjectStore, StorageError};
use crate::worker::{JobQueue, QueueError};

// ── audit ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.status).collect()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ── storage ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    presign_broken: AtomicBool,
}

impl MemoryStore {
    /// Makes every later `presigned_url` call fail as the S3 signer would.
    pub fn break_presigning(&self) {
        self.presign_broken.store(true, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn insert(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String, StorageError> {
        self.insert(key, bytes);
        Ok(format!("mem://{key}"))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn presigned_url(&self, locator: &str, ttl: Duration) -> Result<String, StorageError> {
        if self.presign_broken.load(Ordering::SeqCst) {
            return Err(StorageError::S3("presigning config rejected".into()));
        }
        let key = locator
            .strip_prefix("mem://")
            .ok_or_else(|| StorageError::ForeignLocator(locator.to_string()))?;
        Ok(format!("https://storage.test/{key}?ttl={}", ttl.as_secs()))
    }
}

// ── queue ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryQueue {
    jobs: Mutex<Vec<PipelineJob>>,
}

impl MemoryQueue {
    pub fn jobs(&self) -> Vec<PipelineJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: &PipelineJob) -> Result<(), QueueError> {
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

// ── transmitter ─────────────────────────────────────────────────────────────

/// Plays back a fixed list of results, one per call; the last one repeats.
pub struct ScriptedTransmitter {
    script: Mutex<VecDeque<Result<String, TransmitError>>>,
    requests: Mutex<Vec<SendRequest>>,
}

impl ScriptedTransmitter {
    pub fn new(script: Vec<Result<&str, TransmitError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(|r| r.map(str::to_string)).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<SendRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FaxTransmitter for ScriptedTransmitter {
    async fn send(&self, request: &SendRequest) -> Result<SendResponse, TransmitError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match next {
            Some(Ok(id)) => Ok(SendResponse {
                external_id: id,
                status: "queued".into(),
            }),
            Some(Err(e)) => Err(e),
            None => Err(TransmitError::Transient {
                status: None,
                message: "no scripted response".into(),
            }),
        }
    }
}

// ── images ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StaticImageFetcher {
    images: HashMap<String, Vec<u8>>,
    fetches: AtomicU32,
}

impl StaticImageFetcher {
    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.images.insert(url.to_string(), bytes);
        self
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for StaticImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.images.get(url).cloned().ok_or(MediaError::Status(404))
    }
}

// ── repositories ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryUsers {
    users: Mutex<HashMap<String, User>>,
}

#[async_trait]
impl UserRepository for MemoryUsers {
    async fn find_or_create_by_phone(&self, phone_number: &str) -> Result<(User, bool), RepoError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get(phone_number) {
            return Ok((user.clone(), false));
        }
        let user = User {
            id: Uuid::new_v4(),
            phone_number: phone_number.to_string(),
            display_name: None,
            created_at: Utc::now(),
        };
        users.insert(phone_number.to_string(), user.clone());
        Ok((user, true))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.id == id).cloned())
    }
}

impl MemoryUsers {
    pub fn seed(&self, phone_number: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            phone_number: phone_number.to_string(),
            display_name: Some("Ada".into()),
            created_at: Utc::now(),
        };
        self.users
            .lock()
            .unwrap()
            .insert(phone_number.to_string(), user.clone());
        user
    }

    pub fn count(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[derive(Default)]
pub struct MemoryContexts {
    contexts: Mutex<Vec<ConversationContext>>,
    next_number: AtomicU32,
    failing: AtomicBool,
}

impl MemoryContexts {
    /// Makes every subsequent call fail with a database-style error.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<ConversationContext> {
        self.contexts.lock().unwrap().clone()
    }

    pub fn insert(&self, user_id: Uuid, context_data: Value, created_at: DateTime<Utc>) -> ConversationContext {
        let number = self.next_number.fetch_add(1, Ordering::SeqCst) + 1;
        let context = ConversationContext {
            id: Uuid::new_v4(),
            reference_id: format!("FX-2025-{number:06}"),
            user_id,
            context_data,
            created_at,
        };
        self.contexts.lock().unwrap().push(context.clone());
        context
    }

    fn check(&self) -> Result<(), RepoError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Corrupt("simulated outage".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContextRepository for MemoryContexts {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ConversationContext>, RepoError> {
        self.check()?;
        Ok(self.contexts.lock().unwrap().iter().find(|c| c.id == id).cloned())
    }

    async fn find_by_reference(
        &self,
        reference: &ReferenceId,
    ) -> Result<Option<ConversationContext>, RepoError> {
        self.check()?;
        Ok(self
            .contexts
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.reference_id == reference.as_str())
            .cloned())
    }

    async fn recent_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ConversationContext>, RepoError> {
        self.check()?;
        let mut found: Vec<ConversationContext> = self
            .contexts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.user_id == user_id && c.created_at >= since)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn allocate_reference(&self, year: i32) -> Result<ReferenceId, RepoError> {
        self.check()?;
        let number = self.next_number.fetch_add(1, Ordering::SeqCst) + 1;
        ReferenceId::new(year, number).map_err(|e| RepoError::Corrupt(e.to_string()))
    }

    async fn create(&self, context: NewContext) -> Result<ConversationContext, RepoError> {
        self.check()?;
        let row = ConversationContext {
            id: Uuid::new_v4(),
            reference_id: context.reference_id,
            user_id: context.user_id,
            context_data: context.context_data,
            created_at: Utc::now(),
        };
        self.contexts.lock().unwrap().push(row.clone());
        Ok(row)
    }
}

// ── collaborators ───────────────────────────────────────────────────────────

/// Fails the first `failures` calls, then returns `reply`.
pub struct ScriptedInterpreter {
    reply: Interpretation,
    failures: AtomicU32,
    calls: AtomicU32,
}

impl ScriptedInterpreter {
    pub fn new(reply: Interpretation) -> Self {
        Self {
            reply,
            failures: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing_first(self, failures: u32) -> Self {
        self.failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Interpreter for ScriptedInterpreter {
    async fn interpret(&self, _image: &[u8], _user_id: Uuid) -> Result<Interpretation, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ServiceError::Api {
                status: 503,
                message: "interpreter overloaded".into(),
            });
        }
        Ok(self.reply.clone())
    }
}

/// Returns `reply` and remembers the interpretation it was given.
pub struct ScriptedAgent {
    reply: AgentResult,
    seen: Mutex<Vec<Interpretation>>,
}

impl ScriptedAgent {
    pub fn new(reply: AgentResult) -> Self {
        Self {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<Interpretation> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionAgent for ScriptedAgent {
    async fn execute(&self, request: AgentRequest<'_>) -> Result<AgentResult, ServiceError> {
        self.seen.lock().unwrap().push(request.interpretation.clone());
        Ok(self.reply.clone())
    }
}

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Where finished faxes go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Upload to object storage and send through the fax API.
    Live,
    /// Write PDFs to a local outbox; nothing leaves the machine.
    Mock,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Live => "live",
            DeliveryMode::Mock => "mock",
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(DeliveryMode::Live),
            "mock" => Ok(DeliveryMode::Mock),
            other => bail!("DELIVERY_MODE must be 'live' or 'mock', got '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone)]
pub struct FaxApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub from_number: String,
    pub webhook_url: String,
}

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub delivery_mode: DeliveryMode,
    /// Present in live mode only.
    pub s3: Option<S3Config>,
    /// Present in live mode only.
    pub fax_api: Option<FaxApiConfig>,
    pub mock_outbox_dir: PathBuf,
    pub interpreter_url: String,
    pub agent_url: String,
    pub collaborator_api_key: Option<String>,
    pub delivery_max_attempts: u32,
    pub delivery_backoff_base: Duration,
    pub stage_max_attempts: u32,
    pub stage_retry_delay: Duration,
    pub presigned_url_ttl: Duration,
    pub network_timeout: Duration,
    pub image_max_bytes: usize,
    pub image_cache_ttl_secs: u64,
    pub render_workers: usize,
    pub job_concurrency: usize,
    pub context_window_days: i64,
    pub support_contact: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let delivery_mode: DeliveryMode = env.parsed("DELIVERY_MODE", DeliveryMode::Live)?;

        let (s3, fax_api) = match delivery_mode {
            DeliveryMode::Live => (
                Some(S3Config {
                    bucket: env.require("S3_BUCKET")?,
                    endpoint: env.require("S3_ENDPOINT")?,
                    access_key_id: env.require("AWS_ACCESS_KEY_ID")?,
                    secret_access_key: env.require("AWS_SECRET_ACCESS_KEY")?,
                }),
                Some(FaxApiConfig {
                    base_url: env.require("FAX_API_URL")?,
                    api_key: env.require("FAX_API_KEY")?,
                    from_number: env.require("FAX_FROM_NUMBER")?,
                    webhook_url: env.require("FAX_WEBHOOK_URL")?,
                }),
            ),
            DeliveryMode::Mock => (None, None),
        };

        Ok(Config {
            database_url: env.require("DATABASE_URL")?,
            redis_url: env.require("REDIS_URL")?,
            delivery_mode,
            s3,
            fax_api,
            mock_outbox_dir: env.get("MOCK_OUTBOX_DIR").unwrap_or_else(|| "./outbox".into()).into(),
            interpreter_url: env.require("INTERPRETER_URL")?,
            agent_url: env.require("AGENT_URL")?,
            collaborator_api_key: env.get("COLLABORATOR_API_KEY").filter(|k| !k.is_empty()),
            delivery_max_attempts: env.parsed("DELIVERY_MAX_ATTEMPTS", 3)?,
            delivery_backoff_base: Duration::from_millis(env.parsed("DELIVERY_BACKOFF_BASE_MS", 1000)?),
            stage_max_attempts: env.parsed("STAGE_MAX_ATTEMPTS", 3)?,
            stage_retry_delay: Duration::from_millis(env.parsed("STAGE_RETRY_DELAY_MS", 500)?),
            presigned_url_ttl: Duration::from_secs(env.parsed("PRESIGNED_URL_TTL_SECS", 3600)?),
            network_timeout: Duration::from_secs(env.parsed("NETWORK_TIMEOUT_SECS", 30)?),
            image_max_bytes: env.parsed("IMAGE_MAX_BYTES", 10 * 1024 * 1024)?,
            image_cache_ttl_secs: env.parsed("IMAGE_CACHE_TTL_SECS", 86_400)?,
            render_workers: env.parsed("RENDER_WORKERS", 2)?,
            job_concurrency: env.parsed("JOB_CONCURRENCY", 8)?,
            context_window_days: env.parsed("CONTEXT_WINDOW_DAYS", 7)?,
            support_contact: env
                .get("SUPPORT_CONTACT")
                .unwrap_or_else(|| "support@faxback.example / +1-800-555-0100".into()),
            port: env.parsed("PORT", 8080)?,
            rust_log: env.get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .with_context(|| format!("Required environment variable '{key}' is not set"))
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}")),
        }
    }
}

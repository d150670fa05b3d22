use serde::{Deserialize, Serialize};

const GIB: u64 = 1024 * 1024 * 1024;

/// Deployment-level engine settings. Constructed by the host and injected
/// into the engine; nothing here is read from ambient globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Encrypt object payloads at rest unless an upload overrides it.
    pub encrypt_at_rest: bool,
    /// Server-held passphrase for at-rest encryption. Required when any
    /// upload ends up encrypted.
    pub master_passphrase: Option<String>,
    /// Quota ceiling for users without an explicit override.
    pub default_quota_bytes: u64,
    /// Lifetime of issued signed URLs, seconds.
    pub signed_url_ttl_secs: u64,
    /// Decrypted-payload cache capacity, entries.
    pub cache_capacity: usize,
    /// Idempotency tokens retained for replay, oldest evicted first. The
    /// token table is process-local and empty after a restart.
    pub idempotency_capacity: usize,
    /// Attempts for retryable object-store failures.
    pub retry_max_attempts: u32,
    /// Initial backoff between attempts, milliseconds.
    pub retry_initial_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            encrypt_at_rest: false,
            master_passphrase: None,
            default_quota_bytes: 10 * GIB,
            signed_url_ttl_secs: 900,
            cache_capacity: 64,
            idempotency_capacity: 1024,
            retry_max_attempts: 3,
            retry_initial_delay_ms: 100,
        }
    }
}

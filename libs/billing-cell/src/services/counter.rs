use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use shared_database::SupabaseClient;

use crate::error::BillingError;
use crate::models::{CounterKey, SessionOrdinal};

/// Atomic per-key increment. Each call returns a distinct value and no
/// increment is ever lost; a key seen for the first time starts from zero.
#[async_trait]
pub trait SessionCounter: Send + Sync {
    async fn increment_and_get(&self, key: &CounterKey) -> Result<u64, BillingError>;
}

// ==============================================================================
// IN-PROCESS COUNTER
// ==============================================================================

#[derive(Default)]
pub struct InMemorySessionCounter {
    counts: Mutex<HashMap<CounterKey, u64>>,
}

impl InMemorySessionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `key` at `count` already consumed sessions.
    pub fn with_count(key: CounterKey, count: u64) -> Self {
        let mut counts = HashMap::new();
        counts.insert(key, count);
        Self {
            counts: Mutex::new(counts),
        }
    }

    pub async fn current(&self, key: &CounterKey) -> u64 {
        self.counts.lock().await.get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SessionCounter for InMemorySessionCounter {
    async fn increment_and_get(&self, key: &CounterKey) -> Result<u64, BillingError> {
        let mut counts = self.counts.lock().await;
        let count = counts.entry(key.clone()).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

// ==============================================================================
// REDIS COUNTER
// ==============================================================================

pub struct RedisSessionCounter {
    pool: Pool,
}

impl RedisSessionCounter {
    pub fn new(redis_url: &str) -> Result<Self, BillingError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            BillingError::RedisError(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Failed to create Redis pool",
                format!("Pool creation error: {}", e),
            )))
        })?;
        Ok(Self { pool })
    }

    /// Build the pool and verify the server answers.
    pub async fn connect(redis_url: &str) -> Result<Self, BillingError> {
        let counter = Self::new(redis_url)?;
        let mut conn = counter.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis session counter initialized successfully");
        Ok(counter)
    }

    async fn get_connection(&self) -> Result<Connection, BillingError> {
        self.pool
            .get()
            .await
            .map_err(|e| BillingError::CounterUnavailable(format!("Failed to get Redis connection: {}", e)))
    }
}

#[async_trait]
impl SessionCounter for RedisSessionCounter {
    async fn increment_and_get(&self, key: &CounterKey) -> Result<u64, BillingError> {
        let mut conn = self.get_connection().await?;
        let value: u64 = conn.incr(key.to_string(), 1u64).await?;
        debug!("{} is now {}", key, value);
        Ok(value)
    }
}

// ==============================================================================
// SUPABASE COUNTER
// ==============================================================================

/// Calls the `increment_session_counter(counter_key text) returns bigint`
/// function, which upserts and increments in one statement.
pub struct SupabaseSessionCounter {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseSessionCounter {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl SessionCounter for SupabaseSessionCounter {
    async fn increment_and_get(&self, key: &CounterKey) -> Result<u64, BillingError> {
        self.supabase
            .rpc("increment_session_counter", json!({ "counter_key": key.to_string() }))
            .await
            .map_err(|e| BillingError::CounterUnavailable(e.to_string()))
    }
}

// ==============================================================================
// CAPACITY CLASSIFICATION
// ==============================================================================

/// Counter plus the yearly threshold it is measured against.
pub struct CapacityCounter {
    counter: Arc<dyn SessionCounter>,
    threshold: u64,
}

impl CapacityCounter {
    pub fn new(counter: Arc<dyn SessionCounter>, threshold: u64) -> Self {
        Self { counter, threshold }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub async fn increment_and_classify(&self, program_key: &str, year: i32) -> Result<SessionOrdinal, BillingError> {
        let key = CounterKey::new(program_key, year);
        let ordinal = self.counter.increment_and_get(&key).await?;

        Ok(SessionOrdinal {
            ordinal,
            over_cap: ordinal > self.threshold,
        })
    }
}

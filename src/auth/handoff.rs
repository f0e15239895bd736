//! One-time, expiring storage for the access token handed to the storefront
//! after sign-in. The storefront redeems the session id exactly once.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument};

const REDIS_KEY_PREFIX: &str = "storefront:handoff:";

#[derive(Debug, Error)]
pub enum HandoffStoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[async_trait]
pub trait SessionHandoffStore: Send + Sync {
    /// Stores `access_token` under `session_id` for at most `ttl`.
    async fn put(
        &self,
        session_id: &str,
        access_token: &str,
        ttl: Duration,
    ) -> Result<(), HandoffStoreError>;

    /// Removes and returns the token, or `None` when unknown or expired.
    async fn take(&self, session_id: &str) -> Result<Option<String>, HandoffStoreError>;

    fn backend(&self) -> &'static str;
}

/// Single-process store, suitable for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryHandoffStore {
    entries: DashMap<String, (String, Instant)>,
}

impl InMemoryHandoffStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionHandoffStore for InMemoryHandoffStore {
    async fn put(
        &self,
        session_id: &str,
        access_token: &str,
        ttl: Duration,
    ) -> Result<(), HandoffStoreError> {
        self.purge_expired();
        self.entries.insert(
            session_id.to_string(),
            (access_token.to_string(), Instant::now() + ttl),
        );
        Ok(())
    }

    async fn take(&self, session_id: &str) -> Result<Option<String>, HandoffStoreError> {
        let token = self
            .entries
            .remove(session_id)
            .and_then(|(_, (token, expires_at))| (expires_at > Instant::now()).then_some(token));
        self.purge_expired();
        Ok(token)
    }

    fn backend(&self) -> &'static str {
        "in-memory"
    }
}

/// Redis-backed store shared by every API instance.
#[derive(Clone)]
pub struct RedisHandoffStore {
    connection: ConnectionManager,
}

impl RedisHandoffStore {
    pub async fn connect(client: redis::Client) -> Result<Self, HandoffStoreError> {
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection })
    }

    fn key(session_id: &str) -> String {
        format!("{}{}", REDIS_KEY_PREFIX, session_id)
    }
}

#[async_trait]
impl SessionHandoffStore for RedisHandoffStore {
    #[instrument(skip(self, access_token))]
    async fn put(
        &self,
        session_id: &str,
        access_token: &str,
        ttl: Duration,
    ) -> Result<(), HandoffStoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("SET")
            .arg(Self::key(session_id))
            .arg(access_token)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        debug!("handoff stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn take(&self, session_id: &str) -> Result<Option<String>, HandoffStoreError> {
        let mut conn = self.connection.clone();
        let key = Self::key(session_id);
        // GET and DEL in one MULTI so a token is never handed out twice
        let (token, _deleted): (Option<String>, i64) = redis::pipe()
            .atomic()
            .cmd("GET")
            .arg(&key)
            .cmd("DEL")
            .arg(&key)
            .query_async(&mut conn)
            .await?;
        Ok(token)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

//! Typed facade over a Redis-compatible store — spec §4.1 (C1).
//!
//! The rest of `redwork` never touches the `redis` crate directly; every
//! store interaction funnels through [`StoreFacade`] so the wire contract
//! (key names, value shapes) stays entirely owned by `redwork_protocol` and
//! this crate doesn't need to know what a key's value *means*.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use std::time::Duration;

/// Opaque bytes in, opaque bytes out. `StoreFacade` never inspects a value.
pub type Value = Vec<u8>;

/// Primitive store operations the dispatcher needs — spec §6's "store
/// primitives required" list, plus a batch scope for atomic multi-command
/// writes (envelope + live-sentinel, chunk pushes, cleanup's snapshot+delete).
#[async_trait]
pub trait StoreFacade: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, RedisError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), RedisError>;
    async fn del(&self, keys: &[String]) -> Result<(), RedisError>;
    async fn exists(&self, key: &str) -> Result<bool, RedisError>;
    /// Server-side `KEYS pattern`. Spec treats the store as trusted/small
    /// (single dispatcher's own namespace), so a full scan is acceptable.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, RedisError>;
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Value>>, RedisError>;
    async fn rpush(&self, list: &str, value: Value) -> Result<(), RedisError>;
    async fn lpush(&self, list: &str, value: Value) -> Result<(), RedisError>;
    /// `BRPOP list timeout`. `None` means the timeout elapsed with nothing
    /// to pop — the only suspension point in the master's event loop.
    async fn brpop(&self, list: &str, timeout: Duration) -> Result<Option<Value>, RedisError>;
    async fn llen(&self, list: &str) -> Result<u64, RedisError>;
    async fn lrange(&self, list: &str, start: isize, stop: isize) -> Result<Vec<Value>, RedisError>;

    /// Opens a batch scope: commands queued via [`Batch`] run as one
    /// pipelined `MULTI`/`EXEC` transaction, atomically, returning nothing
    /// to the caller until [`Batch::execute`] is called.
    fn batch(&self) -> Batch;

    /// Runs a previously-built batch against this connection.
    async fn execute_batch(&self, batch: Batch) -> Result<(), RedisError>;
}

/// One queued write inside a [`Batch`].
///
/// Kept as a plain enum rather than a `redis::Pipeline` directly so the
/// in-memory `testkit::FakeStore` used by `redwork_core`'s tests can replay
/// a batch without a live Redis connection; `RedisStore` turns it into a
/// real pipelined `MULTI`/`EXEC` at execute time.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Set(String, Value),
    Del(String),
    RPush(String, Value),
    LPush(String, Value),
}

/// A buffered sequence of writes executed atomically by [`StoreFacade::execute_batch`].
///
/// Mirrors the teacher pack's pipelined-writes idiom (build a `Pipeline`,
/// queue commands, execute once) — see `other_examples`' `dimfeld-ergo` queue
/// module, which always constructs a `Pipeline` up front rather than issuing
/// N round-trips.
#[derive(Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn set(&mut self, key: &str, value: Value) -> &mut Self {
        self.ops.push(BatchOp::Set(key.to_string(), value));
        self
    }

    pub fn del(&mut self, key: &str) -> &mut Self {
        self.ops.push(BatchOp::Del(key.to_string()));
        self
    }

    pub fn rpush(&mut self, list: &str, value: Value) -> &mut Self {
        self.ops.push(BatchOp::RPush(list.to_string(), value));
        self
    }

    pub fn lpush(&mut self, list: &str, value: Value) -> &mut Self {
        self.ops.push(BatchOp::LPush(list.to_string(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

/// Production [`StoreFacade`] backed by `redis`'s auto-reconnecting
/// [`ConnectionManager`].
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Opens a connection to `redis://host:port/db`, optionally authenticating.
    /// Connection opening is part of registration (spec §4.2) — it fails
    /// fast if the store is unreachable.
    pub async fn connect(
        host: &str,
        port: u16,
        db: i64,
        password: Option<&str>,
    ) -> Result<Self, RedisError> {
        let auth = match password {
            Some(p) => format!(":{p}@"),
            None => String::new(),
        };
        let url = format!("redis://{auth}{host}:{port}/{db}");
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl StoreFacade for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, RedisError> {
        self.conn.clone().get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), RedisError> {
        self.conn.clone().set(key, value).await
    }

    async fn del(&self, keys: &[String]) -> Result<(), RedisError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.conn.clone().del(keys).await
    }

    async fn exists(&self, key: &str) -> Result<bool, RedisError> {
        self.conn.clone().exists(key).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, RedisError> {
        self.conn.clone().keys(pattern).await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Value>>, RedisError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.conn.clone().mget(keys).await
    }

    async fn rpush(&self, list: &str, value: Value) -> Result<(), RedisError> {
        let _: i64 = self.conn.clone().rpush(list, value).await?;
        Ok(())
    }

    async fn lpush(&self, list: &str, value: Value) -> Result<(), RedisError> {
        let _: i64 = self.conn.clone().lpush(list, value).await?;
        Ok(())
    }

    async fn brpop(&self, list: &str, timeout: Duration) -> Result<Option<Value>, RedisError> {
        let result: Option<(String, Value)> =
            self.conn.clone().brpop(list, timeout.as_secs_f64()).await?;
        Ok(result.map(|(_, value)| value))
    }

    async fn llen(&self, list: &str) -> Result<u64, RedisError> {
        self.conn.clone().llen(list).await
    }

    async fn lrange(&self, list: &str, start: isize, stop: isize) -> Result<Vec<Value>, RedisError> {
        self.conn.clone().lrange(list, start, stop).await
    }

    fn batch(&self) -> Batch {
        Batch::new()
    }

    async fn execute_batch(&self, batch: Batch) -> Result<(), RedisError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut pipeline = redis::Pipeline::new();
        pipeline.atomic();
        for op in batch.ops() {
            match op {
                BatchOp::Set(key, value) => {
                    pipeline.cmd("SET").arg(key).arg(value).ignore();
                }
                BatchOp::Del(key) => {
                    pipeline.cmd("DEL").arg(key).ignore();
                }
                BatchOp::RPush(list, value) => {
                    pipeline.cmd("RPUSH").arg(list).arg(value).ignore();
                }
                BatchOp::LPush(list, value) => {
                    pipeline.cmd("LPUSH").arg(list).arg(value).ignore();
                }
            }
        }
        let mut conn = self.conn.clone();
        let _: () = pipeline.query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch_executes_no_commands() {
        let batch = Batch::new();
        assert!(batch.is_empty());
    }

    #[test]
    fn batch_tracks_queued_commands() {
        let mut batch = Batch::new();
        batch.set("k", b"v".to_vec());
        assert!(!batch.is_empty());
    }
}

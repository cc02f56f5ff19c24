//! In-memory fake store plus a simulated worker loop, used by this crate's
//! own integration tests to exercise dispatch/fault/cleanup behavior
//! without a live Redis server — grounded in the teacher's
//! `casparian_sentinel/tests/integration.rs` pattern of driving an
//! in-process counterpart rather than mocking every call.

#![cfg(any(test, feature = "testkit"))]

use async_trait::async_trait;
use redis::RedisError;
use redwork_protocol::naming::QueueKeys;
use redwork_protocol::{ResultChunk, TaskChunk};
use redwork_store::{Batch, BatchOp, StoreFacade, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

#[derive(Default)]
struct Inner {
    strings: HashMap<String, Value>,
    lists: HashMap<String, VecDeque<Value>>,
}

/// An in-memory [`StoreFacade`] good enough to drive the real coordinator
/// logic end to end. Pattern matching for `keys()` only supports the
/// `prefix*` and `prefix*suffix` shapes this codebase's key schema
/// actually produces — it is not a general glob implementation.
pub struct FakeStore {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new(Inner::default()), notify: Notify::new() })
    }

    fn matches(pattern: &str, key: &str) -> bool {
        match pattern.split_once('*') {
            None => pattern == key,
            Some((prefix, suffix)) => key.starts_with(prefix) && key.ends_with(suffix),
        }
    }
}

#[async_trait]
impl StoreFacade for FakeStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, RedisError> {
        Ok(self.inner.lock().await.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), RedisError> {
        self.inner.lock().await.strings.insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), RedisError> {
        let mut inner = self.inner.lock().await;
        for key in keys {
            inner.strings.remove(key);
            inner.lists.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, RedisError> {
        let inner = self.inner.lock().await;
        Ok(inner.strings.contains_key(key) || inner.lists.contains_key(key))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, RedisError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<String> = inner
            .strings
            .keys()
            .chain(inner.lists.keys())
            .filter(|key| Self::matches(pattern, key))
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Value>>, RedisError> {
        let inner = self.inner.lock().await;
        Ok(keys.iter().map(|key| inner.strings.get(key).cloned()).collect())
    }

    async fn rpush(&self, list: &str, value: Value) -> Result<(), RedisError> {
        self.inner.lock().await.lists.entry(list.to_string()).or_default().push_back(value);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn lpush(&self, list: &str, value: Value) -> Result<(), RedisError> {
        self.inner.lock().await.lists.entry(list.to_string()).or_default().push_front(value);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn brpop(&self, list: &str, timeout: Duration) -> Result<Option<Value>, RedisError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(value) = inner.lists.get_mut(list).and_then(|l| l.pop_back()) {
                    return Ok(Some(value));
                }
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(deadline - now) => return Ok(None),
            }
        }
    }

    async fn llen(&self, list: &str) -> Result<u64, RedisError> {
        Ok(self.inner.lock().await.lists.get(list).map(|l| l.len() as u64).unwrap_or(0))
    }

    async fn lrange(&self, list: &str, start: isize, stop: isize) -> Result<Vec<Value>, RedisError> {
        let inner = self.inner.lock().await;
        let Some(values) = inner.lists.get(list) else { return Ok(Vec::new()) };
        let len = values.len() as isize;
        if len == 0 {
            return Ok(Vec::new());
        }
        let norm_start = if start < 0 { (len + start).max(0) } else { start.min(len) };
        let norm_stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if norm_stop < norm_start {
            return Ok(Vec::new());
        }
        Ok(values
            .iter()
            .skip(norm_start as usize)
            .take((norm_stop - norm_start + 1) as usize)
            .cloned()
            .collect())
    }

    fn batch(&self) -> Batch {
        Batch::new()
    }

    async fn execute_batch(&self, batch: Batch) -> Result<(), RedisError> {
        let mut inner = self.inner.lock().await;
        let mut touched_list = false;
        for op in batch.ops() {
            match op {
                BatchOp::Set(key, value) => {
                    inner.strings.insert(key.clone(), value.clone());
                }
                BatchOp::Del(key) => {
                    inner.strings.remove(key);
                    inner.lists.remove(key);
                }
                BatchOp::RPush(list, value) => {
                    inner.lists.entry(list.clone()).or_default().push_back(value.clone());
                    touched_list = true;
                }
                BatchOp::LPush(list, value) => {
                    inner.lists.entry(list.clone()).or_default().push_front(value.clone());
                    touched_list = true;
                }
            }
        }
        drop(inner);
        if touched_list {
            self.notify.notify_waiters();
        }
        Ok(())
    }
}

/// A simulated worker: pops chunks off `Q`, marks itself started/alive,
/// applies `process` to produce a value per index (or per chunk, under
/// two-level reduction), pushes results, then clears its markers.
pub struct SimulatedWorker {
    store: Arc<FakeStore>,
    queue: String,
    token: String,
}

impl SimulatedWorker {
    pub fn new(store: Arc<FakeStore>, queue: impl Into<String>, token: impl Into<String>) -> Self {
        Self { store, queue, token: token.into() }
    }

    /// Pops and processes chunks until `Q` stays empty for one poll, or
    /// `max_chunks` have been handled (whichever comes first). Returns the
    /// number of result entries pushed.
    pub async fn drain(&self, process: impl Fn(u64, &redwork_protocol::ArgsTuple) -> Vec<u8>) -> usize {
        let keys = QueueKeys::new(&self.queue);
        let mut pushed = 0usize;
        loop {
            let Some(raw) = self.store.brpop(&keys.tasks(), Duration::from_millis(50)).await.unwrap() else {
                break;
            };
            let chunk: TaskChunk = serde_json::from_slice(&raw).unwrap();
            let indices: Vec<u64> = chunk.args_list.keys().copied().collect();

            let start_key = keys.start(&chunk.id, &self.token);
            let alive_key = keys.alive(&chunk.id, &self.token);
            self.store.set(&start_key, serde_json::to_vec(&indices).unwrap()).await.unwrap();
            self.store.set(&alive_key, Vec::new()).await.unwrap();

            let out_key = keys.out(&chunk.id);
            match chunk.slot {
                Some(slot) => {
                    // Two-level: fold locally, push one result for the chunk.
                    let mut combined = Vec::new();
                    for (idx, tuple) in &chunk.args_list {
                        combined.extend(process(*idx, tuple));
                    }
                    let result = ResultChunk { slot, value: redwork_protocol::Blob::new(combined) };
                    self.store.rpush(&out_key, serde_json::to_vec(&result).unwrap()).await.unwrap();
                    pushed += 1;
                }
                None => {
                    for (idx, tuple) in &chunk.args_list {
                        let value = process(*idx, tuple);
                        let result = ResultChunk { slot: *idx, value: redwork_protocol::Blob::new(value) };
                        self.store.rpush(&out_key, serde_json::to_vec(&result).unwrap()).await.unwrap();
                        pushed += 1;
                    }
                }
            }

            self.store.del(&[start_key, alive_key]).await.unwrap();
        }
        pushed
    }
}

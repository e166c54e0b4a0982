//! In-process [`Store`] with the same observable semantics as Redis.
//!
//! All state sits behind one mutex, so every trait call (including the window
//! cycle) is indivisible. Expired keys are dropped lazily on access, using the
//! injected [`Clock`] so tests can move time forward deterministically.

use super::{Store, StoreError, WindowSnapshot};
use crate::clock::{secs_to_millis, Clock, SystemClock};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Counter(i64),
    /// (score, member), kept sorted by score then member.
    Window(Vec<(i64, String)>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at_ms: Option<i64>,
}

#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.data
            .lock()
            .values()
            .filter(|e| e.expires_at_ms.map_or(true, |at| at > now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_if_expired(data: &mut HashMap<String, Entry>, key: &str, now: i64) {
        let expired = data
            .get(key)
            .and_then(|e| e.expires_at_ms)
            .is_some_and(|at| at <= now);
        if expired {
            data.remove(key);
        }
    }

    /// INCR semantics on an already-purged map.
    fn bump(data: &mut HashMap<String, Entry>, key: &str) -> Result<i64, StoreError> {
        let entry = data.entry(key.to_string()).or_insert(Entry {
            value: Value::Counter(0),
            expires_at_ms: None,
        });
        match &mut entry.value {
            Value::Counter(n) => {
                *n += 1;
                Ok(*n)
            }
            Value::Text(s) => {
                let n = s
                    .parse::<i64>()
                    .map_err(|_| Self::wrong_type(key, "integer"))?
                    + 1;
                entry.value = Value::Counter(n);
                Ok(n)
            }
            Value::Window(_) => Err(Self::wrong_type(key, "integer")),
        }
    }

    fn wrong_type(key: &str, expected: &str) -> StoreError {
        StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("expected {}", expected),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn slide_window(
        &self,
        key: &str,
        now_ms: i64,
        window_start_ms: i64,
        max: u64,
        window_secs: u64,
        request_id: &str,
    ) -> Result<WindowSnapshot, StoreError> {
        let clock_now = self.clock.now_millis();
        let mut data = self.data.lock();
        Self::purge_if_expired(&mut data, key, clock_now);

        let entry = data.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Window(Vec::new()),
            expires_at_ms: None,
        });
        let Value::Window(set) = &mut entry.value else {
            return Err(Self::wrong_type(key, "window set"));
        };

        set.retain(|(score, _)| *score > window_start_ms);

        let mut allowed = false;
        if (set.len() as u64) < max {
            set.retain(|(_, member)| member != request_id);
            set.push((now_ms, request_id.to_string()));
            set.sort();
            allowed = true;
        }

        let count = set.len() as u64;
        let oldest_ms = set.first().map(|(score, _)| *score).filter(|s| *s > 0);
        entry.expires_at_ms =
            Some(clock_now.saturating_add(secs_to_millis(window_secs.saturating_add(1))));

        Ok(WindowSnapshot {
            allowed,
            count,
            oldest_ms,
        })
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock();
        Self::purge_if_expired(&mut data, key, now);
        Self::bump(&mut data, key)
    }

    async fn incr_with_ttl(&self, key: &str, secs: u64) -> Result<i64, StoreError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock();
        Self::purge_if_expired(&mut data, key, now);
        let n = Self::bump(&mut data, key)?;
        if n == 1 {
            if let Some(entry) = data.get_mut(key) {
                entry.expires_at_ms = Some(now.saturating_add(secs_to_millis(secs)));
            }
        }
        Ok(n)
    }

    async fn expire(&self, key: &str, secs: u64) -> Result<(), StoreError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock();
        Self::purge_if_expired(&mut data, key, now);
        if let Some(entry) = data.get_mut(key) {
            entry.expires_at_ms = Some(now.saturating_add(secs_to_millis(secs)));
        }
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, secs: u64) -> Result<(), StoreError> {
        let now = self.clock.now_millis();
        self.data.lock().insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at_ms: Some(now.saturating_add(secs_to_millis(secs))),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock();
        Self::purge_if_expired(&mut data, key, now);
        match data.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s.clone())),
            Some(Value::Counter(n)) => Ok(Some(n.to_string())),
            Some(Value::Window(_)) => Err(Self::wrong_type(key, "string")),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock();
        Self::purge_if_expired(&mut data, key, now);
        Ok(data.contains_key(key))
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock();
        Self::purge_if_expired(&mut data, key, now);
        Ok(data
            .get(key)
            .and_then(|e| e.expires_at_ms)
            .map(|at| ((at - now) as u64).div_ceil(1000)))
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock();
        Self::purge_if_expired(&mut data, key, now);
        Ok(data.remove(key).is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

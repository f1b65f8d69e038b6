//! Redis-backed store.
//!
//! The backlog is a Redis list, the worker maps are hashes and the problem
//! markers are plain keys with an expiry, so several orchestrator processes
//! and outside tooling can share and inspect the same state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use redis::{Client, Cmd, Connection, FromRedisValue};
use tracing::{info, warn};

use super::{KeyValueStore, StoreError};

/// Redis-backed key/value store.
///
/// Uses one blocking connection, opened on first use and reopened after the
/// server drops it.
pub struct RedisStore {
    client: Client,
    conn: Mutex<Option<Connection>>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection", &"Connection")
            .finish()
    }
}

impl RedisStore {
    /// Parse `url` (`redis://`, `rediss://` or `unix://`). No connection is
    /// made until the first command.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)
            .map_err(|e| StoreError::Backend(format!("invalid Redis URL: {e}")))?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
        })
    }

    fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, StoreError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("redis store lock poisoned".to_string()))?;

        if guard.is_none() {
            let conn = self.client.get_connection()?;
            info!("Connected to Redis store");
            *guard = Some(conn);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(StoreError::Backend("no Redis connection".to_string()));
        };

        match cmd.query(conn) {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    warn!("Dropping Redis connection after error: {}", e);
                    *guard = None;
                }
                Err(e.into())
            }
        }
    }
}

impl KeyValueStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.query::<String>(&redis::cmd("PING")).map(|_| ())
    }

    fn list_len(&self, list: &str) -> Result<usize, StoreError> {
        self.query(redis::cmd("LLEN").arg(list))
    }

    fn list_push_tail(&self, list: &str, value: &str) -> Result<(), StoreError> {
        self.query(redis::cmd("RPUSH").arg(list).arg(value))
    }

    fn list_push_head(&self, list: &str, value: &str) -> Result<(), StoreError> {
        self.query(redis::cmd("LPUSH").arg(list).arg(value))
    }

    fn list_pop_head(&self, list: &str) -> Result<Option<String>, StoreError> {
        self.query(redis::cmd("LPOP").arg(list))
    }

    fn list_get(&self, list: &str, index: usize) -> Result<Option<String>, StoreError> {
        self.query(redis::cmd("LINDEX").arg(list).arg(index))
    }

    fn hash_set(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.query(redis::cmd("HSET").arg(hash).arg(field).arg(value))
    }

    fn hash_get(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.query(redis::cmd("HGET").arg(hash).arg(field))
    }

    fn hash_get_all(&self, hash: &str) -> Result<BTreeMap<String, String>, StoreError> {
        self.query(redis::cmd("HGETALL").arg(hash))
    }

    fn set_flag(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        // PX rejects 0
        let millis = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;
        self.query(redis::cmd("SET").arg(key).arg("1").arg("PX").arg(millis))
    }

    fn has_flag(&self, key: &str) -> Result<bool, StoreError> {
        self.query(redis::cmd("EXISTS").arg(key))
    }
}

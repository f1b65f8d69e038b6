//! SQLite-backed bus.
//!
//! Topics are append-only tables keyed by `(topic, seq)`; committed offsets
//! are stored per consumer group. Separate processes opening the same file
//! share the bus, so an orchestrator and its workers can run apart.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::time::Instant;

use super::{BusConsumer, BusError, BusMessage, MessageBus};

/// How often an idle consumer re-checks its topic.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

struct Shared {
    conn: Mutex<Connection>,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, BusError> {
        self.conn
            .lock()
            .map_err(|_| BusError::Backend("sqlite bus lock poisoned".to_string()))
    }

    fn committed(&self, group: &str, topic: &str) -> Result<u64, BusError> {
        let conn = self.lock()?;
        let next: Option<i64> = conn
            .query_row(
                "SELECT next_seq FROM bus_offsets WHERE group_id = ? AND topic = ?",
                params![group, topic],
                |row| row.get(0),
            )
            .optional()?;
        Ok(next.unwrap_or(0) as u64)
    }
}

/// Bus persisted in a SQLite file.
#[derive(Clone)]
pub struct SqliteBus {
    shared: Arc<Shared>,
}

impl SqliteBus {
    /// Open (or create) the bus at `path`.
    pub fn new(path: &Path) -> Result<Self, BusError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::from_connection(conn)
    }

    /// Create an in-memory bus (useful for testing).
    pub fn in_memory() -> Result<Self, BusError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, BusError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS bus_messages (
                topic TEXT NOT NULL,
                seq INTEGER NOT NULL,
                payload TEXT NOT NULL,
                published_at INTEGER NOT NULL,
                PRIMARY KEY (topic, seq)
            );

            CREATE TABLE IF NOT EXISTS bus_offsets (
                group_id TEXT NOT NULL,
                topic TEXT NOT NULL,
                next_seq INTEGER NOT NULL,
                PRIMARY KEY (group_id, topic)
            );
            "#,
        )?;
        Ok(Self {
            shared: Arc::new(Shared {
                conn: Mutex::new(conn),
            }),
        })
    }
}

#[async_trait]
impl MessageBus for SqliteBus {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<u64, BusError> {
        let mut conn = self.shared.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM bus_messages WHERE topic = ?",
            params![topic],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO bus_messages (topic, seq, payload, published_at) VALUES (?, ?, ?, ?)",
            params![topic, seq, payload, Utc::now().timestamp_millis()],
        )?;
        tx.commit()?;
        Ok(seq as u64)
    }

    async fn subscribe(&self, group: &str, topic: &str) -> Result<Box<dyn BusConsumer>, BusError> {
        let position = self.shared.committed(group, topic)?;
        Ok(Box::new(SqliteConsumer {
            shared: Arc::clone(&self.shared),
            group: group.to_string(),
            topic: topic.to_string(),
            position,
        }))
    }

    async fn ping(&self) -> Result<(), BusError> {
        let conn = self.shared.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

struct SqliteConsumer {
    shared: Arc<Shared>,
    group: String,
    topic: String,
    position: u64,
}

impl SqliteConsumer {
    fn next_available(&mut self) -> Result<Option<BusMessage>, BusError> {
        let conn = self.shared.lock()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT seq, payload FROM bus_messages WHERE topic = ? AND seq >= ? ORDER BY seq LIMIT 1",
                params![self.topic, self.position as i64],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.map(|(seq, payload)| {
            let offset = seq as u64;
            self.position = offset + 1;
            BusMessage {
                topic: self.topic.clone(),
                offset,
                payload,
            }
        }))
    }
}

#[async_trait]
impl BusConsumer for SqliteConsumer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<BusMessage>, BusError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.next_available()? {
                return Ok(Some(message));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn commit(&mut self, message: &BusMessage) -> Result<(), BusError> {
        let conn = self.shared.lock()?;
        conn.execute(
            r#"
            INSERT INTO bus_offsets (group_id, topic, next_seq) VALUES (?1, ?2, ?3)
            ON CONFLICT (group_id, topic) DO UPDATE SET next_seq = MAX(next_seq, excluded.next_seq)
            "#,
            params![self.group, self.topic, (message.offset + 1) as i64],
        )?;
        Ok(())
    }

    async fn rewind(&mut self) -> Result<(), BusError> {
        self.position = self.shared.committed(&self.group, &self.topic)?;
        Ok(())
    }

    async fn skip_to_end(&mut self) -> Result<u64, BusError> {
        let conn = self.shared.lock()?;
        let end: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM bus_messages WHERE topic = ?",
            params![self.topic],
            |row| row.get(0),
        )?;
        conn.execute(
            r#"
            INSERT INTO bus_offsets (group_id, topic, next_seq) VALUES (?1, ?2, ?3)
            ON CONFLICT (group_id, topic) DO UPDATE SET next_seq = MAX(next_seq, excluded.next_seq)
            "#,
            params![self.group, self.topic, end],
        )?;

        let end = end as u64;
        let skipped = end.saturating_sub(self.position);
        self.position = end;
        Ok(skipped)
    }
}

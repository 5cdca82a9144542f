//! Chunked persistent storage for the event log.
//!
//! The full event list is sharded into fixed-size chunks so no single write
//! grows unboundedly with archive size; chunking is a storage detail only
//! and is invisible to aggregation, which always sees the flat list.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, params};
use thiserror::Error;

use crate::types::PlaybackEvent;

/// Events per stored chunk.
pub const CHUNK_SIZE: usize = 1000;

const SCHEMA_VERSION: i64 = 1;

/// Persistence failures, surfaced to the caller as a generic
/// "data operation failed" condition with a reason string.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to save listening history: {0}")]
    WriteFailed(String),
    #[error("failed to load listening history: {0}")]
    ReadFailed(String),
}

/// Storage seam for the event log. Any embedded store with all-or-nothing
/// visibility of a full replace can stand behind this trait.
///
/// The store does no internal locking: the single-consumer model expects the
/// caller to serialize ingestion (one `replace_all` in flight at a time).
#[async_trait(?Send)]
pub trait EventStore {
    /// Atomically replace the entire event log. After this returns, readers
    /// see either the complete old state or the complete new state.
    async fn replace_all(&mut self, events: &[PlaybackEvent]) -> Result<(), StoreError>;

    /// Read every chunk in ascending chunk order and reconstitute the flat
    /// event list.
    async fn read_all(&self) -> Result<Vec<PlaybackEvent>, StoreError>;

    /// Whether at least one chunk is present. Never errors.
    async fn exists(&self) -> bool;

    /// Best-effort delete of all chunks; reports success as a flag.
    async fn clear(&mut self) -> bool;
}

/// Default location of the history database.
pub fn default_db_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".spintrace").join("history.db"))
}

/// SQLite-backed `EventStore`. Each row is one chunk: the chunk id, its
/// index, the JSON-encoded events, and the write timestamp.
pub struct SqliteEventStore {
    conn: Connection,
}

impl SqliteEventStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Self::init_schema(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::init_schema(conn)
    }

    fn init_schema(conn: Connection) -> anyhow::Result<Self> {
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .context("Failed to read schema version")?;
        if version > SCHEMA_VERSION {
            anyhow::bail!(
                "history database uses schema v{version}, newer than this build supports (v{SCHEMA_VERSION})"
            );
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (
                id          TEXT PRIMARY KEY,
                chunk_index INTEGER NOT NULL UNIQUE,
                tracks      TEXT NOT NULL,
                timestamp   TEXT NOT NULL
            );
            PRAGMA user_version = 1;",
        )
        .context("Failed to initialize store schema")?;

        Ok(Self { conn })
    }

    /// Number of chunks currently stored.
    pub fn chunk_count(&self) -> Result<u64, StoreError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| StoreError::ReadFailed(e.to_string()))
    }
}

fn write_failed(e: impl std::fmt::Display) -> StoreError {
    StoreError::WriteFailed(e.to_string())
}

fn read_failed(e: impl std::fmt::Display) -> StoreError {
    StoreError::ReadFailed(e.to_string())
}

#[async_trait(?Send)]
impl EventStore for SqliteEventStore {
    async fn replace_all(&mut self, events: &[PlaybackEvent]) -> Result<(), StoreError> {
        let tx = self.conn.transaction().map_err(write_failed)?;
        tx.execute("DELETE FROM chunks", []).map_err(write_failed)?;

        let now = Utc::now().to_rfc3339();
        for (index, chunk) in events.chunks(CHUNK_SIZE).enumerate() {
            let payload = simd_json::to_string(&chunk).map_err(write_failed)?;
            tx.execute(
                "INSERT INTO chunks (id, chunk_index, tracks, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![format!("chunk_{index}"), index as i64, payload, now],
            )
            .map_err(write_failed)?;
        }

        tx.commit().map_err(write_failed)
    }

    async fn read_all(&self) -> Result<Vec<PlaybackEvent>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT tracks FROM chunks ORDER BY chunk_index ASC")
            .map_err(read_failed)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(read_failed)?;

        let mut events = Vec::new();
        for row in rows {
            let mut payload = row.map_err(read_failed)?.into_bytes();
            let chunk: Vec<PlaybackEvent> =
                simd_json::from_slice(&mut payload).map_err(read_failed)?;
            events.extend(chunk);
        }
        Ok(events)
    }

    async fn exists(&self) -> bool {
        self.conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get::<_, i64>(0))
            .map(|count| count > 0)
            .unwrap_or(false)
    }

    async fn clear(&mut self) -> bool {
        self.conn.execute("DELETE FROM chunks", []).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_events(count: usize) -> Vec<PlaybackEvent> {
        (0..count)
            .map(|i| PlaybackEvent {
                ts: "2024-01-01T10:00:00Z".to_string(),
                ms_played: i as i64,
                master_metadata_track_name: Some(format!("track {i}")),
                master_metadata_album_artist_name: Some("Artist".to_string()),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn roundtrip_preserves_contents_and_order_across_chunks() {
        let mut store = SqliteEventStore::open_in_memory().expect("open");
        let events = make_events(2500);

        store.replace_all(&events).await.expect("replace");
        assert_eq!(store.chunk_count().expect("count"), 3);

        let read = store.read_all().await.expect("read");
        assert_eq!(read, events);
    }

    #[tokio::test]
    async fn chunk_rows_carry_index_ids_and_timestamps() {
        let mut store = SqliteEventStore::open_in_memory().expect("open");
        store
            .replace_all(&make_events(1001))
            .await
            .expect("replace");

        let ids: Vec<String> = store
            .conn
            .prepare("SELECT id FROM chunks ORDER BY chunk_index ASC")
            .expect("prepare")
            .query_map([], |row| row.get(0))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(ids, vec!["chunk_0".to_string(), "chunk_1".to_string()]);

        let written_at: String = store
            .conn
            .query_row("SELECT timestamp FROM chunks LIMIT 1", [], |row| row.get(0))
            .expect("timestamp");
        assert!(chrono::DateTime::parse_from_rfc3339(&written_at).is_ok());
    }

    #[tokio::test]
    async fn replace_all_leaves_no_stale_chunks_behind() {
        let mut store = SqliteEventStore::open_in_memory().expect("open");
        store
            .replace_all(&make_events(1500))
            .await
            .expect("first replace");
        assert_eq!(store.chunk_count().expect("count"), 2);

        let second = make_events(500);
        store.replace_all(&second).await.expect("second replace");
        assert_eq!(store.chunk_count().expect("count"), 1);
        assert_eq!(store.read_all().await.expect("read"), second);
    }

    #[tokio::test]
    async fn empty_replace_and_empty_read() {
        let mut store = SqliteEventStore::open_in_memory().expect("open");
        store.replace_all(&[]).await.expect("replace");
        assert!(store.read_all().await.expect("read").is_empty());
        assert!(!store.exists().await);
    }

    #[tokio::test]
    async fn exists_tracks_clear_and_replace() {
        let mut store = SqliteEventStore::open_in_memory().expect("open");
        assert!(!store.exists().await);

        store.replace_all(&make_events(1)).await.expect("replace");
        assert!(store.exists().await);

        assert!(store.clear().await);
        assert!(!store.exists().await);
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("history.db");
        let events = make_events(42);

        {
            let mut store = SqliteEventStore::open(&path).expect("open");
            store.replace_all(&events).await.expect("replace");
        }

        let store = SqliteEventStore::open(&path).expect("reopen");
        assert_eq!(store.read_all().await.expect("read"), events);
    }

    #[test]
    fn refuses_a_newer_schema_version() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("history.db");

        let conn = Connection::open(&path).expect("raw open");
        conn.execute_batch("PRAGMA user_version = 99;").expect("set version");
        drop(conn);

        assert!(SqliteEventStore::open(&path).is_err());
    }
}

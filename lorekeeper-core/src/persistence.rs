//! Persona memory persistence.
//!
//! The pipeline only needs "load/save a list of memory strings for a
//! persona id", expressed by [`MemoryPersistence`]. The bundled
//! [`SqliteMemoryPersistence`] stores each persona's list as a JSON array
//! in one row:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS persona_memories (
//!     persona_id TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{LoreError, Result, require_non_blank};
use crate::memory::MemoryStore;
use crate::types::MutationSource;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS persona_memories (
    persona_id TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

/// Load/save collaborator for persona memories.
pub trait MemoryPersistence: Send + Sync {
    /// Stored memory strings for `persona_id`, empty if none were saved.
    ///
    /// # Errors
    /// Returns an error if the backing store fails.
    fn load(&self, persona_id: &str) -> Result<Vec<String>>;

    /// Replace the stored memory strings for `persona_id`.
    ///
    /// # Errors
    /// Returns an error if the backing store fails.
    fn save(&self, persona_id: &str, memories: &[String]) -> Result<()>;

    /// Save every episodic memory of `store`.
    ///
    /// # Errors
    /// As for [`MemoryPersistence::save`].
    fn save_store(&self, store: &MemoryStore) -> Result<()> {
        self.save(store.persona_id(), &store.export_memory_strings())
    }

    /// Load saved memories into `store` as `source`. Returns how many were
    /// added.
    ///
    /// # Errors
    /// As for [`MemoryPersistence::load`].
    fn restore_store(&self, store: &MemoryStore, source: MutationSource) -> Result<usize> {
        let memories = self.load(store.persona_id())?;
        store.import_memory_strings(memories, source)
    }
}

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// CRC-32 (ISO 3309 polynomial).
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// SqliteMemoryPersistence
// ---------------------------------------------------------------------------

/// SQLite-backed [`MemoryPersistence`].
pub struct SqliteMemoryPersistence {
    conn: Mutex<Connection>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteMemoryPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMemoryPersistence")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteMemoryPersistence {
    /// Open (or create) a database file.
    ///
    /// # Errors
    /// Returns [`LoreError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "memory persistence opened");
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns [`LoreError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Remove a persona's row. Returns `true` if one existed.
    ///
    /// # Errors
    /// Returns [`LoreError::Database`] on SQLite failures.
    pub fn delete(&self, persona_id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM persona_memories WHERE persona_id = ?1", params![persona_id])?;
        Ok(deleted > 0)
    }

    /// Persona ids with saved memories, sorted.
    ///
    /// # Errors
    /// Returns [`LoreError::Database`] on SQLite failures.
    pub fn list_personas(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT persona_id FROM persona_memories ORDER BY persona_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut personas = Vec::new();
        for row in rows {
            personas.push(row?);
        }
        Ok(personas)
    }

    /// Path to the database file (`:memory:` for in-memory databases).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl MemoryPersistence for SqliteMemoryPersistence {
    fn load(&self, persona_id: &str) -> Result<Vec<String>> {
        require_non_blank("persona_id", persona_id)?;
        let start = Instant::now();

        let row: Option<(Vec<u8>, Option<String>)> = {
            let conn = self.conn.lock();
            let mut stmt =
                conn.prepare_cached("SELECT data, checksum FROM persona_memories WHERE persona_id = ?1")?;
            let row = stmt
                .query_row(params![persona_id], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?;
            row
        };
        let Some((data, stored_checksum)) = row else {
            return Ok(Vec::new());
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(persona = %persona_id, %expected, %actual, "checksum mismatch in saved memories");
                }
            }
        }

        let memories: Vec<String> =
            serde_json::from_slice(&data).map_err(|e| LoreError::Serialization(e.to_string()))?;
        debug!(
            persona = %persona_id,
            memories = memories.len(),
            elapsed_us = start.elapsed().as_micros(),
            "loaded persona memories"
        );
        Ok(memories)
    }

    fn save(&self, persona_id: &str, memories: &[String]) -> Result<()> {
        require_non_blank("persona_id", persona_id)?;
        let start = Instant::now();

        let json = serde_json::to_vec(memories).map_err(|e| LoreError::Serialization(e.to_string()))?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        let now = Utc::now().to_rfc3339();

        self.conn.lock().execute(
            "INSERT INTO persona_memories (persona_id, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(persona_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![persona_id, json, now, checksum],
        )?;

        debug!(
            persona = %persona_id,
            memories = memories.len(),
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "saved persona memories"
        );
        Ok(())
    }
}

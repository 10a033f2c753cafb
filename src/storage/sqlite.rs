//! SQLite storage backend
//!
//! One row per crate (its `@context` and last write time) and one row per
//! entity, keeping the graph position so documents come back in order.

use super::traits::{CrateStore, OpenStore, StorageError, StorageResult};
use crate::context::ContextValue;
use crate::graph::{CrateGraph, Entity};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed crate store
///
/// Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS crates (
                id TEXT PRIMARY KEY,
                context_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entities (
                crate_id TEXT NOT NULL,
                id TEXT NOT NULL,
                position INTEGER NOT NULL,
                entity_json TEXT NOT NULL,
                PRIMARY KEY (crate_id, id),
                FOREIGN KEY (crate_id) REFERENCES crates(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_entities_position
                ON entities(crate_id, position);

            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn crate_exists(conn: &Connection, crate_id: &str) -> StorageResult<bool> {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM crates WHERE id = ?1", params![crate_id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Entity writes against an unknown crate are errors, not no-ops
    fn require_crate(conn: &Connection, crate_id: &str) -> StorageResult<()> {
        if Self::crate_exists(conn, crate_id)? {
            Ok(())
        } else {
            Err(StorageError::CrateNotFound(crate_id.to_string()))
        }
    }

    fn touch(conn: &Connection, crate_id: &str) -> StorageResult<()> {
        conn.execute(
            "UPDATE crates SET updated_at = ?2 WHERE id = ?1",
            params![crate_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// When the crate was last written through this store
    pub fn updated_at(&self, crate_id: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row("SELECT updated_at FROM crates WHERE id = ?1", params![crate_id], |row| row.get(0))
            .optional()?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StorageError::DateParse(e.to_string()))
        })
        .transpose()
    }

    /// Delete a crate and all its entities
    pub fn delete_crate(&self, crate_id: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM crates WHERE id = ?1", params![crate_id])?;
        Ok(rows > 0)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CrateStore for SqliteStore {
    fn get_crate(&self, crate_id: &str) -> StorageResult<CrateGraph> {
        let conn = self.conn()?;

        let context_json: Option<String> = conn
            .query_row("SELECT context_json FROM crates WHERE id = ?1", params![crate_id], |row| row.get(0))
            .optional()?;
        let Some(context_json) = context_json else {
            return Err(StorageError::CrateNotFound(crate_id.to_string()));
        };
        let context: ContextValue = serde_json::from_str(&context_json)?;

        let mut stmt = conn.prepare("SELECT entity_json FROM entities WHERE crate_id = ?1 ORDER BY position")?;
        let rows = stmt
            .query_map(params![crate_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let entities = rows
            .iter()
            .map(|json| serde_json::from_str::<Entity>(json))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CrateGraph { context, entities })
    }

    fn save_ro_crate_metadata_json(&self, crate_id: &str, json: &str) -> StorageResult<()> {
        let graph = CrateGraph::from_json_str(json)?;
        let context_json = serde_json::to_string(&graph.context)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO crates (id, context_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                context_json = excluded.context_json,
                updated_at = excluded.updated_at
            "#,
            params![crate_id, context_json, Utc::now().to_rfc3339()],
        )?;
        tx.execute("DELETE FROM entities WHERE crate_id = ?1", params![crate_id])?;
        for (position, entity) in graph.entities.iter().enumerate() {
            tx.execute(
                "INSERT INTO entities (crate_id, id, position, entity_json) VALUES (?1, ?2, ?3, ?4)",
                params![crate_id, entity.id.as_str(), position as i64, serde_json::to_string(entity)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn create_entity(&self, crate_id: &str, entity: &Entity) -> StorageResult<bool> {
        let conn = self.conn()?;
        Self::require_crate(&conn, crate_id)?;
        let rows = conn.execute(
            r#"
            INSERT OR IGNORE INTO entities (crate_id, id, position, entity_json)
            VALUES (?1, ?2,
                    (SELECT COALESCE(MAX(position), -1) + 1 FROM entities WHERE crate_id = ?1),
                    ?3)
            "#,
            params![crate_id, entity.id.as_str(), serde_json::to_string(entity)?],
        )?;
        if rows > 0 {
            Self::touch(&conn, crate_id)?;
        }
        Ok(rows > 0)
    }

    fn update_entity(&self, crate_id: &str, entity: &Entity) -> StorageResult<bool> {
        let conn = self.conn()?;
        Self::require_crate(&conn, crate_id)?;
        let rows = conn.execute(
            "UPDATE entities SET entity_json = ?3 WHERE crate_id = ?1 AND id = ?2",
            params![crate_id, entity.id.as_str(), serde_json::to_string(entity)?],
        )?;
        if rows > 0 {
            Self::touch(&conn, crate_id)?;
        }
        Ok(rows > 0)
    }

    fn delete_entity(&self, crate_id: &str, entity: &Entity) -> StorageResult<bool> {
        let conn = self.conn()?;
        Self::require_crate(&conn, crate_id)?;
        let rows = conn.execute(
            "DELETE FROM entities WHERE crate_id = ?1 AND id = ?2",
            params![crate_id, entity.id.as_str()],
        )?;
        if rows > 0 {
            Self::touch(&conn, crate_id)?;
        }
        Ok(rows > 0)
    }

    fn list_crates(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM crates ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

//! SQLite cache for identification catalogues

mod schema;

pub use schema::*;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub const SIZE_HASH_CATALOGUE: &str = "size_hash";
pub const DIRECTORY_CATALOGUE: &str = "directory";

/// Database wrapper with thread-safe access
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open database")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open database")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Archives identified by exact size and hash
            CREATE TABLE IF NOT EXISTS size_hash_records (
                size INTEGER NOT NULL,
                md5 TEXT NOT NULL,
                game TEXT,
                name TEXT,
                version TEXT,
                transform TEXT,
                custom_manifest TEXT,
                PRIMARY KEY (size, md5)
            );

            -- DLC folders identified by name
            CREATE TABLE IF NOT EXISTS directory_records (
                folder TEXT NOT NULL COLLATE NOCASE,
                game TEXT NOT NULL,
                name TEXT NOT NULL,
                developer TEXT NOT NULL,
                description TEXT,
                update_code INTEGER,
                prevent_import INTEGER NOT NULL DEFAULT 0,
                required_dlc TEXT,
                PRIMARY KEY (folder, game)
            );

            -- When each catalogue was last downloaded
            CREATE TABLE IF NOT EXISTS catalogue_sync (
                name TEXT PRIMARY KEY,
                fetched_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_size_hash_size ON size_hash_records(size);
            "#,
        )
        .context("Failed to initialize database schema")?;

        Ok(())
    }

    /// Replace the whole size/hash catalogue
    pub fn replace_size_hash_records(&self, records: &[SizeHashRecord]) -> Result<usize> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM size_hash_records", [])?;
        for record in records {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO size_hash_records
                (size, md5, game, name, version, transform, custom_manifest)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    record.size as i64,
                    record.md5.to_ascii_lowercase(),
                    record.game.map(|g| g.id()),
                    record.name,
                    record.version,
                    record.transform,
                    record.custom_manifest,
                ],
            )?;
        }

        tx.commit()?;
        Ok(records.len())
    }

    /// Replace the whole directory catalogue
    pub fn replace_directory_records(&self, records: &[DirectoryRecord]) -> Result<usize> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM directory_records", [])?;
        for record in records {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO directory_records
                (folder, game, name, developer, description, update_code, prevent_import, required_dlc)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    record.folder,
                    record.game.id(),
                    record.name,
                    record.developer,
                    record.description,
                    record.update_code.map(|c| c as i64),
                    record.prevent_import as i32,
                    (!record.required_dlc.is_empty()).then(|| record.required_dlc.join(";")),
                ],
            )?;
        }

        tx.commit()?;
        Ok(records.len())
    }

    pub fn size_hash_records(&self, size: u64) -> Result<Vec<SizeHashRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT size, md5, game, name, version, transform, custom_manifest
            FROM size_hash_records
            WHERE size = ?1
            "#,
        )?;

        let records = stmt
            .query_map(params![size as i64], |row| SizeHashRecord::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to query size/hash records")?;
        Ok(records)
    }

    /// Directory record for a DLC folder (case-insensitive)
    pub fn directory_record(&self, folder: &str, game: &str) -> Result<Option<DirectoryRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            r#"
            SELECT folder, game, name, developer, description, update_code, prevent_import, required_dlc
            FROM directory_records
            WHERE folder = ?1 AND game = ?2
            "#,
            params![folder, game],
            |row| DirectoryRecord::from_row(row),
        )
        .optional()
        .context("Failed to query directory record")
    }

    pub fn catalogue_fetched_at(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT fetched_at FROM catalogue_sync WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)))
    }

    pub fn mark_catalogue_fetched(&self, name: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO catalogue_sync (name, fetched_at) VALUES (?1, ?2)",
            params![name, at.to_rfc3339()],
        )?;
        Ok(())
    }
}

//! SQLite store handle shared by the corpus and both indexes

use crate::error::{RagError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Version written to every store's `meta` table
pub const SCHEMA_VERSION: i32 = 1;

const CREATE_META: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// One SQLite file plus the DDL that defines its tables
pub struct Database {
    pub(crate) conn: Connection,
    path: PathBuf,
}

impl Database {
    /// Open or create a store at `path`
    pub fn open(path: impl AsRef<Path>, ddl: &str) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            path: path.to_path_buf(),
        };
        db.initialize(ddl)?;
        Ok(db)
    }

    /// Open a store that must already exist and pass validation
    pub fn open_existing(path: impl AsRef<Path>, ddl: &str) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RagError::IndexMissing(path.to_path_buf()));
        }

        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            path: path.to_path_buf(),
        };
        db.validate()?;
        db.initialize(ddl)?;
        Ok(db)
    }

    pub fn open_in_memory(ddl: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        db.initialize(ddl)?;
        Ok(db)
    }

    fn initialize(&self, ddl: &str) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        self.conn.execute_batch(CREATE_META)?;
        self.conn.execute_batch(ddl)?;

        match self.schema_version()? {
            None => self.set_meta("schema_version", &SCHEMA_VERSION.to_string())?,
            Some(v) if v == SCHEMA_VERSION => {}
            Some(v) => {
                return Err(self.corrupt(format!(
                    "schema version {} is not supported (expected {})",
                    v, SCHEMA_VERSION
                )))
            }
        }
        Ok(())
    }

    /// Integrity check run before serving from an existing file
    fn validate(&self) -> Result<()> {
        let check: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(|e| self.corrupt(format!("quick_check failed: {}", e)))?;
        if check != "ok" {
            return Err(self.corrupt(format!("quick_check reported: {}", check)));
        }

        let has_meta: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'meta'",
            [],
            |row| row.get(0),
        )?;
        if !has_meta {
            return Err(self.corrupt("missing meta table"));
        }
        if self.schema_version()?.is_none() {
            return Err(self.corrupt("missing schema_version"));
        }
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<Option<i32>> {
        match self.get_meta("schema_version")? {
            None => Ok(None),
            Some(v) => v
                .parse::<i32>()
                .map(Some)
                .map_err(|_| self.corrupt(format!("unparseable schema_version '{}'", v))),
        }
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build an `IndexCorrupt` error for this store
    pub fn corrupt(&self, reason: impl Into<String>) -> RagError {
        RagError::IndexCorrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    /// Run `f` inside an immediate transaction, rolling back on error
    pub(crate) fn transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.conn.execute("BEGIN IMMEDIATE", [])?;
        let result = f(&self.conn);
        if result.is_ok() {
            self.conn.execute("COMMIT", [])?;
        } else {
            let _ = self.conn.execute("ROLLBACK", []);
        }
        result
    }
}

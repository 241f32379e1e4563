//! SQLite registry of installed library versions.
//!
//! Records are only trusted while their files exist: lookups and listings
//! prune rows whose library or interpreter has vanished from disk.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use glix_schema::VersionId;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use super::migrations;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Path does not exist: {0}")]
    MissingPath(PathBuf),

    #[error("Corrupt registry row: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One registered version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub version: VersionId,
    pub library_path: PathBuf,
    pub interpreter_path: Option<PathBuf>,
    pub debug_path: Option<PathBuf>,
    pub source_path: Option<PathBuf>,
    pub created_at: Option<DateTime<Utc>>,
}

impl InstalledVersion {
    /// Directory holding the library; used as the runtime search path.
    pub fn library_dir(&self) -> Option<&Path> {
        self.library_path.parent()
    }

    fn is_present(&self) -> bool {
        self.library_path.exists() && self.interpreter_path.as_ref().is_none_or(|p| p.exists())
    }
}

/// Version registry backed by one SQLite connection.
#[derive(Debug)]
pub struct VersionRegistry {
    conn: Connection,
}

const COLUMNS: &str =
    "version, libc_path, interpreter_path, debug_path, source_path, created_at";

impl VersionRegistry {
    /// Open or create the registry at the default location.
    pub fn open() -> Result<Self, RegistryError> {
        Self::open_at(&crate::db_path())
    }

    /// Open database at a specific path (for testing)
    pub fn open_at(path: &Path) -> Result<Self, RegistryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let applied = migrations::apply(&mut conn)?;
        if applied > 0 {
            tracing::debug!("registry {}: {applied} migration(s) applied", path.display());
        }
        Ok(Self { conn })
    }

    /// Register `version`, replacing any existing record.
    ///
    /// Paths are stored absolute. The interpreter is looked up next to the
    /// library.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MissingPath`] naming the first supplied path
    /// that does not exist.
    pub fn add(
        &self,
        version: &VersionId,
        library_path: &Path,
        debug_path: Option<&Path>,
        source_path: Option<&Path>,
    ) -> Result<InstalledVersion, RegistryError> {
        let library_path = existing_absolute(library_path)?;
        let debug_path = debug_path.map(existing_absolute).transpose()?;
        let source_path = source_path.map(existing_absolute).transpose()?;
        let interpreter_path = library_path.parent().and_then(find_interpreter);
        let created_at = Utc::now();

        self.conn.execute(
            "INSERT OR REPLACE INTO glibc_versions
                (version, libc_path, interpreter_path, debug_path, source_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                version.as_str(),
                path_text(&library_path),
                interpreter_path.as_deref().map(path_text),
                debug_path.as_deref().map(path_text),
                source_path.as_deref().map(path_text),
                created_at.to_rfc3339(),
            ],
        )?;

        tracing::debug!("registered {version} at {}", library_path.display());

        Ok(InstalledVersion {
            version: version.clone(),
            library_path,
            interpreter_path,
            debug_path,
            source_path,
            created_at: Some(created_at),
        })
    }

    /// Fetch a version if its files are still on disk.
    ///
    /// A stale record is deleted. Vanished debug or source trees are reported
    /// as `None` without evicting the record.
    pub fn lookup(&self, version: &VersionId) -> Result<Option<InstalledVersion>, RegistryError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM glibc_versions WHERE version = ?1"),
                params![version.as_str()],
                RawRow::from_row,
            )
            .optional()?;

        let Some(raw) = row else {
            return Ok(None);
        };

        let record = raw.into_record()?;
        if !record.is_present() {
            tracing::debug!("pruning stale registry entry {version}");
            self.delete(version.as_str())?;
            return Ok(None);
        }
        Ok(Some(without_vanished_extras(record)))
    }

    /// Every live record, ordered by version. Stale rows are pruned.
    pub fn list(&self) -> Result<Vec<InstalledVersion>, RegistryError> {
        let raws = {
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT {COLUMNS} FROM glibc_versions"))?;
            let rows = stmt.query_map([], RawRow::from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut live = Vec::with_capacity(raws.len());
        for raw in raws {
            let key = raw.version.clone();
            match raw.into_record() {
                Ok(record) if record.is_present() => live.push(without_vanished_extras(record)),
                Ok(_) => {
                    tracing::debug!("pruning stale registry entry {key}");
                    self.delete(&key)?;
                }
                Err(e) => tracing::warn!("skipping registry row: {e}"),
            }
        }

        live.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(live)
    }

    /// Delete a record. Returns whether one existed.
    pub fn remove(&self, version: &VersionId) -> Result<bool, RegistryError> {
        Ok(self.delete(version.as_str())? > 0)
    }

    fn delete(&self, version: &str) -> Result<usize, RegistryError> {
        Ok(self
            .conn
            .execute("DELETE FROM glibc_versions WHERE version = ?1", params![version])?)
    }
}

/// First dynamic loader (`ld-linux*.so*` or `ld-*.so*`) in `dir`, by name.
pub fn find_interpreter(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("ld-") && n.contains(".so"))
        })
        .collect();

    // Prefer the conventional ld-linux names over versioned ld-2.xx.so.
    candidates.sort_by_key(|p| {
        let linux = p
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("ld-linux"));
        (!linux, p.clone())
    });
    candidates.into_iter().next()
}

struct RawRow {
    version: String,
    library_path: String,
    interpreter_path: Option<String>,
    debug_path: Option<String>,
    source_path: Option<String>,
    created_at: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            version: row.get(0)?,
            library_path: row.get(1)?,
            interpreter_path: row.get(2)?,
            debug_path: row.get(3)?,
            source_path: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<InstalledVersion, RegistryError> {
        let version = VersionId::parse(&self.version)
            .map_err(|e| RegistryError::Corrupt(format!("{:?}: {e}", self.version)))?;
        Ok(InstalledVersion {
            version,
            library_path: PathBuf::from(self.library_path),
            interpreter_path: self.interpreter_path.map(PathBuf::from),
            debug_path: self.debug_path.map(PathBuf::from),
            source_path: self.source_path.map(PathBuf::from),
            created_at: self.created_at.as_deref().and_then(parse_timestamp),
        })
    }
}

/// RFC 3339, or SQLite's `CURRENT_TIMESTAMP` format from older databases.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|n| n.and_utc())
        })
}

fn without_vanished_extras(mut record: InstalledVersion) -> InstalledVersion {
    record.debug_path = record.debug_path.filter(|p| p.exists());
    record.source_path = record.source_path.filter(|p| p.exists());
    record
}

fn existing_absolute(path: &Path) -> Result<PathBuf, RegistryError> {
    if !path.exists() {
        return Err(RegistryError::MissingPath(path.to_path_buf()));
    }
    Ok(std::path::absolute(path)?)
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

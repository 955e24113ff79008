//! Discovery and attachment of the queryable databases.
//!
//! A [`Catalog`] records where the anchor database lives and which data
//! files are attached under which alias. It holds paths only, so it can be
//! shared freely between requests; every request opens its own
//! connection with [`Catalog::connect`].

use quarry_core::{AppError, AppResult};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File extensions treated as SQLite databases.
const DATABASE_EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];

/// SQLite's default limit on attached databases per connection.
pub const MAX_ATTACHED: usize = 10;

/// A database file attached under an identifier-safe alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseHandle {
    pub alias: String,
    pub path: PathBuf,
}

/// Something that was left out, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    /// File path, alias or `alias.table` that was skipped
    pub target: String,
    pub reason: String,
}

impl Skipped {
    pub fn new(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Where the anchor database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    File(PathBuf),
    /// The anchor file could not be created; an empty in-memory database stands in.
    Memory,
}

/// The anchor plus every attached database handle.
#[derive(Debug, Clone)]
pub struct Catalog {
    anchor: Anchor,
    handles: Vec<DatabaseHandle>,
    skipped: Vec<Skipped>,
}

impl Catalog {
    /// Build a catalog from an anchor and already-validated handles.
    pub fn new(anchor: Anchor, handles: Vec<DatabaseHandle>) -> Self {
        Self {
            anchor,
            handles,
            skipped: Vec::new(),
        }
    }

    /// Create the anchor if needed and attach every database in `docs_dir`.
    ///
    /// Never fails: an anchor that cannot be created falls back to memory,
    /// and each data file that cannot be attached is recorded in
    /// [`Catalog::skipped`].
    pub fn discover(docs_dir: &Path, anchor_path: &Path) -> Self {
        let anchor = match ensure_anchor(anchor_path) {
            Ok(()) => Anchor::File(anchor_path.to_path_buf()),
            Err(e) => {
                tracing::warn!(
                    "Anchor database {:?} unavailable, using in-memory anchor: {}",
                    anchor_path,
                    e
                );
                Anchor::Memory
            }
        };

        let mut handles = Vec::new();
        let mut skipped = Vec::new();
        let mut taken = HashSet::new();

        for path in database_files(docs_dir, anchor_path) {
            let shown = path.display().to_string();

            if handles.len() >= MAX_ATTACHED {
                tracing::warn!("Skipping {}: attach limit of {} reached", shown, MAX_ATTACHED);
                skipped.push(Skipped::new(
                    shown,
                    format!("attach limit of {} reached", MAX_ATTACHED),
                ));
                continue;
            }

            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let alias = unique_alias(&normalize_alias(&stem), &taken);

            match probe(&path, &alias) {
                Ok(()) => {
                    tracing::debug!("Attached {} as '{}'", shown, alias);
                    taken.insert(alias.clone());
                    handles.push(DatabaseHandle { alias, path });
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", shown, e);
                    skipped.push(Skipped::new(shown, e.to_string()));
                }
            }
        }

        tracing::info!(
            "Catalog ready: {} database(s) attached, {} skipped",
            handles.len(),
            skipped.len()
        );

        Self {
            anchor,
            handles,
            skipped,
        }
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn handles(&self) -> &[DatabaseHandle] {
        &self.handles
    }

    /// Aliases in attachment order.
    pub fn aliases(&self) -> Vec<String> {
        self.handles.iter().map(|h| h.alias.clone()).collect()
    }

    pub fn skipped(&self) -> &[Skipped] {
        &self.skipped
    }

    /// Open a read-only session with every handle attached.
    ///
    /// A handle whose file disappeared since discovery is left out with a
    /// warning; queries naming it then fail at execution time.
    pub fn connect(&self) -> AppResult<Connection> {
        let conn = match &self.anchor {
            Anchor::File(path) => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
            Anchor::Memory => Connection::open_in_memory(),
        }
        .map_err(|e| AppError::Database(format!("Failed to open anchor database: {}", e)))?;

        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| AppError::Database(format!("Failed to set busy timeout: {}", e)))?;

        for handle in &self.handles {
            if let Err(e) = attach(&conn, &handle.path, &handle.alias) {
                tracing::warn!("Could not attach '{}': {}", handle.alias, e);
            }
        }

        conn.execute_batch("PRAGMA query_only = ON;")
            .map_err(|e| AppError::Database(format!("Failed to enable query_only: {}", e)))?;

        Ok(conn)
    }
}

/// Create the anchor database with its metadata table if it is missing.
pub fn ensure_anchor(path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)
        .map_err(|e| AppError::Database(format!("Failed to open {:?}: {}", path, e)))?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _agent_metadata (id INTEGER PRIMARY KEY, info TEXT);",
    )
    .map_err(|e| AppError::Database(format!("Failed to initialize {:?}: {}", path, e)))?;

    Ok(())
}

/// Derive an identifier-safe alias from a file stem.
///
/// Lowercases, replaces every character outside `[a-z0-9_]` with `_`, and
/// prefixes `db_` when the result would start with a digit or be empty.
pub fn normalize_alias(stem: &str) -> String {
    let alias: String = stem
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    match alias.chars().next() {
        None => "db_".to_string(),
        Some(c) if c.is_ascii_digit() => format!("db_{}", alias),
        Some(_) => alias,
    }
}

fn unique_alias(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Database files in `dir`, sorted by file name, excluding the anchor.
fn database_files(dir: &Path, anchor_path: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("No data directory at {:?}: {}", dir, e);
            return Vec::new();
        }
    };

    let anchor = fs::canonicalize(anchor_path).unwrap_or_else(|_| anchor_path.to_path_buf());

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| DATABASE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .filter(|p| fs::canonicalize(p).map(|c| c != anchor).unwrap_or(true))
        .collect();

    files.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));
    files
}

fn attach(conn: &Connection, path: &Path, alias: &str) -> rusqlite::Result<()> {
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS \"{}\"", alias),
        [path.to_string_lossy().to_string()],
    )?;
    Ok(())
}

/// Attach the file to a scratch connection and read its catalog.
fn probe(path: &Path, alias: &str) -> AppResult<()> {
    let conn = Connection::open_in_memory()
        .map_err(|e| AppError::Database(format!("Failed to open probe connection: {}", e)))?;

    attach(&conn, path, alias)
        .map_err(|e| AppError::Database(format!("attach failed: {}", e)))?;

    conn.query_row(
        &format!("SELECT COUNT(*) FROM \"{}\".sqlite_master", alias),
        [],
        |row| row.get::<_, i64>(0),
    )
    .map_err(|e| AppError::Database(format!("not a readable database: {}", e)))?;

    Ok(())
}

//! Flat-file ingestion into per-file SQLite databases.
//!
//! Each `*.csv`, `*.xlsx`/`*.xls` and `*.sql` file in the data directory
//! becomes a fresh `<stem>.db` next to it, which the catalog then
//! discovers. CSV files and the first sheet of a workbook turn into one
//! table; SQL dumps are rewritten from MySQL dialect and replayed statement
//! by statement.

use crate::introspect::quote_ident;
use calamine::{open_workbook_auto, Data, Reader};
use once_cell::sync::Lazy;
use quarry_core::{AppError, AppResult};
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

static VERSIONED_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*!.*?\*/;").expect("valid versioned comment regex"));
static LINE_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^--.*$").expect("valid line comment regex"));
static SIZED_INT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(tiny|small|medium|big)?int\s*\(\s*\d+\s*\)").expect("valid int regex")
});
static DOUBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bdouble\b").expect("valid double regex"));
static FLOAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bfloat\b").expect("valid float regex"));
static TABLE_OPTIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\)\s*(ENGINE|AUTO_INCREMENT|DEFAULT CHARSET)=[^;]*;")
        .expect("valid table options regex")
});
static TABLE_LOCKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(LOCK|UNLOCK) TABLES.*?;").expect("valid lock regex"));
static STATEMENT_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m);\s*$").expect("valid statement end regex"));
static NON_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid identifier regex"));

/// What ingesting one file produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IngestOutcome {
    /// A CSV file or worksheet loaded into a single table
    Table {
        table: String,
        columns: Vec<String>,
        rows: usize,
    },
    /// A SQL dump replayed statement by statement
    Script { executed: usize, failed: usize },
    /// The file could not be ingested at all
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestedFile {
    pub source: PathBuf,
    pub database: PathBuf,
    pub outcome: IngestOutcome,
}

/// Per-file results of one ingestion run, in file-name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub files: Vec<IngestedFile>,
}

impl IngestReport {
    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, IngestOutcome::Failed { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Csv,
    Workbook,
    Sql,
}

impl FileKind {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xlsm" | "xls" => Some(Self::Workbook),
            "sql" => Some(Self::Sql),
            _ => None,
        }
    }
}

/// Ingestible files in `docs_dir` that have no `<stem>.db` beside them yet.
pub fn pending_sources(docs_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(docs_dir) else {
        return Vec::new();
    };
    let mut pending: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && FileKind::from_path(path).is_some())
        .filter(|path| !path.with_extension("db").exists())
        .collect();
    pending.sort();
    pending
}

/// Operator hint naming the files [`pending_sources`] finds, if any.
pub fn pending_hint(docs_dir: &Path) -> Option<String> {
    let pending = pending_sources(docs_dir);
    if pending.is_empty() {
        return None;
    }
    let names: Vec<String> = pending
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .collect();
    Some(format!(
        "{} file(s) in {:?} have no database yet and are invisible to SQL questions ({}); \
         run `quarry ingest`",
        names.len(),
        docs_dir,
        names.join(", ")
    ))
}

/// Ingest every CSV, workbook and SQL file directly inside `docs_dir`.
///
/// A file that fails is reported and the run continues.
pub fn ingest_dir(docs_dir: &Path) -> AppResult<IngestReport> {
    if !docs_dir.is_dir() {
        return Err(AppError::Database(format!(
            "Data directory does not exist: {:?}",
            docs_dir
        )));
    }

    let mut candidates: Vec<(PathBuf, FileKind)> = std::fs::read_dir(docs_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| FileKind::from_path(&path).map(|kind| (path, kind)))
        .collect();
    candidates.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));

    if candidates.is_empty() {
        info!("No CSV, workbook or SQL files found in {:?}", docs_dir);
    }

    let mut report = IngestReport::default();
    for (path, kind) in candidates {
        let database = path.with_extension("db");
        info!("Ingesting {:?} -> {:?}", path, database);

        let outcome = match ingest_file(&path, &database, kind) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Failed to ingest {:?}: {}", path, e);
                IngestOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        report.files.push(IngestedFile {
            source: path,
            database,
            outcome,
        });
    }

    Ok(report)
}

fn ingest_file(path: &Path, database: &Path, kind: FileKind) -> AppResult<IngestOutcome> {
    if database.exists() {
        std::fs::remove_file(database)?;
    }

    match kind {
        FileKind::Csv => ingest_csv(path, database),
        FileKind::Workbook => ingest_workbook(path, database),
        FileKind::Sql => ingest_sql(path, database),
    }
}

/// Load a CSV file into a single table of a new database.
pub fn ingest_csv(path: &Path, database: &Path) -> AppResult<IngestOutcome> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| AppError::Database(format!("Failed to read {:?}: {}", path, e)))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::Database(format!("Failed to read header of {:?}: {}", path, e)))?
        .iter()
        .map(String::from)
        .collect();

    let mut records: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| AppError::Database(format!("Bad record in {:?}: {}", path, e)))?;
        records.push(record.iter().map(String::from).collect());
    }

    write_table(path, database, &headers, records)
}

/// Load the first worksheet of an Excel workbook into a single table.
///
/// The first row holds the headers, as in a CSV file.
pub fn ingest_workbook(path: &Path, database: &Path) -> AppResult<IngestOutcome> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| AppError::Database(format!("Failed to open workbook {:?}: {}", path, e)))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| AppError::Database(format!("{:?} has no worksheets", path)))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| AppError::Database(format!("Failed to read sheet '{}': {}", sheet, e)))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    let headers = rows.next().unwrap_or_default();
    let records: Vec<Vec<String>> = rows.collect();

    info!("Reading sheet '{}' of {:?}", sheet, path);
    write_table(path, database, &headers, records)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string(),
    }
}

/// Create `<normalized stem>` in a new database and fill it in one
/// transaction. Short rows are padded with NULLs and extra cells dropped.
fn write_table(
    path: &Path,
    database: &Path,
    headers: &[String],
    records: Vec<Vec<String>>,
) -> AppResult<IngestOutcome> {
    if headers.is_empty() {
        return Err(AppError::Database(format!("{:?} has no header row", path)));
    }

    let columns = unique_columns(headers);
    let records: Vec<Vec<String>> = records
        .into_iter()
        .map(|mut row| {
            row.resize(columns.len(), String::new());
            row
        })
        .collect();

    let affinities: Vec<Affinity> = (0..columns.len())
        .map(|i| Affinity::infer(records.iter().map(|row| row[i].as_str())))
        .collect();

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let table = clean_identifier(&stem);

    let mut conn = Connection::open(database)
        .map_err(|e| AppError::Database(format!("Failed to create {:?}: {}", database, e)))?;

    let definition = columns
        .iter()
        .zip(&affinities)
        .map(|(name, affinity)| format!("{} {}", quote_ident(name), affinity.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");

    let tx = conn.transaction().map_err(db_error)?;
    tx.execute_batch(&format!(
        "CREATE TABLE {} ({});",
        quote_ident(&table),
        definition
    ))
    .map_err(db_error)?;
    {
        let mut insert = tx
            .prepare(&format!(
                "INSERT INTO {} VALUES ({})",
                quote_ident(&table),
                placeholders
            ))
            .map_err(db_error)?;
        for row in &records {
            let values = row
                .iter()
                .zip(&affinities)
                .map(|(cell, affinity)| affinity.convert(cell));
            insert
                .execute(rusqlite::params_from_iter(values))
                .map_err(db_error)?;
        }
    }
    tx.commit().map_err(db_error)?;

    info!(
        "Table '{}' created with {} row(s) ({} -> {})",
        table,
        records.len(),
        headers[0],
        columns[0]
    );

    Ok(IngestOutcome::Table {
        table,
        columns,
        rows: records.len(),
    })
}

/// Replay a MySQL-flavoured dump into a new database.
///
/// Statements that SQLite rejects are skipped and counted.
pub fn ingest_sql(path: &Path, database: &Path) -> AppResult<IngestOutcome> {
    let raw = std::fs::read_to_string(path)?;
    let script = mysql_to_sqlite(raw.trim_start_matches('\u{feff}'));

    let mut conn = Connection::open(database)
        .map_err(|e| AppError::Database(format!("Failed to create {:?}: {}", database, e)))?;
    let tx = conn.transaction().map_err(db_error)?;

    let mut executed = 0;
    let mut failed = 0;
    for statement in STATEMENT_END.split(&script) {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        match tx.execute_batch(statement) {
            Ok(()) => executed += 1,
            Err(e) => {
                warn!("Skipping statement in {:?}: {}", path, e);
                failed += 1;
            }
        }
    }
    tx.commit().map_err(db_error)?;

    info!("Executed {} statement(s), {} failed", executed, failed);
    Ok(IngestOutcome::Script { executed, failed })
}

/// Rewrite the MySQL constructs SQLite does not accept.
pub fn mysql_to_sqlite(script: &str) -> String {
    let script = VERSIONED_COMMENT.replace_all(script, "");
    let script = LINE_COMMENT.replace_all(&script, "");
    let script = script.replace('`', "");
    let script = SIZED_INT.replace_all(&script, "INTEGER");
    let script = DOUBLE.replace_all(&script, "REAL");
    let script = FLOAT.replace_all(&script, "REAL");
    let script = TABLE_OPTIONS.replace_all(&script, ");");
    TABLE_LOCKS.replace_all(&script, "").into_owned()
}

/// Normalize a header or file stem to a snake_case identifier.
///
/// `Student Name` becomes `student_name`, `Year (2020)` becomes `year_2020`
/// and a name with no usable characters becomes `unnamed_col`.
pub fn clean_identifier(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let replaced = NON_IDENT.replace_all(&lowered, "_");
    let cleaned = replaced.trim_matches('_');
    if cleaned.is_empty() {
        "unnamed_col".to_string()
    } else {
        cleaned.to_string()
    }
}

fn unique_columns(headers: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .iter()
        .map(|header| {
            let base = clean_identifier(header);
            let mut name = base.clone();
            let mut n = 2;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            name
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affinity {
    Integer,
    Real,
    Text,
}

impl Affinity {
    fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> Self {
        let mut affinity = None;
        for cell in cells.map(str::trim).filter(|c| !c.is_empty()) {
            let this = if cell.parse::<i64>().is_ok() {
                Affinity::Integer
            } else if cell.parse::<f64>().is_ok() {
                Affinity::Real
            } else {
                return Affinity::Text;
            };
            affinity = match (affinity, this) {
                (Some(Affinity::Real), _) | (_, Affinity::Real) => Some(Affinity::Real),
                _ => Some(Affinity::Integer),
            };
        }
        affinity.unwrap_or(Affinity::Text)
    }

    fn as_sql(self) -> &'static str {
        match self {
            Affinity::Integer => "INTEGER",
            Affinity::Real => "REAL",
            Affinity::Text => "TEXT",
        }
    }

    fn convert(self, cell: &str) -> SqlValue {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return SqlValue::Null;
        }
        match self {
            Affinity::Integer => trimmed
                .parse()
                .map(SqlValue::Integer)
                .unwrap_or_else(|_| SqlValue::Text(cell.to_string())),
            Affinity::Real => trimmed
                .parse()
                .map(SqlValue::Real)
                .unwrap_or_else(|_| SqlValue::Text(cell.to_string())),
            Affinity::Text => SqlValue::Text(cell.to_string()),
        }
    }
}

fn db_error(e: rusqlite::Error) -> AppError {
    AppError::Database(e.to_string())
}

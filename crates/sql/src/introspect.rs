//! Schema introspection: tables, columns and representative values.

use crate::catalog::Skipped;
use quarry_core::{AppError, AppResult};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::Serialize;

/// Rendered in place of the schema map when no table exists anywhere.
pub const NO_TABLES_SENTINEL: &str = "(No tables found)";

/// Separator between rendered table entries.
pub const ENTRY_SEPARATOR: &str = "\n---------------------\n";

/// How many example values to sample per column and how long they may be.
#[derive(Debug, Clone, Copy)]
pub struct IntrospectOptions {
    pub sample_values: usize,
    pub sample_value_chars: usize,
}

impl Default for IntrospectOptions {
    fn default() -> Self {
        Self {
            sample_values: 3,
            sample_value_chars: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    /// Most frequent non-null values, most frequent first, already truncated
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableProfile {
    pub alias: String,
    pub table: String,
    pub columns: Vec<ColumnProfile>,
}

impl TableProfile {
    /// `alias.table`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.alias, self.table)
    }

    fn render(&self) -> String {
        let mut out = format!("TABLE: {}\nCOLUMNS:", self.qualified_name());
        for column in &self.columns {
            out.push_str("\n- ");
            out.push_str(&column.name);
            if !column.examples.is_empty() {
                out.push_str(&format!(" (e.g. {})", column.examples.join(", ")));
            }
        }
        out
    }
}

/// The schema map handed to query generation.
///
/// Built once and never modified afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaMap {
    tables: Vec<TableProfile>,
    skipped: Vec<Skipped>,
    #[serde(skip)]
    rendered: String,
}

impl SchemaMap {
    pub fn from_tables(tables: Vec<TableProfile>, skipped: Vec<Skipped>) -> Self {
        let rendered = if tables.is_empty() {
            NO_TABLES_SENTINEL.to_string()
        } else {
            tables
                .iter()
                .map(TableProfile::render)
                .collect::<Vec<_>>()
                .join(ENTRY_SEPARATOR)
        };

        Self {
            tables,
            skipped,
            rendered,
        }
    }

    /// Introspect every user table of the attached databases named by `aliases`.
    ///
    /// An alias or table that cannot be read is recorded as skipped and the
    /// rest of the walk continues.
    pub fn build(conn: &Connection, aliases: &[String], options: IntrospectOptions) -> Self {
        let mut tables = Vec::new();
        let mut skipped = Vec::new();

        for alias in aliases {
            let names = match list_tables(conn, alias) {
                Ok(names) => names,
                Err(e) => {
                    tracing::warn!("Skipping database '{}': {}", alias, e);
                    skipped.push(Skipped::new(alias.clone(), e.to_string()));
                    continue;
                }
            };

            for table in names {
                match profile_table(conn, alias, &table, options) {
                    Ok(profile) => tables.push(profile),
                    Err(e) => {
                        let target = format!("{}.{}", alias, table);
                        tracing::warn!("Skipping table '{}': {}", target, e);
                        skipped.push(Skipped::new(target, e.to_string()));
                    }
                }
            }
        }

        tracing::info!(
            "Schema map built: {} table(s), {} skipped",
            tables.len(),
            skipped.len()
        );

        Self::from_tables(tables, skipped)
    }

    pub fn tables(&self) -> &[TableProfile] {
        &self.tables
    }

    pub fn skipped(&self) -> &[Skipped] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// The text representation given to the model.
    pub fn render(&self) -> &str {
        &self.rendered
    }
}

/// Double-quote an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn list_tables(conn: &Connection, alias: &str) -> AppResult<Vec<String>> {
    let sql = format!(
        "SELECT name FROM {}.sqlite_master WHERE type = 'table' ORDER BY name",
        quote_ident(alias)
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| AppError::Introspection(format!("cannot list tables: {}", e)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| AppError::Introspection(format!("cannot list tables: {}", e)))?;

    Ok(names
        .into_iter()
        .filter(|name| !name.starts_with("sqlite_"))
        .collect())
}

fn profile_table(
    conn: &Connection,
    alias: &str,
    table: &str,
    options: IntrospectOptions,
) -> AppResult<TableProfile> {
    let sql = format!(
        "PRAGMA {}.table_info({})",
        quote_ident(alias),
        quote_ident(table)
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| AppError::Introspection(format!("cannot read columns: {}", e)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| AppError::Introspection(format!("cannot read columns: {}", e)))?;

    if names.is_empty() {
        return Err(AppError::Introspection("table has no columns".to_string()));
    }

    let columns = names
        .into_iter()
        .map(|name| {
            let examples = match sample_values(conn, alias, table, &name, options) {
                Ok(values) => values,
                Err(e) => {
                    tracing::debug!("No samples for {}.{}.{}: {}", alias, table, name, e);
                    Vec::new()
                }
            };
            ColumnProfile { name, examples }
        })
        .collect();

    Ok(TableProfile {
        alias: alias.to_string(),
        table: table.to_string(),
        columns,
    })
}

/// Most frequent non-null values of a column, ties broken by value.
fn sample_values(
    conn: &Connection,
    alias: &str,
    table: &str,
    column: &str,
    options: IntrospectOptions,
) -> rusqlite::Result<Vec<String>> {
    if options.sample_values == 0 {
        return Ok(Vec::new());
    }

    let col = quote_ident(column);
    let sql = format!(
        "SELECT {col}, COUNT(*) AS quarry_freq FROM {alias}.{table} WHERE {col} IS NOT NULL \
         GROUP BY {col} ORDER BY quarry_freq DESC, {col} LIMIT {limit}",
        col = col,
        alias = quote_ident(alias),
        table = quote_ident(table),
        limit = options.sample_values,
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut values = Vec::new();
    while let Some(row) = rows.next()? {
        if let Some(text) = display_value(row.get_ref(0)?) {
            values.push(truncate(&text, options.sample_value_chars));
        }
    }
    Ok(values)
}

fn display_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).to_string()),
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() > max_chars {
        let head: String = value.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "ATTACH DATABASE ':memory:' AS students;
             CREATE TABLE students.students (name TEXT, department TEXT, year INTEGER);
             INSERT INTO students.students VALUES
                ('Ana', 'BDS', 1), ('Bo', 'BDS', 1), ('Cy', 'BDS', 2),
                ('Di', 'BDS', 2), ('Ed', 'BDS', 3), ('Fa', 'CS', 1),
                ('Gu', 'CS', 3), ('Hu', 'CS', NULL),
                ('Ix', 'Computational Linguistics', 4);
             ATTACH DATABASE ':memory:' AS empty;",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_build_profiles_columns_with_examples() {
        let conn = session();
        let map = SchemaMap::build(
            &conn,
            &["students".to_string()],
            IntrospectOptions::default(),
        );

        assert_eq!(map.tables().len(), 1);
        let table = &map.tables()[0];
        assert_eq!(table.qualified_name(), "students.students");

        let department = &table.columns[1];
        assert_eq!(department.name, "department");
        assert_eq!(department.examples, vec!["BDS", "CS", "Computational L..."]);

        let year = &table.columns[2];
        assert_eq!(year.examples, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_render_format() {
        let conn = session();
        let map = SchemaMap::build(
            &conn,
            &["students".to_string()],
            IntrospectOptions {
                sample_values: 2,
                sample_value_chars: 15,
            },
        );

        let expected = "TABLE: students.students\nCOLUMNS:\n\
                        - name (e.g. Ana, Bo)\n\
                        - department (e.g. BDS, CS)\n\
                        - year (e.g. 1, 2)";
        assert_eq!(map.render(), expected);
    }

    #[test]
    fn test_entries_are_separated() {
        let conn = session();
        conn.execute_batch("CREATE TABLE students.courses (title TEXT);")
            .unwrap();

        let map = SchemaMap::build(
            &conn,
            &["students".to_string()],
            IntrospectOptions::default(),
        );
        assert_eq!(map.tables().len(), 2);
        assert_eq!(map.render().matches(ENTRY_SEPARATOR).count(), 1);
        assert!(map
            .render()
            .starts_with("TABLE: students.courses\nCOLUMNS:\n- title\n---"));
    }

    #[test]
    fn test_no_tables_gives_sentinel() {
        let conn = session();
        let map = SchemaMap::build(&conn, &["empty".to_string()], IntrospectOptions::default());
        assert!(map.is_empty());
        assert_eq!(map.render(), NO_TABLES_SENTINEL);

        let map = SchemaMap::build(&conn, &[], IntrospectOptions::default());
        assert_eq!(map.render(), NO_TABLES_SENTINEL);
    }

    #[test]
    fn test_unknown_alias_is_skipped() {
        let conn = session();
        let map = SchemaMap::build(
            &conn,
            &["missing".to_string(), "students".to_string()],
            IntrospectOptions::default(),
        );

        assert_eq!(map.tables().len(), 1);
        assert_eq!(map.skipped().len(), 1);
        assert_eq!(map.skipped()[0].target, "missing");
    }

    #[test]
    fn test_awkward_identifiers() {
        let conn = session();
        conn.execute_batch(
            "CREATE TABLE students.\"Exam Results\" (\"Student Name\" TEXT, \"Score\" REAL);
             INSERT INTO students.\"Exam Results\" VALUES ('Ana', 91.5), ('Bo', 91.5);",
        )
        .unwrap();

        let map = SchemaMap::build(
            &conn,
            &["students".to_string()],
            IntrospectOptions::default(),
        );
        let exam = map
            .tables()
            .iter()
            .find(|t| t.table == "Exam Results")
            .unwrap();
        assert_eq!(exam.columns[0].name, "Student Name");
        assert_eq!(exam.columns[1].examples, vec!["91.5"]);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 15), "short");
        assert_eq!(truncate("exactly fifteen", 15), "exactly fifteen");
        assert_eq!(truncate("Computational Linguistics", 15), "Computational L...");
        assert_eq!(truncate("çççççççççççççççç", 15), "ççççççççççççççç...");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}

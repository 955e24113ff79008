//! Running sanitized queries against the attached databases.

use crate::catalog::Catalog;
use crate::result::{json_value, QueryResult, SourceOrigin};
use crate::sanitize::top_level_words;
use quarry_core::{AppError, AppResult};
use rusqlite::Connection;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Virtual machine steps between deadline checks.
const DEADLINE_CHECK_OPS: i32 = 1_000;

/// What running a query produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// At least one row
    Rows(QueryResult),
    /// The query ran and matched nothing
    Empty { columns: Vec<String> },
    /// The query could not run; carries the reason for operators
    Failed(String),
}

/// Attribute a query to the first alias that occurs anywhere in its text.
///
/// A substring test, not a parse: an alias that is a substring of another
/// alias, a column or a literal can be credited instead of the database
/// actually read.
pub fn resolve_origin(sql: &str, aliases: &[String]) -> SourceOrigin {
    aliases
        .iter()
        .find(|alias| sql.contains(alias.as_str()))
        .map(|alias| SourceOrigin::Database(alias.clone()))
        .unwrap_or(SourceOrigin::Unknown)
}

/// Append `LIMIT n` unless the outermost query already has a `LIMIT`.
///
/// A `LIMIT` inside a subquery, a literal, a quoted name or a longer
/// identifier such as `time_limit` does not count.
pub fn apply_row_limit(sql: &str, limit: usize) -> String {
    if top_level_words(sql)
        .iter()
        .any(|word| word.eq_ignore_ascii_case("limit"))
    {
        sql.to_string()
    } else {
        format!("{} LIMIT {}", sql.trim_end(), limit)
    }
}

/// Whether the text begins with a `SELECT` or `WITH` keyword.
pub fn is_read_query(sql: &str) -> bool {
    let first: String = sql
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    first.eq_ignore_ascii_case("select") || first.eq_ignore_ascii_case("with")
}

/// Executes queries on the blocking pool, one connection per query.
#[derive(Debug, Clone)]
pub struct Executor {
    catalog: Arc<Catalog>,
    row_limit: usize,
    timeout: Duration,
}

impl Executor {
    pub fn new(catalog: Arc<Catalog>, row_limit: usize, timeout: Duration) -> Self {
        Self {
            catalog,
            row_limit,
            timeout,
        }
    }

    /// Run a sanitized query.
    ///
    /// Every failure, including a timeout, becomes
    /// [`ExecutionOutcome::Failed`]; nothing here returns an error.
    pub async fn execute(&self, sql: &str) -> ExecutionOutcome {
        if !is_read_query(sql) {
            return ExecutionOutcome::Failed(format!("not a read query: {:?}", truncate(sql)));
        }

        let sql = apply_row_limit(sql, self.row_limit);
        let catalog = Arc::clone(&self.catalog);
        let deadline = Instant::now() + self.timeout;

        let task = tokio::task::spawn_blocking(move || -> AppResult<QueryResult> {
            let conn = catalog.connect()?;
            run_query_until(&conn, &sql, deadline)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(result))) if result.is_empty() => ExecutionOutcome::Empty {
                columns: result.columns,
            },
            Ok(Ok(Ok(result))) => ExecutionOutcome::Rows(result),
            Ok(Ok(Err(e))) => ExecutionOutcome::Failed(e.to_string()),
            Ok(Err(e)) => ExecutionOutcome::Failed(format!("query task failed: {}", e)),
            Err(_) => ExecutionOutcome::Failed(
                AppError::Timeout(format!("query exceeded {:?}", self.timeout)).to_string(),
            ),
        }
    }
}

/// [`run_query`], aborted by SQLite itself once `deadline` passes.
///
/// The blocking thread is released even when the caller stopped waiting
/// before the statement began.
pub fn run_query_until(conn: &Connection, sql: &str, deadline: Instant) -> AppResult<QueryResult> {
    if Instant::now() >= deadline {
        return Err(AppError::Timeout("deadline passed before the query started".to_string()));
    }

    conn.progress_handler(DEADLINE_CHECK_OPS, Some(move || Instant::now() >= deadline));
    let result = run_query(conn, sql);
    conn.progress_handler(DEADLINE_CHECK_OPS, None::<fn() -> bool>);

    result.map_err(|e| match e {
        AppError::Execution(_) if Instant::now() >= deadline => {
            AppError::Timeout(format!("query interrupted at its deadline: {}", e))
        }
        other => other,
    })
}

/// Prepare and fully fetch a single statement.
pub fn run_query(conn: &Connection, sql: &str) -> AppResult<QueryResult> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| AppError::Execution(e.to_string()))?;

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt
        .query([])
        .map_err(|e| AppError::Execution(e.to_string()))?;
    while let Some(row) = cursor
        .next()
        .map_err(|e| AppError::Execution(e.to_string()))?
    {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            let value = row
                .get_ref(i)
                .map_err(|e| AppError::Execution(e.to_string()))?;
            values.push(json_value(value));
        }
        rows.push(values);
    }

    Ok(QueryResult::new(columns, rows))
}

fn truncate(sql: &str) -> String {
    sql.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Anchor;
    use crate::catalog::DatabaseHandle;
    use serde_json::json;
    use tempfile::TempDir;

    fn fixture(rows: usize) -> (TempDir, Arc<Catalog>) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("students.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE students (name TEXT, department TEXT);")
            .unwrap();
        for i in 0..rows {
            let department = if i % 2 == 0 { "BDS" } else { "CS" };
            conn.execute(
                "INSERT INTO students VALUES (?1, ?2)",
                rusqlite::params![format!("student{}", i), department],
            )
            .unwrap();
        }

        let catalog = Catalog::new(
            Anchor::Memory,
            vec![DatabaseHandle {
                alias: "students".to_string(),
                path,
            }],
        );
        (temp, Arc::new(catalog))
    }

    fn executor(catalog: Arc<Catalog>) -> Executor {
        Executor::new(catalog, 20, Duration::from_secs(5))
    }

    #[test]
    fn test_resolve_origin_first_match_wins() {
        let aliases = vec!["sales".to_string(), "sales_2024".to_string()];
        assert_eq!(
            resolve_origin("SELECT * FROM sales_2024.orders", &aliases),
            SourceOrigin::Database("sales".to_string())
        );
        assert_eq!(
            resolve_origin("SELECT 1", &aliases),
            SourceOrigin::Unknown
        );
    }

    #[test]
    fn test_apply_row_limit() {
        assert_eq!(apply_row_limit("SELECT 1", 20), "SELECT 1 LIMIT 20");
        assert_eq!(apply_row_limit("SELECT 1 limit 5", 20), "SELECT 1 limit 5");
        assert_eq!(
            apply_row_limit("SELECT time_limit FROM t", 20),
            "SELECT time_limit FROM t LIMIT 20"
        );
        assert_eq!(
            apply_row_limit("SELECT name FROM t WHERE status = 'unlimited'", 20),
            "SELECT name FROM t WHERE status = 'unlimited' LIMIT 20"
        );
        assert_eq!(
            apply_row_limit("SELECT x FROM t WHERE id IN (SELECT id FROM u LIMIT 40)", 20),
            "SELECT x FROM t WHERE id IN (SELECT id FROM u LIMIT 40) LIMIT 20"
        );
    }

    #[test]
    fn test_is_read_query() {
        assert!(is_read_query("SELECT 1"));
        assert!(is_read_query("  with t as (select 1) select * from t"));
        assert!(!is_read_query("DELETE FROM t"));
        assert!(!is_read_query("SELECTED things"));
        assert!(!is_read_query("I cannot answer that."));
        assert!(!is_read_query(""));
    }

    #[tokio::test]
    async fn test_default_limit_caps_rows() {
        let (_temp, catalog) = fixture(50);
        match executor(catalog)
            .execute("SELECT name FROM students.students")
            .await
        {
            ExecutionOutcome::Rows(result) => assert_eq!(result.len(), 20),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    fn jobs_fixture() -> (TempDir, Arc<Catalog>) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jobs.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE jobs (name TEXT, time_limit INTEGER, status TEXT);")
            .unwrap();
        for i in 0..50 {
            conn.execute(
                "INSERT INTO jobs VALUES (?1, ?2, 'unlimited')",
                rusqlite::params![format!("job{}", i), i],
            )
            .unwrap();
        }

        let catalog = Catalog::new(
            Anchor::Memory,
            vec![DatabaseHandle {
                alias: "jobs".to_string(),
                path,
            }],
        );
        (temp, Arc::new(catalog))
    }

    #[tokio::test]
    async fn test_limit_lookalikes_still_get_the_cap() {
        let (_temp, catalog) = jobs_fixture();
        let exec = executor(catalog);

        for sql in [
            "SELECT name, time_limit FROM jobs.jobs",
            "SELECT name FROM jobs.jobs WHERE status = 'unlimited'",
            "SELECT name FROM jobs.jobs WHERE rowid IN (SELECT rowid FROM jobs.jobs LIMIT 40)",
        ] {
            match exec.execute(sql).await {
                ExecutionOutcome::Rows(result) => assert_eq!(result.len(), 20, "{}", sql),
                other => panic!("unexpected outcome for {}: {:?}", sql, other),
            }
        }
    }

    #[test]
    fn test_run_query_until_stops_at_deadline() {
        let conn = Connection::open_in_memory().unwrap();
        let endless = "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) \
                       SELECT COUNT(*) FROM n";

        let err = run_query_until(&conn, endless, Instant::now() + Duration::from_millis(30))
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));

        let err = run_query_until(&conn, "SELECT 1", Instant::now()).unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));

        let result =
            run_query_until(&conn, "SELECT 1", Instant::now() + Duration::from_secs(5)).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_limit_is_honored() {
        let (_temp, catalog) = fixture(50);
        let exec = executor(catalog);

        for n in [1usize, 7, 20] {
            let sql = format!("SELECT name FROM students.students LIMIT {}", n);
            match exec.execute(&sql).await {
                ExecutionOutcome::Rows(result) => assert_eq!(result.len(), n),
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_rows_carry_columns_and_values() {
        let (_temp, catalog) = fixture(4);
        let outcome = executor(catalog)
            .execute(
                "SELECT department, COUNT(*) AS total FROM students.students \
                 GROUP BY department ORDER BY total DESC, department",
            )
            .await;

        let ExecutionOutcome::Rows(result) = outcome else {
            panic!("expected rows");
        };
        assert_eq!(result.columns, vec!["department", "total"]);
        assert_eq!(
            result.rows,
            vec![vec![json!("BDS"), json!(2)], vec![json!("CS"), json!(2)]]
        );
    }

    #[tokio::test]
    async fn test_empty_result_is_not_an_error() {
        let (_temp, catalog) = fixture(3);
        let outcome = executor(catalog)
            .execute("SELECT name FROM students.students WHERE department = 'LAW'")
            .await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Empty {
                columns: vec!["name".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_errors_are_contained() {
        let (_temp, catalog) = fixture(3);
        let exec = executor(catalog);

        assert!(matches!(
            exec.execute("SELECT nope FROM students.students").await,
            ExecutionOutcome::Failed(_)
        ));
        assert!(matches!(
            exec.execute("SELEC name FROM students.students").await,
            ExecutionOutcome::Failed(_)
        ));
        assert!(matches!(
            exec.execute("DELETE FROM students.students").await,
            ExecutionOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_writes_are_refused_by_the_session() {
        let (_temp, catalog) = fixture(3);
        let outcome = executor(catalog)
            .execute("WITH x AS (SELECT 1) INSERT INTO students.students SELECT 'a', 'b' FROM x")
            .await;
        assert!(matches!(outcome, ExecutionOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_an_execution_failure() {
        let (_temp, catalog) = fixture(1);
        let exec = Executor::new(catalog, 20, Duration::from_millis(50));

        let outcome = exec
            .execute(
                "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) \
                 SELECT COUNT(*) FROM n",
            )
            .await;
        match outcome {
            ExecutionOutcome::Failed(reason) => assert!(reason.contains("Timed out")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}

//! Query results and their attribution.

use rusqlite::types::ValueRef;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Rows returned by one query, in fetch order.
///
/// Never modified after the fetch; serializes as a list of
/// `{column: value}` records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Rows as column-name keyed records, in column order.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows.iter().map(|row| self.record(row)).collect()
    }

    fn record(&self, row: &[Value]) -> Map<String, Value> {
        self.columns
            .iter()
            .cloned()
            .zip(row.iter().cloned())
            .collect()
    }
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&self.record(row))?;
        }
        seq.end()
    }
}

/// Convert a SQLite value into JSON without losing its type.
pub fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} byte blob>", b.len())),
    }
}

/// Which database a query was attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    /// An attached database, by alias
    Database(String),
    /// The query names no known alias
    Unknown,
    /// The query could not be produced or run
    Error,
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(alias) => write!(f, "{}.db", alias),
            Self::Unknown => f.write_str("Unknown"),
            Self::Error => f.write_str("Error"),
        }
    }
}

impl Serialize for SourceOrigin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> QueryResult {
        QueryResult::new(
            vec!["department".to_string(), "total".to_string()],
            vec![
                vec![json!("BDS"), json!(5)],
                vec![json!("CS"), json!(3)],
            ],
        )
    }

    #[test]
    fn test_records_keep_column_order() {
        let records = sample().records();
        assert_eq!(records.len(), 2);
        let keys: Vec<_> = records[0].keys().cloned().collect();
        assert_eq!(keys, vec!["department", "total"]);
        assert_eq!(records[1]["total"], json!(3));
    }

    #[test]
    fn test_serializes_as_records() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            json,
            r#"[{"department":"BDS","total":5},{"department":"CS","total":3}]"#
        );
    }

    #[test]
    fn test_json_value() {
        assert_eq!(json_value(ValueRef::Null), Value::Null);
        assert_eq!(json_value(ValueRef::Integer(7)), json!(7));
        assert_eq!(json_value(ValueRef::Real(2.5)), json!(2.5));
        assert_eq!(json_value(ValueRef::Real(f64::NAN)), Value::Null);
        assert_eq!(json_value(ValueRef::Text(b"BDS")), json!("BDS"));
        assert_eq!(json_value(ValueRef::Blob(&[1, 2, 3])), json!("<3 byte blob>"));
    }

    #[test]
    fn test_origin_display() {
        assert_eq!(SourceOrigin::Database("students".into()).to_string(), "students.db");
        assert_eq!(SourceOrigin::Unknown.to_string(), "Unknown");
        assert_eq!(SourceOrigin::Error.to_string(), "Error");
        assert_eq!(
            serde_json::to_value(SourceOrigin::Database("hr".into())).unwrap(),
            json!("hr.db")
        );
    }
}

//! Traceability records returned with every answer.

use quarry_sql::{QueryResult, SourceOrigin};
use serde::Serialize;
use std::fmt;

/// What supported an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceRecord {
    /// Rows returned by the SQL path, exactly as fetched
    Sql {
        #[serde(rename = "originDb")]
        origin_db: SourceOrigin,
        rows: QueryResult,
    },
    /// A retrieved document passage
    Text {
        #[serde(rename = "originDocument")]
        origin_document: String,
        excerpt: String,
    },
}

impl SourceRecord {
    /// Database or document the record points at.
    pub fn origin(&self) -> String {
        match self {
            Self::Sql { origin_db, .. } => origin_db.to_string(),
            Self::Text {
                origin_document, ..
            } => origin_document.clone(),
        }
    }
}

impl fmt::Display for SourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql { origin_db, rows } => {
                write!(f, "[sql] {} ({} row(s))", origin_db, rows.len())
            }
            Self::Text {
                origin_document,
                excerpt,
            } => write!(f, "[text] {}: {}", origin_document, excerpt),
        }
    }
}

/// Collapse whitespace runs and cap the text at `max_chars` characters.
///
/// `...` is appended only when something was cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_excerpt_collapses_whitespace() {
        assert_eq!(excerpt("  a\n\n b\t c  ", 400), "a b c");
    }

    #[test]
    fn test_excerpt_truncates_on_characters() {
        assert_eq!(excerpt("abcdef", 3), "abc...");
        assert_eq!(excerpt("abc", 3), "abc");
        assert_eq!(excerpt("ééééé", 2), "éé...");
    }

    #[test]
    fn test_sql_record_json() {
        let record = SourceRecord::Sql {
            origin_db: SourceOrigin::Database("students".into()),
            rows: QueryResult::new(vec!["total".into()], vec![vec![json!(5)]]),
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"kind": "sql", "originDb": "students.db", "rows": [{"total": 5}]})
        );
        assert_eq!(record.origin(), "students.db");
    }

    #[test]
    fn test_text_record_json() {
        let record = SourceRecord::Text {
            origin_document: "handbook.md".into(),
            excerpt: "Refunds take 14 days.".into(),
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"kind": "text", "originDocument": "handbook.md", "excerpt": "Refunds take 14 days."})
        );
        assert_eq!(record.to_string(), "[text] handbook.md: Refunds take 14 days.");
    }
}

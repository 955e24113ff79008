//! The cheap gate in front of the SQL path.

/// Vocabulary that marks a question as likely answerable from tables.
pub const STRUCTURED_KEYWORDS: &[&str] = &[
    // aggregation
    "total",
    "sum",
    "average",
    "count",
    "max",
    "min",
    "calculate",
    "value",
    // listing
    "list",
    "table",
    "show me",
    "how many",
    // analysis
    "distribution",
    "breakdown",
    "percentage",
    "proportion",
    "ratio",
    "trend",
    "compare",
    "difference",
    "highest",
    "lowest",
    "rank",
    "top",
    "bottom",
    "common",
    "popular",
];

/// Decides whether a question should try the SQL path first.
///
/// A wrong answer is acceptable: a missed structured question still reaches
/// retrieval, and a false positive falls back to it.
pub trait QuestionClassifier: Send + Sync {
    fn is_structured(&self, question: &str) -> bool;
}

/// Case-insensitive substring match against a keyword list.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    keywords: Vec<String>,
}

impl KeywordClassifier {
    /// The built-in vocabulary.
    pub fn new() -> Self {
        Self::with_extra(Vec::<String>::new())
    }

    /// The built-in vocabulary plus `extra` words.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keywords: Vec<String> = STRUCTURED_KEYWORDS.iter().map(|k| k.to_string()).collect();
        keywords.extend(
            extra
                .into_iter()
                .map(|k| k.into().trim().to_lowercase())
                .filter(|k| !k.is_empty()),
        );
        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionClassifier for KeywordClassifier {
    fn is_structured(&self, question: &str) -> bool {
        let question = question.to_lowercase();
        self.keywords.iter().any(|k| question.contains(k.as_str()))
    }
}

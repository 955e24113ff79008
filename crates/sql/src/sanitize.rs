//! Extraction of a single query from free-form model output.
//!
//! Model replies arrive wrapped in markdown fences, preceded by prose,
//! quoted with MySQL backticks or followed by further statements. The
//! functions here reduce such text to one statement. The result is still
//! untrusted: the executor checks it again and the session is read-only.

use once_cell::sync::Lazy;
use regex::Regex;

/// A fenced block; the language tag only counts when a newline follows it.
static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:[A-Za-z0-9_+-]*[^\S\n]*\n)?(.*?)```").expect("valid fence regex")
});

/// Leftover fence markers, e.g. from an unterminated block.
static FENCE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```(?:sqlite|sql)?").expect("valid fence marker regex"));

static SELECT_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bSELECT\b").expect("valid select regex"));

/// Words that follow "select" in prose but never open a projection list.
const PROSE_AFTER_SELECT: &[&str] = &[
    "the", "a", "an", "this", "that", "these", "those", "your", "our", "some", "each", "every",
    "which", "what", "them", "it", "from",
];

/// `WITH [RECURSIVE] name [(columns)] AS [[NOT] MATERIALIZED] (`
static CTE_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\bWITH\s+(?:RECURSIVE\s+)?(?:"[^"]+"|`[^`]+`|\[[^\]]+\]|\w+)\s*(?:\([^)]*\)\s*)?AS\s*(?:(?:NOT\s+)?MATERIALIZED\s*)?\("#,
    )
    .expect("valid cte regex")
});

/// Reduce raw model output to a single query.
///
/// 1. Prefer the first fenced block holding a query; drop stray fence markers.
/// 2. Cut everything before the first `SELECT`, or before a `WITH` that
///    opens a common table expression.
/// 3. Convert backtick-quoted identifiers to double quotes, outside string
///    literals.
/// 4. Drop comments and stop at the first statement terminator outside
///    quotes.
///
/// Text without any query start is returned trimmed, for the executor to
/// reject.
pub fn sanitize_sql(raw: &str) -> String {
    let body = fenced_body(raw).unwrap_or(raw);
    let body = FENCE_MARKER.replace_all(body, "");

    let from_start = match query_start(&body) {
        Some(start) => &body[start..],
        None => &body[..],
    };

    first_statement(from_start).trim().to_string()
}

/// Byte offset of the first query start in `text`, if any.
///
/// A `SELECT` followed by prose ("select the names for you:") is passed
/// over in favour of a later one; it is only used when nothing better
/// follows.
pub fn query_start(text: &str) -> Option<usize> {
    let mut selects = SELECT_START.find_iter(text).peekable();
    let first = selects.peek().map(|m| m.start());
    let select = selects
        .find(|m| opens_projection(&text[m.end()..]))
        .map(|m| m.start())
        .or(first);
    let cte = CTE_START.find(text).map(|m| m.start());
    match (select, cte) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn opens_projection(after: &str) -> bool {
    let line = after.lines().next().unwrap_or("").trim();
    if line.ends_with(':') {
        return false;
    }
    let next: String = line
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase();
    !PROSE_AFTER_SELECT.contains(&next.as_str())
}

fn fenced_body(raw: &str) -> Option<&str> {
    let blocks: Vec<&str> = FENCED_BLOCK
        .captures_iter(raw)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    blocks
        .iter()
        .find(|block| query_start(block).is_some())
        .or_else(|| blocks.first())
        .copied()
}

#[derive(Clone, Copy, PartialEq)]
enum Lexer {
    Code,
    Literal,
    Identifier { close: char },
    LineComment,
    BlockComment,
}

/// Copy `text` up to the first top-level `;`, dropping comments and
/// turning backtick quoting into double quotes.
fn first_statement(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut state = Lexer::Code;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            Lexer::Code => match ch {
                ';' => break,
                '\'' => {
                    out.push(ch);
                    state = Lexer::Literal;
                }
                '"' => {
                    out.push(ch);
                    state = Lexer::Identifier { close: '"' };
                }
                '`' => {
                    out.push('"');
                    state = Lexer::Identifier { close: '`' };
                }
                '[' => {
                    out.push(ch);
                    state = Lexer::Identifier { close: ']' };
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = Lexer::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push(' ');
                    state = Lexer::BlockComment;
                }
                _ => out.push(ch),
            },
            Lexer::Literal => {
                out.push(ch);
                if ch == '\'' {
                    state = Lexer::Code;
                }
            }
            Lexer::Identifier { close } => {
                if ch == close {
                    out.push(if close == '`' { '"' } else { ch });
                    state = Lexer::Code;
                } else {
                    out.push(ch);
                }
            }
            Lexer::LineComment => {
                if ch == '\n' {
                    out.push('\n');
                    state = Lexer::Code;
                }
            }
            Lexer::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = Lexer::Code;
                }
            }
        }
    }

    out
}

/// Bare words of `sql` at nesting depth zero, skipping literals, quoted
/// identifiers and comments.
///
/// ```
/// use quarry_sql::sanitize::top_level_words;
///
/// let words = top_level_words("SELECT time_limit FROM t WHERE x IN (SELECT y LIMIT 2)");
/// assert_eq!(words, vec!["SELECT", "time_limit", "FROM", "t", "WHERE", "x", "IN"]);
/// ```
pub fn top_level_words(sql: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut state = Lexer::Code;
    let mut depth = 0usize;
    let mut word_start: Option<usize> = None;
    let mut chars = sql.char_indices().peekable();

    while let Some((at, ch)) = chars.next() {
        let word_char = ch.is_alphanumeric() || ch == '_';
        if state == Lexer::Code && word_char {
            word_start.get_or_insert(at);
            continue;
        }
        if let Some(start) = word_start.take() {
            if depth == 0 {
                words.push(&sql[start..at]);
            }
        }

        let next = chars.peek().map(|&(_, n)| n);
        match state {
            Lexer::Code => match ch {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                '\'' => state = Lexer::Literal,
                '"' => state = Lexer::Identifier { close: '"' },
                '`' => state = Lexer::Identifier { close: '`' },
                '[' => state = Lexer::Identifier { close: ']' },
                '-' if next == Some('-') => {
                    chars.next();
                    state = Lexer::LineComment;
                }
                '/' if next == Some('*') => {
                    chars.next();
                    state = Lexer::BlockComment;
                }
                _ => {}
            },
            Lexer::Literal if ch == '\'' => state = Lexer::Code,
            Lexer::Identifier { close } if ch == close => state = Lexer::Code,
            Lexer::LineComment if ch == '\n' => state = Lexer::Code,
            Lexer::BlockComment if ch == '*' && next == Some('/') => {
                chars.next();
                state = Lexer::Code;
            }
            _ => {}
        }
    }

    if let (Some(start), 0) = (word_start, depth) {
        words.push(&sql[start..]);
    }
    words
}

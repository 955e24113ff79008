//! Document parsing and text extraction.

use quarry_core::{AppError, AppResult};
use std::fs;
use std::path::Path;

/// Document formats the learner understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Html,
    PlainText,
}

impl ContentType {
    /// Detect the content type from the file extension.
    ///
    /// Returns `None` for files the learner does not handle, including the
    /// tabular inputs and databases that share the docs directory.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "txt" | "text" | "rst" => Some(Self::PlainText),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::PlainText => "text",
        }
    }
}

/// Read a document and return its cleaned text.
pub fn parse_file(path: &Path, content_type: ContentType) -> AppResult<String> {
    let bytes = fs::read(path)
        .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", path, e)))?;

    if bytes.contains(&0) {
        return Err(AppError::Knowledge(format!(
            "{:?} looks like a binary file",
            path
        )));
    }

    let raw = String::from_utf8(bytes)
        .map_err(|_| AppError::Knowledge(format!("{:?} is not valid UTF-8", path)))?;

    Ok(match content_type {
        ContentType::Markdown => clean_markdown(&raw),
        ContentType::Html => clean_html(&raw),
        ContentType::PlainText => raw.trim().to_string(),
    })
}

/// Drop markdown structure that carries no meaning for retrieval.
fn clean_markdown(text: &str) -> String {
    let mut lines = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }
        if !trimmed.is_empty() && trimmed.chars().all(|c| matches!(c, '-' | '*' | '_' | '=')) {
            continue;
        }

        let content = trimmed.trim_start_matches('#').trim_start();
        let content = content
            .strip_prefix("- ")
            .or_else(|| content.strip_prefix("* "))
            .or_else(|| content.strip_prefix("> "))
            .unwrap_or(content);

        if !content.is_empty() {
            lines.push(content);
        }
    }

    lines.join("\n")
}

/// Strip tags, scripts and styles from HTML, collapsing whitespace.
fn clean_html(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let mut result = String::with_capacity(text.len());
    let mut skip_until: Option<&str> = None;
    let mut in_tag = false;

    for (i, ch) in text.char_indices() {
        if let Some(closing) = skip_until {
            if lower[i..].starts_with(closing) {
                skip_until = None;
                in_tag = true;
            }
            continue;
        }

        match ch {
            '<' => {
                if lower[i..].starts_with("<script") {
                    skip_until = Some("</script");
                } else if lower[i..].starts_with("<style") {
                    skip_until = Some("</style");
                } else {
                    in_tag = true;
                }
                result.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    decode_entities(&result)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_type_detection() {
        assert_eq!(
            ContentType::from_path(Path::new("guide.md")),
            Some(ContentType::Markdown)
        );
        assert_eq!(
            ContentType::from_path(Path::new("INDEX.HTML")),
            Some(ContentType::Html)
        );
        assert_eq!(
            ContentType::from_path(Path::new("notes.txt")),
            Some(ContentType::PlainText)
        );
        assert_eq!(ContentType::from_path(Path::new("students.csv")), None);
        assert_eq!(ContentType::from_path(Path::new("students.db")), None);
        assert_eq!(ContentType::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_clean_markdown() {
        let input = "# Header\n\nSome text\n\n```rust\ncode\n```\n---\n- item one\n> quoted";
        let output = clean_markdown(input);
        assert_eq!(output, "Header\nSome text\ncode\nitem one\nquoted");
    }

    #[test]
    fn test_clean_html() {
        let input = "<html><head><style>p { color: red; }</style></head>\
                     <body><p>Hello <b>world</b></p><script>var x = 1;</script>\
                     <p>Fish &amp; chips</p></body></html>";
        assert_eq!(clean_html(input), "Hello world Fish & chips");
    }

    #[test]
    fn test_clean_html_multibyte() {
        assert_eq!(clean_html("<p>café</p><p>naïve</p>"), "café naïve");
    }

    #[test]
    fn test_parse_file_rejects_binary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blob.txt");
        fs::write(&path, [b'a', 0, b'b']).unwrap();

        assert!(parse_file(&path, ContentType::PlainText).is_err());
    }

    #[test]
    fn test_parse_plain_text() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("policy.txt");
        fs::write(&path, "\n  Refunds within 30 days.  \n").unwrap();

        let text = parse_file(&path, ContentType::PlainText).unwrap();
        assert_eq!(text, "Refunds within 30 days.");
    }
}

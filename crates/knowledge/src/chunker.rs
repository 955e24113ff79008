//! Fixed-size overlapping text chunking.

use crate::types::ChunkCandidate;
use std::path::Path;

/// Split text into overlapping chunks of at most `chunk_size` characters.
///
/// Sizes are counted in characters, not bytes. A chunk ends at the last
/// whitespace inside its window when one exists in the second half of the
/// window, so words are rarely cut. Each chunk records the file it came
/// from and its character offsets.
pub fn chunk_text(
    source_id: &str,
    source_path: &Path,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<ChunkCandidate> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || chunk_size == 0 {
        return vec![];
    }

    let overlap = overlap.min(chunk_size / 2);
    let path = source_path.to_string_lossy().to_string();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let window_end = (start + chunk_size).min(chars.len());
        let end = if window_end == chars.len() {
            window_end
        } else {
            soft_break(&chars, start, window_end)
        };

        let body: String = chars[start..end].iter().collect();
        let body = body.trim();
        if !body.is_empty() {
            chunks.push(ChunkCandidate {
                source_id: source_id.to_string(),
                position: chunks.len() as u32,
                text: body.to_string(),
                metadata: serde_json::json!({
                    "source_path": path,
                    "start": start,
                    "end": end,
                }),
            });
        }

        if end == chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    tracing::debug!(
        "Chunked {} into {} chunks (size: {}, overlap: {})",
        path,
        chunks.len(),
        chunk_size,
        overlap
    );

    chunks
}

fn soft_break(chars: &[char], start: usize, window_end: usize) -> usize {
    let floor = start + (window_end - start) / 2;
    (floor..window_end)
        .rev()
        .find(|&i| chars[i].is_whitespace())
        .map(|i| i + 1)
        .unwrap_or(window_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> &'static Path {
        Path::new("/docs/guide.md")
    }

    #[test]
    fn test_chunk_text_basic() {
        let text = "a".repeat(1000);
        let chunks = chunk_text("src", path(), &text, 200, 50);

        assert!(chunks.len() > 4);
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[1].position, 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 200));
        assert_eq!(chunks[0].metadata["source_path"], "/docs/guide.md");
    }

    #[test]
    fn test_chunk_text_no_overlap() {
        let text = "a".repeat(300);
        let chunks = chunk_text("src", path(), &text, 100, 0);
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("src", path(), "", 100, 10).is_empty());
        assert!(chunk_text("src", path(), "   \n ", 100, 10).is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunk_text("src", path(), "Refund policy: 30 days.", 512, 64);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Refund policy: 30 days.");
    }

    #[test]
    fn test_breaks_on_whitespace() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let chunks = chunk_text("src", path(), text, 20, 0);

        for chunk in &chunks {
            assert!(
                text.split_whitespace().any(|w| chunk.text.ends_with(w)),
                "chunk {:?} ends mid-word",
                chunk.text
            );
        }
    }

    #[test]
    fn test_overlap_repeats_text() {
        let text = "abcdefghijklmnopqrstuvwxyz".repeat(10);
        let chunks = chunk_text("src", path(), &text, 50, 10);

        assert!(chunks.len() >= 2);
        let tail: String = chunks[0].text.chars().skip(40).collect();
        assert!(chunks[1].text.starts_with(&tail));
    }

    #[test]
    fn test_multibyte_text() {
        let text = "é".repeat(250);
        let chunks = chunk_text("src", path(), &text, 100, 10);
        assert!(chunks.iter().all(|c| c.text.chars().all(|ch| ch == 'é')));
    }
}

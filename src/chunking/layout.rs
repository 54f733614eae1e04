//! Layout-aware chunking for paged documents

use crate::error::{CourseMateError, Result};
use crate::model::{ChunkDraft, ChunkSpan};

/// Group each page's lines into chunks.
///
/// Paragraph breaks (blank lines) end a chunk, and a paragraph longer than
/// `max_lines` is cut into consecutive windows of at most `max_lines` lines.
/// Line numbers are 1-based within the page and count blank lines too, so a
/// span always addresses the extracted page text. Output is ordered by
/// (page, line_start).
pub fn chunk_pages<S: AsRef<str>>(pages: &[S], max_lines: usize) -> Result<Vec<ChunkDraft>> {
    let max_lines = max_lines.max(1);
    let mut chunks = Vec::new();

    for (page_idx, page) in pages.iter().enumerate() {
        let page_no = page_idx as u32 + 1;
        let mut run: Vec<(u32, &str)> = Vec::new();

        for (line_idx, line) in page.as_ref().lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                emit_run(page_no, &run, max_lines, &mut chunks);
                run.clear();
            } else {
                run.push((line_idx as u32 + 1, line));
            }
        }
        emit_run(page_no, &run, max_lines, &mut chunks);
    }

    if chunks.is_empty() {
        return Err(CourseMateError::NoExtractableText { pages: pages.len() });
    }

    Ok(chunks)
}

fn emit_run(page: u32, run: &[(u32, &str)], max_lines: usize, chunks: &mut Vec<ChunkDraft>) {
    for window in run.chunks(max_lines) {
        let (Some(first), Some(last)) = (window.first(), window.last()) else {
            continue;
        };
        let text = window
            .iter()
            .map(|(_, line)| *line)
            .collect::<Vec<_>>()
            .join("\n");

        chunks.push(ChunkDraft::spanned(
            text,
            ChunkSpan {
                page,
                line_start: first.0,
                line_end: last.0,
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(chunks: &[ChunkDraft]) -> Vec<(u32, u32, u32)> {
        chunks
            .iter()
            .map(|c| {
                let s = c.span.unwrap();
                (s.page, s.line_start, s.line_end)
            })
            .collect()
    }

    #[test]
    fn test_paragraphs_within_page() {
        let pages = vec!["Title\n\nfirst para line\nsecond para line\n\nlast"];
        let chunks = chunk_pages(&pages, 10).unwrap();

        assert_eq!(spans(&chunks), vec![(1, 1, 1), (1, 3, 4), (1, 6, 6)]);
        assert_eq!(chunks[1].text, "first para line\nsecond para line");
    }

    #[test]
    fn test_long_paragraph_is_windowed() {
        let page = (1..=7).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let chunks = chunk_pages(&[page], 3).unwrap();

        assert_eq!(spans(&chunks), vec![(1, 1, 3), (1, 4, 6), (1, 7, 7)]);
        assert_eq!(chunks[2].text, "line 7");
    }

    #[test]
    fn test_reading_order_across_pages() {
        let pages = vec![
            "p1 a\n\np1 b".to_string(),
            "".to_string(),
            "  \n p3 a \np3 b\n\n\np3 c".to_string(),
        ];
        let chunks = chunk_pages(&pages, 4).unwrap();

        assert_eq!(
            spans(&chunks),
            vec![(1, 1, 1), (1, 3, 3), (3, 2, 3), (3, 6, 6)]
        );
        assert_eq!(chunks[2].text, "p3 a\np3 b");

        let keys: Vec<(u32, u32)> = spans(&chunks).iter().map(|s| (s.0, s.1)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(spans(&chunks).iter().all(|s| s.2 >= s.1));
    }

    #[test]
    fn test_image_only_document_fails() {
        let pages = vec!["", "   \n\n", "\t"];
        match chunk_pages(&pages, 5) {
            Err(CourseMateError::NoExtractableText { pages }) => assert_eq!(pages, 3),
            other => panic!("expected NoExtractableText, got {:?}", other),
        }

        let none: Vec<String> = Vec::new();
        assert!(chunk_pages(&none, 5).is_err());
    }
}

//! PDF page text extraction using pdf-extract

use crate::error::{CourseMateError, Result};

/// Extract the text of every page, in page order.
///
/// Image-only pages come back as empty strings; deciding whether the whole
/// document is unusable is left to the layout chunker.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<String>> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| CourseMateError::PdfExtraction(e.to_string()))?;

    tracing::debug!("Extracted {} page(s) from PDF", pages.len());

    Ok(pages.iter().map(|p| clean_page(p)).collect())
}

/// Strip the control characters pdf-extract leaves behind and normalise line endings
fn clean_page(text: &str) -> String {
    text.replace("\r\n", "\n")
        .chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_page() {
        assert_eq!(clean_page("a\r\nb\u{c}\n\tc"), "a\nb\n\tc");
    }
}

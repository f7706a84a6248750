use std::panic::{self, AssertUnwindSafe};

use anyhow::bail;
use shelf_common::api::is_pdf_media_type;
use shelf_common::extract::TextExtractor;

/// PDF text extraction backed by `pdf-extract`.
///
/// Stateless: every call loads its own document, so one instance can serve
/// any number of concurrent extractions.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn accepts(&self, media_type: &str) -> bool {
        is_pdf_media_type(media_type)
    }

    fn extract(&self, bytes: &[u8], name: &str) -> anyhow::Result<String> {
        extract_from_bytes(bytes, name)
    }
}

/// Extract searchable text from PDF bytes.
///
/// Pages are visited in order; within a page the text fragments are joined
/// with single spaces, then the pages are joined the same way and the result
/// trimmed. Layout (line breaks, columns) is deliberately flattened since the
/// text only feeds substring search.
pub fn extract_from_bytes(bytes: &[u8], name: &str) -> anyhow::Result<String> {
    // pdf-extract can panic on malformed PDFs; catch_unwind turns that into
    // an ordinary error so the rest of the batch is unaffected.
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));

    let pages = match result {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => bail!("PDF extraction error for {name}: {e}"),
        Err(_) => bail!("PDF extraction panicked for {name}"),
    };

    tracing::debug!("extracted {} page(s) from {name}", pages.len());
    Ok(join_pages(&pages))
}

/// Collapse each page to single-space-separated words and join non-empty
/// pages with a single space.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(|page| page.as_ref().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

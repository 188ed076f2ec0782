//! Document text source collaborator.
//!
//! [`DocumentSource`] picks the reader by extension: PDFs go through
//! `pdf-extract`, anything else is read as form-feed separated UTF-8 text.

use std::panic;
use std::path::Path;

use crate::retrieval::error::CollaboratorError;

/// Page separator emitted by `pdftotext` and most text dumpers.
const FORM_FEED: char = '\u{0C}';

/// One page of extracted text. Page numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub text: String,
}

/// Produces the ordered pages of a document.
pub trait TextSource: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<Page>, CollaboratorError>;
}

/// Reads UTF-8 text files, one page per form-feed separated section.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextSource;

impl TextSource for PlainTextSource {
    fn extract_pages(&self, path: &Path) -> Result<Vec<Page>, CollaboratorError> {
        let bytes = std::fs::read(path).map_err(|e| {
            CollaboratorError::Extraction(format!("{}: {}", path.display(), e))
        })?;
        let text = String::from_utf8(bytes).map_err(|_| {
            CollaboratorError::Extraction(format!("{}: file is not valid UTF-8", path.display()))
        })?;

        Ok(split_pages(&text))
    }
}

/// Extracts text from PDF files, one [`Page`] per PDF page.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextSource;

impl TextSource for PdfTextSource {
    fn extract_pages(&self, path: &Path) -> Result<Vec<Page>, CollaboratorError> {
        let bytes = std::fs::read(path).map_err(|e| {
            CollaboratorError::Extraction(format!("{}: {}", path.display(), e))
        })?;

        // pdf-extract panics on some malformed documents
        let texts = panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(&bytes))
            .map_err(|_| {
                CollaboratorError::Extraction(format!("{}: unreadable PDF", path.display()))
            })?
            .map_err(|e| CollaboratorError::Extraction(format!("{}: {}", path.display(), e)))?;

        log::debug!("Extracted {} pages from {}", texts.len(), path.display());
        Ok(number_pages(texts))
    }
}

/// Chooses [`PdfTextSource`] for `.pdf` files and [`PlainTextSource`] otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentSource;

impl TextSource for DocumentSource {
    fn extract_pages(&self, path: &Path) -> Result<Vec<Page>, CollaboratorError> {
        if is_pdf(path) {
            PdfTextSource.extract_pages(path)
        } else {
            PlainTextSource.extract_pages(path)
        }
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Number page texts from 1, keeping empty pages so numbers match the source.
fn number_pages(texts: Vec<String>) -> Vec<Page> {
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page { number: i + 1, text })
        .collect()
}

/// Split text on form feeds. A trailing separator does not start a new page.
pub fn split_pages(text: &str) -> Vec<Page> {
    let body = text.strip_suffix(FORM_FEED).unwrap_or(text);
    if body.is_empty() {
        return vec![];
    }

    body.split(FORM_FEED)
        .enumerate()
        .map(|(i, page)| Page {
            number: i + 1,
            text: page.to_string(),
        })
        .collect()
}

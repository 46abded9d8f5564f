//! PDF text extraction wrapper
//!
//! Wraps the pdf-extract crate. Scanned/image-only PDFs come back as pages
//! with no text; encrypted or corrupted PDFs are errors.

use super::ExtractError;

/// Page-level access to a PDF document
pub trait PdfReader: Send + Sync {
    /// Text of every page, in page order
    fn pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractError>;
}

/// `PdfReader` backed by pdf-extract
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractReader;

impl PdfReader for PdfExtractReader {
    fn pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string()))
    }
}

/// Concatenate page texts in order with no separator
pub fn join_pages(pages: Vec<String>) -> String {
    pages.concat()
}

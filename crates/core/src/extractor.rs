use crate::error::IngestError;
use lopdf::Document;

/// Plain text of a single PDF page. Page numbers are 1-based.
#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Turns a raw PDF byte stream into ordered per-page text.
pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load_mem(bytes)
            .map_err(|error| IngestError::ExtractionFailed(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                // A single unreadable page degrades to the whole-text
                // fallback below rather than failing the document.
                Err(_) => continue,
            };

            let trimmed = text.trim();
            if !trimmed.is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text: trimmed.to_string(),
                });
            }
        }

        if !pages.is_empty() {
            return Ok(pages);
        }

        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        let full_text = document
            .extract_text(&page_numbers)
            .map_err(|error| IngestError::ExtractionFailed(error.to_string()))?;

        let pages = split_on_page_breaks(&full_text);
        if pages.is_empty() {
            return Err(IngestError::ExtractionFailed(
                "pdf had no readable page text".to_string(),
            ));
        }

        Ok(pages)
    }
}

/// Splits running text on form feeds into numbered pages. Text with no
/// detectable page breaks becomes a single synthetic page 1.
pub fn split_on_page_breaks(text: &str) -> Vec<PageText> {
    text.split('\u{000c}')
        .enumerate()
        .filter_map(|(index, raw)| {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(PageText {
                    number: (index + 1) as u32,
                    text: trimmed.to_string(),
                })
            }
        })
        .collect()
}

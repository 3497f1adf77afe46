use serde::{Deserialize, Serialize};

use super::ExtractionError;
use crate::models::OcrRecommendation;

/// Recognized text of one page image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrPageResult {
    pub text: String,
    pub regions: Vec<TextRegion>,
}

/// A block of recognized text. Engines without per-block scores leave
/// `confidence` empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub text: String,
    pub confidence: Option<f32>,
}

/// Outcome of comparing the embedded text layer (A) with fresh OCR (B).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrComparisonResult {
    pub recommendation: OcrRecommendation,
    pub reason: String,
    /// 0–100. Zero when candidate A was not scored.
    pub score_a: f32,
    /// 0–100.
    pub score_b: f32,
    pub selected_text: String,
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, page_png: &[u8]) -> Result<OcrPageResult, ExtractionError>;
}

/// Rasterizes PDF pages to PNG.
pub trait PdfPageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    /// Render one zero-based page at `dpi`.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError>;

    /// Render every page in order. Fails on the first page that cannot be
    /// rendered and on a document without pages.
    fn render_all(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>, ExtractionError> {
        let count = self.page_count(pdf_bytes)?;
        if count == 0 {
            return Err(ExtractionError::EmptyDocument);
        }
        (0..count)
            .map(|page| self.render_page(pdf_bytes, page, dpi))
            .collect()
    }
}

/// Reads the text layer already embedded in a PDF.
pub trait TextLayerReader: Send + Sync {
    /// Text of the first `max_pages` pages, `None` when the document carries none.
    fn read_text(&self, pdf_bytes: &[u8], max_pages: usize)
        -> Result<Option<String>, ExtractionError>;
}

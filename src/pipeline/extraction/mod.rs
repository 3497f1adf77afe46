pub mod arbitrate;
pub mod pdfium;
pub mod text_layer;
pub mod types;
pub mod vision_ocr;

pub use arbitrate::*;
pub use pdfium::*;
pub use text_layer::*;
pub use types::*;
pub use vision_ocr::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("PDF is password-protected or encrypted")]
    PdfEncrypted,

    #[error("PDF has no pages")]
    EmptyDocument,

    #[error("Image processing error: {0}")]
    ImageProcessing(String),
}

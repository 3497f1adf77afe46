use lopdf::Document;

use super::types::TextLayerReader;
use super::ExtractionError;

/// Reads the embedded text layer with lopdf.
///
/// Scanner software often embeds its own OCR output; this is candidate A
/// in the OCR arbitration.
pub struct LopdfTextLayer;

impl TextLayerReader for LopdfTextLayer {
    fn read_text(
        &self,
        pdf_bytes: &[u8],
        max_pages: usize,
    ) -> Result<Option<String>, ExtractionError> {
        let doc =
            Document::load_mem(pdf_bytes).map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;
        if doc.is_encrypted() {
            return Err(ExtractionError::PdfEncrypted);
        }

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().take(max_pages).collect();
        if page_numbers.is_empty() {
            return Ok(None);
        }

        let mut pages = Vec::with_capacity(page_numbers.len());
        for number in page_numbers {
            match doc.extract_text(&[number]) {
                Ok(text) => pages.push(text),
                Err(e) => {
                    tracing::debug!(page = number, error = %e, "No readable text on page");
                }
            }
        }

        let text = pages.join("\n").trim().to_string();
        Ok(if text.is_empty() { None } else { Some(text) })
    }
}

/// Mock text layer returning fixed text (or nothing).
pub struct MockTextLayer {
    text: Option<String>,
    fail: bool,
}

impl MockTextLayer {
    pub fn new(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            fail: false,
        }
    }

    /// A document without an embedded text layer.
    pub fn empty() -> Self {
        Self {
            text: None,
            fail: false,
        }
    }

    /// A document whose structure cannot be parsed.
    pub fn unreadable() -> Self {
        Self {
            text: None,
            fail: true,
        }
    }
}

impl TextLayerReader for MockTextLayer {
    fn read_text(
        &self,
        _pdf_bytes: &[u8],
        _max_pages: usize,
    ) -> Result<Option<String>, ExtractionError> {
        if self.fail {
            return Err(ExtractionError::PdfParsing("mock parse failure".into()));
        }
        Ok(self.text.clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};

    /// Build a PDF with one page of Helvetica text per entry.
    pub(crate) fn make_text_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let pages_id = doc.new_object_id();

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = format!("BT /F1 12 Tf 100 700 Td ({text}) Tj ET");
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn reads_embedded_text() {
        let pdf = make_text_pdf(&["Hello World from the scanner"]);
        let text = LopdfTextLayer.read_text(&pdf, 10).unwrap().unwrap();
        assert!(text.contains("Hello"), "got: {text}");
    }

    #[test]
    fn respects_page_limit() {
        let pdf = make_text_pdf(&["First page text", "Second page text", "Third page text"]);
        let text = LopdfTextLayer.read_text(&pdf, 2).unwrap().unwrap();
        assert!(text.contains("First"));
        assert!(text.contains("Second"));
        assert!(!text.contains("Third"));
    }

    #[test]
    fn blank_pages_yield_none() {
        let pdf = make_text_pdf(&[""]);
        assert_eq!(LopdfTextLayer.read_text(&pdf, 10).unwrap(), None);
    }

    #[test]
    fn invalid_pdf_returns_error() {
        assert!(matches!(
            LopdfTextLayer.read_text(b"not a pdf", 10),
            Err(ExtractionError::PdfParsing(_))
        ));
    }

    #[test]
    fn mock_variants() {
        assert_eq!(
            MockTextLayer::new("abc").read_text(&[], 1).unwrap().as_deref(),
            Some("abc")
        );
        assert_eq!(MockTextLayer::empty().read_text(&[], 1).unwrap(), None);
        assert!(MockTextLayer::unreadable().read_text(&[], 1).is_err());
    }
}

//! Page rasterization with Google PDFium.
//!
//! Every page of a scan is rendered once per document: the images feed OCR,
//! the vision stage and the rebuilt output PDF. The upstream `Pdfium` handle
//! is `!Send`, so it is bound per call; the dynamic loader caches the library.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::types::PdfPageRenderer;
use super::ExtractionError;

/// Longest edge of a rendered page in pixels.
const MAX_EDGE_PX: u32 = 4096;

/// PDF user-space units per inch.
pub const POINTS_PER_INCH: f32 = 72.0;

/// Explicit library location.
const LIBRARY_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

// ──────────────────────────────────────────────
// Geometry
// ──────────────────────────────────────────────

/// Pixel size of a page rendered at a given DPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageGeometry {
    width: u32,
    height: u32,
    /// The page was scaled down to fit `MAX_EDGE_PX`.
    capped: bool,
}

impl PageGeometry {
    /// Both edges at least 1 px; the longer edge at most `MAX_EDGE_PX`,
    /// keeping the aspect ratio.
    fn from_points(width_pt: f32, height_pt: f32, dpi: u32) -> Self {
        let scale = dpi as f32 / POINTS_PER_INCH;
        let w = (width_pt * scale).max(1.0);
        let h = (height_pt * scale).max(1.0);
        let longest = w.max(h);

        if longest <= MAX_EDGE_PX as f32 {
            return Self {
                width: w as u32,
                height: h as u32,
                capped: false,
            };
        }
        let shrink = MAX_EDGE_PX as f32 / longest;
        Self {
            width: ((w * shrink).round() as u32).clamp(1, MAX_EDGE_PX),
            height: ((h * shrink).round() as u32).clamp(1, MAX_EDGE_PX),
            capped: true,
        }
    }
}

// ──────────────────────────────────────────────
// Library binding
// ──────────────────────────────────────────────

/// Directories searched for the platform library, in order:
/// the executable's directory, `<exe>/lib`, `<exe>/../lib`.
fn library_dirs(exe: &Path) -> Vec<PathBuf> {
    let Some(dir) = exe.parent() else {
        return Vec::new();
    };
    vec![
        dir.to_path_buf(),
        dir.join("lib"),
        dir.join("..").join("lib"),
    ]
}

/// `PDFIUM_DYNAMIC_LIB_PATH`, then the directories next to the executable,
/// then the system search path.
fn bind_pdfium() -> Result<Pdfium, ExtractionError> {
    let unavailable = |reason: String| ExtractionError::PdfRendering { page: 0, reason };

    if let Ok(path) = std::env::var(LIBRARY_ENV) {
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| unavailable(format!("Cannot load PDFium from {path}: {e}")))?;
        debug!(path = %path, "PDFium bound from {LIBRARY_ENV}");
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        for dir in library_dirs(&exe) {
            let candidate =
                Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&candidate) {
                debug!(dir = %dir.display(), "PDFium bound next to executable");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        unavailable(format!(
            "PDFium not found; install it or set {LIBRARY_ENV}: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_bytes: &'a [u8],
) -> Result<PdfDocument<'a>, ExtractionError> {
    pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| {
            let message = e.to_string();
            let lower = message.to_lowercase();
            if lower.contains("password") || lower.contains("encrypt") {
                ExtractionError::PdfEncrypted
            } else {
                ExtractionError::PdfParsing(format!("Cannot open PDF: {message}"))
            }
        })
}

/// PNG bytes of an image.
pub(crate) fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ExtractionError> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

fn render(page: &PdfPage, index: usize, dpi: u32) -> Result<Vec<u8>, ExtractionError> {
    let geometry = PageGeometry::from_points(page.width().value, page.height().value, dpi);
    if geometry.capped {
        warn!(
            page = index,
            width = geometry.width,
            height = geometry.height,
            dpi,
            "Page scaled down to {MAX_EDGE_PX}px"
        );
    }

    let config = PdfRenderConfig::new()
        .set_target_width(geometry.width as i32)
        .set_maximum_height(geometry.height as i32);
    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| ExtractionError::PdfRendering {
            page: index,
            reason: e.to_string(),
        })?;
    encode_png(&bitmap.as_image())
}

// ──────────────────────────────────────────────
// PdfiumRenderer
// ──────────────────────────────────────────────

/// Production renderer.
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Fails when no PDFium library can be bound.
    pub fn new() -> Result<Self, ExtractionError> {
        bind_pdfium()?;
        Ok(Self)
    }
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, pdf_bytes)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        let out_of_range = |count: u16| ExtractionError::PdfRendering {
            page: page_number,
            reason: format!("no such page (document has {count})"),
        };
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, pdf_bytes)?;
        let pages = document.pages();
        let index = u16::try_from(page_number).map_err(|_| out_of_range(pages.len()))?;
        let page = pages.get(index).map_err(|_| out_of_range(pages.len()))?;
        render(&page, page_number, dpi)
    }

    /// Opens the document once for all pages.
    fn render_all(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>, ExtractionError> {
        let start = std::time::Instant::now();
        let pdfium = bind_pdfium()?;
        let document = open_document(&pdfium, pdf_bytes)?;
        let pages = document.pages();
        if pages.len() == 0 {
            return Err(ExtractionError::EmptyDocument);
        }

        let images = pages
            .iter()
            .enumerate()
            .map(|(index, page)| render(&page, index, dpi))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            pages = images.len(),
            dpi,
            bytes = images.iter().map(Vec::len).sum::<usize>(),
            elapsed_ms = %start.elapsed().as_millis(),
            "Rendered document"
        );
        Ok(images)
    }
}

// ──────────────────────────────────────────────
// MockPdfPageRenderer (testing)
// ──────────────────────────────────────────────

/// Renders blank white pages of a fixed size.
pub struct MockPdfPageRenderer {
    page_count: usize,
    fail_on_page: Option<usize>,
}

impl MockPdfPageRenderer {
    /// Width and height in pixels of every mock page.
    pub const PAGE_PX: (u32, u32) = (12, 17);

    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            fail_on_page: None,
        }
    }

    /// Make rendering of `page` fail.
    pub fn failing_on(mut self, page: usize) -> Self {
        self.fail_on_page = Some(page);
        self
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        if page_number >= self.page_count || self.fail_on_page == Some(page_number) {
            return Err(ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("mock cannot render page {page_number}"),
            });
        }
        let (w, h) = Self::PAGE_PX;
        let page = RgbImage::from_pixel(w, h, Rgb([255, 255, 255]));
        encode_png(&DynamicImage::ImageRgb8(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn a4_at_150_dpi() {
        let g = PageGeometry::from_points(595.0, 842.0, 150);
        assert_eq!((g.width, g.height), (1239, 1754));
        assert!(!g.capped);
    }

    #[test]
    fn oversized_pages_are_capped_with_aspect_ratio() {
        let g = PageGeometry::from_points(5000.0, 10000.0, 200);
        assert!(g.capped);
        assert_eq!(g.height, MAX_EDGE_PX);
        let ratio = g.height as f32 / g.width as f32;
        assert!((ratio - 2.0).abs() < 0.01, "ratio {ratio}");
    }

    #[test]
    fn degenerate_pages_get_one_pixel() {
        let g = PageGeometry::from_points(0.0, 0.0, 150);
        assert_eq!((g.width, g.height), (1, 1));
    }

    #[test]
    fn library_dirs_follow_executable() {
        let dirs = library_dirs(Path::new("/opt/docsort/bin/docsort"));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/opt/docsort/bin"),
                PathBuf::from("/opt/docsort/bin/lib"),
                PathBuf::from("/opt/docsort/bin/../lib"),
            ]
        );
        assert!(library_dirs(Path::new("/")).is_empty());
    }

    #[test]
    fn mock_pages_are_decodable_png() {
        let png = MockPdfPageRenderer::new(1).render_page(&[], 0, 150).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(
            (decoded.width(), decoded.height()),
            MockPdfPageRenderer::PAGE_PX
        );
    }

    #[test]
    fn render_all_stops_at_failing_page() {
        let mock = MockPdfPageRenderer::new(3).failing_on(1);
        let err = mock.render_all(&[], 150).unwrap_err();
        assert!(matches!(err, ExtractionError::PdfRendering { page: 1, .. }));
        assert_eq!(MockPdfPageRenderer::new(3).render_all(&[], 150).unwrap().len(), 3);
    }

    #[test]
    fn render_all_rejects_empty_document() {
        let err = MockPdfPageRenderer::new(0).render_all(&[], 150).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyDocument));
    }

    #[test]
    fn mock_rejects_out_of_range_page() {
        let err = MockPdfPageRenderer::new(2).render_page(&[], 2, 150).unwrap_err();
        assert!(matches!(err, ExtractionError::PdfRendering { page: 2, .. }));
    }
}

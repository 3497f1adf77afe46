//! Document processing orchestrator.
//!
//! Drives one scanned PDF through the full pipeline:
//! OCR → arbitrate → preview → vision → extraction → name → target → relocate.
//!
//! Uses trait-based DI for every engine (PdfPageRenderer, TextLayerReader,
//! OcrEngine, LlmClient) so the orchestrator is fully testable with mocks.
//! Progress is reported through `ProcessingEvents`; the orchestrator itself
//! knows nothing about queues or UIs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;

use crate::config::{AppConfig, ConfigStore};
use crate::models::{Document, OcrRecommendation};
use crate::pipeline::classification::{
    detect_language, Classification, ClassificationError, Classifier, LlmClient, OllamaClient,
};
use crate::pipeline::events::ProcessingEvents;
use crate::pipeline::extraction::{
    compare, ExtractionError, LopdfTextLayer, OcrComparisonResult, OcrEngine, OllamaVisionOcr,
    PdfPageRenderer, PdfiumRenderer, TextLayerReader,
};
use crate::pipeline::naming::{build_file_name, parse_iso_date, resolve_target, NamingError};
use crate::pipeline::relocate::{build_image_pdf, write_relocated, RelocateError};

/// Accepted input extension (case-insensitive).
pub const PDF_INPUT_EXTENSION: &str = "pdf";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during document processing.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Input rejected: {0}")]
    InputRejected(String),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Classification failed: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Naming failed: {0}")]
    Naming(#[from] NamingError),

    #[error("Relocation failed: {0}")]
    Relocate(#[from] RelocateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Pipeline steps in execution order, each with its fixed progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStep {
    Start,
    Ocr,
    Arbitrate,
    RenderPage,
    VisionAi,
    TextAi,
    BuildFilename,
    ResolveTarget,
    Relocate,
    Done,
}

impl ProcessingStep {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start => "Starting",
            Self::Ocr => "Running OCR",
            Self::Arbitrate => "Comparing OCR results",
            Self::RenderPage => "Rendering preview",
            Self::VisionAi => "Analyzing page image",
            Self::TextAi => "Extracting document details",
            Self::BuildFilename => "Building file name",
            Self::ResolveTarget => "Resolving target path",
            Self::Relocate => "Writing document",
            Self::Done => "Done",
        }
    }

    pub fn progress(&self) -> f32 {
        match self {
            Self::Start => 0.0,
            Self::Ocr => 0.1,
            Self::Arbitrate => 0.25,
            Self::RenderPage => 0.35,
            Self::VisionAi => 0.5,
            Self::TextAi => 0.7,
            Self::BuildFilename => 0.8,
            Self::ResolveTarget => 0.85,
            Self::Relocate => 0.95,
            Self::Done => 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Arbitration outcome without the selected text (kept on the document).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrSummary {
    pub recommendation: OcrRecommendation,
    pub reason: String,
    pub score_a: f32,
    pub score_b: f32,
}

impl From<&OcrComparisonResult> for OcrSummary {
    fn from(result: &OcrComparisonResult) -> Self {
        Self {
            recommendation: result.recommendation,
            reason: result.reason.clone(),
            score_a: result.score_a,
            score_b: result.score_b,
        }
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub document: Document,
    pub new_path: PathBuf,
    pub file_name: String,
    pub confidence: f32,
    pub page_count: usize,
    pub ocr: OcrSummary,
    pub classification: Classification,
    pub preview_path: Option<PathBuf>,
}

/// Anything that can process one document. The queue depends on this seam.
pub trait DocumentPipeline: Send + Sync {
    fn process(
        &self,
        path: &Path,
        events: &dyn ProcessingEvents,
    ) -> Result<ProcessingResult, ProcessingError>;
}

/// Reject anything that is not an existing regular `.pdf` file.
pub fn validate_input(path: &Path) -> Result<(), String> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(PDF_INPUT_EXTENSION));
    if !is_pdf {
        return Err(format!("not a PDF file: {}", path.display()));
    }
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(format!("not a regular file: {}", path.display())),
        Err(_) => Err(format!("file not found: {}", path.display())),
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Orchestrates processing of one scanned PDF.
///
/// Reads a fresh configuration snapshot at the start of every document, so
/// a configuration change applies from the next document on.
pub struct DocumentProcessor {
    config: Arc<ConfigStore>,
    renderer: Box<dyn PdfPageRenderer>,
    text_layer: Box<dyn TextLayerReader>,
    ocr: Box<dyn OcrEngine>,
    llm: Arc<dyn LlmClient>,
}

impl DocumentProcessor {
    pub fn new(
        config: Arc<ConfigStore>,
        renderer: Box<dyn PdfPageRenderer>,
        text_layer: Box<dyn TextLayerReader>,
        ocr: Box<dyn OcrEngine>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            config,
            renderer,
            text_layer,
            ocr,
            llm,
        }
    }

    fn run(
        &self,
        path: &Path,
        document: &mut Document,
        step: &mut ProcessingStep,
        events: &dyn ProcessingEvents,
    ) -> Result<ProcessingResult, ProcessingError> {
        let enter = |s: ProcessingStep, step: &mut ProcessingStep| {
            *step = s;
            events.on_status(s.label(), s.progress());
        };

        // Start
        enter(ProcessingStep::Start, step);
        validate_input(path).map_err(ProcessingError::InputRejected)?;
        let config = self.config.snapshot();
        let today = Local::now().date_naive();
        let file_date = file_date(path).unwrap_or(today).format("%Y-%m-%d").to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pdf_bytes = std::fs::read(path)?;
        events.on_log(&format!("Processing {file_name} ({} bytes)", pdf_bytes.len()));

        // OCR
        enter(ProcessingStep::Ocr, step);
        let pages = self.render_pages(&pdf_bytes, &config, events)?;
        let ocr_text = self.recognize_pages(&pages, config.pipeline.max_ocr_pages, events)?;
        let existing = match self
            .text_layer
            .read_text(&pdf_bytes, config.pipeline.max_ocr_pages)
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Embedded text layer unreadable, ignoring it");
                events.on_log(&format!("Embedded text layer unreadable: {e}"));
                None
            }
        };

        // Arbitrate
        enter(ProcessingStep::Arbitrate, step);
        let comparison = compare(existing.as_deref(), &ocr_text);
        events.on_log(&format!(
            "OCR decision: {} ({})",
            comparison.recommendation.as_str(),
            comparison.reason
        ));
        let ocr = OcrSummary::from(&comparison);
        document.extracted_text = comparison.selected_text;

        // Preview
        enter(ProcessingStep::RenderPage, step);
        let preview_path = write_preview(&config, document, &pages[0], events);

        // Vision stage
        enter(ProcessingStep::VisionAi, step);
        let classifier = Classifier::new(Arc::clone(&self.llm), &config);
        let description =
            classifier.describe_image(&document.extracted_text, &pages[0], &file_name)?;
        let language = detect_language(&description);
        events.on_log(&format!("Detected language: {language}"));

        // Text stage
        enter(ProcessingStep::TextAi, step);
        let components = classifier.extract_structure(
            &description,
            &document.extracted_text,
            &file_date,
            language,
        )?;
        let classification = Classification::from_parts(components, language, description);
        document.set_raw_type(&classification.components.doc_type);
        document.set_confidence(classification.confidence());
        document.vendor = classification.vendor.clone();
        document.amount = classification.amount.clone();
        document.document_date = parse_iso_date(&classification.components.date);
        events.on_log(&format!(
            "Classified as {} (confidence {:.2})",
            document.doc_type.as_str(),
            document.confidence()
        ));

        // File name
        enter(ProcessingStep::BuildFilename, step);
        let new_name = build_file_name(&classification.components, &config.filename);
        events.on_log(&format!("New file name: {new_name}"));

        // Target
        enter(ProcessingStep::ResolveTarget, step);
        let target = resolve_target(
            path,
            &new_name,
            &config.pipeline.placement,
            document.doc_type,
            document.document_date.unwrap_or(today),
        )?;

        // Relocate
        enter(ProcessingStep::Relocate, step);
        let rebuilt = build_image_pdf(
            &pages,
            config.pipeline.render_dpi,
            config.pipeline.jpeg_quality,
        )?;
        write_relocated(path, &target, &rebuilt)?;
        events.on_log(&format!("Saved as {}", target.display()));

        document.destination_path = Some(target.clone());
        document.processed_at = Some(Utc::now());

        enter(ProcessingStep::Done, step);
        Ok(ProcessingResult {
            document: document.clone(),
            file_name: target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(new_name),
            new_path: target,
            confidence: document.confidence(),
            page_count: pages.len(),
            ocr,
            classification,
            preview_path,
        })
    }

    /// Rasterize every page; all of them go into the rebuilt PDF.
    fn render_pages(
        &self,
        pdf_bytes: &[u8],
        config: &AppConfig,
        events: &dyn ProcessingEvents,
    ) -> Result<Vec<Vec<u8>>, ProcessingError> {
        let pages = self
            .renderer
            .render_all(pdf_bytes, config.pipeline.render_dpi)?;
        events.on_log(&format!(
            "Rendered {} page(s) at {} dpi",
            pages.len(),
            config.pipeline.render_dpi
        ));
        Ok(pages)
    }

    /// OCR the first `max_pages` page images and join the page texts.
    fn recognize_pages(
        &self,
        pages: &[Vec<u8>],
        max_pages: usize,
        events: &dyn ProcessingEvents,
    ) -> Result<String, ProcessingError> {
        let limit = pages.len().min(max_pages.max(1));
        let mut texts = Vec::with_capacity(limit);
        for (index, page) in pages.iter().take(limit).enumerate() {
            let result = self.ocr.recognize(page)?;
            events.on_log(&format!(
                "OCR page {}/{limit}: {} characters",
                index + 1,
                result.text.chars().count()
            ));
            texts.push(result.text);
        }
        Ok(texts.join("\n\n"))
    }
}

impl DocumentPipeline for DocumentProcessor {
    fn process(
        &self,
        path: &Path,
        events: &dyn ProcessingEvents,
    ) -> Result<ProcessingResult, ProcessingError> {
        let mut document = Document::new(path.to_path_buf());
        let _span = tracing::info_span!(
            "process_document",
            doc_id = %document.id,
            path = %path.display(),
        )
        .entered();
        let start = std::time::Instant::now();
        let mut step = ProcessingStep::Start;

        match self.run(path, &mut document, &mut step, events) {
            Ok(result) => {
                tracing::info!(
                    target_path = %result.new_path.display(),
                    doc_type = %result.document.doc_type.as_str(),
                    confidence = result.confidence,
                    elapsed_ms = %start.elapsed().as_millis(),
                    "Document processed"
                );
                Ok(result)
            }
            Err(e) => {
                tracing::error!(
                    step = step.label(),
                    error = %e,
                    elapsed_ms = %start.elapsed().as_millis(),
                    "Document processing failed"
                );
                events.on_log(&format!("Failed during '{}': {e}", step.label()));
                Err(e)
            }
        }
    }
}

/// Local modification date of the file.
fn file_date(path: &Path) -> Option<NaiveDate> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Local>::from(modified).date_naive())
}

/// Write the first page to the preview directory. Failures only cost the preview.
fn write_preview(
    config: &AppConfig,
    document: &Document,
    page_png: &[u8],
    events: &dyn ProcessingEvents,
) -> Option<PathBuf> {
    let dir = &config.pipeline.preview_dir;
    let path = dir.join(format!("{}.png", document.id));
    let written = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, page_png));
    match written {
        Ok(()) => {
            events.on_preview(&path);
            Some(path)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Preview not written");
            events.on_log(&format!("Preview not written: {e}"));
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build the production processor: Ollama for OCR and classification,
/// PDFium for rendering, lopdf for the embedded text layer.
///
/// The Ollama endpoint and OCR model are taken from the snapshot current
/// at build time.
pub fn build_processor(config: Arc<ConfigStore>) -> Result<DocumentProcessor, ProcessingError> {
    let snapshot = config.snapshot();
    let llm: Arc<dyn LlmClient> = Arc::new(OllamaClient::from_config(&snapshot.ollama)?);
    let renderer = PdfiumRenderer::new()?;
    let ocr = OllamaVisionOcr::new(
        Arc::clone(&llm),
        &snapshot.ollama.ocr_model,
        &snapshot.prompts.ocr,
    );

    tracing::info!(
        base_url = %snapshot.ollama.base_url,
        ocr_model = %snapshot.ollama.ocr_model,
        vision_model = %snapshot.ollama.vision_model,
        text_model = %snapshot.ollama.text_model,
        "Document processor ready"
    );

    Ok(DocumentProcessor::new(
        config,
        Box::new(renderer),
        Box::new(LopdfTextLayer),
        Box::new(ocr),
        llm,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

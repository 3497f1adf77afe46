//! Vision OCR engine: transcribes page images through a local vision model.
//!
//! Produces candidate B for the OCR arbitration. The model has no notion of
//! per-word confidence, so regions are plain paragraphs without a score.

use std::sync::Arc;

use base64::Engine as _;

use super::types::{OcrEngine, OcrPageResult, TextRegion};
use super::ExtractionError;
use crate::pipeline::classification::ollama_types::{GenerateRequest, GenerationOptions};
use crate::pipeline::classification::LlmClient;

/// Deterministic decoding for transcription.
fn ocr_options() -> GenerationOptions {
    GenerationOptions {
        temperature: 0.0,
        top_p: None,
        num_predict: 4096,
    }
}

// ──────────────────────────────────────────────
// OllamaVisionOcr
// ──────────────────────────────────────────────

/// Production OCR engine backed by a vision model.
pub struct OllamaVisionOcr {
    client: Arc<dyn LlmClient>,
    model_name: String,
    prompt: String,
}

impl OllamaVisionOcr {
    pub fn new(client: Arc<dyn LlmClient>, model_name: &str, prompt: &str) -> Self {
        Self {
            client,
            model_name: model_name.to_string(),
            prompt: prompt.to_string(),
        }
    }
}

impl OcrEngine for OllamaVisionOcr {
    fn recognize(&self, page_png: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let _span = tracing::info_span!(
            "vision_ocr",
            model = %self.model_name,
            image_size = page_png.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let image = base64::engine::general_purpose::STANDARD.encode(page_png);
        let request = GenerateRequest::new(&self.model_name, self.prompt.clone(), ocr_options())
            .with_image(image);

        let raw = self
            .client
            .generate(&request)
            .map_err(|e| ExtractionError::OcrProcessing(format!("Vision OCR failed: {e}")))?;

        let text = strip_wrapping_fence(&raw);
        let regions = split_regions(&text);

        tracing::info!(
            model = %self.model_name,
            elapsed_ms = %start.elapsed().as_millis(),
            text_len = text.len(),
            regions = regions.len(),
            "Vision OCR complete"
        );

        Ok(OcrPageResult { text, regions })
    }
}

/// Vision models sometimes wrap a transcription in a code fence.
fn strip_wrapping_fence(response: &str) -> String {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop an info string such as ```text
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

/// Paragraphs separated by blank lines.
fn split_regions(text: &str) -> Vec<TextRegion> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| TextRegion {
            text: p.to_string(),
            confidence: None,
        })
        .collect()
}

// ──────────────────────────────────────────────
// MockOcrEngine (testing)
// ──────────────────────────────────────────────

/// Mock OCR engine returning the same text for every page.
pub struct MockOcrEngine {
    text: String,
    fail: bool,
}

impl MockOcrEngine {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            text: String::new(),
            fail: true,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(&self, _page_png: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        if self.fail {
            return Err(ExtractionError::OcrProcessing("mock OCR failure".into()));
        }
        Ok(OcrPageResult {
            text: self.text.clone(),
            regions: split_regions(&self.text),
        })
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

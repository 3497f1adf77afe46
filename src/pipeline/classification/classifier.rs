//! Two-stage document classification against a local model.
//!
//! Stage 1 sends the page image with an OCR excerpt and asks for a free-text
//! description. Stage 2 sends that description with a longer OCR excerpt and
//! asks for a JSON object, which is parsed leniently.

use std::sync::Arc;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::amount::find_amount;
use super::ollama::LlmClient;
use super::ollama_types::{GenerateRequest, OllamaError, MAX_IMAGE_BASE64_BYTES};
use super::parser::{parse_components, ClassificationComponents};
use super::prompt::{detect_language, render_template, truncate_chars};
use super::ClassificationError;
use crate::config::{AppConfig, ClassificationConfig, PromptConfig};
use crate::models::{Amount, DocumentType};

/// Component labels that name the sender.
const VENDOR_LABEL_HINTS: &[&str] = &["vendor", "company", "from"];

/// Everything the classifier learned about one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub components: ClassificationComponents,
    /// Coarse language tag, `UNKNOWN` when none was recognized.
    pub language: String,
    /// Stage-1 free-text description.
    pub description: String,
    pub doc_type: DocumentType,
    pub vendor: Option<String>,
    pub amount: Option<Amount>,
}

impl Classification {
    /// Derive type, vendor and amount from the parsed components.
    pub fn from_parts(
        components: ClassificationComponents,
        language: &str,
        description: String,
    ) -> Self {
        let doc_type = DocumentType::from_raw(&components.doc_type);
        let vendor = find_vendor(&components);
        let amount = components
            .components
            .iter()
            .find_map(|c| find_amount(&c.value));
        Self {
            components,
            language: language.to_string(),
            description,
            doc_type,
            vendor,
            amount,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.components.confidence
    }
}

fn find_vendor(components: &ClassificationComponents) -> Option<String> {
    components
        .components
        .iter()
        .find(|c| {
            let label = c.label.to_lowercase();
            VENDOR_LABEL_HINTS.iter().any(|hint| label.contains(hint))
        })
        .map(|c| c.value.clone())
}

/// Runs both classification stages with one configuration snapshot.
pub struct Classifier {
    client: Arc<dyn LlmClient>,
    vision_model: String,
    text_model: String,
    prompts: PromptConfig,
    settings: ClassificationConfig,
}

impl Classifier {
    pub fn new(client: Arc<dyn LlmClient>, config: &AppConfig) -> Self {
        Self {
            client,
            vision_model: config.ollama.vision_model.clone(),
            text_model: config.ollama.text_model.clone(),
            prompts: config.prompts.clone(),
            settings: config.classification.clone(),
        }
    }

    /// Stage 1: free-text description of the page image.
    pub fn describe_image(
        &self,
        ocr_text: &str,
        page_png: &[u8],
        file_name: &str,
    ) -> Result<String, ClassificationError> {
        let _span = tracing::info_span!("describe_image", model = %self.vision_model).entered();
        let start = std::time::Instant::now();

        let image = base64::engine::general_purpose::STANDARD.encode(page_png);
        if image.len() > MAX_IMAGE_BASE64_BYTES {
            return Err(OllamaError::ImageTooLarge(image.len()).into());
        }

        let prompt = render_template(
            &self.prompts.vision,
            &[
                (
                    "ocr_text",
                    truncate_chars(ocr_text, self.settings.vision_text_chars),
                ),
                ("file_name", file_name),
            ],
        );
        let request = GenerateRequest::new(
            &self.vision_model,
            prompt,
            self.settings.vision_options.clone(),
        )
        .with_image(image);

        let description = self.client.generate(&request)?;
        tracing::info!(
            model = %self.vision_model,
            elapsed_ms = %start.elapsed().as_millis(),
            description_len = description.len(),
            "Image description received"
        );
        Ok(description.trim().to_string())
    }

    /// Stage 2: structured extraction from the description and OCR text.
    pub fn extract_structure(
        &self,
        description: &str,
        ocr_text: &str,
        file_date: &str,
        language: &str,
    ) -> Result<ClassificationComponents, ClassificationError> {
        let _span = tracing::info_span!("extract_structure", model = %self.text_model).entered();
        let start = std::time::Instant::now();

        let prompt = render_template(
            &self.prompts.extraction,
            &[
                ("vision_description", description),
                (
                    "ocr_text",
                    truncate_chars(ocr_text, self.settings.extraction_text_chars),
                ),
                ("file_date", file_date),
                ("language", language),
            ],
        );
        let request = GenerateRequest::new(
            &self.text_model,
            prompt,
            self.settings.extraction_options.clone(),
        );

        let response = self.client.generate(&request)?;
        let components = parse_components(&response, file_date);
        tracing::info!(
            model = %self.text_model,
            elapsed_ms = %start.elapsed().as_millis(),
            doc_type = %components.doc_type,
            confidence = components.confidence,
            component_count = components.components.len(),
            "Structured extraction complete"
        );
        Ok(components)
    }

    /// Run both stages back to back.
    pub fn classify(
        &self,
        ocr_text: &str,
        page_png: &[u8],
        file_name: &str,
        file_date: &str,
    ) -> Result<Classification, ClassificationError> {
        let description = self.describe_image(ocr_text, page_png, file_name)?;
        let language = detect_language(&description);
        let components = self.extract_structure(&description, ocr_text, file_date, language)?;
        Ok(Classification::from_parts(components, language, description))
    }
}

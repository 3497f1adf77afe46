//! Application configuration.
//!
//! Configuration is an immutable `AppConfig` value. The `ConfigStore` hands out
//! `Arc<AppConfig>` snapshots; `reload()` and `replace()` swap in a new
//! snapshot without touching the ones already handed out, so a document that
//! started under one configuration finishes under it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::pipeline::classification::ollama_types::{
    validate_base_url, validate_model_name, GenerationOptions,
};

/// Application-level constants
pub const APP_NAME: &str = "docsort";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV: &str = "DOCSORT_CONFIG";

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "docsort=info,docsort_lib=info,warn"
}

/// Directory holding `config.toml` (e.g. `~/.config/docsort`).
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ═══════════════════════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    /// Client-side budget per inference call. Multimodal calls on CPU are slow.
    pub timeout_secs: u64,
    /// Model for the image-description stage (must accept images).
    pub vision_model: String,
    /// Model for the structured-extraction stage.
    pub text_model: String,
    /// Vision model used as the on-device recognizer.
    pub ocr_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            timeout_secs: 600,
            vision_model: "qwen2.5vl:7b".into(),
            text_model: "qwen2.5vl:7b".into(),
            ocr_model: "qwen2.5vl:7b".into(),
        }
    }
}

/// Prompt templates. Placeholders: `{ocr_text}`, `{file_name}`,
/// `{vision_description}`, `{file_date}`, `{language}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub vision: String,
    pub extraction: String,
    pub ocr: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            vision: DEFAULT_VISION_PROMPT.into(),
            extraction: DEFAULT_EXTRACTION_PROMPT.into(),
            ocr: DEFAULT_OCR_PROMPT.into(),
        }
    }
}

const DEFAULT_VISION_PROMPT: &str = "\
Describe this scanned document page in a few sentences. Name the kind of document, \
the sender or issuing company, the main subject, any date and total amount you can see, \
and the language the document is written in.

File name: {file_name}
OCR text (excerpt):
{ocr_text}";

const DEFAULT_EXTRACTION_PROMPT: &str = "\
You file scanned documents. Using the description and the OCR text below, answer with \
ONLY a JSON object, no explanation:
{\"date\": \"YYYY-MM-DD\", \"title\": \"short title\", \
\"type\": \"invoice|receipt|contract|letter|report|statement|unknown\", \
\"components\": [{\"label\": \"vendor\", \"value\": \"...\", \"confidence\": 0.9}]}
Use the document date. If no date is visible, use {file_date}. \
The document language is {language}; write the title in that language.

Description:
{vision_description}

OCR text:
{ocr_text}";

const DEFAULT_OCR_PROMPT: &str = "\
Transcribe all text visible in this document image exactly as written. \
Keep line breaks. Output plain text only.";

/// Text budgets and decoding parameters for the two classification stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// OCR characters embedded in the image-description prompt.
    pub vision_text_chars: usize,
    /// OCR characters embedded in the structured-extraction prompt.
    pub extraction_text_chars: usize,
    pub vision_options: GenerationOptions,
    pub extraction_options: GenerationOptions,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            vision_text_chars: 800,
            extraction_text_chars: 1500,
            vision_options: GenerationOptions {
                temperature: 0.3,
                top_p: Some(0.9),
                num_predict: 300,
            },
            extraction_options: GenerationOptions {
                temperature: 0.1,
                top_p: None,
                num_predict: 300,
            },
        }
    }
}

/// Rules for building the new file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilenameConfig {
    pub include_date: bool,
    /// Pattern using `YYYY`, `MM` and `DD`.
    pub date_format: String,
    /// Placed between date, title and component parts.
    pub part_separator: String,
    /// Replaces whitespace inside a single part.
    pub internal_separator: String,
    pub include_components: bool,
    /// Components at or above this confidence are considered.
    pub component_min_confidence: f32,
    pub max_components: usize,
    pub title_max_chars: usize,
    pub component_max_chars: usize,
}

impl Default for FilenameConfig {
    fn default() -> Self {
        Self {
            include_date: true,
            date_format: "YYYY-MM-DD".into(),
            part_separator: "_".into(),
            internal_separator: "-".into(),
            include_components: true,
            component_min_confidence: 0.6,
            max_components: 3,
            title_max_chars: 50,
            component_max_chars: 30,
        }
    }
}

/// Where a processed document is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Placement {
    /// Next to the source file.
    SameDirectory,
    /// `<root>/<year>/<type>/`.
    ArchiveTree { root: PathBuf },
}

impl Default for Placement {
    fn default() -> Self {
        Self::SameDirectory
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Rasterization DPI for OCR, vision and the rebuilt PDF.
    pub render_dpi: u32,
    /// Pages read from the embedded text layer and sent through OCR.
    pub max_ocr_pages: usize,
    /// JPEG quality of the page images in the rebuilt PDF.
    pub jpeg_quality: u8,
    /// Directory for preview PNGs handed to the UI.
    pub preview_dir: PathBuf,
    pub placement: Placement,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            render_dpi: 150,
            max_ocr_pages: 10,
            jpeg_quality: 85,
            preview_dir: std::env::temp_dir().join("docsort-previews"),
            placement: Placement::SameDirectory,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// AppConfig
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ollama: OllamaConfig,
    pub prompts: PromptConfig,
    pub classification: ClassificationConfig,
    pub filename: FilenameConfig,
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load from a file; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OLLAMA_HOST") {
            self.ollama.base_url = normalize_host(&host);
        }
        if let Some(model) = lookup("DOCSORT_VISION_MODEL") {
            self.ollama.vision_model = model.clone();
            self.ollama.ocr_model = model;
        }
        if let Some(model) = lookup("DOCSORT_TEXT_MODEL") {
            self.ollama.text_model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_base_url(&self.ollama.base_url)
            .map_err(|e| ConfigError::Invalid(format!("ollama.base_url: {e}")))?;
        for (key, model) in [
            ("vision_model", &self.ollama.vision_model),
            ("text_model", &self.ollama.text_model),
            ("ocr_model", &self.ollama.ocr_model),
        ] {
            validate_model_name(model)
                .map_err(|e| ConfigError::Invalid(format!("ollama.{key}: {e}")))?;
        }
        if self.filename.part_separator.is_empty() || self.filename.internal_separator.is_empty() {
            return Err(ConfigError::Invalid(
                "filename separators must not be empty".into(),
            ));
        }
        if self.pipeline.render_dpi == 0 || self.pipeline.max_ocr_pages == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.render_dpi and pipeline.max_ocr_pages must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// `OLLAMA_HOST` may be given without a scheme (`127.0.0.1:11434`).
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

// ═══════════════════════════════════════════════════════════
// ConfigStore
// ═══════════════════════════════════════════════════════════

/// Holds the current configuration snapshot.
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<AppConfig>>,
}

impl ConfigStore {
    /// Wrap an in-memory configuration (no backing file).
    pub fn new(config: AppConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Load from `path`, applying environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = read_effective(path)?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(Self {
            path: Some(path.to_path_buf()),
            current: RwLock::new(Arc::new(config)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<AppConfig> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Validate and install a new configuration.
    pub fn replace(&self, config: AppConfig) -> Result<Arc<AppConfig>, ConfigError> {
        config.validate()?;
        let snapshot = Arc::new(config);
        match self.current.write() {
            Ok(mut guard) => *guard = Arc::clone(&snapshot),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&snapshot),
        }
        Ok(snapshot)
    }

    /// Re-read the backing file. Without one, returns the current snapshot.
    pub fn reload(&self) -> Result<Arc<AppConfig>, ConfigError> {
        match &self.path {
            Some(path) => {
                let config = read_effective(path)?;
                tracing::info!(path = %path.display(), "Configuration reloaded");
                self.replace(config)
            }
            None => Ok(self.snapshot()),
        }
    }
}

fn read_effective(path: &Path) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::load_from(path)?;
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

//! Ollama API contract types and endpoint/model validators.
//!
//! These types mirror the `/api/generate` and `/api/tags` wire formats. The
//! validators keep document contents on the local machine and keep model
//! names out of anything that looks like a path or a shell fragment.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Request / response types
// ──────────────────────────────────────────────

/// Decoding parameters sent as `options` on `/api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature. Lower = more deterministic.
    pub temperature: f32,
    /// Nucleus sampling threshold. Omitted from the request when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Maximum tokens in the generated response.
    pub num_predict: i32,
}

/// A single non-streaming generation request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    /// Base64-encoded images (PNG or JPEG). Omitted when empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    pub stream: bool,
    pub options: GenerationOptions,
}

impl GenerateRequest {
    pub fn new(model: &str, prompt: String, options: GenerationOptions) -> Self {
        Self {
            model: model.to_string(),
            prompt,
            images: Vec::new(),
            stream: false,
            options,
        }
    }

    pub fn with_image(mut self, base64_image: String) -> Self {
        self.images.push(base64_image);
        self
    }
}

/// Response body from `/api/generate`. Only `response` is required.
#[derive(Debug, Deserialize)]
pub(crate) struct GenerateResponse {
    pub response: String,
}

/// Installed model as listed by `/api/tags`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    /// Bytes on disk.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagsResponse {
    pub models: Vec<ModelInfo>,
}

/// Known vision-capable model name prefixes.
///
/// Fast heuristic used by the CLI health check; the service is the final
/// authority and rejects image input for text-only models.
pub const VISION_MODEL_PREFIXES: &[&str] = &[
    "llava",
    "bakllava",
    "llama3.2-vision",
    "qwen2.5vl",
    "qwen2.5-vl",
    "minicpm-v",
    "moondream",
    "gemma3",
    "granite3.2-vision",
];

/// Check if a model is vision-capable using the name prefix heuristic.
pub fn is_vision_model(model_name: &str) -> bool {
    let component = extract_model_component(model_name);
    VISION_MODEL_PREFIXES
        .iter()
        .any(|prefix| component.starts_with(prefix))
}

/// Maximum base64 payload for a single image (20 MB).
pub const MAX_IMAGE_BASE64_BYTES: usize = 20 * 1024 * 1024;

// ──────────────────────────────────────────────
// Error taxonomy for endpoint/model validation
// ──────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("Only localhost connections are allowed")]
    NonLocalEndpoint,

    #[error("Invalid URL format")]
    InvalidUrl,

    #[error("Invalid model name: '{0}'")]
    InvalidModelName(String),

    #[error("Image too large ({0} bytes), maximum is 20 MB")]
    ImageTooLarge(usize),
}

// ──────────────────────────────────────────────
// Validators
// ──────────────────────────────────────────────

/// Validate that a base URL points to localhost only.
///
/// Accepts: localhost, 127.0.0.1, [::1] (IPv6 loopback).
/// Rejects: any other host, malformed URLs.
pub fn validate_base_url(url: &str) -> Result<(), OllamaError> {
    let after_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or(OllamaError::InvalidUrl)?;

    let host = after_scheme
        .split(':')
        .next()
        .unwrap_or("")
        .split('/')
        .next()
        .unwrap_or("");

    // IPv6 bracket notation: [::1]
    let host_clean = if after_scheme.starts_with('[') {
        after_scheme
            .split(']')
            .next()
            .unwrap_or("")
            .trim_start_matches('[')
    } else {
        host
    };

    match host_clean {
        "localhost" | "127.0.0.1" | "::1" => Ok(()),
        _ => Err(OllamaError::NonLocalEndpoint),
    }
}

static MODEL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*(/[a-zA-Z0-9][a-zA-Z0-9._-]*)?(:[a-zA-Z0-9._-]+)?$")
        .expect("static regex")
});

/// Validate a model name against the Ollama naming convention.
///
/// Format: `[namespace/]model[:tag]`, each segment starting alphanumeric,
/// at most one `/`.
pub fn validate_model_name(name: &str) -> Result<(), OllamaError> {
    if name.is_empty() {
        return Err(OllamaError::InvalidModelName(name.to_string()));
    }

    if !MODEL_NAME.is_match(name) {
        return Err(OllamaError::InvalidModelName(name.to_string()));
    }

    Ok(())
}

/// Strip namespace and tag: `"library/qwen2.5vl:7b"` → `"qwen2.5vl"`.
pub fn extract_model_component(full_name: &str) -> String {
    let without_tag = full_name.split(':').next().unwrap_or(full_name);
    let model_part = without_tag.rsplit('/').next().unwrap_or(without_tag);
    model_part.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── URL validation ──

    #[test]
    fn validate_url_accepts_localhost() {
        assert!(validate_base_url("http://localhost:11434").is_ok());
        assert!(validate_base_url("http://localhost").is_ok());
        assert!(validate_base_url("https://localhost:11434").is_ok());
    }

    #[test]
    fn validate_url_accepts_loopback_ips() {
        assert!(validate_base_url("http://127.0.0.1:11434").is_ok());
        assert!(validate_base_url("http://[::1]:11434").is_ok());
    }

    #[test]
    fn validate_url_rejects_remote_hosts() {
        assert!(matches!(
            validate_base_url("http://192.168.1.100:11434"),
            Err(OllamaError::NonLocalEndpoint)
        ));
        assert!(validate_base_url("https://api.example.com").is_err());
    }

    #[test]
    fn validate_url_rejects_missing_scheme() {
        assert!(matches!(
            validate_base_url("localhost:11434"),
            Err(OllamaError::InvalidUrl)
        ));
        assert!(validate_base_url("").is_err());
    }

    // ── Model names ──

    #[test]
    fn validate_name_accepts_common_forms() {
        assert!(validate_model_name("llava").is_ok());
        assert!(validate_model_name("qwen2.5vl:7b").is_ok());
        assert!(validate_model_name("library/llama3.2-vision:11b").is_ok());
    }

    #[test]
    fn validate_name_rejects_injection_and_traversal() {
        assert!(validate_model_name("").is_err());
        assert!(validate_model_name("../etc/passwd").is_err());
        assert!(validate_model_name("; rm -rf /").is_err());
        assert!(validate_model_name("model name").is_err());
        assert!(validate_model_name("a/b/c").is_err());
        assert!(validate_model_name("-flag").is_err());
    }

    #[test]
    fn extract_component_strips_namespace_and_tag() {
        assert_eq!(extract_model_component("library/qwen2.5vl:7b"), "qwen2.5vl");
        assert_eq!(extract_model_component("Llava:13B"), "llava");
        assert_eq!(extract_model_component("llama3"), "llama3");
    }

    #[test]
    fn vision_heuristic() {
        assert!(is_vision_model("llava:13b"));
        assert!(is_vision_model("qwen2.5vl:7b"));
        assert!(is_vision_model("library/llama3.2-vision"));
        assert!(!is_vision_model("llama3.1:8b"));
        assert!(!is_vision_model("mistral"));
    }

    // ── Wire format ──

    #[test]
    fn request_omits_empty_images_and_top_p() {
        let req = GenerateRequest::new(
            "llama3.1:8b",
            "hi".into(),
            GenerationOptions {
                temperature: 0.1,
                top_p: None,
                num_predict: 300,
            },
        );
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("images").is_none());
        assert_eq!(json["stream"], false);
        assert!(json["options"].get("top_p").is_none());
        assert_eq!(json["options"]["num_predict"], 300);
    }

    #[test]
    fn request_carries_images_and_top_p() {
        let req = GenerateRequest::new(
            "llava",
            "describe".into(),
            GenerationOptions {
                temperature: 0.3,
                top_p: Some(0.9),
                num_predict: 300,
            },
        )
        .with_image("aGVsbG8=".into());
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["images"][0], "aGVsbG8=");
        assert!(json["options"]["top_p"].is_number());
    }

    #[test]
    fn response_requires_response_field() {
        let ok: Result<GenerateResponse, _> =
            serde_json::from_str(r#"{"model":"x","response":"text","done":true}"#);
        assert_eq!(ok.unwrap().response, "text");

        let missing: Result<GenerateResponse, _> =
            serde_json::from_str(r#"{"model":"x","done":true}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn tags_response_parses_minimal_models() {
        let tags: TagsResponse =
            serde_json::from_str(r#"{"models":[{"name":"llava:7b"},{"name":"mistral","size":42}]}"#)
                .unwrap();
        assert_eq!(tags.models.len(), 2);
        assert_eq!(tags.models[1].size, 42);
    }
}

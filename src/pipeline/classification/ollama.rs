use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::ollama_types::{
    validate_base_url, GenerateRequest, GenerateResponse, ModelInfo, TagsResponse,
};
use super::ClassificationError;
use crate::config::OllamaConfig;

/// Blocking access to a local inference service.
///
/// Implemented by `OllamaClient` for production and by the mocks below for
/// tests. Every call is synchronous; callers run on the queue worker thread.
pub trait LlmClient: Send + Sync {
    /// Run one non-streaming generation and return the `response` text.
    fn generate(&self, request: &GenerateRequest) -> Result<String, ClassificationError>;

    /// Installed models.
    fn list_models(&self) -> Result<Vec<ModelInfo>, ClassificationError>;
}

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a client for a loopback Ollama instance.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ClassificationError> {
        validate_base_url(base_url)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ClassificationError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn from_config(config: &OllamaConfig) -> Result<Self, ClassificationError> {
        Self::new(&config.base_url, config.timeout_secs)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> ClassificationError {
        if e.is_connect() {
            ClassificationError::OllamaConnection(self.base_url.clone())
        } else if e.is_timeout() {
            ClassificationError::Timeout(self.timeout_secs)
        } else {
            ClassificationError::HttpClient(e.to_string())
        }
    }
}

impl LlmClient for OllamaClient {
    fn generate(&self, request: &GenerateRequest) -> Result<String, ClassificationError> {
        let _span = tracing::debug_span!(
            "ollama_generate",
            model = %request.model,
            images = request.images.len(),
        )
        .entered();
        let start = std::time::Instant::now();
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClassificationError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| ClassificationError::ResponseParsing(e.to_string()))?;

        tracing::debug!(
            model = %request.model,
            elapsed_ms = %start.elapsed().as_millis(),
            response_len = parsed.response.len(),
            "Generation complete"
        );
        Ok(parsed.response)
    }

    fn list_models(&self) -> Result<Vec<ModelInfo>, ClassificationError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClassificationError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TagsResponse = response
            .json()
            .map_err(|e| ClassificationError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models)
    }
}

// ──────────────────────────────────────────────
// Test doubles
// ──────────────────────────────────────────────

/// Mock LLM client for testing: returns one configurable response.
pub struct MockLlmClient {
    response: String,
    available_models: Vec<String>,
    unreachable: bool,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            available_models: vec!["qwen2.5vl:7b".to_string()],
            unreachable: false,
        }
    }

    /// A client whose every call fails as if the service were down.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new("")
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _request: &GenerateRequest) -> Result<String, ClassificationError> {
        if self.unreachable {
            return Err(ClassificationError::OllamaConnection("mock".into()));
        }
        Ok(self.response.clone())
    }

    fn list_models(&self) -> Result<Vec<ModelInfo>, ClassificationError> {
        if self.unreachable {
            return Err(ClassificationError::OllamaConnection("mock".into()));
        }
        Ok(self
            .available_models
            .iter()
            .map(|name| ModelInfo {
                name: name.clone(),
                size: 0,
                modified_at: String::new(),
            })
            .collect())
    }
}

/// Replays a fixed sequence of outcomes and records every request.
///
/// Once the script is exhausted each call fails with `ResponseParsing`.
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, ClassificationError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedLlmClient {
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<String, ClassificationError>>,
    {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience for an all-success script.
    pub fn replying(responses: &[&str]) -> Self {
        Self::new(responses.iter().map(|r| Ok(r.to_string())))
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl LlmClient for ScriptedLlmClient {
    fn generate(&self, request: &GenerateRequest) -> Result<String, ClassificationError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| {
            Err(ClassificationError::ResponseParsing(
                "scripted client exhausted".into(),
            ))
        })
    }

    fn list_models(&self) -> Result<Vec<ModelInfo>, ClassificationError> {
        Ok(Vec::new())
    }
}

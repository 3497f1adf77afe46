pub mod amount;
pub mod classifier;
pub mod confidence;
pub mod ollama;
pub mod ollama_types;
pub mod parser;
pub mod prompt;

pub use amount::*;
pub use classifier::*;
pub use confidence::*;
pub use ollama::*;
pub use ollama_types::{
    is_vision_model, validate_base_url, validate_model_name, GenerateRequest, GenerationOptions,
    ModelInfo, OllamaError,
};
pub use parser::*;
pub use prompt::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("Ollama is not running at {0}")]
    OllamaConnection(String),

    #[error("Ollama returned error (status {status}): {body}")]
    OllamaError { status: u16, body: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error(transparent)]
    Validation(#[from] OllamaError),
}

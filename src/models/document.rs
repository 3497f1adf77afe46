use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::DocumentType;

/// A monetary amount held as integer minor units (cents) to avoid float drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub minor_units: i64,
    /// ISO 4217 code, e.g. "EUR".
    pub currency: String,
}

impl Amount {
    pub fn new(minor_units: i64, currency: &str) -> Self {
        Self {
            minor_units,
            currency: currency.to_string(),
        }
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.minor_units < 0 { "-" } else { "" };
        let abs = self.minor_units.unsigned_abs();
        write!(f, "{sign}{}.{:02} {}", abs / 100, abs % 100, self.currency)
    }
}

/// One scanned document moving through the pipeline.
///
/// Built when processing starts and filled in stage by stage. Once the
/// pipeline returns it is handed out read-only inside `ProcessingResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub source_path: PathBuf,
    pub destination_path: Option<PathBuf>,
    pub doc_type: DocumentType,
    /// Type string exactly as the model returned it.
    pub raw_type: Option<String>,
    confidence: f32,
    pub extracted_text: String,
    pub vendor: Option<String>,
    pub amount: Option<Amount>,
    pub document_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(source_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_path,
            destination_path: None,
            doc_type: DocumentType::Unknown,
            raw_type: None,
            confidence: 0.0,
            extracted_text: String::new(),
            vendor: None,
            amount: None,
            document_date: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Store a confidence value, clamped to [0.0, 1.0]. NaN becomes 0.0.
    pub fn set_confidence(&mut self, confidence: f32) {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
    }

    /// Record the model's raw type string and derive the typed value from it.
    pub fn set_raw_type(&mut self, raw: &str) {
        self.doc_type = DocumentType::from_raw(raw);
        self.raw_type = Some(raw.to_string());
    }
}

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::confidence::score_components;

/// Title used when the model output could not be parsed.
pub const FALLBACK_TITLE: &str = "Dokument";

/// Confidence assigned to the fallback components.
pub const FALLBACK_CONFIDENCE: f32 = 0.5;

/// One labelled fact the model pulled out of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub label: String,
    pub value: String,
    pub confidence: f32,
}

/// Structured output of the extraction stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationComponents {
    /// Document date as returned by the model (expected `YYYY-MM-DD`).
    pub date: String,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub components: Vec<Component>,
    /// Overall confidence, 0.0–1.0.
    pub confidence: f32,
}

impl ClassificationComponents {
    /// Safe result when the response holds no usable JSON.
    pub fn fallback(file_date: &str) -> Self {
        Self {
            date: file_date.to_string(),
            title: FALLBACK_TITLE.to_string(),
            doc_type: "unknown".to_string(),
            components: Vec::new(),
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

/// Parse the extraction-stage response.
///
/// Never fails: a response without a decodable JSON object yields
/// `ClassificationComponents::fallback`. Keys missing from the object take
/// per-key defaults and malformed component entries are skipped.
pub fn parse_components(response: &str, file_date: &str) -> ClassificationComponents {
    let Some(json_str) = extract_json_object(response) else {
        tracing::warn!("No JSON object in extraction response, using fallback");
        return ClassificationComponents::fallback(file_date);
    };

    let raw: serde_json::Value = match serde_json::from_str(&json_str) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        Ok(_) | Err(_) => {
            tracing::warn!("Extraction response is not valid JSON, using fallback");
            return ClassificationComponents::fallback(file_date);
        }
    };

    let mut parsed = ClassificationComponents {
        date: string_field(&raw, "date").unwrap_or_else(|| file_date.to_string()),
        title: string_field(&raw, "title").unwrap_or_default(),
        doc_type: string_field(&raw, "type").unwrap_or_else(|| "unknown".to_string()),
        components: parse_components_lenient(raw.get("components")),
        confidence: 0.0,
    };
    parsed.confidence = score_components(&parsed, file_date);
    parsed
}

/// Strip Markdown fences and slice from the first `{` to the last `}`.
pub fn extract_json_object(response: &str) -> Option<String> {
    let unfenced = strip_fences(response);
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end < start {
        return None;
    }
    Some(unfenced[start..=end].to_string())
}

/// Body of a ```json fence when there is one, else the text with every
/// literal ``` removed.
fn strip_fences(response: &str) -> Cow<'_, str> {
    if let Some(open) = response.find("```json") {
        let body_start = open + "```json".len();
        return Cow::Borrowed(match response[body_start..].find("```") {
            Some(close) => &response[body_start..body_start + close],
            None => &response[body_start..],
        });
    }
    if response.contains("```") {
        return Cow::Owned(response.replace("```", ""));
    }
    Cow::Borrowed(response)
}

fn string_field(raw: &serde_json::Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Keep entries with a string label and a string or numeric value.
fn parse_components_lenient(items: Option<&serde_json::Value>) -> Vec<Component> {
    let Some(serde_json::Value::Array(arr)) = items else {
        return vec![];
    };
    arr.iter()
        .filter_map(|item| {
            let label = item.get("label")?.as_str()?.trim().to_string();
            let value = match item.get("value")? {
                serde_json::Value::String(s) => s.trim().to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            if label.is_empty() || value.is_empty() {
                return None;
            }
            let confidence = item
                .get("confidence")
                .and_then(|c| c.as_f64())
                .map(|c| (c as f32).clamp(0.0, 1.0))
                .unwrap_or(0.0);
            Some(Component {
                label,
                value,
                confidence,
            })
        })
        .collect()
}

use super::parser::ClassificationComponents;
use crate::pipeline::naming::parse_iso_date;

/// Values the model uses when it has nothing to say.
const PLACEHOLDERS: &[&str] = &[
    "keine angabe",
    "keine",
    "n/a",
    "unbekannt",
    "unknown",
    "dokument",
    "document",
];

/// Component confidence that counts as "high".
pub const HIGH_COMPONENT_CONFIDENCE: f32 = 0.8;

/// True for empty strings and known filler values (case-insensitive).
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v.is_empty() || PLACEHOLDERS.contains(&v.as_str())
}

/// Overall confidence of a parsed extraction, 0.0–1.0.
///
/// Additive: type up to 0.30, title up to 0.20, date up to 0.20 and
/// components up to 0.30.
pub fn score_components(components: &ClassificationComponents, file_date: &str) -> f32 {
    let type_score: f32 = if is_placeholder(&components.doc_type) {
        0.10
    } else {
        0.30
    };

    let title = components.title.trim();
    let title_score: f32 = if title.is_empty() {
        0.0
    } else if !is_placeholder(title) && title.chars().count() > 5 {
        0.20
    } else {
        0.10
    };

    let date = components.date.trim();
    let date_score: f32 = if parse_iso_date(date).is_some() && date != file_date {
        0.20
    } else {
        0.05
    };

    let high = components
        .components
        .iter()
        .filter(|c| c.confidence >= HIGH_COMPONENT_CONFIDENCE)
        .count();
    let component_score: f32 = match (high, components.components.len()) {
        (_, 0) => 0.0,
        (h, _) if h >= 2 => 0.30,
        (1, _) => 0.20,
        _ => 0.10,
    };

    (type_score + title_score + date_score + component_score).clamp(0.0, 1.0)
}

//! Prompt assembly for the two classification stages.

/// Language names scanned for in the image description, with the tag each maps to.
///
/// Order matters: the first name found wins.
const LANGUAGE_MARKERS: &[(&str, &str)] = &[
    ("GERMAN", "GERMAN"),
    ("DEUTSCH", "GERMAN"),
    ("ENGLISH", "ENGLISH"),
    ("ENGLISCH", "ENGLISH"),
    ("FRENCH", "FRENCH"),
    ("FRANZÖSISCH", "FRENCH"),
    ("SPANISH", "SPANISH"),
    ("ITALIAN", "ITALIAN"),
    ("DUTCH", "DUTCH"),
];

pub const UNKNOWN_LANGUAGE: &str = "UNKNOWN";

/// Substitute `{name}` placeholders in one pass.
///
/// Values are inserted verbatim and never re-scanned, so OCR text that
/// happens to contain `{file_name}` stays as written. Unknown placeholders
/// are left untouched.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// First `max_chars` characters of `text` (char boundary safe).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Coarse language tag from a free-text description.
pub fn detect_language(description: &str) -> &'static str {
    let upper = description.to_uppercase();
    LANGUAGE_MARKERS
        .iter()
        .find(|(name, _)| upper.contains(name))
        .map(|(_, tag)| *tag)
        .unwrap_or(UNKNOWN_LANGUAGE)
}

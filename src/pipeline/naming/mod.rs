//! Deterministic file names from classification output.
//!
//! `<date>_<Title>_<component>..._<component>.pdf`, with separators,
//! date pattern and limits taken from `FilenameConfig`. The same input and
//! the same `today` always produce the same name.

pub mod target;

pub use target::*;

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::config::FilenameConfig;
use crate::pipeline::classification::{parse_amount, ClassificationComponents};

/// Stem used when every part came out empty.
pub const FALLBACK_STEM: &str = "document";

pub const PDF_EXTENSION: &str = "pdf";

/// Titles that carry no information and are left out of the name.
const TITLE_DENYLIST: &[&str] = &["keine angabe", "keine", "n/a", "unbekannt", "unknown"];

/// Components looked at, in order, before the confidence filter.
const COMPONENTS_CONSIDERED: usize = 5;

/// Amounts are written as integer cents behind this prefix, whatever the
/// detected currency.
const AMOUNT_TOKEN_PREFIX: &str = "EUR";

#[derive(Error, Debug)]
pub enum NamingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source path has no parent directory: {0}")]
    NoParent(PathBuf),

    #[error("No free file name for {0} after {1} attempts")]
    Exhausted(PathBuf, u32),
}

/// Build the file name using the local date as the fallback date.
pub fn build_file_name(components: &ClassificationComponents, config: &FilenameConfig) -> String {
    build_file_name_on(components, config, chrono::Local::now().date_naive())
}

/// Build the file name with an explicit fallback date.
pub fn build_file_name_on(
    components: &ClassificationComponents,
    config: &FilenameConfig,
    today: NaiveDate,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if config.include_date {
        let date = parse_iso_date(&components.date).unwrap_or(today);
        parts.push(format_date(date, &config.date_format));
    }

    let title = components.title.trim();
    if !title.is_empty() && !TITLE_DENYLIST.contains(&title.to_lowercase().as_str()) {
        let sanitized = sanitize_title(title, &config.internal_separator, config.title_max_chars);
        if !sanitized.is_empty() {
            parts.push(sanitized);
        }
    }

    if config.include_components {
        let kept = components
            .components
            .iter()
            .take(COMPONENTS_CONSIDERED)
            .filter(|c| c.confidence >= config.component_min_confidence)
            .take(config.max_components);
        for component in kept {
            let part = match parse_amount(&component.value) {
                Some(amount) => format!("{AMOUNT_TOKEN_PREFIX}{}", amount.minor_units),
                None => sanitize_part(
                    &component.value,
                    &config.internal_separator,
                    config.component_max_chars,
                ),
            };
            if part.chars().count() > 1 {
                parts.push(part);
            }
        }
    }

    let joined = transliterate_umlauts(&parts.join(&config.part_separator));
    let mut stem = collapse_separator(&joined, &config.part_separator);
    stem = collapse_separator(&stem, &config.internal_separator);
    let stem = trim_separators(
        &stem,
        &[config.part_separator.as_str(), config.internal_separator.as_str()],
    );

    if stem.is_empty() {
        format!("{FALLBACK_STEM}.{PDF_EXTENSION}")
    } else {
        format!("{stem}.{PDF_EXTENSION}")
    }
}

/// `YYYY-MM-DD` only.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Render `date` with a pattern containing `YYYY`, `MM` and `DD`.
pub fn format_date(date: NaiveDate, pattern: &str) -> String {
    pattern
        .replace("YYYY", &date.format("%Y").to_string())
        .replace("MM", &date.format("%m").to_string())
        .replace("DD", &date.format("%d").to_string())
}

/// Keep letters, digits, underscore, hyphen and whitespace; join words with
/// `separator`; cut to `max_chars`.
pub fn sanitize_part(value: &str, separator: &str, max_chars: usize) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join(separator);
    let joined = collapse_separator(&joined, separator);
    let truncated: String = joined.chars().take(max_chars).collect();
    trim_separators(&truncated, &[separator, "-", "_"])
}

/// `sanitize_part` plus title case. Idempotent.
pub fn sanitize_title(title: &str, separator: &str, max_chars: usize) -> String {
    let cased = title_case(title);
    sanitize_part(&cased, separator, max_chars)
}

/// Upper-case the first letter of every alphanumeric run, lower-case the rest.
fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for c in value.chars() {
        if c.is_alphanumeric() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// ä→ae, ö→oe, ü→ue, ß→ss, capitals included.
pub fn transliterate_umlauts(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'Ä' => out.push_str("Ae"),
            'Ö' => out.push_str("Oe"),
            'Ü' => out.push_str("Ue"),
            'ß' => out.push_str("ss"),
            'ẞ' => out.push_str("SS"),
            other => out.push(other),
        }
    }
    out
}

fn collapse_separator(value: &str, separator: &str) -> String {
    if separator.is_empty() {
        return value.to_string();
    }
    let doubled = separator.repeat(2);
    let mut out = value.to_string();
    while out.contains(&doubled) {
        out = out.replace(&doubled, separator);
    }
    out
}

fn trim_separators(value: &str, separators: &[&str]) -> String {
    let mut s = value;
    loop {
        let before = s.len();
        for sep in separators.iter().filter(|sep| !sep.is_empty()) {
            s = s.trim_start_matches(*sep).trim_end_matches(*sep);
        }
        if s.len() == before {
            return s.to_string();
        }
    }
}

//! Currency amount recognition in model output.
//!
//! An amount counts only when it is at least 10 and either carries a
//! currency marker (`€`, `EUR`, `$`, `USD`, `CHF`, `£`) or has exactly two
//! decimals. Both `1.234,56` and `1,234.56` are understood.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::models::Amount;

/// Smallest amount (in minor units) worth reporting.
pub const MIN_AMOUNT_MINOR: i64 = 10_00;

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<pre>€|\bEUR\b|\$|\bUSD\b|\bCHF\b|£)?\s*(?P<num>\d{1,3}(?:[.,']\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?)\s*(?P<post>€|\bEUR\b|\$|\bUSD\b|\bCHF\b|£)?",
    )
    .expect("static regex")
});

/// Parse a value that is an amount and nothing else, e.g. `"49.90 EUR"`.
pub fn parse_amount(value: &str) -> Option<Amount> {
    let trimmed = value.trim();
    let caps = AMOUNT_RE.captures(trimmed)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 || whole.end() != trimmed.len() {
        return None;
    }
    amount_from_captures(&caps)
}

/// First qualifying amount anywhere in `text`.
pub fn find_amount(text: &str) -> Option<Amount> {
    AMOUNT_RE
        .captures_iter(text)
        .filter(|caps| caps.name("num").is_some_and(|m| stands_alone(text, m.start(), m.end())))
        .find_map(|caps| amount_from_captures(&caps))
}

/// Reject numbers that are a fragment of a longer token such as a date
/// (`15.03.2025`) or a reference number.
fn stands_alone(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    if before.is_some_and(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return false;
    }
    let mut after = text[end..].chars();
    match after.next() {
        Some(c) if c.is_ascii_digit() => false,
        Some('.') | Some(',') => !after.next().is_some_and(|c| c.is_ascii_digit()),
        _ => true,
    }
}

fn amount_from_captures(caps: &Captures<'_>) -> Option<Amount> {
    let num = caps.name("num")?.as_str();
    let marker = caps.name("pre").or_else(|| caps.name("post"));
    let (minor_units, decimals) = parse_minor_units(num)?;

    if marker.is_none() && decimals != 2 {
        return None;
    }
    if minor_units < MIN_AMOUNT_MINOR {
        return None;
    }

    let currency = marker.map(|m| currency_code(m.as_str())).unwrap_or("EUR");
    Some(Amount::new(minor_units, currency))
}

/// Returns (minor units, number of decimal digits written).
fn parse_minor_units(num: &str) -> Option<(i64, usize)> {
    let (int_part, frac_part) = match num.rfind(['.', ',']) {
        Some(idx) if (1..=2).contains(&(num.len() - idx - 1)) => (&num[..idx], &num[idx + 1..]),
        _ => (num, ""),
    };

    let digits: String = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
    let whole: i64 = digits.parse().ok()?;
    let cents: i64 = match frac_part.len() {
        0 => 0,
        1 => frac_part.parse::<i64>().ok()? * 10,
        _ => frac_part.parse().ok()?,
    };

    let minor = whole.checked_mul(100)?.checked_add(cents)?;
    Some((minor, frac_part.len()))
}

fn currency_code(marker: &str) -> &'static str {
    match marker.to_uppercase().as_str() {
        "$" | "USD" => "USD",
        "CHF" => "CHF",
        "£" => "GBP",
        _ => "EUR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_marked_amounts() {
        assert_eq!(parse_amount("49.90 EUR"), Some(Amount::new(4990, "EUR")));
        assert_eq!(parse_amount("€ 120"), Some(Amount::new(12000, "EUR")));
        assert_eq!(parse_amount("$15.5"), Some(Amount::new(1550, "USD")));
        assert_eq!(parse_amount("CHF 10"), Some(Amount::new(1000, "CHF")));
    }

    #[test]
    fn parses_both_separator_conventions() {
        assert_eq!(parse_amount("1.234,56 €"), Some(Amount::new(123456, "EUR")));
        assert_eq!(parse_amount("1,234.56 USD"), Some(Amount::new(123456, "USD")));
        assert_eq!(parse_amount("1.234 EUR"), Some(Amount::new(123400, "EUR")));
    }

    #[test]
    fn unmarked_needs_two_decimals() {
        assert_eq!(parse_amount("49,90"), Some(Amount::new(4990, "EUR")));
        assert!(parse_amount("4990").is_none());
        assert!(parse_amount("49,9").is_none());
    }

    #[test]
    fn below_ten_is_ignored() {
        assert!(parse_amount("9.99 EUR").is_none());
        assert_eq!(parse_amount("10.00 EUR"), Some(Amount::new(1000, "EUR")));
    }

    #[test]
    fn parse_requires_whole_value() {
        assert!(parse_amount("ABC GmbH").is_none());
        assert!(parse_amount("Total 49.90 EUR").is_none());
        assert!(parse_amount("").is_none());
    }

    #[test]
    fn find_scans_free_text() {
        assert_eq!(
            find_amount("Invoice 2025-0042, total due 49,90 EUR"),
            Some(Amount::new(4990, "EUR"))
        );
        assert_eq!(find_amount("Summe: € 1.299,00"), Some(Amount::new(129900, "EUR")));
    }

    #[test]
    fn find_skips_dates_and_references() {
        assert!(find_amount("Datum 15.03.2025").is_none());
        assert!(find_amount("Kundennummer 123456").is_none());
        assert!(find_amount("").is_none());
    }

    #[test]
    fn huge_numbers_do_not_overflow() {
        assert!(parse_amount("99999999999999999999999 EUR").is_none());
    }
}

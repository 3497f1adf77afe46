//! Choose between the embedded text layer (candidate A) and fresh OCR
//! (candidate B).
//!
//! Each candidate gets a 0–100 quality score built from five sub-scores of
//! up to 20 points: length, word count, readability, language plausibility
//! and line structure. B replaces A only when it scores more than 10% higher.

use std::sync::LazyLock;

use regex::Regex;

use super::types::OcrComparisonResult;
use crate::models::OcrRecommendation;

/// Candidate A shorter than this (after trimming) is not worth scoring.
pub const MIN_EXISTING_CHARS: usize = 10;

/// B must beat A by this factor.
pub const REPLACEMENT_MARGIN: f32 = 1.1;

static GERMAN_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(der|die|das|und|ist|nicht|mit|von|für|auf|den|dem|ein|eine|sie|wir)\b")
        .expect("static regex")
});

static ENGLISH_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(the|and|is|are|of|to|in|for|with|this|that|you|your)\b")
        .expect("static regex")
});

/// Compare two candidate extractions. Pure; never fails.
pub fn compare(candidate_a: Option<&str>, candidate_b: &str) -> OcrComparisonResult {
    let existing = candidate_a.map(str::trim).unwrap_or("");
    if existing.chars().count() < MIN_EXISTING_CHARS {
        return OcrComparisonResult {
            recommendation: OcrRecommendation::NoExistingText,
            reason: "no existing OCR or too short".into(),
            score_a: 0.0,
            score_b: quality_score(candidate_b),
            selected_text: candidate_b.to_string(),
        };
    }

    let score_a = quality_score(existing);
    let score_b = quality_score(candidate_b);
    let recommendation = decide(score_a, score_b);

    let (reason, selected_text) = match recommendation {
        OcrRecommendation::UseCandidateB => (
            format!("new OCR scores {score_b:.1} vs existing {score_a:.1}"),
            candidate_b.to_string(),
        ),
        _ => (
            format!("existing OCR scores {score_a:.1}, new OCR {score_b:.1} is not 10% better"),
            existing.to_string(),
        ),
    };

    OcrComparisonResult {
        recommendation,
        reason,
        score_a,
        score_b,
        selected_text,
    }
}

/// `UseCandidateB` iff `score_b > score_a * 1.1`.
pub fn decide(score_a: f32, score_b: f32) -> OcrRecommendation {
    if score_b > score_a * REPLACEMENT_MARGIN {
        OcrRecommendation::UseCandidateB
    } else {
        OcrRecommendation::KeepCandidateA
    }
}

/// Quality score in [0, 100].
pub fn quality_score(text: &str) -> f32 {
    let chars = text.chars().count() as f32;
    let words = text.split_whitespace().count();
    let non_space = text.chars().filter(|c| !c.is_whitespace()).count() as f32;
    let line_breaks = text.matches('\n').count() as f32;

    let length = (chars / 500.0 * 20.0).min(20.0);
    let word_score = (words as f32 / 100.0 * 20.0).min(20.0);

    let readability = if words == 0 {
        10.0
    } else {
        let avg = non_space / words as f32;
        if avg > 3.0 && avg < 15.0 {
            20.0
        } else {
            10.0
        }
    };

    let language = if GERMAN_WORDS.is_match(text) || ENGLISH_WORDS.is_match(text) {
        20.0
    } else {
        10.0
    };

    let structure = (line_breaks / 10.0 * 20.0).min(20.0);

    length + word_score + readability + language + structure
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_german(lines: usize) -> String {
        (0..lines)
            .map(|i| format!("Die Rechnung Nummer {i} ist mit der Post gekommen und wird bezahlt"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn margin_boundary() {
        assert_eq!(decide(50.0, 55.0), OcrRecommendation::KeepCandidateA);
        assert_eq!(decide(50.0, 56.0), OcrRecommendation::UseCandidateB);
        assert_eq!(decide(0.0, 0.0), OcrRecommendation::KeepCandidateA);
    }

    #[test]
    fn missing_or_short_a_selects_b() {
        for a in [None, Some(""), Some("   short  ")] {
            let result = compare(a, "fresh text");
            assert_eq!(result.recommendation, OcrRecommendation::NoExistingText);
            assert_eq!(result.selected_text, "fresh text");
            assert_eq!(result.reason, "no existing OCR or too short");
            assert_eq!(result.score_a, 0.0);
            assert_eq!(result.score_b, quality_score("fresh text"));
            assert!(result.score_b > 0.0);
        }
    }

    #[test]
    fn scores_are_bounded() {
        let texts = vec![
            String::new(),
            "x".to_string(),
            "word ".repeat(1000),
            sample_german(50),
            "\n\n\n\n".to_string(),
        ];
        for text in &texts {
            let s = quality_score(text);
            assert!((0.0..=100.0).contains(&s), "score {s} out of range");
        }
    }

    #[test]
    fn rich_text_maxes_out() {
        let text = sample_german(20);
        assert!((quality_score(&text) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn garbage_scores_low() {
        // One long token, no function words, no line breaks.
        let s = quality_score("x#%&x#%&x#%&x#%&x#%&");
        assert!(s < 25.0, "got {s}");
    }

    #[test]
    fn much_better_b_replaces_a() {
        let a = "sc4nn3d g4rb4ge t3xt";
        let b = sample_german(12);
        let result = compare(Some(a), &b);
        assert_eq!(result.recommendation, OcrRecommendation::UseCandidateB);
        assert_eq!(result.selected_text, b);
        assert!(result.score_b > result.score_a);
    }

    #[test]
    fn similar_quality_keeps_a() {
        let a = sample_german(12);
        let b = sample_german(12).replace("Post", "Postt");
        let result = compare(Some(&a), &b);
        assert_eq!(result.recommendation, OcrRecommendation::KeepCandidateA);
        assert_eq!(result.selected_text, a);
    }

    #[test]
    fn compare_is_pure() {
        let a = sample_german(3);
        let b = sample_german(8);
        assert_eq!(compare(Some(&a), &b), compare(Some(&a), &b));
    }

    #[test]
    fn english_function_words_count() {
        let with = quality_score("this is the invoice");
        let without = quality_score("xyzq wvut srqp onml");
        assert!((with - without - 10.0).abs() < 1e-3);
    }
}

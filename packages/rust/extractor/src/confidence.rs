//! Deterministic confidence scoring.
//!
//! Confidence is always recomputed from the extraction method and the
//! evidence itself; it is never defaulted once extraction succeeds.

use firmfacts_shared::ExtractionMethod;

/// Base score by extraction method.
fn base_score(method: ExtractionMethod) -> f64 {
    match method {
        ExtractionMethod::Structured => 0.9,
        ExtractionMethod::Llm => 0.8,
        ExtractionMethod::Regex => 0.7,
    }
}

/// Score one extracted fact:
/// base(method) +0.1 if the evidence exceeds 100 chars, +0.1 more past
/// 200 chars, +0.1 if the extracted value contains a numeric token,
/// capped at 1.0.
pub fn score(method: ExtractionMethod, source_text: &str, value_text: &str) -> f64 {
    let mut score = base_score(method);

    if source_text.len() > 100 {
        score += 0.1;
    }
    if source_text.len() > 200 {
        score += 0.1;
    }
    if value_text.chars().any(|c| c.is_ascii_digit()) {
        score += 0.1;
    }

    score.min(1.0)
}

/// Mean confidence over a set of scores; 0.0 for an empty set.
pub fn average(scores: impl IntoIterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for s in scores {
        sum += s;
        count += 1;
    }
    if count == 0 { 0.0 } else { sum / count as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: &str = "short evidence";
    const MEDIUM: &str =
        "evidence text that is comfortably longer than one hundred characters so the \
         first length bonus applies to the score";

    fn long_evidence() -> String {
        format!("{MEDIUM} {MEDIUM}")
    }

    #[test]
    fn base_scores_by_method() {
        assert_eq!(score(ExtractionMethod::Structured, SHORT, "x"), 0.9);
        assert_eq!(score(ExtractionMethod::Llm, SHORT, "x"), 0.8);
        assert_eq!(score(ExtractionMethod::Regex, SHORT, "x"), 0.7);
    }

    #[test]
    fn evidence_length_bonuses() {
        assert_eq!(score(ExtractionMethod::Regex, MEDIUM, "x"), 0.7 + 0.1);
        assert_eq!(
            score(ExtractionMethod::Regex, &long_evidence(), "x"),
            0.7 + 0.1 + 0.1
        );
    }

    #[test]
    fn numeric_value_bonus_and_cap() {
        assert_eq!(score(ExtractionMethod::Regex, SHORT, "4,200"), 0.7 + 0.1);
        // 0.9 + 0.1 + 0.1 + 0.1 caps at 1.0
        assert_eq!(
            score(ExtractionMethod::Structured, &long_evidence(), "4200"),
            1.0
        );
    }

    #[test]
    fn average_is_order_independent() {
        let a = average([0.9, 0.7, 0.8]);
        let b = average([0.7, 0.8, 0.9]);
        assert!((a - b).abs() < f64::EPSILON);
        assert!((a - 0.8).abs() < 1e-9);
    }

    #[test]
    fn average_of_empty_is_zero() {
        assert_eq!(average([]), 0.0);
    }

    #[test]
    fn average_monotone_in_high_confidence_facts() {
        let base = average([0.5, 0.5]);
        let with_high = average([0.5, 0.5, 0.95]);
        assert!(with_high > base);
    }
}

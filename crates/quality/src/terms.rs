use std::sync::OnceLock;

use regex::Regex;
use voxdub_interface::{Language, TermPreservation};

fn number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:[.,]\d+)?%?").expect("number pattern"))
}

fn date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4}").expect("date pattern")
    })
}

fn capitalized_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][A-Za-z]+\b").expect("capitalized pattern"))
}

fn ascii_run_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z]{2,}").expect("ascii run pattern"))
}

/// Salient tokens that must survive translation: numbers, dates, proper
/// nouns (capitalized words not opening a sentence), and, for non-Latin
/// target scripts, any ASCII-alphabetic run, since those are
/// product names and identifiers a translator has no business rewriting.
pub fn extract_terms(original: &str, target: Language) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let mut push = |term: &str| {
        if !terms.iter().any(|t| t == term) {
            terms.push(term.to_string());
        }
    };

    for m in date_pattern().find_iter(original) {
        push(m.as_str());
    }
    for m in number_pattern().find_iter(original) {
        push(m.as_str());
    }
    for m in capitalized_pattern().find_iter(original) {
        if !is_sentence_initial(original, m.start()) {
            push(m.as_str());
        }
    }
    if target.is_non_latin() {
        for m in ascii_run_pattern().find_iter(original) {
            push(m.as_str());
        }
    }
    terms
}

/// A capitalized word right after a sentence boundary (or at the very
/// start) is probably just capitalization, not a proper noun.
fn is_sentence_initial(text: &str, start: usize) -> bool {
    let before = text[..start].trim_end();
    if before.is_empty() {
        return true;
    }
    before.ends_with(['.', '!', '?', '\n'])
}

/// Fraction of extracted terms that survive into the translation.
/// Latin-alphabet terms match case-insensitively; numbers and dates must
/// appear verbatim. No salient terms means a perfect score.
pub fn check_preservation(
    original: &str,
    translated: &str,
    target: Language,
) -> TermPreservation {
    let terms = extract_terms(original, target);
    if terms.is_empty() {
        return TermPreservation { score: 1.0, missing: Vec::new() };
    }

    let translated_lower = translated.to_lowercase();
    let mut missing = Vec::new();
    let mut matched = 0usize;

    for term in &terms {
        let found = if term.chars().any(|c| c.is_ascii_alphabetic()) {
            translated_lower.contains(&term.to_lowercase())
        } else {
            translated.contains(term.as_str())
        };
        if found {
            matched += 1;
        } else {
            missing.push(term.clone());
        }
    }

    TermPreservation {
        score: matched as f32 / terms.len() as f32,
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_numbers_and_percentages() {
        let terms = extract_terms("Take 2.5mg twice, reduce by 30%.", Language::En);
        assert!(terms.contains(&"2.5".to_string()));
        assert!(terms.contains(&"30%".to_string()));
    }

    #[test]
    fn extracts_dates() {
        let terms = extract_terms("Launched on 2024-03-15 worldwide.", Language::En);
        assert!(terms.contains(&"2024-03-15".to_string()));
    }

    #[test]
    fn skips_sentence_initial_capitals() {
        let terms = extract_terms("The scan was clear. Results from Stanford agree.", Language::En);
        assert!(terms.contains(&"Stanford".to_string()));
        assert!(!terms.contains(&"The".to_string()));
        assert!(!terms.contains(&"Results".to_string()));
    }

    #[test]
    fn ascii_runs_only_for_non_latin_targets() {
        let text = "the api rate";
        assert!(extract_terms(text, Language::En).is_empty());
        assert!(extract_terms(text, Language::Ko).contains(&"api".to_string()));
    }

    #[test]
    fn preservation_ratio_counts_matches() {
        let original = "Dr. Chen prescribed 40mg of Lipitor.";
        let good = "첸 박사는 Lipitor 40mg을 처방했습니다.";
        let report = check_preservation(original, good, Language::Ko);
        assert!(report.score >= 0.4);

        let bad = "의사가 약을 처방했습니다.";
        let report = check_preservation(original, bad, Language::Ko);
        assert!(report.score < 0.3);
        assert!(report.missing.contains(&"Lipitor".to_string()));
    }

    #[test]
    fn latin_terms_match_case_insensitively() {
        let report = check_preservation("Use the GitHub repo.", "use the github repo.", Language::En);
        assert_eq!(report.score, 1.0);
    }

    #[test]
    fn no_terms_is_perfect() {
        let report = check_preservation("그리고 계속 갑니다", "and it continues", Language::En);
        assert_eq!(report.score, 1.0);
        assert!(report.missing.is_empty());
    }
}

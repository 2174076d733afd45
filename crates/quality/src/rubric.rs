use voxdub_interface::Language;

/// Evaluation criteria the target language needs spelled out beyond the
/// base rubric.
fn language_notes(target: Language) -> &'static str {
    match target {
        Language::Ko => {
            "\nAdditional criteria for Korean:\n\
             - Sentence endings should sound natural and spoken, not literary.\n\
             - Polite speech level should be consistent unless the source is casual.\n\
             - Dubbing fit: Korean is often shorter than English; check if padding feels forced."
        }
        Language::Ru => {
            "\nAdditional criteria for Russian:\n\
             - Grammatical case and gender agreement must be correct.\n\
             - Formal/informal register must match the source tone."
        }
        Language::Ja => {
            "\nAdditional criteria for Japanese:\n\
             - Politeness level should match the source tone.\n\
             - Sentence-final particles should sound natural for spoken Japanese."
        }
        _ => "",
    }
}

/// The scoring prompt. Weights and band definitions are part of the
/// contract with the model; the overall score is a weighted sum the model
/// computes itself and the parser re-clamps.
pub fn evaluation_prompt(
    original: &str,
    translated: &str,
    source: Language,
    target: Language,
) -> String {
    format!(
        "You are a strict translation quality evaluator for video dubbing.\n\n\
         Evaluate the following {src} -> {tgt} translation.\n\n\
         Original ({src}):\n{original}\n\n\
         Translation ({tgt}):\n{translated}\n\n\
         SCORING RUBRIC (be strict and consistent):\n\n\
         1. Accuracy (40% weight):\n\
            - 90-100: Every sentence fully translated, no omissions, no mistranslations\n\
            - 70-89: Minor inaccuracies but all sentences present\n\
            - 50-69: Some sentences missing or significantly mistranslated\n\
            - Below 50: Major omissions or incomplete sentences\n\
            CRITICAL: If ANY sentence is incomplete or cut off, accuracy MUST be 70 or below.\n\n\
         2. Naturalness (30% weight):\n\
            - 90-100: Sounds like a native speaker wrote it, natural spoken style\n\
            - 70-89: Grammatically correct but slightly stiff or literal\n\
            - 50-69: Awkward phrasing that a native would notice immediately\n\
            - Below 50: Machine-translation quality, unnatural word order\n\n\
         3. Dubbing Fit (20% weight):\n\
            - 90-100: Length matches original, easy to speak aloud at natural pace\n\
            - 70-89: Slightly longer/shorter but still speakable\n\
            - 50-69: Noticeably too long or too short for the video timing\n\
            - Below 50: Completely mismatched length\n\n\
         4. Consistency (10% weight):\n\
            - 90-100: Same terms and tone throughout, no contradictions\n\
            - 70-89: Minor inconsistencies in terminology\n\
            - Below 70: Different terms used for the same concept, tone shifts\n\
         {notes}\n\n\
         overall_score = accuracy*0.4 + naturalness*0.3 + dubbing_fit*0.2 + consistency*0.1\n\n\
         List ONLY actionable issues that can be fixed (max 5). Be specific: quote the problematic text.\n\n\
         Respond ONLY in this JSON format (no markdown, no code blocks):\n\
         {{\n\
           \"overall_score\": <1-100>,\n\
           \"breakdown\": {{\n\
             \"accuracy\": <1-100>,\n\
             \"naturalness\": <1-100>,\n\
             \"dubbing_fit\": <1-100>,\n\
             \"consistency\": <1-100>\n\
           }},\n\
           \"issues\": [\"issue1\", \"issue2\"],\n\
           \"recommendation\": \"APPROVED\" or \"REVIEW_NEEDED\" or \"REJECT\"\n\
         }}",
        src = source.display_name(),
        tgt = target.display_name(),
        original = original,
        translated = translated,
        notes = language_notes(target),
    )
}

pub fn repair_request_prompt(broken: &str) -> String {
    format!(
        "The following was supposed to be a single valid JSON object but is malformed.\n\
         Return ONLY the corrected JSON object, nothing else.\n\n{broken}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_rubric_and_texts() {
        let p = evaluation_prompt("hello", "annyeong", Language::En, Language::Ko);
        assert!(p.contains("SCORING RUBRIC"));
        assert!(p.contains("hello"));
        assert!(p.contains("annyeong"));
        assert!(p.contains("Additional criteria for Korean"));
    }

    #[test]
    fn latin_targets_have_no_extra_notes() {
        let p = evaluation_prompt("hola", "hello", Language::Es, Language::En);
        assert!(!p.contains("Additional criteria"));
    }
}

//! Translation quality scoring.
//!
//! Two low-temperature evaluations are averaged to suppress scoring
//! noise; a third breaks ties when the first two disagree sharply. Term
//! preservation is computed locally and can veto the model's verdict.

mod rubric;
mod terms;

use voxdub_interface::{
    EngineError, Language, QualityBreakdown, QualityReport, Recommendation,
};
use voxdub_llm::{repair, ChatEngine, ChatRequest};

pub use rubric::evaluation_prompt;
pub use terms::{check_preservation, extract_terms};

const EVAL_TEMPERATURE: f32 = 0.1;
const EVAL_MAX_TOKENS: u32 = 2048;

/// Combined length beyond which the texts are windowed before scoring.
const SAMPLE_THRESHOLD: usize = 10_000;
/// Per-text budget when sampling; three windows share it.
const SAMPLE_BUDGET: usize = 5_000;

/// Score gap between the two base evaluations that triggers a tie-break.
const DISAGREEMENT_DELTA: i16 = 20;

/// Term-preservation ratio below which the verdict is forced to Reject.
const TERM_FLOOR: f32 = 0.30;

#[derive(Debug, Clone)]
struct ParsedEval {
    overall_score: u8,
    breakdown: QualityBreakdown,
    issues: Vec<String>,
    recommendation: Option<Recommendation>,
}

#[derive(Clone)]
pub struct Evaluator {
    primary: ChatEngine,
    secondary: Option<ChatEngine>,
}

impl Evaluator {
    pub fn new(primary: ChatEngine, secondary: Option<ChatEngine>) -> Self {
        Self { primary, secondary }
    }

    /// Score a translation pair. `Err` means no evaluator could be
    /// reached at all; the verify stage treats that as soft failure.
    /// Responses that arrive but cannot be parsed degrade to a zero-score
    /// Reject report instead.
    pub async fn evaluate(
        &self,
        original: &str,
        translated: &str,
        source: Language,
        target: Language,
    ) -> Result<QualityReport, EngineError> {
        let term_preservation = terms::check_preservation(original, translated, target);

        let sampled = original.chars().count() + translated.chars().count() > SAMPLE_THRESHOLD;
        let (original_text, translated_text) = if sampled {
            (
                sample_windows(original, SAMPLE_BUDGET),
                sample_windows(translated, SAMPLE_BUDGET),
            )
        } else {
            (original.to_string(), translated.to_string())
        };

        let prompt = rubric::evaluation_prompt(&original_text, &translated_text, source, target);

        let mut engine = &self.primary;
        let mut rounds: Vec<ParsedEval> = Vec::new();
        let mut degraded: Option<String> = None;
        let mut last_error: Option<EngineError> = None;

        let mut round = 0usize;
        while rounds.len() < 2 && round < 3 {
            round += 1;
            match self.evaluate_once(engine, &prompt).await {
                Ok(parsed) => rounds.push(parsed),
                Err(EngineError::Quota { provider, message }) => {
                    match (&self.secondary, std::ptr::eq(engine, &self.primary)) {
                        (Some(secondary), true) => {
                            tracing::warn!(provider, "evaluator_quota_switching_secondary");
                            engine = secondary;
                        }
                        _ => {
                            last_error = Some(EngineError::Quota { provider, message });
                            break;
                        }
                    }
                }
                Err(EngineError::Malformed { message, .. }) => {
                    degraded = Some(message);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "evaluation_round_failed");
                    last_error = Some(err);
                }
            }
        }

        if rounds.is_empty() {
            if let Some(message) = degraded {
                return Ok(QualityReport::failed(format!(
                    "evaluator produced unusable output: {message}"
                )));
            }
            return Err(last_error.unwrap_or(EngineError::Exhausted {
                provider: self.primary.provider(),
            }));
        }

        // Sharp disagreement between the two base rounds gets a third
        // opinion; the median wins.
        if rounds.len() == 2 {
            let delta =
                (rounds[0].overall_score as i16 - rounds[1].overall_score as i16).abs();
            if delta >= DISAGREEMENT_DELTA {
                tracing::info!(delta, "dual_eval_disagreement_tiebreak");
                if let Ok(third) = self.evaluate_once(engine, &prompt).await {
                    rounds.push(third);
                }
            }
        }

        let mut report = merge_rounds(&rounds);
        report.sampled = sampled;
        report.term_preservation = term_preservation;
        if report.term_preservation.score < TERM_FLOOR {
            tracing::warn!(
                score = report.term_preservation.score,
                "term_preservation_floor_violated"
            );
            report.recommendation = Recommendation::Reject;
        }
        Ok(report)
    }

    async fn evaluate_once(
        &self,
        engine: &ChatEngine,
        prompt: &str,
    ) -> Result<ParsedEval, EngineError> {
        let request = ChatRequest {
            system: None,
            user: prompt.to_string(),
            temperature: EVAL_TEMPERATURE,
            max_tokens: Some(EVAL_MAX_TOKENS),
        };
        let response = engine.complete(&request).await?;

        if let Some(parsed) = parse_eval(&response) {
            return Ok(parsed);
        }

        // One shot at having the model repair its own output.
        let repair_request = ChatRequest {
            system: None,
            user: rubric::repair_request_prompt(&response),
            temperature: EVAL_TEMPERATURE,
            max_tokens: Some(EVAL_MAX_TOKENS),
        };
        let repaired = engine.complete(&repair_request).await?;
        parse_eval(&repaired).ok_or_else(|| EngineError::Malformed {
            provider: engine.provider(),
            message: "evaluation response unparseable after repair".into(),
        })
    }
}

/// Head, middle and tail windows joined with ellipsis markers, so long
/// inputs still expose their beginning, bulk and ending to the rubric.
fn sample_windows(text: &str, budget: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= budget {
        return text.to_string();
    }
    let window = budget / 3;
    let head: String = chars[..window].iter().collect();
    let mid_start = chars.len() / 2 - window / 2;
    let middle: String = chars[mid_start..mid_start + window].iter().collect();
    let tail: String = chars[chars.len() - window..].iter().collect();
    format!("{head}\n[...]\n{middle}\n[...]\n{tail}")
}

fn parse_eval(response: &str) -> Option<ParsedEval> {
    let value = repair::parse_or_repair(response)?;
    let overall = value.get("overall_score")?.as_f64()?;
    let overall_score = overall.clamp(0.0, 100.0).round() as u8;

    let field = |key: &str| -> u8 {
        value
            .get("breakdown")
            .and_then(|b| b.get(key))
            .and_then(|v| v.as_f64())
            .map(|v| v.clamp(0.0, 100.0).round() as u8)
            .unwrap_or(overall_score)
    };
    let breakdown = QualityBreakdown {
        accuracy: field("accuracy"),
        naturalness: field("naturalness"),
        dubbing_fit: field("dubbing_fit"),
        consistency: field("consistency"),
    };

    let issues = value
        .get("issues")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let recommendation = value
        .get("recommendation")
        .and_then(|v| v.as_str())
        .and_then(|s| match s {
            "APPROVED" => Some(Recommendation::Approved),
            "REVIEW_NEEDED" => Some(Recommendation::ReviewNeeded),
            "REJECT" => Some(Recommendation::Reject),
            _ => None,
        });

    Some(ParsedEval {
        overall_score,
        breakdown,
        issues,
        recommendation,
    })
}

fn merge_rounds(rounds: &[ParsedEval]) -> QualityReport {
    let overall_score = match rounds.len() {
        1 => rounds[0].overall_score,
        2 => {
            ((rounds[0].overall_score as u16 + rounds[1].overall_score as u16 + 1) / 2) as u8
        }
        _ => {
            let mut scores: Vec<u8> = rounds.iter().map(|r| r.overall_score).collect();
            scores.sort_unstable();
            scores[scores.len() / 2]
        }
    };

    let n = rounds.len() as u16;
    let avg = |pick: fn(&QualityBreakdown) -> u8| -> u8 {
        (rounds.iter().map(|r| pick(&r.breakdown) as u16).sum::<u16>() / n) as u8
    };
    let breakdown = QualityBreakdown {
        accuracy: avg(|b| b.accuracy),
        naturalness: avg(|b| b.naturalness),
        dubbing_fit: avg(|b| b.dubbing_fit),
        consistency: avg(|b| b.consistency),
    };

    let mut issues: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    for round in rounds {
        for issue in &round.issues {
            let normalized: String = issue.trim().to_lowercase().chars().take(80).collect();
            if !seen.contains(&normalized) {
                seen.push(normalized);
                issues.push(issue.clone());
            }
        }
    }

    let recommendation = rounds
        .iter()
        .filter_map(|r| r.recommendation)
        .fold(None::<Recommendation>, |acc, r| {
            Some(acc.map_or(r, |a| a.worst(r)))
        })
        .unwrap_or_else(|| Recommendation::from_score(overall_score));

    QualityReport {
        overall_score,
        breakdown,
        issues,
        recommendation,
        term_preservation: Default::default(),
        sampled: false,
        refine_rounds: 0,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(score: u8, rec: Option<Recommendation>) -> ParsedEval {
        ParsedEval {
            overall_score: score,
            breakdown: QualityBreakdown {
                accuracy: score,
                naturalness: score,
                dubbing_fit: score,
                consistency: score,
            },
            issues: vec![format!("issue at {score}")],
            recommendation: rec,
        }
    }

    #[test]
    fn two_rounds_average() {
        let report = merge_rounds(&[eval(80, None), eval(90, None)]);
        assert_eq!(report.overall_score, 85);
        assert_eq!(report.recommendation, Recommendation::Approved);
    }

    #[test]
    fn three_rounds_take_median() {
        let report = merge_rounds(&[eval(60, None), eval(95, None), eval(90, None)]);
        assert_eq!(report.overall_score, 90);
    }

    #[test]
    fn explicit_recommendation_wins_worst() {
        let report = merge_rounds(&[
            eval(90, Some(Recommendation::Approved)),
            eval(88, Some(Recommendation::ReviewNeeded)),
        ]);
        assert_eq!(report.recommendation, Recommendation::ReviewNeeded);
    }

    #[test]
    fn issues_deduplicate_across_rounds() {
        let mut a = eval(80, None);
        let mut b = eval(80, None);
        a.issues = vec!["Dropped the dosage".into()];
        b.issues = vec!["dropped the dosage".into(), "Stiff phrasing".into()];
        let report = merge_rounds(&[a, b]);
        assert_eq!(report.issues.len(), 2);
    }

    #[test]
    fn parses_model_response() {
        let body = r#"{
            "overall_score": 87.4,
            "breakdown": {"accuracy": 90, "naturalness": 85, "dubbing_fit": 88, "consistency": 86},
            "issues": ["minor register slip"],
            "recommendation": "APPROVED"
        }"#;
        let parsed = parse_eval(body).unwrap();
        assert_eq!(parsed.overall_score, 87);
        assert_eq!(parsed.breakdown.naturalness, 85);
        assert_eq!(parsed.recommendation, Some(Recommendation::Approved));
    }

    #[test]
    fn parse_fills_breakdown_from_overall() {
        let parsed = parse_eval(r#"{"overall_score": 70}"#).unwrap();
        assert_eq!(parsed.breakdown.accuracy, 70);
        assert!(parsed.issues.is_empty());
    }

    #[test]
    fn sampling_windows_long_text() {
        let text = "a".repeat(3000) + &"b".repeat(3000) + &"c".repeat(3000);
        let sampled = sample_windows(&text, 5_000);
        assert!(sampled.len() < text.len());
        assert!(sampled.contains("[...]"));
        assert!(sampled.starts_with('a'));
        assert!(sampled.ends_with('c'));
    }

    #[test]
    fn short_text_not_sampled() {
        assert_eq!(sample_windows("short", 5_000), "short");
    }
}

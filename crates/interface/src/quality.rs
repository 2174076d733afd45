use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Approved,
    ReviewNeeded,
    Reject,
}

impl Recommendation {
    /// Default mapping from an overall score, used when the evaluator
    /// response omits its own verdict.
    pub fn from_score(score: u8) -> Self {
        if score >= 85 {
            Self::Approved
        } else if score >= 60 {
            Self::ReviewNeeded
        } else {
            Self::Reject
        }
    }

    pub fn worst(self, other: Self) -> Self {
        use Recommendation::*;
        match (self, other) {
            (Reject, _) | (_, Reject) => Reject,
            (ReviewNeeded, _) | (_, ReviewNeeded) => ReviewNeeded,
            _ => Approved,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub accuracy: u8,
    pub naturalness: u8,
    pub dubbing_fit: u8,
    pub consistency: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermPreservation {
    /// matched / total over the salient terms of the source text; 1.0 when
    /// nothing salient was found.
    pub score: f32,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub overall_score: u8,
    pub breakdown: QualityBreakdown,
    pub issues: Vec<String>,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub term_preservation: TermPreservation,
    /// Set when the evaluated text was windowed head/middle/tail instead
    /// of scored whole.
    #[serde(default)]
    pub sampled: bool,
    #[serde(default)]
    pub refine_rounds: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QualityReport {
    /// Report emitted when every evaluation avenue failed.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            overall_score: 0,
            breakdown: QualityBreakdown::default(),
            issues: vec![message.clone()],
            recommendation: Recommendation::Reject,
            term_preservation: TermPreservation::default(),
            sampled: false,
            refine_rounds: 0,
            error: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommendation_thresholds() {
        assert_eq!(Recommendation::from_score(85), Recommendation::Approved);
        assert_eq!(Recommendation::from_score(84), Recommendation::ReviewNeeded);
        assert_eq!(Recommendation::from_score(59), Recommendation::Reject);
    }

    #[test]
    fn worst_ordering() {
        assert_eq!(
            Recommendation::Approved.worst(Recommendation::Reject),
            Recommendation::Reject
        );
        assert_eq!(
            Recommendation::ReviewNeeded.worst(Recommendation::Approved),
            Recommendation::ReviewNeeded
        );
    }
}

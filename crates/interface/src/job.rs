use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{SttEngineId, TranslateEngineId, TtsEngineId};
use crate::language::Language;
use crate::quality::QualityReport;

pub type JobId = uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Pipeline phases in execution order. `Verify` only runs when the job
/// requested translation verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Transcribe,
    Translate,
    Verify,
    Synthesize,
    Merge,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Extract,
        Stage::Transcribe,
        Stage::Translate,
        Stage::Verify,
        Stage::Synthesize,
        Stage::Merge,
    ];

    pub fn weight(&self) -> u32 {
        match self {
            Stage::Extract => 5,
            Stage::Transcribe => 15,
            Stage::Translate => 25,
            Stage::Verify => 15,
            Stage::Synthesize => 25,
            Stage::Merge => 15,
        }
    }

    /// Cumulative progress (0-100) after this stage completes. With verify
    /// disabled the remaining weights rescale so merge still lands on 100.
    pub fn cumulative_progress(&self, verify_enabled: bool) -> u8 {
        let mut total = 0u32;
        let mut done = 0u32;
        for stage in Stage::ALL {
            if stage == Stage::Verify && !verify_enabled {
                continue;
            }
            total += stage.weight();
            if stage <= *self {
                done += stage.weight();
            }
        }
        ((done * 100) / total) as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Transcribe => "transcribe",
            Stage::Translate => "translate",
            Stage::Verify => "verify",
            Stage::Synthesize => "synthesize",
            Stage::Merge => "merge",
        }
    }
}

impl PartialOrd for Stage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Stage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let pos = |s: &Stage| Stage::ALL.iter().position(|x| x == s).unwrap();
        pos(self).cmp(&pos(other))
    }
}

/// How synthesized audio of a different length than the source speech is
/// reconciled with the video timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Place segments at their original timestamps; overruns push later
    /// segments and may drift past the video tail.
    Natural,
    /// Tempo-compress overruns so the track length matches the video.
    #[default]
    Speed,
    /// Lay segments end-to-end; the mux stage stretches the video to fit.
    Stretch,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Natural => "natural",
            SyncMode::Speed => "speed",
            SyncMode::Stretch => "stretch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Video,
    /// Audio-only upload: extract and merge are skipped, the artifact is
    /// the assembled WAV.
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    pub source_lang: Language,
    pub target_lang: Language,
    pub clone_voice: bool,
    pub verify_translation: bool,
    #[serde(default)]
    pub sync_mode: SyncMode,
    #[serde(default)]
    pub stt_engine: Option<SttEngineId>,
    #[serde(default)]
    pub translation_engine: Option<TranslateEngineId>,
    #[serde(default)]
    pub tts_engine: Option<TtsEngineId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Read-only snapshot of a job handed to API consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub current_stage: Option<Stage>,
    pub settings: JobSettings,
    pub input_filename: Option<String>,
    pub input_kind: InputKind,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub logs: Vec<LogEntry>,
    pub output_file: Option<String>,
    pub quality: Option<QualityReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cumulative_progress_reaches_100_with_verify() {
        assert_eq!(Stage::Extract.cumulative_progress(true), 5);
        assert_eq!(Stage::Transcribe.cumulative_progress(true), 20);
        assert_eq!(Stage::Translate.cumulative_progress(true), 45);
        assert_eq!(Stage::Verify.cumulative_progress(true), 60);
        assert_eq!(Stage::Synthesize.cumulative_progress(true), 85);
        assert_eq!(Stage::Merge.cumulative_progress(true), 100);
    }

    #[test]
    fn cumulative_progress_rescales_without_verify() {
        assert_eq!(Stage::Merge.cumulative_progress(false), 100);
        assert!(Stage::Translate.cumulative_progress(false) > Stage::Translate.cumulative_progress(true));
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }
}

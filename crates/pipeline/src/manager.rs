use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use voxdub_interface::{
    InputKind, JobId, JobSettings, JobStatus, JobView, LogEntry, QualityReport, Stage,
};

const MAX_LOGS: usize = 1000;
/// Oldest share of the buffer dropped when the cap is hit.
const LOG_TRIM: usize = MAX_LOGS / 10;
const MAX_LOG_MESSAGE: usize = 500;
const VIEW_LOG_TAIL: usize = 100;

const MAX_JOBS: usize = 1000;
const JOB_EXPIRY_HOURS: i64 = 24;

#[derive(Debug, Clone)]
struct JobRecord {
    id: JobId,
    status: JobStatus,
    progress: u8,
    current_stage: Option<Stage>,
    settings: JobSettings,
    input_path: PathBuf,
    input_filename: Option<String>,
    input_kind: InputKind,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
    logs: Vec<LogEntry>,
    output_file: Option<PathBuf>,
    quality: Option<QualityReport>,
    cancel_token: CancellationToken,
}

/// The single source of truth for job state. Every mutator takes the one
/// registry lock; writes are short, reads hand out deep snapshots. State
/// is process-memory only and dies with the process.
#[derive(Clone, Default)]
pub struct JobManager {
    registry: Arc<Mutex<HashMap<JobId, JobRecord>>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        settings: JobSettings,
        input_path: PathBuf,
        input_filename: Option<String>,
        input_kind: InputKind,
    ) -> JobId {
        let id = uuid::Uuid::new_v4();
        let record = JobRecord {
            id,
            status: JobStatus::Queued,
            progress: 0,
            current_stage: None,
            settings,
            input_path,
            input_filename,
            input_kind,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
            logs: Vec::new(),
            output_file: None,
            quality: None,
            cancel_token: CancellationToken::new(),
        };

        let mut registry = self.registry.lock().unwrap();
        evict_expired(&mut registry);
        registry.insert(id, record);
        id
    }

    pub fn get(&self, id: &JobId) -> Option<JobView> {
        let registry = self.registry.lock().unwrap();
        registry.get(id).map(view_of)
    }

    /// Status transitions; terminal statuses are never revised.
    pub fn update_status(&self, id: &JobId, status: JobStatus) -> bool {
        let mut registry = self.registry.lock().unwrap();
        let Some(record) = registry.get_mut(id) else {
            return false;
        };
        if record.status.is_terminal() {
            return false;
        }
        record.status = status;
        if status == JobStatus::Completed {
            record.completed_at = Some(Utc::now());
        }
        true
    }

    pub fn set_stage(&self, id: &JobId, stage: Stage) -> bool {
        let mut registry = self.registry.lock().unwrap();
        let Some(record) = registry.get_mut(id) else {
            return false;
        };
        record.current_stage = Some(stage);
        true
    }

    /// Clamped to 0-100 and monotonic: a stage may never report less than
    /// what the job already showed.
    pub fn set_progress(&self, id: &JobId, progress: u8) -> bool {
        let progress = progress.min(100);
        let mut registry = self.registry.lock().unwrap();
        let Some(record) = registry.get_mut(id) else {
            return false;
        };
        if progress > record.progress {
            record.progress = progress;
        }
        true
    }

    pub fn append_log(&self, id: &JobId, message: impl Into<String>) -> bool {
        let mut message = message.into();
        if message.chars().count() > MAX_LOG_MESSAGE {
            message = message.chars().take(MAX_LOG_MESSAGE).collect::<String>() + "…";
        }

        let mut registry = self.registry.lock().unwrap();
        let Some(record) = registry.get_mut(id) else {
            return false;
        };
        if record.logs.len() >= MAX_LOGS {
            record.logs.drain(..LOG_TRIM);
        }
        record.logs.push(LogEntry {
            timestamp: Utc::now(),
            message,
        });
        true
    }

    pub fn set_output(&self, id: &JobId, path: PathBuf) -> bool {
        let mut registry = self.registry.lock().unwrap();
        let Some(record) = registry.get_mut(id) else {
            return false;
        };
        record.output_file = Some(path);
        true
    }

    pub fn set_quality(&self, id: &JobId, report: QualityReport) -> bool {
        let mut registry = self.registry.lock().unwrap();
        let Some(record) = registry.get_mut(id) else {
            return false;
        };
        record.quality = Some(report);
        true
    }

    pub fn set_error(&self, id: &JobId, error: impl Into<String>) -> bool {
        let mut error: String = error.into();
        if error.chars().count() > 1000 {
            error = error.chars().take(1000).collect();
        }
        let mut registry = self.registry.lock().unwrap();
        let Some(record) = registry.get_mut(id) else {
            return false;
        };
        record.error = Some(error);
        true
    }

    /// Mark the job cancelled and fire its token. Idempotent in effect;
    /// returns `false` for unknown jobs and jobs already terminal, so a
    /// second cancel is a deterministic no-op. Does not stop work itself:
    /// the worker observes the flag at its next checkpoint.
    pub fn cancel(&self, id: &JobId) -> bool {
        let mut registry = self.registry.lock().unwrap();
        let Some(record) = registry.get_mut(id) else {
            return false;
        };
        if record.status.is_terminal() {
            return false;
        }
        record.status = JobStatus::Cancelled;
        record.cancel_token.cancel();
        record.logs.push(LogEntry {
            timestamp: Utc::now(),
            message: "Job cancelled by user".into(),
        });
        true
    }

    pub fn is_cancelled(&self, id: &JobId) -> bool {
        let registry = self.registry.lock().unwrap();
        registry
            .get(id)
            .map(|r| r.cancel_token.is_cancelled())
            .unwrap_or(false)
    }

    pub fn cancellation_token(&self, id: &JobId) -> Option<CancellationToken> {
        let registry = self.registry.lock().unwrap();
        registry.get(id).map(|r| r.cancel_token.clone())
    }

    pub fn input_path(&self, id: &JobId) -> Option<PathBuf> {
        let registry = self.registry.lock().unwrap();
        registry.get(id).map(|r| r.input_path.clone())
    }

    pub fn input_kind(&self, id: &JobId) -> Option<InputKind> {
        let registry = self.registry.lock().unwrap();
        registry.get(id).map(|r| r.input_kind)
    }

    pub fn settings(&self, id: &JobId) -> Option<JobSettings> {
        let registry = self.registry.lock().unwrap();
        registry.get(id).map(|r| r.settings.clone())
    }

    pub fn output_path(&self, id: &JobId) -> Option<PathBuf> {
        let registry = self.registry.lock().unwrap();
        registry.get(id).and_then(|r| r.output_file.clone())
    }

    pub fn active_count(&self) -> usize {
        let registry = self.registry.lock().unwrap();
        registry
            .values()
            .filter(|r| matches!(r.status, JobStatus::Queued | JobStatus::Processing))
            .count()
    }

    pub fn job_count(&self) -> usize {
        self.registry.lock().unwrap().len()
    }
}

fn view_of(record: &JobRecord) -> JobView {
    let tail_start = record.logs.len().saturating_sub(VIEW_LOG_TAIL);
    JobView {
        job_id: record.id,
        status: record.status,
        progress: record.progress,
        current_stage: record.current_stage,
        settings: record.settings.clone(),
        input_filename: record.input_filename.clone(),
        input_kind: record.input_kind,
        created_at: record.created_at,
        completed_at: record.completed_at,
        error: record.error.clone(),
        logs: record.logs[tail_start..].to_vec(),
        output_file: record
            .output_file
            .as_ref()
            .map(|p| p.display().to_string()),
        quality: record.quality.clone(),
    }
}

/// Bound registry growth: past the cap, expired terminal jobs go first,
/// then the oldest terminal jobs until the cap holds.
fn evict_expired(registry: &mut HashMap<JobId, JobRecord>) {
    if registry.len() < MAX_JOBS {
        return;
    }
    let threshold = Utc::now() - Duration::hours(JOB_EXPIRY_HOURS);
    let expired: Vec<JobId> = registry
        .values()
        .filter(|r| r.status.is_terminal() && r.created_at < threshold)
        .map(|r| r.id)
        .collect();
    for id in expired {
        registry.remove(&id);
    }

    if registry.len() >= MAX_JOBS {
        let mut terminal: Vec<(JobId, DateTime<Utc>)> = registry
            .values()
            .filter(|r| r.status.is_terminal())
            .map(|r| (r.id, r.created_at))
            .collect();
        terminal.sort_by_key(|(_, created)| *created);
        let excess = registry.len() + 1 - MAX_JOBS;
        for (id, _) in terminal.into_iter().take(excess) {
            registry.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxdub_interface::{Language, SyncMode};

    fn settings() -> JobSettings {
        JobSettings {
            source_lang: Language::Ko,
            target_lang: Language::En,
            clone_voice: false,
            verify_translation: false,
            sync_mode: SyncMode::Speed,
            stt_engine: None,
            translation_engine: None,
            tts_engine: None,
        }
    }

    fn manager_with_job() -> (JobManager, JobId) {
        let manager = JobManager::new();
        let id = manager.create(
            settings(),
            PathBuf::from("uploads/in.mp4"),
            Some("in.mp4".into()),
            InputKind::Video,
        );
        (manager, id)
    }

    #[test]
    fn created_job_is_queued_and_viewable() {
        let (manager, id) = manager_with_job();
        let view = manager.get(&id).unwrap();
        assert_eq!(view.status, JobStatus::Queued);
        assert_eq!(view.progress, 0);
        assert!(view.output_file.is_none());
    }

    #[test]
    fn unknown_id_yields_nothing() {
        let manager = JobManager::new();
        assert!(manager.get(&uuid::Uuid::new_v4()).is_none());
        assert!(!manager.cancel(&uuid::Uuid::new_v4()));
    }

    #[test]
    fn terminal_status_is_never_revised() {
        let (manager, id) = manager_with_job();
        assert!(manager.update_status(&id, JobStatus::Processing));
        assert!(manager.update_status(&id, JobStatus::Completed));
        assert!(!manager.update_status(&id, JobStatus::Failed));
        assert_eq!(manager.get(&id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn progress_is_monotonic_and_clamped() {
        let (manager, id) = manager_with_job();
        manager.set_progress(&id, 40);
        manager.set_progress(&id, 20);
        assert_eq!(manager.get(&id).unwrap().progress, 40);
        manager.set_progress(&id, 200);
        assert_eq!(manager.get(&id).unwrap().progress, 100);
    }

    #[test]
    fn long_log_messages_are_truncated() {
        let (manager, id) = manager_with_job();
        manager.append_log(&id, "x".repeat(600));
        let view = manager.get(&id).unwrap();
        assert!(view.logs[0].message.chars().count() <= MAX_LOG_MESSAGE + 1);
        assert!(view.logs[0].message.ends_with('…'));
    }

    #[test]
    fn log_buffer_trims_oldest_tenth() {
        let (manager, id) = manager_with_job();
        for i in 0..MAX_LOGS {
            manager.append_log(&id, format!("line {i}"));
        }
        manager.append_log(&id, "overflow");

        let registry = manager.registry.lock().unwrap();
        let logs = &registry.get(&id).unwrap().logs;
        assert_eq!(logs.len(), MAX_LOGS - LOG_TRIM + 1);
        assert_eq!(logs[0].message, format!("line {LOG_TRIM}"));
        assert_eq!(logs.last().unwrap().message, "overflow");
    }

    #[test]
    fn cancel_is_observable_and_idempotent() {
        let (manager, id) = manager_with_job();
        let token = manager.cancellation_token(&id).unwrap();
        assert!(!token.is_cancelled());

        assert!(manager.cancel(&id));
        assert!(manager.is_cancelled(&id));
        assert!(token.is_cancelled());
        assert_eq!(manager.get(&id).unwrap().status, JobStatus::Cancelled);

        // Second cancel is a deterministic no-op on a terminal job.
        assert!(!manager.cancel(&id));
    }

    #[test]
    fn completed_job_cannot_be_cancelled() {
        let (manager, id) = manager_with_job();
        manager.update_status(&id, JobStatus::Processing);
        manager.update_status(&id, JobStatus::Completed);
        assert!(!manager.cancel(&id));
        assert_eq!(manager.get(&id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn active_count_tracks_live_jobs() {
        let (manager, id) = manager_with_job();
        assert_eq!(manager.active_count(), 1);
        manager.update_status(&id, JobStatus::Failed);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.job_count(), 1);
    }

    #[test]
    fn snapshots_are_stable_for_terminal_jobs() {
        let (manager, id) = manager_with_job();
        manager.append_log(&id, "done");
        manager.update_status(&id, JobStatus::Completed);
        let a = manager.get(&id).unwrap();
        let b = manager.get(&id).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}

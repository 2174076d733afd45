use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use voxdub_interface::{Language, QualityReport, SyncMode};

/// Cached chunk translations below this score are discarded on read.
const MIN_CACHED_SCORE: u8 = 60;

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub stored_at: DateTime<Utc>,
    pub translated_texts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
}

/// Disk cache for chunk translations, keyed by source text, language pair
/// and sync mode. One JSON file per entry.
#[derive(Debug, Clone)]
pub struct TranslationCache {
    dir: PathBuf,
    max_age: Duration,
}

impl TranslationCache {
    pub fn new(dir: impl Into<PathBuf>, max_age_days: i64) -> Self {
        Self {
            dir: dir.into(),
            max_age: Duration::days(max_age_days),
        }
    }

    fn path_for(&self, key: &CacheKey<'_>) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.source_text.as_bytes());
        hasher.update([0]);
        hasher.update(key.source_lang.code().as_bytes());
        hasher.update([0]);
        hasher.update(key.target_lang.code().as_bytes());
        hasher.update([0]);
        hasher.update(key.sync_mode.as_str().as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().take(12).map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{hex}.json"))
    }

    pub fn get(&self, key: &CacheKey<'_>) -> Option<CacheEntry> {
        let path = self.path_for(key);
        let raw = std::fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(_) => {
                let _ = std::fs::remove_file(&path);
                return None;
            }
        };

        if Utc::now() - entry.stored_at > self.max_age {
            let _ = std::fs::remove_file(&path);
            return None;
        }
        if let Some(quality) = &entry.quality {
            if quality.overall_score < MIN_CACHED_SCORE {
                tracing::debug!(score = quality.overall_score, "cache_entry_below_floor");
                let _ = std::fs::remove_file(&path);
                return None;
            }
        }
        Some(entry)
    }

    pub fn put(
        &self,
        key: &CacheKey<'_>,
        translated_texts: &[String],
        quality: Option<&QualityReport>,
    ) {
        let entry = CacheEntry {
            stored_at: Utc::now(),
            translated_texts: translated_texts.to_vec(),
            quality: quality.cloned(),
        };
        let path = self.path_for(key);
        if let Err(err) = std::fs::create_dir_all(&self.dir)
            .and_then(|_| std::fs::write(&path, serde_json::to_string(&entry).expect("entry serializes")))
        {
            tracing::warn!(error = %err, "cache_write_failed");
        }
    }

    pub fn invalidate(&self, key: &CacheKey<'_>) {
        let _ = std::fs::remove_file(self.path_for(key));
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheKey<'a> {
    pub source_text: &'a str,
    pub source_lang: Language,
    pub target_lang: Language,
    pub sync_mode: SyncMode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxdub_interface::{QualityBreakdown, Recommendation, TermPreservation};

    fn key(text: &str) -> CacheKey<'_> {
        CacheKey {
            source_text: text,
            source_lang: Language::Ko,
            target_lang: Language::En,
            sync_mode: SyncMode::Speed,
        }
    }

    fn report(score: u8) -> QualityReport {
        QualityReport {
            overall_score: score,
            breakdown: QualityBreakdown::default(),
            issues: vec![],
            recommendation: Recommendation::from_score(score),
            term_preservation: TermPreservation::default(),
            sampled: false,
            refine_rounds: 0,
            error: None,
        }
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranslationCache::new(dir.path(), 30);
        let texts = vec!["hello".to_string()];

        assert!(cache.get(&key("src")).is_none());
        cache.put(&key("src"), &texts, Some(&report(90)));
        let entry = cache.get(&key("src")).unwrap();
        assert_eq!(entry.translated_texts, texts);
        assert_eq!(entry.quality.unwrap().overall_score, 90);
    }

    #[test]
    fn key_varies_by_sync_mode() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranslationCache::new(dir.path(), 30);
        cache.put(&key("src"), &["a".to_string()], None);

        let stretch_key = CacheKey {
            sync_mode: SyncMode::Stretch,
            ..key("src")
        };
        assert!(cache.get(&stretch_key).is_none());
    }

    #[test]
    fn low_quality_entries_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranslationCache::new(dir.path(), 30);
        cache.put(&key("src"), &["a".to_string()], Some(&report(40)));
        assert!(cache.get(&key("src")).is_none());
    }

    #[test]
    fn expired_entries_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranslationCache::new(dir.path(), 0);
        cache.put(&key("src"), &["a".to_string()], None);
        // max_age of zero days expires immediately.
        assert!(cache.get(&key("src")).is_none());
    }
}

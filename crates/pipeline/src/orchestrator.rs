use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use voxdub_audio::{decode_wav, write_wav_file, Assembler};
use voxdub_gate::ResourceGate;
use voxdub_interface::{
    EngineError, InputKind, JobId, JobSettings, JobStatus, Language, Locality, QualityReport,
    Recommendation, Stage, SyncMode, SynthesizedSegment, Transcript, TranslationChunk,
};
use voxdub_media::Media;
use voxdub_quality::check_preservation;
use voxdub_stt::ComputeHint;
use voxdub_translate::{
    CacheKey, Chunker, TranslationCache, TranslationOptions,
};
use voxdub_tts::SynthesisRequest;

use crate::dispatcher::Dispatcher;
use crate::engines::EngineRegistry;
use crate::error::PipelineError;
use crate::manager::JobManager;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Per-job intermediates (extracted audio, assembled track).
    pub work_dir: PathBuf,
    /// Finished artifacts, retained until purged.
    pub output_dir: PathBuf,
    /// Concurrent worker tasks; queued jobs wait for a slot.
    pub max_workers: usize,
    /// Refine loop acceptance threshold.
    pub min_quality_score: u8,
    pub max_refine_rounds: u8,
    /// First transient-retry delay; doubles per attempt. Tests shrink it.
    pub retry_min_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("data/work"),
            output_dir: PathBuf::from("data/outputs"),
            max_workers: 3,
            min_quality_score: 85,
            max_refine_rounds: 3,
            retry_min_delay: Duration::from_secs(2),
        }
    }
}

struct Inner {
    manager: JobManager,
    dispatcher: Dispatcher,
    registry: EngineRegistry,
    gate: ResourceGate,
    media: Media,
    cache: Option<TranslationCache>,
    config: PipelineConfig,
    workers: Arc<Semaphore>,
}

/// Drives jobs through extract → transcribe → translate → [verify] →
/// synthesize → merge on worker tasks, one job per task, bounded by the
/// worker pool.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    pub fn new(
        manager: JobManager,
        registry: EngineRegistry,
        gate: ResourceGate,
        media: Media,
        cache: Option<TranslationCache>,
        config: PipelineConfig,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            inner: Arc::new(Inner {
                manager,
                dispatcher: Dispatcher,
                registry,
                gate,
                media,
                cache,
                config,
                workers,
            }),
        }
    }

    pub fn manager(&self) -> &JobManager {
        &self.inner.manager
    }

    pub fn gate(&self) -> &ResourceGate {
        &self.inner.gate
    }

    /// Hand the job to a worker task and return immediately.
    pub fn submit(&self, id: JobId) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            Worker { inner }.run(id).await;
        });
    }
}

struct Worker {
    inner: Arc<Inner>,
}

struct JobPaths {
    source_audio: PathBuf,
    assembled: PathBuf,
    output: PathBuf,
    /// Whether `source_audio` is the uploaded file itself (audio input)
    /// and must survive cleanup.
    source_is_input: bool,
}

impl Worker {
    async fn run(self, id: JobId) {
        let manager = self.inner.manager.clone();
        let Some(settings) = manager.settings(&id) else {
            tracing::error!(job = %id, "job_missing_at_start");
            return;
        };
        let Some(token) = manager.cancellation_token(&id) else {
            return;
        };

        // Queued until a worker slot frees; cancellation short-circuits
        // the wait.
        let permit = tokio::select! {
            permit = Arc::clone(&self.inner.workers).acquire_owned() => permit,
            _ = token.cancelled() => {
                tracing::info!(job = %id, "job_cancelled_while_queued");
                return;
            }
        };
        let _permit = permit.expect("worker semaphore never closes");

        if manager.is_cancelled(&id) {
            return;
        }
        manager.update_status(&id, JobStatus::Processing);

        let kind = manager.input_kind(&id).unwrap_or(InputKind::Video);
        let input = manager.input_path(&id).unwrap_or_default();
        let paths = self.job_paths(&id, kind, &input);

        let result = self.execute(&id, &settings, kind, &input, &paths, &token).await;

        match result {
            // A cancel can land between the final merge and this commit;
            // the artifact must not surface on a cancelled job.
            Ok(()) if manager.is_cancelled(&id) => {
                remove_quietly(&paths.output).await;
                tracing::info!(job = %id, "job_cancelled_at_commit");
            }
            Ok(()) => {
                manager.set_output(&id, paths.output.clone());
                manager.set_progress(&id, 100);
                manager.update_status(&id, JobStatus::Completed);
                manager.append_log(&id, "Processing complete");
                tracing::info!(job = %id, "job_completed");
            }
            Err(PipelineError::Cancelled) => {
                manager.append_log(&id, "Cancellation observed, stopping");
                manager.update_status(&id, JobStatus::Cancelled);
                remove_quietly(&paths.output).await;
                tracing::info!(job = %id, "job_cancelled");
            }
            Err(err) => {
                let message = err.to_string();
                manager.append_log(&id, format!("Job failed: {message}"));
                manager.set_error(&id, &message);
                manager.update_status(&id, JobStatus::Failed);
                remove_quietly(&paths.output).await;
                tracing::error!(job = %id, error = %message, "job_failed");
            }
        }

        if !paths.source_is_input {
            remove_quietly(&paths.source_audio).await;
        }
        remove_quietly(&paths.assembled).await;
    }

    fn job_paths(&self, id: &JobId, kind: InputKind, input: &Path) -> JobPaths {
        let work = &self.inner.config.work_dir;
        let out = &self.inner.config.output_dir;
        match kind {
            InputKind::Video => JobPaths {
                source_audio: work.join(format!("{id}_source.wav")),
                assembled: work.join(format!("{id}_dubbed.wav")),
                output: out.join(format!("dubbed_{id}.mp4")),
                source_is_input: false,
            },
            InputKind::Audio => JobPaths {
                source_audio: input.to_path_buf(),
                assembled: work.join(format!("{id}_dubbed.wav")),
                output: out.join(format!("dubbed_{id}.wav")),
                source_is_input: true,
            },
        }
    }

    async fn execute(
        &self,
        id: &JobId,
        settings: &JobSettings,
        kind: InputKind,
        input: &Path,
        paths: &JobPaths,
        token: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let manager = &self.inner.manager;
        let verify = settings.verify_translation && self.inner.registry.evaluator().is_some();

        // ---- extract ----
        self.checkpoint(id)?;
        manager.set_stage(id, Stage::Extract);
        let timeline_secs = if kind == InputKind::Video {
            manager.append_log(id, "Extracting audio from video");
            self.inner
                .media
                .extract_audio(input, &paths.source_audio)
                .await?;
            self.inner.media.duration_secs(input).await?
        } else {
            manager.append_log(id, "Audio input detected, skipping extraction");
            wav_duration_secs(&paths.source_audio).await?
        };
        manager.set_progress(id, Stage::Extract.cumulative_progress(verify));

        // ---- transcribe ----
        self.checkpoint(id)?;
        manager.set_stage(id, Stage::Transcribe);
        let transcript = self
            .transcribe(id, settings, &paths.source_audio, token)
            .await?;
        manager.append_log(
            id,
            format!(
                "Transcribed {} segments ({} chars)",
                transcript.len(),
                transcript.total_chars()
            ),
        );
        manager.set_progress(id, Stage::Transcribe.cumulative_progress(verify));

        // ---- translate ----
        self.checkpoint(id)?;
        manager.set_stage(id, Stage::Translate);
        let mut chunks = Chunker::default().chunk(&transcript);
        if chunks.is_empty() {
            return Err(EngineError::Exhausted { provider: "translate" }.into());
        }
        let mut cached_reports: Vec<Option<QualityReport>> = vec![None; chunks.len()];
        self.translate_all(id, settings, verify, &mut chunks, &mut cached_reports)
            .await?;
        manager.set_progress(id, Stage::Translate.cumulative_progress(verify));

        // ---- verify ----
        if verify {
            self.checkpoint(id)?;
            manager.set_stage(id, Stage::Verify);
            self.verify_all(id, settings, &mut chunks, &mut cached_reports)
                .await?;
            manager.set_progress(id, Stage::Verify.cumulative_progress(verify));
        }

        // ---- synthesize ----
        self.checkpoint(id)?;
        manager.set_stage(id, Stage::Synthesize);
        let synthesized = self
            .synthesize_all(id, settings, verify, &chunks, &paths.source_audio, token)
            .await?;

        let assembler = Assembler::new(settings.sync_mode);
        let track = assembler.assemble(&synthesized, transcript.segments(), timeline_secs)?;
        write_wav_file(&paths.assembled, &track, assembler.sample_rate())?;
        manager.append_log(
            id,
            format!(
                "Assembled {:.1}s of audio ({} segments)",
                track.len() as f64 / assembler.sample_rate() as f64,
                synthesized.len()
            ),
        );
        manager.set_progress(id, Stage::Synthesize.cumulative_progress(verify));

        // ---- merge ----
        self.checkpoint(id)?;
        manager.set_stage(id, Stage::Merge);
        tokio::fs::create_dir_all(&self.inner.config.output_dir).await?;
        match kind {
            InputKind::Audio => {
                tokio::fs::copy(&paths.assembled, &paths.output).await?;
            }
            InputKind::Video => {
                manager.append_log(
                    id,
                    format!("Merging audio onto video ({})", settings.sync_mode.as_str()),
                );
                match settings.sync_mode {
                    SyncMode::Stretch => {
                        self.inner
                            .media
                            .merge_stretch(input, &paths.assembled, &paths.output)
                            .await?
                    }
                    SyncMode::Natural | SyncMode::Speed => {
                        self.inner
                            .media
                            .merge(input, &paths.assembled, &paths.output)
                            .await?
                    }
                }
            }
        }

        let produced = tokio::fs::metadata(&paths.output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if produced == 0 {
            return Err(PipelineError::Engine(EngineError::Fatal {
                provider: "merge",
                message: "merge produced no output file".into(),
            }));
        }
        Ok(())
    }

    // ---------------- transcription ----------------

    async fn transcribe(
        &self,
        id: &JobId,
        settings: &JobSettings,
        audio: &Path,
        token: &CancellationToken,
    ) -> Result<Transcript, PipelineError> {
        let credentials = self.inner.registry.credentials();
        let chain = self.inner.dispatcher.resolve_stt(settings, &credentials);
        let language = Some(settings.source_lang);

        let mut last: Option<EngineError> = None;
        for spec in &chain {
            self.checkpoint(id)?;
            let Some(client) = self.inner.registry.stt(spec.id) else {
                continue;
            };
            self.inner
                .manager
                .append_log(id, format!("Transcribing with {}", spec.id.as_str()));

            let result = if spec.locality == Locality::Local {
                self.transcribe_local(client, audio, language, token).await
            } else {
                self.retry_transient(|| client.transcribe(audio, language, ComputeHint::Full))
                    .await
            };

            match result {
                Ok(transcript) => return Ok(transcript),
                Err(EngineError::Cancelled) => return Err(PipelineError::Cancelled),
                // Empty speech is a property of the input, not the engine.
                Err(err @ EngineError::Exhausted { .. }) => return Err(err.into()),
                Err(err) => {
                    tracing::warn!(
                        provider = spec.id.as_str(),
                        error = %err,
                        "stt_engine_failed_trying_next"
                    );
                    self.inner
                        .manager
                        .append_log(id, format!("{} failed: {err}", spec.id.as_str()));
                    last = Some(err);
                }
            }
        }
        Err(last
            .map(PipelineError::from)
            .unwrap_or(PipelineError::NoEngines(Stage::Transcribe)))
    }

    /// Local transcription under the gate. A device OOM releases the
    /// gate, downgrades the compute hint and retries exactly once.
    async fn transcribe_local(
        &self,
        client: &voxdub_stt::SttClient,
        audio: &Path,
        language: Option<Language>,
        token: &CancellationToken,
    ) -> Result<Transcript, EngineError> {
        let first = {
            let _guard = self
                .inner
                .gate
                .acquire("stt", token)
                .await
                .map_err(|_| EngineError::Cancelled)?;
            self.retry_transient(|| client.transcribe(audio, language, ComputeHint::Full))
                .await
        };

        match first {
            Err(EngineError::ResourceExhausted { provider, message }) => {
                tracing::warn!(provider, error = %message, "stt_oom_retrying_reduced");
                let _guard = self
                    .inner
                    .gate
                    .acquire("stt", token)
                    .await
                    .map_err(|_| EngineError::Cancelled)?;
                client.transcribe(audio, language, ComputeHint::Reduced).await
            }
            other => other,
        }
    }

    // ---------------- translation ----------------

    async fn translate_all(
        &self,
        id: &JobId,
        settings: &JobSettings,
        verify: bool,
        chunks: &mut [TranslationChunk],
        cached_reports: &mut [Option<QualityReport>],
    ) -> Result<(), PipelineError> {
        let manager = &self.inner.manager;
        let options = TranslationOptions {
            source_lang: settings.source_lang,
            target_lang: settings.target_lang,
            sync_mode: settings.sync_mode,
        };

        let same_language =
            settings.source_lang == settings.target_lang && settings.source_lang != Language::Auto;

        let total = chunks.len();
        for (index, chunk) in chunks.iter_mut().enumerate() {
            self.checkpoint(id)?;

            if same_language {
                chunk.translated_texts = chunk.source_texts.clone();
                continue;
            }

            let source_joined = chunk.source_joined();
            let cache_key = CacheKey {
                source_text: &source_joined,
                source_lang: settings.source_lang,
                target_lang: settings.target_lang,
                sync_mode: settings.sync_mode,
            };

            if let Some(cache) = &self.inner.cache {
                if let Some(entry) = cache.get(&cache_key) {
                    if entry.translated_texts.len() == chunk.source_texts.len() {
                        manager.append_log(
                            id,
                            format!("Chunk {}/{} served from cache", index + 1, total),
                        );
                        chunk.translated_texts = entry.translated_texts;
                        cached_reports[index] = entry.quality;
                        continue;
                    }
                }
            }

            let texts = self.translate_chunk_with_chain(id, chunk, &options).await?;
            manager.append_log(
                id,
                format!(
                    "Translated chunk {}/{} ({} chars)",
                    index + 1,
                    total,
                    chunk.char_count()
                ),
            );
            chunk.translated_texts = texts;

            // Unverified results are cached right away; the verify stage
            // rewrites the entry with its report.
            if !verify {
                if let Some(cache) = &self.inner.cache {
                    cache.put(&cache_key, &chunk.translated_texts, None);
                }
            }

            self.publish_stage_fraction(id, Stage::Translate, verify, index + 1, total);
        }
        Ok(())
    }

    async fn translate_chunk_with_chain(
        &self,
        id: &JobId,
        chunk: &TranslationChunk,
        options: &TranslationOptions,
    ) -> Result<Vec<String>, PipelineError> {
        let credentials = self.inner.registry.credentials();
        let settings = self.inner.manager.settings(id).expect("job settings exist");
        let chain = self.inner.dispatcher.resolve_translate(&settings, &credentials);

        let mut last: Option<EngineError> = None;
        for spec in &chain {
            self.checkpoint(id)?;
            let Some(engine) = self.inner.registry.translate(spec.id) else {
                continue;
            };

            let result = self
                .retry_transient(|| voxdub_translate::translate_chunk(engine, chunk, options))
                .await;

            match result {
                Ok(texts) => return Ok(texts),
                Err(EngineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(err @ EngineError::Exhausted { .. }) => return Err(err.into()),
                Err(err) => {
                    tracing::warn!(
                        provider = spec.id.as_str(),
                        error = %err,
                        quota = err.is_quota(),
                        "translate_engine_failed_trying_next"
                    );
                    self.inner
                        .manager
                        .append_log(id, format!("{} failed: {err}", spec.id.as_str()));
                    last = Some(err);
                }
            }
        }
        Err(last
            .map(PipelineError::from)
            .unwrap_or(PipelineError::NoEngines(Stage::Translate)))
    }

    // ---------------- verification ----------------

    /// Per-chunk evaluate/refine loop. Evaluator unavailability is soft:
    /// the job keeps its translation and simply carries no report.
    async fn verify_all(
        &self,
        id: &JobId,
        settings: &JobSettings,
        chunks: &mut [TranslationChunk],
        cached_reports: &mut [Option<QualityReport>],
    ) -> Result<(), PipelineError> {
        let manager = &self.inner.manager;
        let evaluator = self
            .inner
            .registry
            .evaluator()
            .expect("verify stage requires an evaluator");
        let min_score = self.inner.config.min_quality_score;
        let max_rounds = self.inner.config.max_refine_rounds;
        let options = TranslationOptions {
            source_lang: settings.source_lang,
            target_lang: settings.target_lang,
            sync_mode: settings.sync_mode,
        };

        let mut reports: Vec<QualityReport> = Vec::with_capacity(chunks.len());
        let total = chunks.len();

        for (index, chunk) in chunks.iter_mut().enumerate() {
            self.checkpoint(id)?;

            if let Some(cached) = cached_reports[index].take() {
                if cached.overall_score >= min_score {
                    reports.push(cached);
                    continue;
                }
            }

            let source_joined = chunk.source_joined();
            let mut current = chunk.translated_texts.clone();
            let mut best_texts = current.clone();
            let mut best: Option<QualityReport> = None;
            let mut rounds_used: u8 = 0;

            loop {
                self.checkpoint(id)?;
                let report = match evaluator
                    .evaluate(
                        &source_joined,
                        &current.join(" "),
                        settings.source_lang,
                        settings.target_lang,
                    )
                    .await
                {
                    Ok(report) => report,
                    Err(err) => {
                        if err.is_cancelled() {
                            return Err(PipelineError::Cancelled);
                        }
                        manager.append_log(
                            id,
                            format!("Quality evaluation unavailable: {err} (continuing)"),
                        );
                        tracing::warn!(error = %err, "verify_soft_failure");
                        return Ok(());
                    }
                };

                manager.append_log(
                    id,
                    format!(
                        "Chunk {}/{} quality round {}: {}%",
                        index + 1,
                        total,
                        rounds_used + 1,
                        report.overall_score
                    ),
                );

                let improved = best
                    .as_ref()
                    .map(|b| report.overall_score > b.overall_score)
                    .unwrap_or(true);
                if improved {
                    best = Some(report.clone());
                    best_texts = current.clone();
                }

                if report.overall_score >= min_score || rounds_used >= max_rounds {
                    break;
                }

                rounds_used += 1;
                match self
                    .refine_chunk_with_chain(id, chunk, &current, &report.issues, &options)
                    .await
                {
                    Ok(refined) => {
                        if acceptable_refinement(&current, &refined, settings.target_lang) {
                            current = refined;
                        } else {
                            manager.append_log(
                                id,
                                format!(
                                    "Chunk {}/{} refinement discarded (lost content)",
                                    index + 1,
                                    total
                                ),
                            );
                        }
                    }
                    Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                    Err(err) => {
                        manager.append_log(id, format!("Refinement failed: {err}"));
                        tracing::warn!(error = %err, "refine_round_failed");
                    }
                }
            }

            let mut report = best.expect("at least one evaluation round succeeded");
            report.refine_rounds = rounds_used;
            if report.overall_score < min_score {
                report.recommendation = report
                    .recommendation
                    .worst(Recommendation::ReviewNeeded);
            }
            chunk.translated_texts = best_texts;

            if let Some(cache) = &self.inner.cache {
                let cache_key = CacheKey {
                    source_text: &source_joined,
                    source_lang: settings.source_lang,
                    target_lang: settings.target_lang,
                    sync_mode: settings.sync_mode,
                };
                cache.put(&cache_key, &chunk.translated_texts, Some(&report));
            }

            reports.push(report);
            self.publish_stage_fraction(id, Stage::Verify, true, index + 1, total);
        }

        let aggregate = aggregate_reports(&reports, chunks);
        if let Some(aggregate) = aggregate {
            manager.append_log(
                id,
                format!(
                    "Overall quality {}% ({:?})",
                    aggregate.overall_score, aggregate.recommendation
                ),
            );
            manager.set_quality(id, aggregate);
        }
        Ok(())
    }

    async fn refine_chunk_with_chain(
        &self,
        id: &JobId,
        chunk: &TranslationChunk,
        previous: &[String],
        issues: &[String],
        options: &TranslationOptions,
    ) -> Result<Vec<String>, PipelineError> {
        let credentials = self.inner.registry.credentials();
        let settings = self.inner.manager.settings(id).expect("job settings exist");
        let chain = self.inner.dispatcher.resolve_translate(&settings, &credentials);

        let mut last: Option<EngineError> = None;
        for spec in &chain {
            self.checkpoint(id)?;
            let Some(engine) = self.inner.registry.translate(spec.id) else {
                continue;
            };
            let result = self
                .retry_transient(|| {
                    voxdub_translate::refine_chunk(engine, chunk, previous, issues, options)
                })
                .await;
            match result {
                Ok(texts) => return Ok(texts),
                Err(EngineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(err) => {
                    tracing::warn!(provider = spec.id.as_str(), error = %err, "refine_engine_failed");
                    last = Some(err);
                }
            }
        }
        Err(last
            .map(PipelineError::from)
            .unwrap_or(PipelineError::NoEngines(Stage::Verify)))
    }

    // ---------------- synthesis ----------------

    async fn synthesize_all(
        &self,
        id: &JobId,
        settings: &JobSettings,
        verify: bool,
        chunks: &[TranslationChunk],
        speaker_audio: &Path,
        token: &CancellationToken,
    ) -> Result<Vec<SynthesizedSegment>, PipelineError> {
        let manager = &self.inner.manager;
        let credentials = self.inner.registry.credentials();
        let chain = self.inner.dispatcher.resolve_tts(settings, &credentials);
        if chain.is_empty() {
            return Err(PipelineError::NoEngines(Stage::Synthesize));
        }

        let speaker = settings.clone_voice.then_some(speaker_audio);
        let utterances: Vec<(usize, &str)> = chunks
            .iter()
            .flat_map(|chunk| {
                chunk
                    .translated_texts
                    .iter()
                    .enumerate()
                    .map(move |(offset, text)| (chunk.first_segment + offset, text.as_str()))
            })
            .collect();

        let total = utterances.len();
        let mut synthesized = Vec::with_capacity(total);
        for (done, (segment_index, text)) in utterances.into_iter().enumerate() {
            self.checkpoint(id)?;

            if text.trim().is_empty() {
                synthesized.push(SynthesizedSegment {
                    segment_index,
                    samples: Vec::new(),
                    sample_rate: voxdub_audio::TRACK_SAMPLE_RATE,
                    is_silence: true,
                });
                continue;
            }

            let request = SynthesisRequest {
                text,
                language: settings.target_lang,
                speaker_wav: speaker,
            };

            let mut last: Option<EngineError> = None;
            let mut produced: Option<Vec<u8>> = None;
            for spec in &chain {
                self.checkpoint(id)?;
                let Some(client) = self.inner.registry.tts(spec.id) else {
                    continue;
                };

                let result = if spec.locality == Locality::Local {
                    let _guard = self
                        .inner
                        .gate
                        .acquire("tts", token)
                        .await
                        .map_err(|_| PipelineError::Cancelled)?;
                    self.retry_transient(|| client.synthesize(&request)).await
                } else {
                    self.retry_transient(|| client.synthesize(&request)).await
                };

                match result {
                    Ok(wav) => {
                        produced = Some(wav);
                        break;
                    }
                    Err(EngineError::Cancelled) => return Err(PipelineError::Cancelled),
                    Err(err) => {
                        tracing::warn!(
                            provider = spec.id.as_str(),
                            error = %err,
                            "tts_engine_failed_trying_next"
                        );
                        manager.append_log(id, format!("{} failed: {err}", spec.id.as_str()));
                        last = Some(err);
                    }
                }
            }

            let Some(wav) = produced else {
                return Err(last
                    .map(PipelineError::from)
                    .unwrap_or(PipelineError::NoEngines(Stage::Synthesize)));
            };

            let (samples, sample_rate) = decode_wav(&wav)?;
            synthesized.push(SynthesizedSegment {
                segment_index,
                samples,
                sample_rate,
                is_silence: false,
            });

            self.publish_stage_fraction(id, Stage::Synthesize, verify, done + 1, total);
        }
        Ok(synthesized)
    }

    // ---------------- plumbing ----------------

    fn checkpoint(&self, id: &JobId) -> Result<(), PipelineError> {
        if self.inner.manager.is_cancelled(id) {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Exponential backoff over transient failures only: quota and
    /// malformed responses go straight back to the chain walk.
    async fn retry_transient<T, F, Fut>(&self, op: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, EngineError>>,
    {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.inner.config.retry_min_delay)
            .with_factor(2.0)
            .with_max_times(3);

        op.retry(backoff)
            .when(EngineError::is_transient)
            .notify(|err, delay| {
                tracing::warn!(
                    error = %err,
                    retry_delay_ms = delay.as_millis() as u64,
                    "transient_failure_retrying"
                );
            })
            .await
    }

    /// Progress inside a stage, interpolated between the previous stage's
    /// cumulative value and this stage's.
    fn publish_stage_fraction(
        &self,
        id: &JobId,
        stage: Stage,
        verify: bool,
        done: usize,
        total: usize,
    ) {
        let end = stage.cumulative_progress(verify) as u32;
        let start = previous_cumulative(stage, verify) as u32;
        let value = start + (end - start) * done as u32 / total.max(1) as u32;
        self.inner.manager.set_progress(id, value as u8);
    }
}

fn previous_cumulative(stage: Stage, verify: bool) -> u8 {
    let mut prev = 0;
    for candidate in Stage::ALL {
        if candidate == stage {
            break;
        }
        if candidate == Stage::Verify && !verify {
            continue;
        }
        prev = candidate.cumulative_progress(verify);
    }
    prev
}

/// A refinement that shrinks below half the previous attempt or loses the
/// bulk of its key terms is worse than what it replaces.
fn acceptable_refinement(previous: &[String], refined: &[String], target: Language) -> bool {
    let prev_joined = previous.join(" ");
    let refined_joined = refined.join(" ");
    if refined_joined.chars().count() * 2 < prev_joined.chars().count() {
        return false;
    }
    check_preservation(&prev_joined, &refined_joined, target).score >= 0.7
}

/// Job-level report: chunk scores weighted by source length, worst
/// recommendation wins, issue lists concatenate.
fn aggregate_reports(
    reports: &[QualityReport],
    chunks: &[TranslationChunk],
) -> Option<QualityReport> {
    if reports.is_empty() {
        return None;
    }

    let weights: Vec<usize> = chunks
        .iter()
        .take(reports.len())
        .map(|c| c.char_count().max(1))
        .collect();
    let total_weight: usize = weights.iter().sum();

    let weighted = |pick: fn(&QualityReport) -> u8| -> u8 {
        let sum: usize = reports
            .iter()
            .zip(&weights)
            .map(|(r, w)| pick(r) as usize * w)
            .sum();
        (sum / total_weight) as u8
    };

    let mut issues = Vec::new();
    let mut missing = Vec::new();
    let mut recommendation = Recommendation::Approved;
    let mut sampled = false;
    let mut refine_rounds = 0u8;
    let mut term_score = 0f32;
    for (report, weight) in reports.iter().zip(&weights) {
        issues.extend(report.issues.iter().cloned());
        missing.extend(report.term_preservation.missing.iter().cloned());
        recommendation = recommendation.worst(report.recommendation);
        sampled |= report.sampled;
        refine_rounds = refine_rounds.max(report.refine_rounds);
        term_score += report.term_preservation.score * *weight as f32;
    }

    Some(QualityReport {
        overall_score: weighted(|r| r.overall_score),
        breakdown: voxdub_interface::QualityBreakdown {
            accuracy: weighted(|r| r.breakdown.accuracy),
            naturalness: weighted(|r| r.breakdown.naturalness),
            dubbing_fit: weighted(|r| r.breakdown.dubbing_fit),
            consistency: weighted(|r| r.breakdown.consistency),
        },
        issues,
        recommendation,
        term_preservation: voxdub_interface::TermPreservation {
            score: term_score / total_weight as f32,
            missing,
        },
        sampled,
        refine_rounds,
        error: None,
    })
}

/// Duration of an audio-kind upload, read from the WAV itself so the
/// probe tool is only needed for video inputs.
async fn wav_duration_secs(path: &Path) -> Result<f64, PipelineError> {
    let bytes = tokio::fs::read(path).await?;
    let (samples, sample_rate) = decode_wav(&bytes)?;
    Ok(samples.len() as f64 / sample_rate as f64)
}

async fn remove_quietly(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %err, "cleanup_skip");
        }
    }
}

mod common;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{start_mock_engines, wait_for, write_input_wav, MockState};
use voxdub_gate::ResourceGate;
use voxdub_interface::{
    InputKind, JobSettings, JobStatus, Language, Stage, SttEngineId, SyncMode, TranslateEngineId,
    TtsEngineId,
};
use voxdub_llm::{ChatEngine, GeminiClient, GroqClient};
use voxdub_media::Media;
use voxdub_pipeline::{EngineRegistry, JobManager, Pipeline, PipelineConfig};
use voxdub_quality::Evaluator;
use voxdub_stt::{SttClient, WhisperLocalClient};
use voxdub_tts::{EdgeClient, TtsClient, XttsClient};

fn settings(verify: bool) -> JobSettings {
    JobSettings {
        source_lang: Language::Ko,
        target_lang: Language::En,
        clone_voice: false,
        verify_translation: verify,
        sync_mode: SyncMode::Speed,
        stt_engine: Some(SttEngineId::WhisperLocal),
        translation_engine: None,
        tts_engine: Some(TtsEngineId::Edge),
    }
}

fn registry_for(addr: SocketAddr, with_eval: bool) -> EngineRegistry {
    let base = format!("http://{addr}");
    let groq_chat = ChatEngine::Groq(
        GroqClient::new("test-key", "test-model").with_base_url(format!("{base}/chat/completions")),
    );
    let gemini_chat = ChatEngine::Gemini(
        GeminiClient::new("test-key", "test-model").with_base_url(format!("{base}/gemini")),
    );

    let mut registry = EngineRegistry::new()
        .with_stt(
            SttEngineId::WhisperLocal,
            SttClient::WhisperLocal(WhisperLocalClient::new(base.clone(), "large-v3")),
        )
        .with_translate(TranslateEngineId::Groq, groq_chat)
        .with_tts(TtsEngineId::Edge, TtsClient::Edge(EdgeClient::new(base.clone())));

    if with_eval {
        registry = registry.with_evaluator(Evaluator::new(gemini_chat, None));
    }
    registry
}

struct Harness {
    pipeline: Pipeline,
    upload_dir: PathBuf,
    output_dir: PathBuf,
    _tmp: tempfile::TempDir,
}

fn harness(registry: EngineRegistry, max_workers: usize) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let upload_dir = tmp.path().join("uploads");
    let work_dir = tmp.path().join("work");
    let output_dir = tmp.path().join("outputs");
    std::fs::create_dir_all(&upload_dir).unwrap();
    std::fs::create_dir_all(&work_dir).unwrap();
    std::fs::create_dir_all(&output_dir).unwrap();

    let config = PipelineConfig {
        work_dir,
        output_dir: output_dir.clone(),
        max_workers,
        min_quality_score: 85,
        max_refine_rounds: 3,
        retry_min_delay: Duration::from_millis(20),
    };

    let pipeline = Pipeline::new(
        JobManager::new(),
        registry,
        ResourceGate::new(),
        Media::default(),
        None,
        config,
    );
    Harness {
        pipeline,
        upload_dir,
        output_dir,
        _tmp: tmp,
    }
}

fn submit_audio_job(h: &Harness, name: &str, settings: JobSettings) -> voxdub_interface::JobId {
    let input = h.upload_dir.join(name);
    write_input_wav(&input, 2.0);
    let id = h.pipeline.manager().create(
        settings,
        input,
        Some(name.to_string()),
        InputKind::Audio,
    );
    h.pipeline.submit(id);
    id
}

fn short_segments() -> Vec<(f64, f64, String)> {
    vec![
        (0.0, 0.6, "첫 번째 문장입니다".to_string()),
        (0.8, 1.4, "두 번째 문장입니다".to_string()),
    ]
}

/// Enough text per segment that the chunker emits several chunks.
fn long_segments() -> Vec<(f64, f64, String)> {
    (0..4)
        .map(|i| {
            (
                i as f64 * 0.5,
                i as f64 * 0.5 + 0.4,
                format!("문장 {i} ").repeat(60),
            )
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn happy_path_completes_with_stage_logs() {
    let state = Arc::new(MockState::with_segments(short_segments()));
    let addr = start_mock_engines(Arc::clone(&state)).await;
    let h = harness(registry_for(addr, false), 2);

    let id = submit_audio_job(&h, "clip.wav", settings(false));
    let manager = h.pipeline.manager().clone();

    assert!(
        wait_for(
            || manager.get(&id).map(|v| v.status.is_terminal()).unwrap_or(false),
            Duration::from_secs(10),
        )
        .await
    );

    let view = manager.get(&id).unwrap();
    assert_eq!(view.status, JobStatus::Completed, "error: {:?}", view.error);
    assert_eq!(view.progress, 100);

    let output = view.output_file.expect("completed job has an output");
    let meta = std::fs::metadata(&output).unwrap();
    assert!(meta.len() > 0);
    assert!(output.ends_with(&format!("dubbed_{id}.wav")));

    let log_text = view
        .logs
        .iter()
        .map(|l| l.message.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(log_text.contains("skipping extraction"));
    assert!(log_text.contains("Transcribed 2 segments"));
    assert!(log_text.contains("Translated chunk"));
    assert!(log_text.contains("Assembled"));
    assert!(log_text.contains("Processing complete"));

    // Verify was off: no quality report, no evaluator traffic.
    assert!(view.quality.is_none());
    assert_eq!(state.eval_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn quota_on_primary_advances_chain_without_backoff() {
    // Primary (gemini) always answers 429; secondary (groq) translates.
    let quota_state = Arc::new(MockState {
        translate_always_quota: true,
        ..MockState::with_segments(short_segments())
    });
    let quota_addr = start_mock_engines(Arc::clone(&quota_state)).await;

    let good_state = Arc::new(MockState::with_segments(short_segments()));
    let good_addr = start_mock_engines(Arc::clone(&good_state)).await;

    let base_quota = format!("http://{quota_addr}");
    let base_good = format!("http://{good_addr}");
    let registry = EngineRegistry::new()
        .with_stt(
            SttEngineId::WhisperLocal,
            SttClient::WhisperLocal(WhisperLocalClient::new(base_good.clone(), "large-v3")),
        )
        .with_translate(
            TranslateEngineId::Gemini,
            ChatEngine::Gemini(
                GeminiClient::new("k", "m").with_base_url(format!("{base_quota}/gemini")),
            ),
        )
        .with_translate(
            TranslateEngineId::Groq,
            ChatEngine::Groq(
                GroqClient::new("k", "m").with_base_url(format!("{base_good}/chat/completions")),
            ),
        )
        .with_tts(TtsEngineId::Edge, TtsClient::Edge(EdgeClient::new(base_good)));

    let h = harness(registry, 2);
    let started = Instant::now();
    let id = submit_audio_job(&h, "clip.wav", settings(false));
    let manager = h.pipeline.manager().clone();

    assert!(
        wait_for(
            || manager.get(&id).map(|v| v.status.is_terminal()).unwrap_or(false),
            Duration::from_secs(10),
        )
        .await
    );

    let view = manager.get(&id).unwrap();
    assert_eq!(view.status, JobStatus::Completed, "error: {:?}", view.error);
    // Gemini saw exactly one call per chunk (no backoff retries), and the
    // whole job finished far faster than a single 2s backoff sleep.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(good_state.translate_calls.load(Ordering::SeqCst) > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_mid_translation_leaves_no_output() {
    let state = Arc::new(MockState {
        translate_delay_ms: 250,
        ..MockState::with_segments(long_segments())
    });
    let addr = start_mock_engines(Arc::clone(&state)).await;
    let h = harness(registry_for(addr, false), 2);

    let id = submit_audio_job(&h, "clip.wav", settings(false));
    let manager = h.pipeline.manager().clone();

    // Wait until the job is inside the translate stage, then cancel.
    assert!(
        wait_for(
            || manager
                .get(&id)
                .map(|v| v.current_stage == Some(Stage::Translate))
                .unwrap_or(false),
            Duration::from_secs(10),
        )
        .await
    );
    assert!(manager.cancel(&id));

    assert!(
        wait_for(
            || manager.get(&id).map(|v| v.status.is_terminal()).unwrap_or(false),
            Duration::from_secs(10),
        )
        .await
    );

    // Give the worker a beat to run its cleanup path.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let view = manager.get(&id).unwrap();
    assert_eq!(view.status, JobStatus::Cancelled);
    assert!(view.output_file.is_none());
    assert!(std::fs::read_dir(&h.output_dir).unwrap().next().is_none());
    assert_eq!(h.pipeline.gate().holders(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn local_engines_of_two_jobs_never_overlap() {
    let state = Arc::new(MockState {
        stt_delay_ms: 120,
        tts_delay_ms: 120,
        ..MockState::with_segments(short_segments())
    });
    let addr = start_mock_engines(Arc::clone(&state)).await;
    let base = format!("http://{addr}");

    // Both stages forced local: whisper for STT, XTTS for TTS.
    let registry = EngineRegistry::new()
        .with_stt(
            SttEngineId::WhisperLocal,
            SttClient::WhisperLocal(WhisperLocalClient::new(base.clone(), "large-v3")),
        )
        .with_translate(
            TranslateEngineId::Groq,
            ChatEngine::Groq(
                GroqClient::new("k", "m").with_base_url(format!("{base}/chat/completions")),
            ),
        )
        .with_tts(TtsEngineId::XttsLocal, TtsClient::Xtts(XttsClient::new(base)));

    let mut s = settings(false);
    s.tts_engine = Some(TtsEngineId::XttsLocal);

    let h = harness(registry, 2);
    let first = submit_audio_job(&h, "one.wav", s.clone());
    let second = submit_audio_job(&h, "two.wav", s);
    let manager = h.pipeline.manager().clone();

    assert!(
        wait_for(
            || {
                [first, second].iter().all(|id| {
                    manager.get(id).map(|v| v.status.is_terminal()).unwrap_or(false)
                })
            },
            Duration::from_secs(20),
        )
        .await
    );

    for id in [first, second] {
        let view = manager.get(&id).unwrap();
        assert_eq!(view.status, JobStatus::Completed, "error: {:?}", view.error);
    }
    assert!(
        !state.local_overlap.load(Ordering::SeqCst),
        "two jobs were inside a GPU-local section at once"
    );
    assert_eq!(h.pipeline.gate().holders(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn verify_refines_low_first_pass_to_acceptance() {
    // Dual evaluation of round one scores 72 twice; after one refinement
    // the pair scores 88.
    let state = Arc::new(MockState {
        eval_scores: vec![72, 72, 88, 88],
        ..MockState::with_segments(short_segments())
    });
    let addr = start_mock_engines(Arc::clone(&state)).await;
    let h = harness(registry_for(addr, true), 2);

    let id = submit_audio_job(&h, "clip.wav", settings(true));
    let manager = h.pipeline.manager().clone();

    assert!(
        wait_for(
            || manager.get(&id).map(|v| v.status.is_terminal()).unwrap_or(false),
            Duration::from_secs(10),
        )
        .await
    );

    let view = manager.get(&id).unwrap();
    assert_eq!(view.status, JobStatus::Completed, "error: {:?}", view.error);

    let quality = view.quality.expect("verified job carries a report");
    assert!(quality.overall_score >= 85);
    assert_eq!(quality.refine_rounds, 1);
    assert_ne!(
        quality.recommendation,
        voxdub_interface::Recommendation::Reject
    );
    assert_eq!(state.eval_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn dual_eval_disagreement_triggers_exactly_one_extra_call() {
    // 90 vs 60 disagree by 30, forcing a third call; the median (86)
    // clears the bar, so no refinement happens.
    let state = Arc::new(MockState {
        eval_scores: vec![90, 60, 86],
        ..MockState::with_segments(short_segments())
    });
    let addr = start_mock_engines(Arc::clone(&state)).await;
    let h = harness(registry_for(addr, true), 2);

    let id = submit_audio_job(&h, "clip.wav", settings(true));
    let manager = h.pipeline.manager().clone();

    assert!(
        wait_for(
            || manager.get(&id).map(|v| v.status.is_terminal()).unwrap_or(false),
            Duration::from_secs(10),
        )
        .await
    );

    let view = manager.get(&id).unwrap();
    assert_eq!(view.status, JobStatus::Completed, "error: {:?}", view.error);
    let quality = view.quality.expect("verified job carries a report");
    assert_eq!(quality.overall_score, 86);
    assert_eq!(quality.refine_rounds, 0);
    assert_eq!(state.eval_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn lost_terms_force_reject_despite_high_score() {
    // The translator discards every number and date; even a 90 from the
    // evaluator cannot rescue the verdict.
    let state = Arc::new(MockState {
        translate_drops_terms: true,
        eval_scores: vec![90, 90],
        ..MockState::with_segments(vec![
            (0.0, 0.6, "2024-03-15 진료에서 Lipitor 40mg 처방".to_string()),
            (0.8, 1.4, "혈압은 120에 80으로 측정되었습니다".to_string()),
        ])
    });
    let addr = start_mock_engines(Arc::clone(&state)).await;
    let h = harness(registry_for(addr, true), 2);

    let id = submit_audio_job(&h, "clip.wav", settings(true));
    let manager = h.pipeline.manager().clone();

    assert!(
        wait_for(
            || manager.get(&id).map(|v| v.status.is_terminal()).unwrap_or(false),
            Duration::from_secs(10),
        )
        .await
    );

    let view = manager.get(&id).unwrap();
    assert_eq!(view.status, JobStatus::Completed, "error: {:?}", view.error);
    let quality = view.quality.expect("verified job carries a report");
    assert!(quality.term_preservation.score < 0.3);
    assert_eq!(
        quality.recommendation,
        voxdub_interface::Recommendation::Reject
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_evaluator_is_soft() {
    // Evaluator points at a dead port; translation must still complete.
    let state = Arc::new(MockState::with_segments(short_segments()));
    let addr = start_mock_engines(Arc::clone(&state)).await;
    let base = format!("http://{addr}");

    let dead = ChatEngine::Gemini(
        GeminiClient::new("k", "m")
            .with_base_url("http://127.0.0.1:1/gemini")
            .with_timeout(Duration::from_millis(200)),
    );

    let registry = EngineRegistry::new()
        .with_stt(
            SttEngineId::WhisperLocal,
            SttClient::WhisperLocal(WhisperLocalClient::new(base.clone(), "large-v3")),
        )
        .with_translate(
            TranslateEngineId::Groq,
            ChatEngine::Groq(
                GroqClient::new("k", "m").with_base_url(format!("{base}/chat/completions")),
            ),
        )
        .with_tts(TtsEngineId::Edge, TtsClient::Edge(EdgeClient::new(base)))
        .with_evaluator(Evaluator::new(dead, None));

    let h = harness(registry, 2);
    let id = submit_audio_job(&h, "clip.wav", settings(true));
    let manager = h.pipeline.manager().clone();

    assert!(
        wait_for(
            || manager.get(&id).map(|v| v.status.is_terminal()).unwrap_or(false),
            Duration::from_secs(15),
        )
        .await
    );

    let view = manager.get(&id).unwrap();
    assert_eq!(view.status, JobStatus::Completed, "error: {:?}", view.error);
    assert!(view.quality.is_none(), "verify failure must stay soft");
}

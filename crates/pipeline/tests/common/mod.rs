//! In-process mock engine servers for end-to-end pipeline tests, bound to
//! 127.0.0.1:0 and wired into the registry through each client's base-URL
//! override.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

#[derive(Default)]
pub struct MockState {
    /// Calls seen by each endpoint family.
    pub stt_calls: AtomicUsize,
    pub translate_calls: AtomicUsize,
    pub eval_calls: AtomicUsize,
    pub tts_calls: AtomicUsize,
    /// Concurrency tracking for the GPU-local endpoints.
    pub local_active: AtomicUsize,
    pub local_overlap: AtomicBool,
    /// Behavior knobs.
    pub stt_delay_ms: u64,
    pub translate_delay_ms: u64,
    pub tts_delay_ms: u64,
    pub translate_always_quota: bool,
    /// Replace every translation with bland filler that keeps none of the
    /// source's salient terms.
    pub translate_drops_terms: bool,
    /// Evaluator scores handed out in call order; the last repeats.
    pub eval_scores: Vec<u32>,
    /// Transcript segments returned by the mock STT.
    pub segments: Vec<(f64, f64, String)>,
}

impl MockState {
    pub fn with_segments(segments: Vec<(f64, f64, String)>) -> Self {
        Self { segments, ..Default::default() }
    }
}

pub async fn start_mock_engines(state: Arc<MockState>) -> SocketAddr {
    let app = Router::new()
        .route("/v1/audio/transcriptions", post(stt_handler))
        .route("/chat/completions", post(chat_handler))
        // The generateContent suffix rides inside the {action} segment.
        .route("/gemini/models/{action}", post(gemini_handler))
        .route("/synthesize", post(tts_handler))
        .route("/tts_to_audio", post(local_tts_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock engine server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server runs");
    });
    addr
}

/// Track entry into a GPU-local section; trips the overlap flag when two
/// callers are inside at once.
fn enter_local(state: &MockState) {
    if state.local_active.fetch_add(1, Ordering::SeqCst) != 0 {
        state.local_overlap.store(true, Ordering::SeqCst);
    }
}

fn leave_local(state: &MockState) {
    state.local_active.fetch_sub(1, Ordering::SeqCst);
}

async fn stt_handler(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    state.stt_calls.fetch_add(1, Ordering::SeqCst);
    enter_local(&state);
    tokio::time::sleep(Duration::from_millis(state.stt_delay_ms)).await;
    leave_local(&state);

    let segments: Vec<Value> = state
        .segments
        .iter()
        .map(|(start, end, text)| json!({ "start": start, "end": end, "text": text }))
        .collect();
    let text = state
        .segments
        .iter()
        .map(|(_, _, t)| t.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    Json(json!({ "text": text, "language": "ko", "segments": segments }))
}

/// Echo-translator: pulls the segments array out of the prompt and
/// returns it with a marker prefix, so alignment is always 1:1.
fn translate_from_prompt(prompt: &str, drop_terms: bool) -> Vec<String> {
    let Some(start) = prompt.find("<segments>") else {
        return vec![];
    };
    let Some(end) = prompt[start..].find("</segments>") else {
        return vec![];
    };
    let body = prompt[start + "<segments>".len()..start + end].trim();
    let sources: Vec<String> = serde_json::from_str(body).unwrap_or_default();
    sources
        .into_iter()
        .map(|s| {
            if drop_terms {
                "전혀 다른 내용입니다".to_string()
            } else {
                format!("[tl] {s}")
            }
        })
        .collect()
}

async fn chat_handler(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.translate_calls.fetch_add(1, Ordering::SeqCst);
    if state.translate_always_quota {
        return (StatusCode::TOO_MANY_REQUESTS, "quota exceeded").into_response();
    }
    tokio::time::sleep(Duration::from_millis(state.translate_delay_ms)).await;

    let prompt = body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default();
    let translated = translate_from_prompt(prompt, state.translate_drops_terms);
    let content = serde_json::to_string(&translated).unwrap();

    Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    }))
    .into_response()
}

async fn gemini_handler(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if state.translate_always_quota {
        state.translate_calls.fetch_add(1, Ordering::SeqCst);
        return (StatusCode::TOO_MANY_REQUESTS, "quota exceeded").into_response();
    }

    let prompt = body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default();

    // The evaluator and the translator share the Gemini wire shape; tell
    // them apart by the rubric marker.
    let reply = if prompt.contains("SCORING RUBRIC") {
        let call = state.eval_calls.fetch_add(1, Ordering::SeqCst);
        let score = state
            .eval_scores
            .get(call)
            .or(state.eval_scores.last())
            .copied()
            .unwrap_or(90);
        json!({
            "overall_score": score,
            "breakdown": {
                "accuracy": score, "naturalness": score,
                "dubbing_fit": score, "consistency": score
            },
            "issues": if score < 85 { vec!["stiff phrasing in the opening line"] } else { vec![] },
            "recommendation": if score >= 85 { "APPROVED" } else { "REVIEW_NEEDED" }
        })
        .to_string()
    } else {
        serde_json::to_string(&translate_from_prompt(prompt, state.translate_drops_terms)).unwrap()
    };

    Json(json!({
        "candidates": [{ "content": { "parts": [{ "text": reply }] } }]
    }))
    .into_response()
}

async fn tts_handler(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    state.tts_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(state.tts_delay_ms)).await;
    synth_wav()
}

async fn local_tts_handler(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    state.tts_calls.fetch_add(1, Ordering::SeqCst);
    enter_local(&state);
    tokio::time::sleep(Duration::from_millis(state.tts_delay_ms)).await;
    leave_local(&state);
    synth_wav()
}

/// 300 ms of quiet tone, the mock's answer to every utterance.
fn synth_wav() -> Vec<u8> {
    let samples: Vec<f32> = (0..7200)
        .map(|i| (std::f32::consts::TAU * 180.0 * i as f32 / 24_000.0).sin() * 0.3)
        .collect();
    voxdub_audio::encode_wav(&samples, 24_000)
}

/// A short source WAV for audio-kind uploads.
pub fn write_input_wav(path: &std::path::Path, secs: f32) {
    let samples: Vec<f32> = (0..(16_000.0 * secs) as usize)
        .map(|i| (std::f32::consts::TAU * 120.0 * i as f32 / 16_000.0).sin() * 0.4)
        .collect();
    voxdub_audio::write_wav_file(path, &samples, 16_000).expect("write input wav");
}

/// Poll until the predicate holds or the deadline passes.
pub async fn wait_for<F>(mut predicate: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
}

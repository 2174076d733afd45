mod auth;
mod env;
mod error;
mod rate_limit;
mod routes;
mod upload;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath, Request},
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{self, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::prelude::*;

use voxdub_gate::ResourceGate;
use voxdub_interface::{Credentials, SttEngineId, TranslateEngineId, TtsEngineId};
use voxdub_llm::{ChatEngine, GeminiClient, GroqClient, OllamaClient};
use voxdub_media::{Media, MediaConfig};
use voxdub_pipeline::{EngineRegistry, JobManager, Pipeline, PipelineConfig};
use voxdub_quality::Evaluator;
use voxdub_stt::{SttClient, WhisperLocalClient};
use voxdub_tts::{EdgeClient, ElevenLabsClient, TtsClient, XttsClient};
use voxdub_translate::TranslationCache;

use auth::AuthState;
use env::{api_keys, env};
use routes::AppState;

fn build_registry() -> (EngineRegistry, Credentials, Option<ElevenLabsClient>) {
    let env = env();
    let keys = api_keys();

    let whisper = WhisperLocalClient::new(env.whisper_url.clone(), env.whisper_model.clone());
    let mut registry = EngineRegistry::new()
        .with_stt(
            SttEngineId::WhisperLocal,
            SttClient::WhisperLocal(whisper),
        )
        .with_translate(
            TranslateEngineId::Ollama,
            ChatEngine::Ollama(OllamaClient::new(
                env.ollama_url.clone(),
                env.ollama_model.clone(),
            )),
        )
        .with_tts(
            TtsEngineId::XttsLocal,
            TtsClient::Xtts(XttsClient::new(env.xtts_url.clone())),
        )
        .with_tts(
            TtsEngineId::Edge,
            TtsClient::Edge(EdgeClient::new(env.edge_url.clone())),
        );

    if let Some(key) = &keys.groq_api_key {
        registry = registry
            .with_stt(SttEngineId::Groq, SttClient::groq(key.clone()))
            .with_translate(
                TranslateEngineId::Groq,
                ChatEngine::Groq(GroqClient::new(key.clone(), env.groq_model.clone())),
            );
    }
    if let Some(key) = &keys.gemini_api_key {
        registry = registry.with_translate(
            TranslateEngineId::Gemini,
            ChatEngine::Gemini(GeminiClient::new(key.clone(), env.gemini_model.clone())),
        );
    }
    if let Some(key) = &keys.openai_api_key {
        registry = registry.with_stt(SttEngineId::Openai, SttClient::openai(key.clone()));
    }

    let mut elevenlabs = None;
    if let Some(key) = &keys.elevenlabs_api_key {
        let client = ElevenLabsClient::new(key.clone(), env.elevenlabs_model.clone());
        registry = registry.with_tts(TtsEngineId::Elevenlabs, TtsClient::Elevenlabs(client.clone()));
        elevenlabs = Some(client);
    }

    // Evaluator: Gemini first, Groq as the quota fallback.
    let eval_primary = keys.gemini_api_key.as_ref().map(|key| {
        ChatEngine::Gemini(GeminiClient::new(key.clone(), env.gemini_model.clone()))
    });
    let eval_secondary = keys.groq_api_key.as_ref().map(|key| {
        ChatEngine::Groq(GroqClient::new(key.clone(), env.groq_model.clone()))
    });
    registry = match (eval_primary, eval_secondary) {
        (Some(primary), secondary) => registry.with_evaluator(Evaluator::new(primary, secondary)),
        (None, Some(primary)) => registry.with_evaluator(Evaluator::new(primary, None)),
        (None, None) => registry,
    };

    let credentials = registry.credentials();
    (registry, credentials, elevenlabs)
}

/// Gate cleanup: ask both local engine servers to drop their models so
/// the next holder sees an empty device.
fn gate_cleanup_hook() -> voxdub_gate::CleanupHook {
    let env = env();
    let whisper_unload = format!("{}/v1/models/unload", env.whisper_url);
    let xtts_unload = format!("{}/unload", env.xtts_url);
    let http = reqwest::Client::new();

    Arc::new(move |label: &'static str| {
        let http = http.clone();
        let whisper_unload = whisper_unload.clone();
        let xtts_unload = xtts_unload.clone();
        Box::pin(async move {
            for url in [whisper_unload, xtts_unload] {
                match http
                    .post(&url)
                    .timeout(Duration::from_secs(10))
                    .send()
                    .await
                {
                    Ok(_) => {}
                    Err(err) => {
                        tracing::debug!(label, url = %url, error = %err, "model_unload_skipped");
                    }
                }
            }
        })
    })
}

fn app() -> Router {
    let env = env();
    let (registry, credentials, elevenlabs) = build_registry();

    let upload_dir = PathBuf::from(&env.upload_dir);
    let output_dir = PathBuf::from(&env.output_dir);
    std::fs::create_dir_all(&upload_dir).expect("upload dir");
    std::fs::create_dir_all(&output_dir).expect("output dir");
    std::fs::create_dir_all(&env.work_dir).expect("work dir");

    let cache = env
        .translation_cache_enabled
        .then(|| TranslationCache::new(&env.cache_dir, env.cache_expiration_days));

    let media = Media::new(MediaConfig {
        timeout: Duration::from_secs(env.ffmpeg_timeout_secs),
        ..MediaConfig::default()
    });

    let pipeline = Pipeline::new(
        JobManager::new(),
        registry,
        ResourceGate::with_cleanup(gate_cleanup_hook()),
        media,
        cache,
        PipelineConfig {
            work_dir: PathBuf::from(&env.work_dir),
            output_dir: output_dir.clone(),
            max_workers: env.max_workers,
            ..PipelineConfig::default()
        },
    );

    let state = AppState {
        pipeline,
        env,
        credentials,
        elevenlabs,
        upload_dir,
        output_dir: output_dir.clone(),
    };

    let auth_state = AuthState::new(env.auth_enabled, env.allowed_keys());
    let rate_state = rate_limit::RateLimitState::new(
        env.rate_limit_requests,
        Duration::from_secs(env.rate_limit_window_secs),
    );

    let job_routes = Router::new()
        .route("/api/jobs", post(routes::create_job))
        .route("/api/jobs/{id}", get(routes::get_job))
        .route("/api/jobs/{id}/cancel", post(routes::cancel_job))
        .route("/api/jobs/{id}/download", get(routes::download_output))
        .route_layer(middleware::from_fn_with_state(
            auth_state,
            auth::require_api_key,
        ))
        .route_layer(middleware::from_fn_with_state(
            rate_state,
            rate_limit::rate_limit,
        ));

    let cors = {
        let origins = env.cors_origin_list();
        let layer = CorsLayer::new()
            .allow_methods(cors::Any)
            .allow_headers(cors::Any);
        if origins.is_empty() {
            layer.allow_origin(cors::Any)
        } else {
            let parsed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            layer.allow_origin(parsed)
        }
    };

    Router::new()
        .route("/api/system/status", get(routes::system_status))
        .merge(job_routes)
        .nest_service("/static/outputs", ServeDir::new(&output_dir))
        .layer(DefaultBodyLimit::max(env.max_file_size as usize + 1024 * 1024))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let matched = request
                    .extensions()
                    .get::<MatchedPath>()
                    .map(MatchedPath::as_str)
                    .unwrap_or_else(|| request.uri().path());
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    http.route = %matched,
                )
            }),
        )
        .with_state(state)
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let env = env();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let host: std::net::IpAddr = env
                .host
                .parse()
                .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0]));
            let addr = SocketAddr::from((host, env.port));
            tracing::info!(addr = %addr, "server_listening");

            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .expect("failed to bind listener");
            axum::serve(
                listener,
                app().into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal())
            .await
            .expect("server error");
        });

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("shutdown_signal_received");
}

use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tokio_util::io::ReaderStream;
use voxdub_interface::{
    Credentials, InputKind, JobId, JobSettings, JobView, Language, SttEngineId, SyncMode,
    TranslateEngineId, TtsEngineId,
};
use voxdub_pipeline::Pipeline;
use voxdub_tts::ElevenLabsClient;

use crate::env::Env;
use crate::error::{ApiError, Result};
use crate::upload;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub env: &'static Env,
    pub credentials: Credentials,
    pub elevenlabs: Option<ElevenLabsClient>,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
}

fn parse_job_id(raw: &str) -> Result<JobId> {
    let id = uuid::Uuid::parse_str(raw)
        .map_err(|_| ApiError::BadRequest("invalid job id format".into()))?;
    if id.get_version_num() != 4 {
        return Err(ApiError::BadRequest("invalid job id format".into()));
    }
    Ok(id)
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "true" | "1" | "on" | "yes")
}

#[derive(Default)]
struct JobForm {
    source_lang: Option<String>,
    target_lang: Option<String>,
    clone_voice: Option<bool>,
    verify_translation: Option<bool>,
    sync_mode: Option<String>,
    stt_engine: Option<String>,
    translation_engine: Option<String>,
    tts_engine: Option<String>,
    saved_file: Option<(PathBuf, String, InputKind)>,
}

impl JobForm {
    fn into_settings(self, credentials: &Credentials) -> Result<(JobSettings, PathBuf, String, InputKind)> {
        let source_lang = match self.source_lang.as_deref() {
            None | Some("") => Language::Auto,
            Some(code) => code
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid source language: {code}")))?,
        };
        let target_lang: Language = match self.target_lang.as_deref() {
            None | Some("") => {
                return Err(ApiError::BadRequest("target_lang is required".into()));
            }
            Some(code) => code
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid target language: {code}")))?,
        };
        if target_lang == Language::Auto {
            return Err(ApiError::BadRequest(
                "target language cannot be auto".into(),
            ));
        }

        let sync_mode = match self.sync_mode.as_deref() {
            None | Some("") => SyncMode::default(),
            Some("natural") => SyncMode::Natural,
            Some("speed") => SyncMode::Speed,
            Some("stretch") => SyncMode::Stretch,
            Some(other) => {
                return Err(ApiError::BadRequest(format!("invalid sync_mode: {other}")));
            }
        };

        let stt_engine = parse_stt_engine(&self.stt_engine)?;
        let translation_engine = parse_translate_engine(&self.translation_engine)?;
        let tts_engine = parse_tts_engine(&self.tts_engine)?;
        let verify_translation = self.verify_translation.unwrap_or(false);

        ensure_credentials(
            credentials,
            stt_engine,
            translation_engine,
            tts_engine,
            verify_translation,
        )?;

        let (path, original, kind) = self
            .saved_file
            .ok_or_else(|| ApiError::BadRequest("file field is required".into()))?;

        Ok((
            JobSettings {
                source_lang,
                target_lang,
                clone_voice: self.clone_voice.unwrap_or(false),
                verify_translation,
                sync_mode,
                stt_engine,
                translation_engine,
                tts_engine,
            },
            path,
            original,
            kind,
        ))
    }
}

fn parse_stt_engine(raw: &Option<String>) -> Result<Option<SttEngineId>> {
    match raw.as_deref() {
        None | Some("") | Some("auto") => Ok(None),
        Some("whisper_local") | Some("local") => Ok(Some(SttEngineId::WhisperLocal)),
        Some("groq") => Ok(Some(SttEngineId::Groq)),
        Some("openai") => Ok(Some(SttEngineId::Openai)),
        Some(other) => Err(ApiError::BadRequest(format!("invalid stt_engine: {other}"))),
    }
}

fn parse_translate_engine(raw: &Option<String>) -> Result<Option<TranslateEngineId>> {
    match raw.as_deref() {
        None | Some("") | Some("auto") => Ok(None),
        Some("gemini") => Ok(Some(TranslateEngineId::Gemini)),
        Some("groq") => Ok(Some(TranslateEngineId::Groq)),
        Some("ollama") | Some("local") => Ok(Some(TranslateEngineId::Ollama)),
        Some(other) => Err(ApiError::BadRequest(format!(
            "invalid translation_engine: {other}"
        ))),
    }
}

fn parse_tts_engine(raw: &Option<String>) -> Result<Option<TtsEngineId>> {
    match raw.as_deref() {
        None | Some("") | Some("auto") => Ok(None),
        Some("xtts_local") | Some("xtts") => Ok(Some(TtsEngineId::XttsLocal)),
        Some("elevenlabs") => Ok(Some(TtsEngineId::Elevenlabs)),
        Some("edge") => Ok(Some(TtsEngineId::Edge)),
        Some(other) => Err(ApiError::BadRequest(format!("invalid tts_engine: {other}"))),
    }
}

/// An explicitly selected engine whose credential is absent is a client
/// error, surfaced before any work starts.
fn ensure_credentials(
    credentials: &Credentials,
    stt: Option<SttEngineId>,
    translate: Option<TranslateEngineId>,
    tts: Option<TtsEngineId>,
    verify: bool,
) -> Result<()> {
    let mut missing: Vec<&str> = Vec::new();
    match stt {
        Some(SttEngineId::Groq) if !credentials.groq => missing.push("GROQ_API_KEY"),
        Some(SttEngineId::Openai) if !credentials.openai => missing.push("OPENAI_API_KEY"),
        _ => {}
    }
    match translate {
        Some(TranslateEngineId::Gemini) if !credentials.gemini => missing.push("GEMINI_API_KEY"),
        Some(TranslateEngineId::Groq) if !credentials.groq => missing.push("GROQ_API_KEY"),
        _ => {}
    }
    if let Some(TtsEngineId::Elevenlabs) = tts {
        if !credentials.elevenlabs {
            missing.push("ELEVENLABS_API_KEY");
        }
    }
    if verify && !credentials.gemini && !credentials.groq {
        missing.push("GEMINI_API_KEY or GROQ_API_KEY (translation verification)");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        missing.sort_unstable();
        missing.dedup();
        Err(ApiError::BadRequest(format!(
            "missing credentials for the selected engines: {}",
            missing.join(", ")
        )))
    }
}

pub async fn create_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<JobView>> {
    let mut form = JobForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let original = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("file field has no filename".into()))?;
                let kind = upload::classify_extension(&original).ok_or_else(|| {
                    ApiError::BadRequest(format!(
                        "invalid file type; allowed: {} / {}",
                        upload::VIDEO_EXTENSIONS.join(", "),
                        upload::AUDIO_EXTENSIONS.join(", ")
                    ))
                })?;
                let safe_name = upload::sanitize_filename(&original)?;
                let path = upload::save_upload(
                    &mut field,
                    &state.upload_dir,
                    &safe_name,
                    state.env.max_file_size,
                )
                .await?;
                form.saved_file = Some((path, original, kind));
            }
            "source_lang" => form.source_lang = Some(text_field(field).await?),
            "target_lang" => form.target_lang = Some(text_field(field).await?),
            "clone_voice" => form.clone_voice = Some(parse_bool(&text_field(field).await?)),
            "verify_translation" => {
                form.verify_translation = Some(parse_bool(&text_field(field).await?))
            }
            "sync_mode" => form.sync_mode = Some(text_field(field).await?),
            "stt_engine" => form.stt_engine = Some(text_field(field).await?),
            "translation_engine" => form.translation_engine = Some(text_field(field).await?),
            "tts_engine" => form.tts_engine = Some(text_field(field).await?),
            _ => {}
        }
    }

    let saved_path = form.saved_file.as_ref().map(|(p, _, _)| p.clone());
    let parsed = form.into_settings(&state.credentials);
    let (settings, path, original, kind) = match parsed {
        Ok(parts) => parts,
        Err(err) => {
            // Settings rejected after the upload landed: remove the file.
            if let Some(path) = saved_path {
                let _ = tokio::fs::remove_file(path).await;
            }
            return Err(err);
        }
    };

    let manager = state.pipeline.manager();
    let id = manager.create(settings, path, Some(original), kind);
    state.pipeline.submit(id);
    tracing::info!(job = %id, "job_created");

    let view = manager
        .get(&id)
        .ok_or_else(|| ApiError::Internal("job vanished after create".into()))?;
    Ok(Json(view))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed field: {e}")))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>> {
    let id = parse_job_id(&id)?;
    state
        .pipeline
        .manager()
        .get(&id)
        .map(Json)
        .ok_or(ApiError::NotFound("job not found"))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let id = parse_job_id(&id)?;
    let manager = state.pipeline.manager();

    if manager.cancel(&id) {
        return Ok(Json(json!({ "message": "cancellation requested", "job_id": id })));
    }
    match manager.get(&id) {
        Some(view) => Err(ApiError::Conflict(format!(
            "cannot cancel a job with status {:?}",
            view.status
        ))),
        None => Err(ApiError::NotFound("job not found")),
    }
}

pub async fn download_output(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_job_id(&id)?;
    let manager = state.pipeline.manager();
    let view = manager.get(&id).ok_or(ApiError::NotFound("job not found"))?;
    let output = view
        .output_file
        .ok_or(ApiError::NotFound("no output available for this job"))?;

    let path = PathBuf::from(&output)
        .canonicalize()
        .map_err(|_| ApiError::NotFound("output file missing on disk"))?;
    let canonical_out = state
        .output_dir
        .canonicalize()
        .map_err(|e| ApiError::Internal(format!("output dir unavailable: {e}")))?;
    if !path.starts_with(&canonical_out) {
        return Err(ApiError::NotFound("output file missing on disk"));
    }

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::NotFound("output file missing on disk"))?;
    let stream = ReaderStream::new(file);

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    let short_id = id.simple().to_string()[..8].to_string();
    let disposition = format!("attachment; filename=\"voxdub_{short_id}.{extension}\"");

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

pub async fn system_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let manager = state.pipeline.manager();
    let configured = |present: bool| if present { "configured" } else { "missing" };

    let elevenlabs_usage = match &state.elevenlabs {
        Some(client) => client
            .usage()
            .await
            .and_then(|u| serde_json::to_value(u).ok()),
        None => None,
    };

    Json(json!({
        "status": "online",
        "device": state.env.device.as_deref().unwrap_or("cpu"),
        "active_jobs": manager.active_count(),
        "total_jobs": manager.job_count(),
        "api_status": {
            "groq": configured(state.credentials.groq),
            "gemini": configured(state.credentials.gemini),
            "openai": configured(state.credentials.openai),
            "elevenlabs": configured(state.credentials.elevenlabs),
            "elevenlabs_usage": elevenlabs_usage,
        },
        "engines": {
            "whisper_local": state.env.whisper_url,
            "xtts_local": state.env.xtts_url,
            "edge": state.env.edge_url,
            "ollama": state.env.ollama_url,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_must_be_uuid_v4() {
        assert!(parse_job_id("not-a-uuid").is_err());
        // v1-shaped UUID is rejected even though it parses.
        assert!(parse_job_id("c232ab00-9414-11ec-b3c8-9f68deced846").is_err());
        let v4 = uuid::Uuid::new_v4().to_string();
        assert!(parse_job_id(&v4).is_ok());
    }

    #[test]
    fn credential_preflight_names_missing_keys() {
        let creds = Credentials::default();
        let err = ensure_credentials(
            &creds,
            None,
            Some(TranslateEngineId::Gemini),
            None,
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        assert!(ensure_credentials(&creds, None, Some(TranslateEngineId::Ollama), None, false).is_ok());
    }

    #[test]
    fn verify_requires_an_evaluator_credential() {
        let creds = Credentials::default();
        assert!(ensure_credentials(&creds, None, None, None, true).is_err());
        let with_gemini = Credentials { gemini: true, ..creds };
        assert!(ensure_credentials(&with_gemini, None, None, None, true).is_ok());
    }
}

use std::sync::OnceLock;

use serde::Deserialize;

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_upload_dir() -> String {
    "data/uploads".into()
}
fn default_output_dir() -> String {
    "data/outputs".into()
}
fn default_work_dir() -> String {
    "data/work".into()
}
fn default_cache_dir() -> String {
    "data/cache/translations".into()
}
fn default_true() -> bool {
    true
}
fn default_max_file_size() -> u64 {
    2 * 1024 * 1024 * 1024
}
fn default_rate_limit() -> u32 {
    10
}
fn default_rate_window_secs() -> u64 {
    60
}
fn default_max_workers() -> usize {
    3
}
fn default_cache_days() -> i64 {
    30
}
fn default_whisper_url() -> String {
    "http://127.0.0.1:9000".into()
}
fn default_whisper_model() -> String {
    "large-v3".into()
}
fn default_xtts_url() -> String {
    "http://127.0.0.1:8020".into()
}
fn default_edge_url() -> String {
    "http://127.0.0.1:5500".into()
}
fn default_ollama_url() -> String {
    "http://127.0.0.1:11434".into()
}
fn default_ollama_model() -> String {
    "qwen3:14b".into()
}
fn default_groq_model() -> String {
    "llama-3.3-70b-versatile".into()
}
fn default_gemini_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_elevenlabs_model() -> String {
    "eleven_multilingual_v2".into()
}
fn default_ffmpeg_timeout() -> u64 {
    600
}

/// Service configuration, `VOXDUB_`-prefixed in the environment.
#[derive(Debug, Deserialize)]
pub struct Env {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub auth_enabled: bool,
    /// Comma-separated allowed API keys.
    #[serde(default)]
    pub api_keys: String,
    /// Comma-separated CORS origins; empty means same-host tooling only.
    #[serde(default)]
    pub cors_origins: String,

    #[serde(default = "default_rate_limit")]
    pub rate_limit_requests: u32,
    #[serde(default = "default_rate_window_secs")]
    pub rate_limit_window_secs: u64,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_ffmpeg_timeout")]
    pub ffmpeg_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub translation_cache_enabled: bool,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_cache_days")]
    pub cache_expiration_days: i64,

    #[serde(default = "default_whisper_url")]
    pub whisper_url: String,
    #[serde(default = "default_whisper_model")]
    pub whisper_model: String,
    #[serde(default = "default_xtts_url")]
    pub xtts_url: String,
    #[serde(default = "default_edge_url")]
    pub edge_url: String,
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    #[serde(default = "default_groq_model")]
    pub groq_model: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_elevenlabs_model")]
    pub elevenlabs_model: String,

    /// Device label surfaced by the status endpoint.
    #[serde(default)]
    pub device: Option<String>,
}

impl Env {
    pub fn allowed_keys(&self) -> Vec<String> {
        self.api_keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Provider credentials, read unprefixed. Values stay inside this struct;
/// everything else observes presence only.
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub elevenlabs_api_key: Option<String>,
}

static ENV: OnceLock<Env> = OnceLock::new();
static KEYS: OnceLock<ApiKeys> = OnceLock::new();

pub fn env() -> &'static Env {
    ENV.get_or_init(|| {
        let _ = dotenvy::dotenv();
        envy::prefixed("VOXDUB_")
            .from_env()
            .expect("failed to load environment")
    })
}

pub fn api_keys() -> &'static ApiKeys {
    KEYS.get_or_init(|| {
        let _ = dotenvy::dotenv();
        envy::from_env().unwrap_or_default()
    })
}

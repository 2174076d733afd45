use serde::{Deserialize, Serialize};

use crate::job::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    /// GPU-resident model behind a localhost service; requires the
    /// resource gate.
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SttEngineId {
    WhisperLocal,
    Groq,
    Openai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslateEngineId {
    Gemini,
    Groq,
    Ollama,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsEngineId {
    XttsLocal,
    Elevenlabs,
    Edge,
}

/// Static description of one concrete engine for one pipeline stage.
/// Immutable after construction; the dispatcher hands ordered lists of
/// these back, it never performs the calls itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSpec<I> {
    pub stage: Stage,
    pub id: I,
    pub locality: Locality,
    pub requires_credential: bool,
    /// TTS only: the engine can mimic the source speaker from reference
    /// audio.
    pub supports_clone: bool,
}

impl SttEngineId {
    pub fn spec(self) -> EngineSpec<SttEngineId> {
        let (locality, requires_credential) = match self {
            SttEngineId::WhisperLocal => (Locality::Local, false),
            SttEngineId::Groq | SttEngineId::Openai => (Locality::Remote, true),
        };
        EngineSpec {
            stage: Stage::Transcribe,
            id: self,
            locality,
            requires_credential,
            supports_clone: false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SttEngineId::WhisperLocal => "whisper_local",
            SttEngineId::Groq => "groq",
            SttEngineId::Openai => "openai",
        }
    }
}

impl TranslateEngineId {
    pub fn spec(self) -> EngineSpec<TranslateEngineId> {
        let (locality, requires_credential) = match self {
            TranslateEngineId::Ollama => (Locality::Local, false),
            TranslateEngineId::Gemini | TranslateEngineId::Groq => (Locality::Remote, true),
        };
        EngineSpec {
            stage: Stage::Translate,
            id: self,
            locality,
            requires_credential,
            supports_clone: false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TranslateEngineId::Gemini => "gemini",
            TranslateEngineId::Groq => "groq",
            TranslateEngineId::Ollama => "ollama",
        }
    }
}

impl TtsEngineId {
    pub fn spec(self) -> EngineSpec<TtsEngineId> {
        let (locality, requires_credential, supports_clone) = match self {
            TtsEngineId::XttsLocal => (Locality::Local, false, true),
            TtsEngineId::Elevenlabs => (Locality::Remote, true, true),
            TtsEngineId::Edge => (Locality::Remote, false, false),
        };
        EngineSpec {
            stage: Stage::Synthesize,
            id: self,
            locality,
            requires_credential,
            supports_clone,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TtsEngineId::XttsLocal => "xtts_local",
            TtsEngineId::Elevenlabs => "elevenlabs",
            TtsEngineId::Edge => "edge",
        }
    }
}

/// Which provider credentials the process holds. Presence only; values
/// never travel through this type.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub groq: bool,
    pub gemini: bool,
    pub openai: bool,
    pub elevenlabs: bool,
}

impl Credentials {
    pub fn has_stt(&self, id: SttEngineId) -> bool {
        match id {
            SttEngineId::WhisperLocal => true,
            SttEngineId::Groq => self.groq,
            SttEngineId::Openai => self.openai,
        }
    }

    pub fn has_translate(&self, id: TranslateEngineId) -> bool {
        match id {
            TranslateEngineId::Ollama => true,
            TranslateEngineId::Gemini => self.gemini,
            TranslateEngineId::Groq => self.groq,
        }
    }

    pub fn has_tts(&self, id: TtsEngineId) -> bool {
        match id {
            TtsEngineId::XttsLocal | TtsEngineId::Edge => true,
            TtsEngineId::Elevenlabs => self.elevenlabs,
        }
    }
}

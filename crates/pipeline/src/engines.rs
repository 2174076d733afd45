use std::collections::HashMap;

use voxdub_interface::{Credentials, SttEngineId, TranslateEngineId, TtsEngineId};
use voxdub_llm::ChatEngine;
use voxdub_quality::Evaluator;
use voxdub_stt::SttClient;
use voxdub_tts::TtsClient;

/// The concrete engine adapters this process was configured with. The
/// dispatcher decides order; the registry answers "is it configured" and
/// hands the adapter out. Tests register adapters aimed at local mock
/// servers.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    stt: HashMap<SttEngineId, SttClient>,
    translate: HashMap<TranslateEngineId, ChatEngine>,
    tts: HashMap<TtsEngineId, TtsClient>,
    evaluator: Option<Evaluator>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stt(mut self, id: SttEngineId, client: SttClient) -> Self {
        self.stt.insert(id, client);
        self
    }

    pub fn with_translate(mut self, id: TranslateEngineId, engine: ChatEngine) -> Self {
        self.translate.insert(id, engine);
        self
    }

    pub fn with_tts(mut self, id: TtsEngineId, client: TtsClient) -> Self {
        self.tts.insert(id, client);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn stt(&self, id: SttEngineId) -> Option<&SttClient> {
        self.stt.get(&id)
    }

    pub fn translate(&self, id: TranslateEngineId) -> Option<&ChatEngine> {
        self.translate.get(&id)
    }

    pub fn tts(&self, id: TtsEngineId) -> Option<&TtsClient> {
        self.tts.get(&id)
    }

    pub fn evaluator(&self) -> Option<&Evaluator> {
        self.evaluator.as_ref()
    }

    /// Credential presence as the dispatcher sees it: an engine that made
    /// it into the registry has whatever credential it needs.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            groq: self.stt.contains_key(&SttEngineId::Groq)
                || self.translate.contains_key(&TranslateEngineId::Groq),
            gemini: self.translate.contains_key(&TranslateEngineId::Gemini),
            openai: self.stt.contains_key(&SttEngineId::Openai),
            elevenlabs: self.tts.contains_key(&TtsEngineId::Elevenlabs),
        }
    }
}

use voxdub_interface::{
    Credentials, EngineSpec, JobSettings, Language, SttEngineId, TranslateEngineId, TtsEngineId,
};

/// Resolves which concrete engines serve each stage of a job, in fallback
/// order. Pure selection logic: the orchestrator walks the returned
/// chains and performs the calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher;

impl Dispatcher {
    /// Transcription chain. An explicit engine choice pins the head; auto
    /// mode prefers the remote fast path for English/Russian when its
    /// credential is present and the local large model for CJK sources
    /// and auto-detection. Every configured provider trails as fallback.
    pub fn resolve_stt(
        &self,
        settings: &JobSettings,
        credentials: &Credentials,
    ) -> Vec<EngineSpec<SttEngineId>> {
        let mut chain: Vec<SttEngineId> = Vec::new();

        if let Some(pinned) = settings.stt_engine {
            push_unique(&mut chain, pinned);
        } else {
            match settings.source_lang {
                Language::En | Language::Ru if credentials.groq => {
                    push_unique(&mut chain, SttEngineId::Groq);
                }
                Language::Ko | Language::Ja | Language::Zh | Language::Auto => {
                    push_unique(&mut chain, SttEngineId::WhisperLocal);
                }
                _ => {}
            }
        }

        for candidate in [
            SttEngineId::WhisperLocal,
            SttEngineId::Groq,
            SttEngineId::Openai,
        ] {
            push_unique(&mut chain, candidate);
        }

        chain
            .into_iter()
            .filter(|id| credentials.has_stt(*id))
            .map(SttEngineId::spec)
            .collect()
    }

    /// Translation chain: primary remote, secondary remote, local last.
    pub fn resolve_translate(
        &self,
        settings: &JobSettings,
        credentials: &Credentials,
    ) -> Vec<EngineSpec<TranslateEngineId>> {
        let mut chain: Vec<TranslateEngineId> = Vec::new();

        if let Some(pinned) = settings.translation_engine {
            push_unique(&mut chain, pinned);
        }
        for candidate in [
            TranslateEngineId::Gemini,
            TranslateEngineId::Groq,
            TranslateEngineId::Ollama,
        ] {
            push_unique(&mut chain, candidate);
        }

        chain
            .into_iter()
            .filter(|id| credentials.has_translate(*id))
            .map(TranslateEngineId::spec)
            .collect()
    }

    /// Synthesis chain. With cloning on, cloning-capable engines lead;
    /// with cloning off, a keyed top-tier remote wins, otherwise the
    /// per-language table decides. Edge terminates every chain since it
    /// needs no credential.
    pub fn resolve_tts(
        &self,
        settings: &JobSettings,
        credentials: &Credentials,
    ) -> Vec<EngineSpec<TtsEngineId>> {
        let mut chain: Vec<TtsEngineId> = Vec::new();

        if let Some(pinned) = settings.tts_engine {
            push_unique(&mut chain, pinned);
        } else if settings.clone_voice {
            if credentials.elevenlabs {
                push_unique(&mut chain, TtsEngineId::Elevenlabs);
            }
            push_unique(&mut chain, TtsEngineId::XttsLocal);
        } else {
            if credentials.elevenlabs {
                push_unique(&mut chain, TtsEngineId::Elevenlabs);
            }
            push_unique(&mut chain, preferred_neutral_tts(settings.target_lang));
        }

        push_unique(&mut chain, TtsEngineId::Edge);

        chain
            .into_iter()
            .filter(|id| credentials.has_tts(*id))
            .map(TtsEngineId::spec)
            .collect()
    }
}

/// Static per-language preference when no cloning is requested: languages
/// with strong neural voices go remote, the rest use the local cloner as
/// a plain synthesizer.
fn preferred_neutral_tts(target: Language) -> TtsEngineId {
    match target {
        Language::Ko | Language::Ru => TtsEngineId::Edge,
        Language::En | Language::Ja => TtsEngineId::XttsLocal,
        _ => TtsEngineId::Edge,
    }
}

fn push_unique<T: PartialEq + Copy>(chain: &mut Vec<T>, id: T) {
    if !chain.contains(&id) {
        chain.push(id);
    }
}

use serde::{Deserialize, Serialize};

/// Languages accepted by the API. `Auto` is only meaningful as a source
/// language (detection is delegated to the transcription engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Auto,
    En,
    Ko,
    Ja,
    Zh,
    Ru,
    Es,
    Fr,
    De,
    It,
    Pt,
    Nl,
    Pl,
    Tr,
    Vi,
    Th,
    Ar,
    Hi,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Auto => "auto",
            Language::En => "en",
            Language::Ko => "ko",
            Language::Ja => "ja",
            Language::Zh => "zh",
            Language::Ru => "ru",
            Language::Es => "es",
            Language::Fr => "fr",
            Language::De => "de",
            Language::It => "it",
            Language::Pt => "pt",
            Language::Nl => "nl",
            Language::Pl => "pl",
            Language::Tr => "tr",
            Language::Vi => "vi",
            Language::Th => "th",
            Language::Ar => "ar",
            Language::Hi => "hi",
        }
    }

    /// Full name used when building prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Auto => "detected language",
            Language::En => "English",
            Language::Ko => "Korean",
            Language::Ja => "Japanese",
            Language::Zh => "Chinese",
            Language::Ru => "Russian",
            Language::Es => "Spanish",
            Language::Fr => "French",
            Language::De => "German",
            Language::It => "Italian",
            Language::Pt => "Portuguese",
            Language::Nl => "Dutch",
            Language::Pl => "Polish",
            Language::Tr => "Turkish",
            Language::Vi => "Vietnamese",
            Language::Th => "Thai",
            Language::Ar => "Arabic",
            Language::Hi => "Hindi",
        }
    }

    /// Whether the language is written in a non-Latin script. Drives the
    /// foreign-term extraction rules in quality checking.
    pub fn is_non_latin(&self) -> bool {
        matches!(
            self,
            Language::Ko
                | Language::Ja
                | Language::Zh
                | Language::Ru
                | Language::Th
                | Language::Ar
                | Language::Hi
        )
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
            .map_err(|_| format!("unsupported language code: {s}"))
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_codes() {
        assert_eq!("ko".parse::<Language>().unwrap(), Language::Ko);
        assert_eq!("EN".parse::<Language>().unwrap(), Language::En);
        assert!("xx".parse::<Language>().is_err());
    }

    #[test]
    fn script_classification() {
        assert!(Language::Ko.is_non_latin());
        assert!(!Language::De.is_non_latin());
    }
}

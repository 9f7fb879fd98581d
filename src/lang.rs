/// Language used when the request does not name one.
pub const DEFAULT_LANG: &str = "tr";

/// Languages with a dedicated answer-language instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Turkish,
    English,
    German,
    French,
    Arabic,
}

impl Lang {
    /// Codes are matched exactly; anything unrecognized falls back to English.
    pub fn from_code(code: &str) -> Self {
        match code {
            "tr" => Lang::Turkish,
            "en" => Lang::English,
            "de" => Lang::German,
            "fr" => Lang::French,
            "ar" => Lang::Arabic,
            _ => Lang::English,
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Lang::Turkish => "Lütfen yalnızca Türkçe yanıt ver.",
            Lang::English => "Please respond in English only.",
            Lang::German => "Antworten Sie ausschließlich auf Deutsch.",
            Lang::French => "Répondez uniquement en français.",
            Lang::Arabic => "يرجى الإجابة باللغة العربية فقط.",
        }
    }

    /// Prefixes the prompt with the instruction, separated by a blank line.
    pub fn localize(self, prompt: &str) -> String {
        format!("{}\n\n{}", self.instruction(), prompt)
    }
}

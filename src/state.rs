use serde::Serialize;

use crate::config::Config;
use crate::providers::{ProviderKind, ProviderRegistry};

/// Shared by every request; nothing in here changes after startup.
pub struct AppState {
    pub config: Config,
    pub providers: ProviderRegistry,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ProviderStatus {
    pub configured: bool,
    pub model: String,
    #[serde(rename = "apiVersion", skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// Body of the `GET` status response.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub ok: bool,
    /// Default provider name, or `"none"`.
    pub provider: &'static str,
    pub openai: ProviderStatus,
    pub gemini: ProviderStatus,
}

impl AppState {
    pub fn new(config: Config, providers: ProviderRegistry) -> Self {
        Self { config, providers }
    }

    pub fn status(&self) -> StatusReport {
        let model_of = |kind: ProviderKind, fallback: &str| {
            self.providers
                .get(kind)
                .map(|p| p.model().to_string())
                .unwrap_or_else(|| fallback.to_string())
        };
        StatusReport {
            ok: true,
            provider: self
                .providers
                .default_kind()
                .map(ProviderKind::as_str)
                .unwrap_or("none"),
            openai: ProviderStatus {
                configured: self.providers.get(ProviderKind::OpenAi).is_some(),
                model: model_of(ProviderKind::OpenAi, &self.config.openai.model),
                api_version: None,
            },
            gemini: ProviderStatus {
                configured: self.providers.get(ProviderKind::Gemini).is_some(),
                model: model_of(ProviderKind::Gemini, &self.config.gemini.model),
                api_version: Some(self.config.gemini.api_version.clone()),
            },
        }
    }
}

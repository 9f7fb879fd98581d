pub mod gemini;
pub mod openai;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::error::{RelayError, UpstreamError};

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Temperature sent upstream when the caller does not pick one.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn alternate(self) -> Self {
        match self {
            ProviderKind::OpenAi => ProviderKind::Gemini,
            ProviderKind::Gemini => ProviderKind::OpenAi,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    pub temperature: Option<f64>,
    /// Overrides the provider's configured model.
    pub model: Option<String>,
}

/// One upstream chat-completion service.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Model name reported by the status endpoint.
    fn model(&self) -> &str;

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, UpstreamError>;
}

/// How the provider for a request was chosen. Only automatic choices may fall back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Explicit(ProviderKind),
    Auto(ProviderKind),
}

impl Selection {
    pub fn kind(self) -> ProviderKind {
        match self {
            Selection::Explicit(kind) | Selection::Auto(kind) => kind,
        }
    }
}

/// The configured providers. Built once at startup, read-only afterwards.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    openai: Option<Arc<dyn Provider>>,
    gemini: Option<Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new(openai: Option<Arc<dyn Provider>>, gemini: Option<Arc<dyn Provider>>) -> Self {
        Self { openai, gemini }
    }

    /// Registers a provider for every key present in the config.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        let openai = config.openai.api_key.as_ref().map(|key| {
            Arc::new(OpenAiProvider::new(client.clone(), &config.openai, key.clone()))
                as Arc<dyn Provider>
        });
        let gemini = config.gemini.api_key.as_ref().map(|key| {
            Arc::new(GeminiProvider::new(client.clone(), &config.gemini, key.clone()))
                as Arc<dyn Provider>
        });
        Self::new(openai, gemini)
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&Arc<dyn Provider>> {
        match kind {
            ProviderKind::OpenAi => self.openai.as_ref(),
            ProviderKind::Gemini => self.gemini.as_ref(),
        }
    }

    /// OpenAI wins over Gemini when both are configured.
    pub fn default_kind(&self) -> Option<ProviderKind> {
        [ProviderKind::OpenAi, ProviderKind::Gemini]
            .into_iter()
            .find(|kind| self.get(*kind).is_some())
    }

    pub fn alternate(&self, kind: ProviderKind) -> Option<&Arc<dyn Provider>> {
        self.get(kind.alternate())
    }

    /// Resolves the optional `provider` request field.
    pub fn select(&self, requested: Option<&str>) -> Result<Selection, RelayError> {
        let requested = requested.map(str::trim).filter(|name| !name.is_empty());
        match requested {
            None => self
                .default_kind()
                .map(Selection::Auto)
                .ok_or(RelayError::NoProviderConfigured { requested: None }),
            Some("none") => Err(RelayError::NoProviderConfigured { requested: None }),
            Some(name) => {
                let kind = match name {
                    "openai" => ProviderKind::OpenAi,
                    "gemini" => ProviderKind::Gemini,
                    other => return Err(RelayError::UnknownProvider(other.to_string())),
                };
                if self.get(kind).is_some() {
                    Ok(Selection::Explicit(kind))
                } else {
                    Err(RelayError::NoProviderConfigured {
                        requested: Some(kind),
                    })
                }
            }
        }
    }
}

/// Shared HTTP client for all upstream calls.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(2)
        .build()
}


#[cfg(test)]
mod tests {
    use super::*;

    struct Named(ProviderKind);

    #[async_trait]
    impl Provider for Named {
        fn kind(&self) -> ProviderKind {
            self.0
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn complete(
            &self,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<String, UpstreamError> {
            Ok(String::new())
        }
    }

    fn registry(openai: bool, gemini: bool) -> ProviderRegistry {
        ProviderRegistry::new(
            openai.then(|| Arc::new(Named(ProviderKind::OpenAi)) as Arc<dyn Provider>),
            gemini.then(|| Arc::new(Named(ProviderKind::Gemini)) as Arc<dyn Provider>),
        )
    }

    #[test]
    fn test_default_prefers_openai() {
        assert_eq!(
            registry(true, true).select(None).unwrap(),
            Selection::Auto(ProviderKind::OpenAi)
        );
        assert_eq!(
            registry(false, true).select(None).unwrap(),
            Selection::Auto(ProviderKind::Gemini)
        );
        assert_eq!(
            registry(true, false).select(Some("  ")).unwrap(),
            Selection::Auto(ProviderKind::OpenAi)
        );
    }

    #[test]
    fn test_nothing_configured() {
        assert!(matches!(
            registry(false, false).select(None),
            Err(RelayError::NoProviderConfigured { requested: None })
        ));
        assert!(matches!(
            registry(true, true).select(Some("none")),
            Err(RelayError::NoProviderConfigured { .. })
        ));
    }

    #[test]
    fn test_explicit_provider() {
        assert_eq!(
            registry(true, true).select(Some("gemini")).unwrap(),
            Selection::Explicit(ProviderKind::Gemini)
        );
        assert!(matches!(
            registry(true, false).select(Some("gemini")),
            Err(RelayError::NoProviderConfigured {
                requested: Some(ProviderKind::Gemini)
            })
        ));
        assert!(matches!(
            registry(true, true).select(Some("OpenAI")),
            Err(RelayError::UnknownProvider(name)) if name == "OpenAI"
        ));
    }

    #[test]
    fn test_alternate() {
        let both = registry(true, true);
        assert_eq!(
            both.alternate(ProviderKind::OpenAi).map(|p| p.kind()),
            Some(ProviderKind::Gemini)
        );
        assert!(registry(true, false).alternate(ProviderKind::OpenAi).is_none());
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ProviderKind::OpenAi).unwrap(),
            serde_json::json!("openai")
        );
        assert_eq!(ProviderKind::Gemini.to_string(), "gemini");
    }
}

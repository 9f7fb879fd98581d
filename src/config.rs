use std::time::Duration;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_GEMINI_API_VERSION: &str = "v1beta";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL_PREFERENCE: &[&str] =
    &["gemini-1.5-flash", "gemini-1.5-pro", "gemini-pro"];

/// `GEMINI_MODEL` value that asks the relay to pick a model from the list endpoint.
pub const GEMINI_AUTO_MODEL: &str = "auto";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a positive number of seconds, got {value:?}")]
    InvalidTimeout { name: &'static str, value: String },
    #[error("{name} must be a port number, got {value:?}")]
    InvalidPort { name: &'static str, value: String },
    #[error("LOG_FORMAT must be `pretty` or `json`, got {0:?}")]
    InvalidLogFormat(String),
}

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    /// Either a concrete model name or [`GEMINI_AUTO_MODEL`].
    pub model: String,
    pub api_version: String,
    pub base_url: String,
    pub model_preference: Vec<String>,
}

impl GeminiConfig {
    pub fn auto_model(&self) -> bool {
        self.model.eq_ignore_ascii_case(GEMINI_AUTO_MODEL)
    }
}

/// Process-wide settings, read once at startup and never mutated.
#[derive(Clone)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub gemini: GeminiConfig,
    pub upstream_timeout: Duration,
    pub port: u16,
    pub log_format: LogFormat,
}

// Keys are deliberately left out of the Debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("openai_configured", &self.openai.api_key.is_some())
            .field("openai_model", &self.openai.model)
            .field("gemini_configured", &self.gemini.api_key.is_some())
            .field("gemini_model", &self.gemini.model)
            .field("gemini_api_version", &self.gemini.api_version)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let upstream_timeout = match var("UPSTREAM_TIMEOUT_SECS") {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidTimeout {
                        name: "UPSTREAM_TIMEOUT_SECS",
                        value,
                    });
                }
            },
            None => Duration::from_secs(30),
        };

        let port = match var("PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort { name: "PORT", value })?,
            None => 8080,
        };

        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        };

        let model_preference = var("GEMINI_MODEL_PREFERENCE")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| {
                DEFAULT_GEMINI_MODEL_PREFERENCE
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });

        Ok(Self {
            openai: OpenAiConfig {
                api_key: var("OPENAI_API_KEY"),
                model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                base_url: var("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            },
            gemini: GeminiConfig {
                api_key: var("GEMINI_API_KEY"),
                model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                api_version: var("GEMINI_API_VERSION")
                    .unwrap_or_else(|| DEFAULT_GEMINI_API_VERSION.to_string()),
                base_url: var("GEMINI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
                model_preference,
            },
            upstream_timeout,
            port,
            log_format,
        })
    }
}

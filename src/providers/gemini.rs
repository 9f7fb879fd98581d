use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{CompletionOptions, Provider, ProviderKind};
use crate::config::GeminiConfig;
use crate::error::UpstreamError;

const GENERATE_CONTENT: &str = "generateContent";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
}

// Upstream may send `null` for any level; every one of them degrades to empty text.
#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Option<Candidate>>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<Option<CandidatePart>>>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Joins every text part of the first candidate.
    fn into_text(self) -> String {
        self.candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .flatten()
            .and_then(|c| c.content)
            .and_then(|content| content.parts)
            .map(|parts| {
                parts
                    .into_iter()
                    .filter_map(|p| p.and_then(|p| p.text))
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct ListModelsResponse {
    models: Option<Vec<ModelEntry>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
    name: String,
    supported_generation_methods: Option<Vec<String>>,
}

impl ModelEntry {
    fn short_name(&self) -> &str {
        self.name.strip_prefix("models/").unwrap_or(&self.name)
    }

    fn can_generate(&self) -> bool {
        match self.supported_generation_methods.as_deref() {
            None | Some([]) => true,
            Some(methods) => methods.iter().any(|m| m == GENERATE_CONTENT),
        }
    }
}

/// First usable model matching the earliest preference entry, else the first usable model.
fn pick_model(models: &[ModelEntry], preference: &[String]) -> Option<String> {
    let usable: Vec<&ModelEntry> = models.iter().filter(|m| m.can_generate()).collect();
    preference
        .iter()
        .find_map(|wanted| usable.iter().find(|m| m.short_name().contains(wanted.as_str())))
        .or_else(|| usable.first())
        .map(|m| m.short_name().to_string())
}

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    auto_model: bool,
    model_preference: Vec<String>,
    endpoint: String,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, config: &GeminiConfig, api_key: String) -> Self {
        Self {
            client,
            api_key,
            model: config.model.clone(),
            auto_model: config.auto_model(),
            model_preference: config.model_preference.clone(),
            endpoint: format!(
                "{}/{}",
                config.base_url.trim_end_matches('/'),
                config.api_version.trim_matches('/')
            ),
        }
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, UpstreamError> {
        let kind = self.kind();
        let response = request
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(kind, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::from_reqwest(kind, &e))?;

        if !status.is_success() {
            return Err(UpstreamError::from_status(kind, status, &body));
        }

        serde_json::from_str(&body).map_err(|e| UpstreamError::decode(kind, &e, &body))
    }

    /// `{endpoint}/models/{model}:generateContent`, with the model encoded as one path segment.
    fn model_url(&self, model: &str) -> Result<reqwest::Url, UpstreamError> {
        let invalid = |message: String| UpstreamError::Transport {
            provider: self.kind(),
            message,
        };
        let mut url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| invalid(format!("invalid endpoint {}: {e}", self.endpoint)))?;
        url.path_segments_mut()
            .map_err(|_| invalid(format!("endpoint {} cannot take a path", self.endpoint)))?
            .pop_if_empty()
            .push("models")
            .push(&format!("{model}:{GENERATE_CONTENT}"));
        Ok(url)
    }

    /// Queries the list endpoint and picks a model by preference.
    pub async fn resolve_model(&self) -> Result<String, UpstreamError> {
        let url = format!("{}/models", self.endpoint);
        let listing: ListModelsResponse = self.send_json(self.client.get(&url)).await?;
        let models = listing.models.unwrap_or_default();
        let model = pick_model(&models, &self.model_preference).ok_or_else(|| {
            UpstreamError::Decode {
                provider: self.kind(),
                message: format!("no listed model supports {GENERATE_CONTENT}"),
                body: String::new(),
            }
        })?;
        info!(model = %model, "resolved gemini model from list endpoint");
        Ok(model)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, UpstreamError> {
        let model = match &options.model {
            Some(model) => model.clone(),
            None if self.auto_model => self.resolve_model().await?,
            None => self.model.clone(),
        };
        let model = model.strip_prefix("models/").unwrap_or(&model);

        let url = self.model_url(model)?;
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: options
                .temperature
                .map(|temperature| GenerationConfig { temperature }),
        };
        debug!(model, "calling gemini generateContent");

        let response: GenerateContentResponse =
            self.send_json(self.client.post(url).json(&request)).await?;
        Ok(response.into_text())
    }
}

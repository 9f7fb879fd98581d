use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionOptions, DEFAULT_TEMPERATURE, Provider, ProviderKind};
use crate::config::OpenAiConfig;
use crate::error::UpstreamError;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

// Every level may be missing or `null`: a well-formed reply without text yields an empty answer.
#[derive(Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Option<Choice>>>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> String {
        self.choices
            .unwrap_or_default()
            .into_iter()
            .next()
            .flatten()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default()
    }
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, config: &OpenAiConfig, api_key: String) -> Self {
        Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, UpstreamError> {
        let kind = self.kind();
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatRequest {
            model: options.model.as_deref().unwrap_or(&self.model),
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        };
        debug!(model = request.model, "calling openai chat completions");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
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

        let chat_response: ChatResponse =
            serde_json::from_str(&body).map_err(|e| UpstreamError::decode(kind, &e, &body))?;
        Ok(chat_response.into_text())
    }
}

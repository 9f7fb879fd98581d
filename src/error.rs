use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::providers::ProviderKind;

/// Longest upstream body excerpt that is passed back to callers.
const MAX_BODY_EXCERPT: usize = 500;

/// A failed call to one upstream provider.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{provider} returned HTTP {status}")]
    Http {
        provider: ProviderKind,
        status: u16,
        body: String,
    },
    #[error("{provider} request timed out")]
    Timeout { provider: ProviderKind },
    #[error("{provider} request failed: {message}")]
    Transport {
        provider: ProviderKind,
        message: String,
    },
    #[error("{provider} response could not be decoded: {message}")]
    Decode {
        provider: ProviderKind,
        message: String,
        body: String,
    },
}

impl UpstreamError {
    pub fn from_reqwest(provider: ProviderKind, e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout { provider }
        } else {
            UpstreamError::Transport {
                provider,
                message: e.to_string(),
            }
        }
    }

    pub fn from_status(provider: ProviderKind, status: reqwest::StatusCode, body: &str) -> Self {
        UpstreamError::Http {
            provider,
            status: status.as_u16(),
            body: excerpt(body),
        }
    }

    pub fn decode(provider: ProviderKind, e: &serde_json::Error, body: &str) -> Self {
        UpstreamError::Decode {
            provider,
            message: e.to_string(),
            body: excerpt(body),
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            UpstreamError::Http { provider, .. }
            | UpstreamError::Timeout { provider }
            | UpstreamError::Transport { provider, .. }
            | UpstreamError::Decode { provider, .. } => *provider,
        }
    }

    /// Wire code, e.g. `openai_http_401` or `gemini_timeout`.
    pub fn code(&self) -> String {
        let provider = self.provider();
        match self {
            UpstreamError::Http { status, .. } => format!("{provider}_http_{status}"),
            UpstreamError::Timeout { .. } => format!("{provider}_timeout"),
            UpstreamError::Transport { .. } => format!("{provider}_request_failed"),
            UpstreamError::Decode { .. } => format!("{provider}_bad_response"),
        }
    }

    fn fill(&self, body: &mut ErrorBody) {
        body.error = self.code();
        match self {
            UpstreamError::Http { status, body: b, .. } => {
                body.status = Some(*status);
                body.body = Some(b.clone());
            }
            UpstreamError::Timeout { .. } => {
                body.detail = Some(self.to_string());
            }
            UpstreamError::Transport { message, .. } => {
                body.detail = Some(message.clone());
            }
            UpstreamError::Decode { message, body: b, .. } => {
                body.detail = Some(message.clone());
                body.body = Some(b.clone());
            }
        }
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(MAX_BODY_EXCERPT).collect()
}

/// Every way a relay request can end without a generated answer.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("request body is not valid JSON: {0}")]
    BadJson(String),
    #[error("prompt is required")]
    PromptRequired,
    #[error("unknown provider {0:?}")]
    UnknownProvider(String),
    #[error("no provider is configured")]
    NoProviderConfigured { requested: Option<ProviderKind> },
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("{fallback} (after {primary})")]
    FallbackFailed {
        primary: UpstreamError,
        fallback: UpstreamError,
    },
    #[error("handler crashed: {0}")]
    HandlerCrashed(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::NotFound => StatusCode::NOT_FOUND,
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::BadJson(_) | RelayError::PromptRequired | RelayError::UnknownProvider(_) => {
                StatusCode::BAD_REQUEST
            }
            RelayError::NoProviderConfigured { .. } | RelayError::HandlerCrashed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RelayError::Upstream(_) | RelayError::FallbackFailed { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    fn to_body(&self) -> ErrorBody {
        let mut body = ErrorBody::default();
        match self {
            RelayError::NotFound => body.error = "not_found".to_string(),
            RelayError::MethodNotAllowed => body.error = "method_not_allowed".to_string(),
            RelayError::BadJson(detail) => {
                body.error = "bad_json".to_string();
                body.detail = Some(detail.clone());
            }
            RelayError::PromptRequired => body.error = "prompt_required".to_string(),
            RelayError::UnknownProvider(name) => {
                body.error = "unknown_provider".to_string();
                body.detail = Some(name.clone());
            }
            RelayError::NoProviderConfigured { requested } => {
                body.error = "no_provider_configured".to_string();
                body.detail = requested.map(|p| p.to_string());
            }
            RelayError::Upstream(e) => e.fill(&mut body),
            RelayError::FallbackFailed { primary, fallback } => {
                fallback.fill(&mut body);
                body.fallback_from = Some(primary.provider());
                body.primary_error = Some(primary.code());
            }
            RelayError::HandlerCrashed(detail) => {
                body.error = "handler_crashed".to_string();
                body.detail = Some(detail.clone());
            }
        }
        body
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<ProviderKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_error: Option<String>,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_body())).into_response()
    }
}

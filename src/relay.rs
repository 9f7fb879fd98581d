use std::any::Any;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{MethodRouter, get},
};
use serde::Serialize;
use serde_json::{Map, Value};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::RelayError;
use crate::lang::{DEFAULT_LANG, Lang};
use crate::providers::{CompletionOptions, Provider, ProviderKind, ProviderRegistry, Selection};
use crate::state::{AppState, StatusReport};

/// Request envelope accepted by `POST`.
#[derive(Debug, Default, PartialEq)]
pub struct PromptRequest {
    pub prompt: Option<String>,
    pub lang: Option<String>,
    pub provider: Option<String>,
    pub temperature: Option<f64>,
    pub model: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub provider: ProviderKind,
    pub output: String,
    pub lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<ProviderKind>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let endpoint: MethodRouter<Arc<AppState>> = get(status)
        .head(method_not_allowed)
        .post(relay_prompt)
        .options(preflight)
        .fallback(method_not_allowed);

    Router::new()
        .route("/", endpoint.clone())
        .route("/api/sor", endpoint)
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET,POST,OPTIONS"),
        ))
        .with_state(state)
}

/// Assigns a v4 uuid to requests that arrive without an `x-request-id`.
#[derive(Clone, Copy)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusReport> {
    Json(state.status())
}

async fn method_not_allowed() -> RelayError {
    RelayError::MethodNotAllowed
}

async fn not_found() -> RelayError {
    RelayError::NotFound
}

async fn relay_prompt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RelayResponse>, RelayError> {
    let request = parse_request(&body)?;
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    dispatch(&state.providers, request)
        .instrument(info_span!("relay", request_id))
        .await
        .map(Json)
}

/// An empty body counts as `{}`; anything else must be a JSON object.
/// Fields of an unexpected type are read leniently rather than rejected.
pub fn parse_request(body: &[u8]) -> Result<PromptRequest, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PromptRequest::default());
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|e| RelayError::BadJson(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(RelayError::BadJson("expected a JSON object".to_string()));
    };

    Ok(PromptRequest {
        prompt: text_field(&fields, "prompt"),
        lang: text_field(&fields, "lang"),
        provider: text_field(&fields, "provider"),
        temperature: fields.get("temperature").and_then(Value::as_f64),
        model: text_field(&fields, "model"),
    })
}

/// Strings pass through, numbers and `true` are written out, everything else is absent.
fn text_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Validates the envelope, calls the selected provider and, for automatic
/// selections only, retries once on the alternate provider.
pub async fn dispatch(
    providers: &ProviderRegistry,
    request: PromptRequest,
) -> Result<RelayResponse, RelayError> {
    let PromptRequest {
        prompt,
        lang,
        provider,
        temperature,
        model,
    } = request;

    let prompt = prompt.as_deref().unwrap_or_default().trim();
    if prompt.is_empty() {
        return Err(RelayError::PromptRequired);
    }
    let lang = lang
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| DEFAULT_LANG.to_string());

    let selection = providers.select(provider.as_deref())?;
    let primary_kind = selection.kind();
    let primary = providers
        .get(primary_kind)
        .ok_or(RelayError::NoProviderConfigured {
            requested: Some(primary_kind),
        })?;

    let localized = Lang::from_code(&lang).localize(prompt);
    let options = CompletionOptions {
        temperature,
        model: model.filter(|m| !m.trim().is_empty()),
    };

    info!(
        provider = %primary_kind,
        automatic = matches!(selection, Selection::Auto(_)),
        lang = %lang,
        "dispatching prompt"
    );

    let primary_err = match primary.complete(&localized, &options).await {
        Ok(output) => {
            return Ok(RelayResponse {
                provider: primary_kind,
                output,
                lang,
                fallback_from: None,
            });
        }
        Err(e) => e,
    };
    warn!(provider = %primary_kind, error = %primary_err, "provider call failed");

    let fallback = match selection {
        Selection::Auto(kind) => providers.alternate(kind),
        Selection::Explicit(_) => None,
    };
    let Some(fallback) = fallback else {
        return Err(primary_err.into());
    };

    let fallback_kind = fallback.kind();
    info!(provider = %fallback_kind, from = %primary_kind, "falling back");
    // The requested model belongs to the primary provider.
    let options = CompletionOptions {
        model: None,
        ..options
    };

    match fallback.complete(&localized, &options).await {
        Ok(output) => Ok(RelayResponse {
            provider: fallback_kind,
            output,
            lang,
            fallback_from: Some(primary_kind),
        }),
        Err(fallback_err) => {
            warn!(provider = %fallback_kind, error = %fallback_err, "fallback call failed");
            Err(RelayError::FallbackFailed {
                primary: primary_err,
                fallback: fallback_err,
            })
        }
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(detail = %detail, "request handler panicked");
    RelayError::HandlerCrashed(detail).into_response()
}

pub mod completion;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use fanpulse_config::Config;
use fanpulse_contracts::{
    contracts_manifest_v1, ClassifyRequest, ClassifyResponse, ContractsMetadata, ErrorBody,
    ErrorResponse, EvaluateRequest, EvaluateResponse, Evaluated, FanAttributes, FanStateRequest, FanStateResult, HeatRequest,
    HeatResult, Intent, LabelSets, Language, Message, NextActionRequest, NextActionSummary,
    Purchase, Sender, SuggestRequest, Suggestion, API_VERSION,
};
use fanpulse_kernel::copy::resolve_language;
use fanpulse_kernel::heat::HeatInput;
use fanpulse_kernel::intent::ClassifyOptions;
use fanpulse_kernel::suggest::SuggestInput;
use fanpulse_kernel::{
    classify, compute_heat, derive_state, jcs_sha256_hex, message_timestamp,
    parse_optional_timestamp, suggest, summarize, CompletionClient,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::completion::OpenAiCompatibleClient;

type ApiError = (StatusCode, Json<ErrorResponse>);
type JsonBody = Result<Json<Value>, JsonRejection>;

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg).await?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

/// Router with the completion client the config asks for.
pub async fn build_app(cfg: Config) -> Result<Router, String> {
    let client: Option<Arc<dyn CompletionClient>> = if cfg.classifier.remote.is_enabled() {
        Some(Arc::new(OpenAiCompatibleClient::from_config(
            &cfg.classifier.remote,
        )?))
    } else {
        None
    };
    Ok(build_app_with_client(cfg, client))
}

/// Router with an explicit completion client; `None` keeps classification
/// rule-only.
pub fn build_app_with_client(cfg: Config, client: Option<Arc<dyn CompletionClient>>) -> Router {
    let state = AppState {
        cfg: Arc::new(cfg),
        client,
    };
    Router::new()
        .route("/v1/healthz", get(healthz))
        .route("/v1/contracts", get(contracts))
        .route("/v1/intents/classify", post(classify_intent))
        .route("/v1/heat", post(heat))
        .route("/v1/fan-state", post(fan_state))
        .route("/v1/suggestions", post(suggestions))
        .route("/v1/next-action", post(next_action))
        .route("/v1/evaluate", post(evaluate))
        .layer(middleware::from_fn(request_span))
        .with_state(state)
}

#[derive(Clone)]
struct AppState {
    cfg: Arc<Config>,
    client: Option<Arc<dyn CompletionClient>>,
}

impl AppState {
    fn language(&self, hint: Option<&str>) -> Language {
        resolve_language(hint.or(Some(self.cfg.engine.default_language.as_str())))
    }

    fn completion_client(&self) -> Option<&dyn CompletionClient> {
        self.client.as_deref()
    }
}

async fn request_span(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        %request_id,
        method = %req.method(),
        route = %req.uri().path()
    );
    async move {
        let started = Instant::now();
        let mut response = next.run(req).await;
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
    .instrument(span)
    .await
}

fn api_error(status: StatusCode, code: &str, message: String) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details: None,
            },
        }),
    )
}

fn validation_error(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "validation_error", message.into())
}

fn internal_error(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message.into())
}

/// Decodes the typed request and fingerprints the raw body. Unreadable
/// bodies and a missing JSON content type are validation errors too.
fn decode<T: DeserializeOwned>(body: JsonBody) -> Result<(T, String), ApiError> {
    let Json(body) = body.map_err(|e| validation_error(e.body_text()))?;
    let input_sha256 = jcs_sha256_hex(&body).map_err(internal_error)?;
    let request = serde_json::from_value(body).map_err(|e| validation_error(e.to_string()))?;
    Ok((request, input_sha256))
}

fn resolve_now(raw: Option<&str>) -> Result<DateTime<Utc>, ApiError> {
    match raw {
        None => Ok(Utc::now()),
        Some(v) => parse_optional_timestamp(Some(v))
            .ok_or_else(|| validation_error("invalid now (RFC3339 or epoch milliseconds required)")),
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn contracts() -> Json<ContractsMetadata> {
    let manifest = contracts_manifest_v1();
    Json(ContractsMetadata {
        api_version: API_VERSION.to_string(),
        openapi_sha256: manifest.openapi_sha256.to_string(),
        contracts_set_sha256: manifest.contracts_set_sha256.to_string(),
        generated_at: manifest.generated_at.to_string(),
        schemas: manifest
            .schemas
            .iter()
            .map(|s| (s.path.to_string(), s.sha256.to_string()))
            .collect(),
        labels: LabelSets::v1(),
    })
}

async fn classify_intent(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let (req, input_sha256): (ClassifyRequest, String) = decode(body)?;
    let threshold = req.threshold.unwrap_or(state.cfg.classifier.threshold);
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(validation_error("threshold must be within [0, 1]"));
    }
    let lang = req
        .lang
        .as_deref()
        .unwrap_or(state.cfg.engine.default_language.as_str());
    let options = ClassifyOptions {
        lang: Some(lang),
        context: &req.context,
        identity: req.identity_hints.as_ref(),
        threshold,
    };
    let classification = classify(&req.text, &options, state.completion_client()).await;
    info!(
        intent = classification.result.intent.as_str(),
        confidence = classification.result.confidence,
        text_len = req.text.len(),
        "classified"
    );
    Ok(Json(ClassifyResponse {
        result: classification.result,
        remote_failure: classification.remote_failure,
        input_sha256,
    }))
}

async fn heat(body: JsonBody) -> Result<Json<Evaluated<HeatResult>>, ApiError> {
    let (req, input_sha256): (HeatRequest, String) = decode(body)?;
    let now = resolve_now(req.now.as_deref())?;
    let result = compute_heat(
        &HeatInput {
            messages: &req.messages,
            purchases: &req.purchases,
            subscription_status: req.subscription_status.as_deref(),
            last_seen_at: req.last_seen_at.as_deref(),
        },
        now,
    );
    Ok(Json(Evaluated {
        result,
        input_sha256,
    }))
}

async fn fan_state(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<Json<Evaluated<FanStateResult>>, ApiError> {
    let (req, input_sha256): (FanStateRequest, String) = decode(body)?;
    let now = resolve_now(req.now.as_deref())?;
    let lang = state.language(req.language.as_deref());
    Ok(Json(Evaluated {
        result: derive_state(&req.fan, lang, now),
        input_sha256,
    }))
}

async fn suggestions(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<Json<Evaluated<Suggestion>>, ApiError> {
    let (req, input_sha256): (SuggestRequest, String) = decode(body)?;
    let now = resolve_now(req.now.as_deref())?;
    let lang = state.language(req.language.as_deref());
    let result = suggest(
        &SuggestInput {
            language: Some(lang.as_str()),
            heat_bucket: req.heat_bucket.as_deref(),
            heat_score: req.heat_score,
            last_intent: req.last_intent.as_deref(),
            manual_next_action: req.manual_next_action.as_deref(),
            membership_status: req.membership_status.as_deref(),
            days_left: req.days_left,
            last_purchase_at: req.last_purchase_at.as_deref(),
            last_inbound_at: req.last_inbound_at.as_deref(),
        },
        now,
    );
    Ok(Json(Evaluated {
        result,
        input_sha256,
    }))
}

async fn next_action(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<Json<Evaluated<NextActionSummary>>, ApiError> {
    let (req, input_sha256): (NextActionRequest, String) = decode(body)?;
    let now = resolve_now(req.now.as_deref())?;
    let lang = state.language(req.language.as_deref());
    Ok(Json(Evaluated {
        result: summarize(&req.fan, lang, req.has_unread_inbound, now),
        input_sha256,
    }))
}

/// Index of the most recent fan message; timestamped ones win, ties go to
/// the later position.
fn latest_fan_message(messages: &[Message]) -> Option<usize> {
    messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.from == Sender::Fan)
        .max_by_key(|(idx, m)| (message_timestamp(m), *idx))
        .map(|(idx, _)| idx)
}

/// Fills the derived fan fields the snapshot did not carry.
fn enrich_fan(
    fan: &FanAttributes,
    messages: &[Message],
    purchases: &[Purchase],
    heat: &HeatResult,
    intent: Intent,
) -> FanAttributes {
    let fan_times: Vec<DateTime<Utc>> = messages
        .iter()
        .filter(|m| m.from == Sender::Fan)
        .filter_map(message_timestamp)
        .collect();
    let last_fan_at = fan_times.iter().max().copied().map(format_ts);
    let last_purchase_at = purchases
        .iter()
        .filter_map(|p| parse_optional_timestamp(p.created_at.as_deref()))
        .max()
        .map(format_ts);
    let fan_count = messages.iter().filter(|m| m.from == Sender::Fan).count();

    let mut enriched = fan.clone();
    enriched.last_seen_at = enriched.last_seen_at.or_else(|| last_fan_at.clone());
    enriched.last_inbound_at = enriched.last_inbound_at.or(last_fan_at);
    enriched.last_purchase_at = enriched.last_purchase_at.or(last_purchase_at);
    enriched.fan_message_count = enriched
        .fan_message_count
        .or(Some(u32::try_from(fan_count).unwrap_or(u32::MAX)));
    enriched.heat_score = Some(f64::from(heat.score));
    enriched.heat_label = Some(heat.label.as_str().to_string());
    enriched.last_intent = Some(intent.as_str().to_string());
    enriched
}

async fn evaluate(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let (req, input_sha256): (EvaluateRequest, String) = decode(body)?;
    let now = resolve_now(req.now.as_deref())?;
    let lang = state.language(req.lang.as_deref());

    let latest = latest_fan_message(&req.messages);
    let text = req
        .text
        .clone()
        .or_else(|| latest.map(|idx| req.messages[idx].text.clone()))
        .unwrap_or_default();
    let options = ClassifyOptions {
        lang: Some(lang.as_str()),
        threshold: state.cfg.classifier.threshold,
        ..Default::default()
    };
    let classification = classify(&text, &options, state.completion_client()).await;
    if let Some(failure) = classification.remote_failure {
        warn!(?failure, "remote classifier unavailable for evaluation");
    }
    let intent = classification.result.intent;

    let mut messages = req.messages.clone();
    let history_has_intent = messages
        .iter()
        .any(|m| m.from == Sender::Fan && m.intent_key.as_deref().and_then(Intent::parse).is_some());
    if !history_has_intent {
        if let Some(idx) = latest {
            messages[idx].intent_key = Some(intent.as_str().to_string());
            messages[idx].intent_confidence = Some(classification.result.confidence);
        }
    }

    let heat = compute_heat(
        &HeatInput {
            messages: &messages,
            purchases: &req.purchases,
            subscription_status: req.fan.subscription_status.as_deref(),
            last_seen_at: req.fan.last_seen_at.as_deref(),
        },
        now,
    );
    let fan = enrich_fan(&req.fan, &messages, &req.purchases, &heat, intent);
    let fan_state = derive_state(&fan, lang, now);
    let suggestion = suggest(
        &SuggestInput {
            language: Some(lang.as_str()),
            heat_bucket: Some(heat.label.as_str()),
            heat_score: Some(f64::from(heat.score)),
            last_intent: Some(intent.as_str()),
            manual_next_action: None,
            membership_status: fan.membership_status.as_deref(),
            days_left: fan.days_left,
            last_purchase_at: fan.last_purchase_at.as_deref(),
            last_inbound_at: fan.last_inbound_at.as_deref(),
        },
        now,
    );
    let next_action = summarize(&fan, lang, req.has_unread_inbound, now);

    info!(
        intent = intent.as_str(),
        heat = heat.score,
        state = ?fan_state.state,
        next_action = next_action.action_key.map(|k| k.as_str()).unwrap_or("none"),
        "evaluated"
    );

    Ok(Json(EvaluateResponse {
        intent: classification.result,
        remote_failure: classification.remote_failure,
        heat,
        fan_state,
        suggestion,
        next_action,
        evaluated_at: format_ts(now),
        input_sha256,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(from: Sender, created_at: Option<&str>) -> Message {
        Message {
            id: None,
            from,
            text: String::new(),
            intent_key: None,
            intent_confidence: None,
            created_at: created_at.map(str::to_string),
        }
    }

    #[test]
    fn latest_fan_message_prefers_timestamps() {
        let messages = vec![
            msg(Sender::Fan, Some("2026-10-18T10:00:00Z")),
            msg(Sender::Fan, None),
            msg(Sender::Creator, Some("2026-10-18T11:00:00Z")),
        ];
        assert_eq!(latest_fan_message(&messages), Some(0));
        assert_eq!(latest_fan_message(&messages[2..]), None);
    }

    #[test]
    fn now_accepts_epoch_millis_and_rejects_garbage() {
        assert_eq!(
            resolve_now(Some("1760788800000")).unwrap().timestamp_millis(),
            1_760_788_800_000
        );
        let (status, _) = resolve_now(Some("yesterday")).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

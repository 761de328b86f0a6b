//! Intent classification: a deterministic rule cascade with a remote
//! completion fallback for messages no rule is confident about.

use std::sync::OnceLock;

use async_trait::async_trait;
use fanpulse_contracts::{IdentityHints, Intent, IntentResult, RemoteFailure};
use regex::Regex;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_THRESHOLD: f64 = 0.75;
pub const UNSAFE_MINOR_CONFIDENCE: f64 = 0.95;
const EMPTY_CONFIDENCE: f64 = 0.3;
const UNREACHABLE_CONFIDENCE: f64 = 0.3;
const INVALID_RESPONSE_CONFIDENCE: f64 = 0.35;
const REMOTE_DEFAULT_CONFIDENCE: f64 = 0.4;

struct IntentRule {
    intent: Intent,
    confidence: f64,
    keywords: &'static [&'static str],
}

/// First match wins. Keywords are matched on normalized text at word
/// boundaries, so `subscribe` does not fire inside `unsubscribe`.
const RULES: &[IntentRule] = &[
    IntentRule {
        intent: Intent::PriceAsk,
        confidence: 0.85,
        keywords: &[
            "precio",
            "precios",
            "cuanto cuesta",
            "cuánto cuesta",
            "cuanto vale",
            "cuánto vale",
            "cuanto es",
            "cuánto es",
            "cuanto cobras",
            "cuánto cobras",
            "tarifa",
            "tarifas",
            "price",
            "prices",
            "pricing",
            "how much",
            "cost",
            "costs",
        ],
    },
    IntentRule {
        intent: Intent::BuyNow,
        confidence: 0.88,
        keywords: &[
            "lo quiero",
            "lo compro",
            "quiero comprar",
            "comprar",
            "pasame el link",
            "pásame el link",
            "mandame el link",
            "mándame el link",
            "link de pago",
            "enlace de pago",
            "pagar",
            "buy",
            "buy now",
            "i'll take it",
            "send the link",
            "send me the link",
            "payment link",
            "purchase",
            "checkout",
        ],
    },
    IntentRule {
        intent: Intent::OffPlatform,
        confidence: 0.85,
        keywords: &[
            "whatsapp",
            "telegram",
            "snapchat",
            "instagram",
            "insta",
            "tu numero",
            "tu número",
            "your number",
            "phone number",
            "paypal",
            "bizum",
            "venmo",
            "cashapp",
            "tu correo",
            "your email",
            "fuera de aqui",
            "fuera de aquí",
            "outside the app",
            "off platform",
        ],
    },
    IntentRule {
        intent: Intent::Subscribe,
        confidence: 0.82,
        keywords: &[
            "suscribirme",
            "suscribir",
            "me suscribo",
            "plan mensual",
            "membresia",
            "membresía",
            "renovar",
            "subscribe",
            "sign up",
            "monthly plan",
            "membership",
            "renew",
        ],
    },
    IntentRule {
        intent: Intent::Cancel,
        confidence: 0.85,
        keywords: &[
            "cancelar",
            "cancela",
            "darme de baja",
            "dar de baja",
            "reembolso",
            "devolucion",
            "devolución",
            "cancel",
            "unsubscribe",
            "refund",
        ],
    },
    IntentRule {
        intent: Intent::Support,
        confidence: 0.8,
        keywords: &[
            "no puedo ver",
            "no me carga",
            "no carga",
            "no funciona",
            "no me llego",
            "no me llegó",
            "error",
            "problema",
            "ayuda",
            "soporte",
            "can't see",
            "cannot see",
            "not loading",
            "doesn't work",
            "does not work",
            "not working",
            "didn't receive",
            "never received",
            "help",
            "support",
            "bug",
        ],
    },
    IntentRule {
        intent: Intent::Objection,
        confidence: 0.8,
        keywords: &[
            "muy caro",
            "caro",
            "no tengo dinero",
            "no me alcanza",
            "mas barato",
            "más barato",
            "descuento",
            "no se si",
            "no sé si",
            "too expensive",
            "expensive",
            "discount",
            "cheaper",
            "can't afford",
            "no money",
            "maybe later",
            "not sure",
        ],
    },
    IntentRule {
        intent: Intent::ContentRequest,
        confidence: 0.78,
        keywords: &[
            "foto",
            "fotos",
            "video",
            "vídeo",
            "videos",
            "vídeos",
            "contenido",
            "enseñame",
            "enséñame",
            "ensename",
            "muestrame",
            "muéstrame",
            "pic",
            "pics",
            "photo",
            "photos",
            "content",
            "show me",
            "new post",
        ],
    },
    IntentRule {
        intent: Intent::CustomRequest,
        confidence: 0.8,
        keywords: &[
            "personalizado",
            "personalizada",
            "a medida",
            "con mi nombre",
            "dedicatoria",
            "solo para mi",
            "solo para mí",
            "custom",
            "personalized",
            "personalised",
            "with my name",
            "just for me",
        ],
    },
    IntentRule {
        intent: Intent::Greeting,
        confidence: 0.75,
        keywords: &[
            "hola",
            "buenas",
            "buenos dias",
            "buenos días",
            "buenas tardes",
            "buenas noches",
            "que tal",
            "qué tal",
            "saludos",
            "hey",
            "hi",
            "hello",
            "good morning",
            "good evening",
        ],
    },
    IntentRule {
        intent: Intent::Flirt,
        confidence: 0.78,
        keywords: &[
            "guapa",
            "guapo",
            "preciosa",
            "hermosa",
            "bella",
            "linda",
            "cariño",
            "mi amor",
            "te quiero",
            "beso",
            "besos",
            "sexy",
            "beautiful",
            "gorgeous",
            "cute",
            "babe",
            "baby",
            "kiss",
        ],
    },
    IntentRule {
        intent: Intent::RudeOrHarass,
        confidence: 0.9,
        keywords: &[
            "puta",
            "zorra",
            "perra",
            "idiota",
            "estupida",
            "estúpida",
            "imbecil",
            "imbécil",
            "estafa",
            "estafadora",
            "bitch",
            "whore",
            "slut",
            "stupid",
            "idiot",
            "fuck you",
            "scam",
        ],
    },
];

/// Words that turn "N años" into a duration rather than an age.
const DURATION_LEADS: &[&str] = &[
    "hace", "durante", "desde", "cada", "llevo", "llevas", "lleva", "llevamos", "por", "más",
    "mas", "for", "since", "every", "over",
];

/// Words that open an age statement; a duration lead before them does not count.
const AGE_LEADS: &[&str] = &[
    "tengo", "soy", "edad", "cumplí", "cumplo", "age", "aged", "i'm", "im", "am", "turned",
];

/// Looks back up to three words, stopping at an age statement or a clause break.
fn has_duration_lead(before: &str) -> bool {
    for word in before.split_whitespace().rev().take(3) {
        let bare = word.trim_matches(|c: char| !c.is_alphanumeric());
        if AGE_LEADS.contains(&bare) {
            return false;
        }
        if DURATION_LEADS.contains(&bare) {
            return true;
        }
        if word.ends_with(&[',', '.', ';', '!', '?'][..]) {
            return false;
        }
    }
    false
}

fn age_with_unit() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:^|[^\p{L}\p{N}])(1[0-7]|[0-9])(?:\s*(?:años|año|añitos|anos|years? old|yrs? old|y/o|y\.o\.?)|yo)(?:$|[^\p{L}\p{N}])",
        )
        .expect("age-with-unit pattern")
    })
}

fn age_statement() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:^|[^\p{L}])(?:tengo|mi edad es|edad|i'?m|i am|im|my age is|age|aged)\s*:?\s*(1[0-7]|[0-9])(?:$|\s*[.,!?;)]|\s+(?:years?|yrs?|and|y|pero|but)(?:$|[^\p{L}]))",
        )
        .expect("age-statement pattern")
    })
}

/// Lowercases, collapses runs of whitespace and trims.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Returns the matched age expression when the text states an age of 0-17.
pub fn detect_minor_age(normalized: &str) -> Option<String> {
    for caps in age_with_unit().captures_iter(normalized) {
        let Some(number) = caps.get(1) else { continue };
        if has_duration_lead(&normalized[..number.start()]) {
            continue;
        }
        if let Some(whole) = caps.get(0) {
            return Some(whole.as_str().trim_matches(|c: char| !c.is_alphanumeric()).to_string());
        }
    }
    age_statement().captures(normalized).and_then(|caps| {
        caps.get(0)
            .map(|m| m.as_str().trim_matches(|c: char| !c.is_alphanumeric()).to_string())
    })
}

fn is_boundary(c: Option<char>) -> bool {
    c.map(|c| !c.is_alphanumeric()).unwrap_or(true)
}

/// Substring match that only counts hits bounded by non-alphanumerics.
pub fn contains_term(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(idx, matched)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + matched.len()..].chars().next();
        is_boundary(before) && is_boundary(after)
    })
}

/// Outcome of the deterministic stage.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// Decided without consulting any keyword rule (empty text, stated minor age).
    Final(IntentResult),
    Matched(IntentResult),
    NoMatch,
}

pub fn classify_by_rules(text: &str) -> RuleOutcome {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return RuleOutcome::Final(result_with(
            Intent::Other,
            EMPTY_CONFIDENCE,
            [("empty", Value::Bool(true))],
        ));
    }

    if let Some(expr) = detect_minor_age(&normalized) {
        return RuleOutcome::Final(result_with(
            Intent::UnsafeMinor,
            UNSAFE_MINOR_CONFIDENCE,
            [("age_match", Value::String(expr))],
        ));
    }

    for rule in RULES {
        if let Some(keyword) = rule
            .keywords
            .iter()
            .find(|kw| contains_term(&normalized, kw))
        {
            return RuleOutcome::Matched(result_with(
                rule.intent,
                rule.confidence,
                [
                    ("source", Value::String("rule".to_string())),
                    ("keyword", Value::String((*keyword).to_string())),
                ],
            ));
        }
    }
    RuleOutcome::NoMatch
}

fn result_with<const N: usize>(
    intent: Intent,
    confidence: f64,
    signals: [(&str, Value); N],
) -> IntentResult {
    IntentResult {
        intent,
        confidence,
        signals: signals
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionErrorKind {
    RateLimited,
    Auth,
    Timeout,
    Network,
    Server,
    InvalidResponse,
    Unconfigured,
}

impl CompletionErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionErrorKind::RateLimited => "rate_limited",
            CompletionErrorKind::Auth => "auth",
            CompletionErrorKind::Timeout => "timeout",
            CompletionErrorKind::Network => "network",
            CompletionErrorKind::Server => "server_error",
            CompletionErrorKind::InvalidResponse => "invalid_response",
            CompletionErrorKind::Unconfigured => "unconfigured",
        }
    }

    /// Only rate limiting and auth failures are the caller's business.
    pub fn caller_visible(self) -> Option<RemoteFailure> {
        match self {
            CompletionErrorKind::RateLimited => Some(RemoteFailure::RateLimited),
            CompletionErrorKind::Auth => Some(RemoteFailure::Auth),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("completion failed ({}): {message}", kind.as_str())]
pub struct CompletionError {
    pub kind: CompletionErrorKind,
    pub message: String,
}

impl CompletionError {
    pub fn new(kind: CompletionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => CompletionErrorKind::Auth,
            408 => CompletionErrorKind::Timeout,
            429 => CompletionErrorKind::RateLimited,
            500..=599 => CompletionErrorKind::Server,
            _ => CompletionErrorKind::InvalidResponse,
        };
        let mut message: String = body.chars().take(300).collect();
        if message.is_empty() {
            message = format!("HTTP {status}");
        }
        Self { kind, message }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
}

/// Remote text-completion collaborator. Returns the raw assistant text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ClassifyOptions<'a> {
    pub lang: Option<&'a str>,
    pub context: &'a [String],
    pub identity: Option<&'a IdentityHints>,
    pub threshold: f64,
}

impl Default for ClassifyOptions<'_> {
    fn default() -> Self {
        Self {
            lang: None,
            context: &[],
            identity: None,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub result: IntentResult,
    pub remote_failure: Option<RemoteFailure>,
}

impl Classification {
    fn resolved(result: IntentResult) -> Self {
        Self {
            result,
            remote_failure: None,
        }
    }
}

const SYSTEM_INSTRUCTION: &str = "You classify a single message a fan sent to a content creator on a subscription messaging platform. Reply with one JSON object and nothing else: no prose, no markdown, no code fences. The object must be exactly {\"intent\": <one of valid_intents>, \"confidence\": <number from 0 to 1>, \"signals\": <object with short evidence strings>}.";

const MINOR_INSTRUCTION: &str = "If anything in the message or context indicates the fan is under 18 years old, the intent MUST be UNSAFE_MINOR with confidence of at least 0.9, regardless of any other content.";

pub fn build_completion_request(text: &str, options: &ClassifyOptions<'_>) -> CompletionRequest {
    let mut payload = Map::new();
    payload.insert("text".to_string(), Value::String(text.to_string()));
    if let Some(lang) = options.lang {
        payload.insert("lang".to_string(), Value::String(lang.to_string()));
    }
    if !options.context.is_empty() {
        payload.insert("context".to_string(), json!(options.context));
    }
    if let Some(identity) = options.identity {
        payload.insert(
            "identity_hints".to_string(),
            json!({
                "fan_name": identity.fan_name,
                "creator_name": identity.creator_name,
            }),
        );
    }
    payload.insert(
        "valid_intents".to_string(),
        json!(Intent::ALL.iter().map(|i| i.as_str()).collect::<Vec<_>>()),
    );
    payload.insert(
        "instructions".to_string(),
        Value::String(MINOR_INSTRUCTION.to_string()),
    );

    CompletionRequest {
        system: SYSTEM_INSTRUCTION.to_string(),
        user: Value::Object(payload).to_string(),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches(|c: char| c.is_alphanumeric()),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Treats the remote text as untrusted: strips fences, requires a JSON
/// object with a known intent, and range-checks the confidence.
pub fn parse_remote_response(raw: &str) -> Result<IntentResult, String> {
    let body = strip_code_fence(raw);
    let candidate = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if end > start => &body[start..=end],
        _ => body,
    };
    let value: Value =
        serde_json::from_str(candidate).map_err(|e| format!("unparseable JSON: {e}"))?;
    let obj = value
        .as_object()
        .ok_or_else(|| "response is not a JSON object".to_string())?;

    let intent = obj
        .get("intent")
        .and_then(Value::as_str)
        .and_then(Intent::parse)
        .ok_or_else(|| "missing or unknown intent".to_string())?;

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite() && (0.0..=1.0).contains(c))
        .unwrap_or(REMOTE_DEFAULT_CONFIDENCE);

    let mut signals = obj
        .get("signals")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    signals.insert("source".to_string(), Value::String("remote".to_string()));

    Ok(IntentResult {
        intent,
        confidence,
        signals,
    })
}

fn fallback(rule: Option<IntentResult>, reason: &str, confidence: f64) -> IntentResult {
    match rule {
        Some(mut result) => {
            result
                .signals
                .insert("remote_fallback".to_string(), Value::String(reason.to_string()));
            result
        }
        None => result_with(
            Intent::Other,
            confidence,
            [("fallback", Value::String(reason.to_string()))],
        ),
    }
}

fn effective_threshold(raw: f64) -> f64 {
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        DEFAULT_THRESHOLD
    }
}

/// Classifies one fan message. Never fails: remote problems degrade the
/// confidence, and only rate-limit/auth failures are reported back.
pub async fn classify(
    text: &str,
    options: &ClassifyOptions<'_>,
    client: Option<&dyn CompletionClient>,
) -> Classification {
    let rule = match classify_by_rules(text) {
        RuleOutcome::Final(result) => return Classification::resolved(result),
        RuleOutcome::Matched(result) => Some(result),
        RuleOutcome::NoMatch => None,
    };

    let threshold = effective_threshold(options.threshold);
    if let Some(result) = rule.as_ref() {
        if result.confidence >= threshold {
            return Classification::resolved(result.clone());
        }
    }

    let Some(client) = client else {
        debug!(
            has_rule = rule.is_some(),
            "no completion client configured; using rule fallback"
        );
        return Classification::resolved(fallback(
            rule,
            CompletionErrorKind::Unconfigured.as_str(),
            UNREACHABLE_CONFIDENCE,
        ));
    };

    let request = build_completion_request(text, options);
    match client.complete(&request).await {
        Ok(raw) => match parse_remote_response(&raw) {
            Ok(result) => {
                debug!(intent = result.intent.as_str(), confidence = result.confidence, "remote classification");
                Classification::resolved(result)
            }
            Err(reason) => {
                warn!(%reason, response_len = raw.len(), "discarding malformed remote classification");
                Classification::resolved(fallback(
                    rule,
                    CompletionErrorKind::InvalidResponse.as_str(),
                    INVALID_RESPONSE_CONFIDENCE,
                ))
            }
        },
        Err(err) => {
            warn!(kind = err.kind.as_str(), error = %err.message, "remote classification failed");
            Classification {
                result: fallback(rule, err.kind.as_str(), UNREACHABLE_CONFIDENCE),
                remote_failure: err.kind.caller_visible(),
            }
        }
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const API_VERSION: &str = "1.0.0";

#[derive(Debug, Clone)]
pub struct ContractSchemaManifest {
    pub path: &'static str,
    pub sha256: &'static str,
    pub body: &'static str,
}

#[derive(Debug, Clone)]
pub struct ContractsManifest {
    pub openapi_sha256: &'static str,
    pub contracts_set_sha256: &'static str,
    pub generated_at: &'static str,
    pub schemas: Vec<ContractSchemaManifest>,
}

include!(concat!(env!("OUT_DIR"), "/generated_contracts.rs"));

pub fn contracts_manifest_v1() -> ContractsManifest {
    ContractsManifest {
        openapi_sha256: OPENAPI_SHA256,
        contracts_set_sha256: CONTRACTS_SET_SHA256,
        generated_at: GENERATED_AT,
        schemas: CONTRACT_SCHEMAS
            .iter()
            .map(|&(path, sha256, body)| ContractSchemaManifest { path, sha256, body })
            .collect(),
    }
}

/// Looks up an embedded schema body by its file name, e.g. `suggestion.schema.json`.
pub fn schema_body(file_name: &str) -> Option<&'static str> {
    CONTRACT_SCHEMAS
        .iter()
        .find(|(path, _, _)| path.rsplit('/').next() == Some(file_name))
        .map(|(_, _, body)| *body)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Fan,
    Creator,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Greeting,
    Flirt,
    ContentRequest,
    CustomRequest,
    PriceAsk,
    BuyNow,
    Subscribe,
    Cancel,
    OffPlatform,
    Support,
    Objection,
    RudeOrHarass,
    UnsafeMinor,
    Other,
}

impl Intent {
    pub const ALL: [Intent; 14] = [
        Intent::Greeting,
        Intent::Flirt,
        Intent::ContentRequest,
        Intent::CustomRequest,
        Intent::PriceAsk,
        Intent::BuyNow,
        Intent::Subscribe,
        Intent::Cancel,
        Intent::OffPlatform,
        Intent::Support,
        Intent::Objection,
        Intent::RudeOrHarass,
        Intent::UnsafeMinor,
        Intent::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Greeting => "GREETING",
            Intent::Flirt => "FLIRT",
            Intent::ContentRequest => "CONTENT_REQUEST",
            Intent::CustomRequest => "CUSTOM_REQUEST",
            Intent::PriceAsk => "PRICE_ASK",
            Intent::BuyNow => "BUY_NOW",
            Intent::Subscribe => "SUBSCRIBE",
            Intent::Cancel => "CANCEL",
            Intent::OffPlatform => "OFF_PLATFORM",
            Intent::Support => "SUPPORT",
            Intent::Objection => "OBJECTION",
            Intent::RudeOrHarass => "RUDE_OR_HARASS",
            Intent::UnsafeMinor => "UNSAFE_MINOR",
            Intent::Other => "OTHER",
        }
    }

    /// Accepts the wire label in any case, with `-` or spaces in place of `_`.
    pub fn parse(raw: &str) -> Option<Intent> {
        let normalized = raw.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Intent::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalized)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeatLabel {
    Cold,
    Warm,
    Hot,
}

impl HeatLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            HeatLabel::Cold => "COLD",
            HeatLabel::Warm => "WARM",
            HeatLabel::Hot => "HOT",
        }
    }

    pub fn parse(raw: &str) -> Option<HeatLabel> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "COLD" => Some(HeatLabel::Cold),
            "WARM" => Some(HeatLabel::Warm),
            "HOT" => Some(HeatLabel::Hot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FanState {
    NewCurious,
    NewShy,
    ColdFan,
    NearExpiry,
    VipBuyer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Connect,
    BreakIce,
    Reactivate,
    Renewal,
    PushMonthly,
    OfferExtra,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NextActionKey {
    Reply,
    ThankAndDeliver,
    SupportFlow,
    SafetyFlow,
    ResolveObjection,
    SendPaymentLink,
    OfferExtra,
    BreakIce,
    BuildRapport,
    Renewal,
    PushMonthly,
}

impl NextActionKey {
    pub const ALL: [NextActionKey; 11] = [
        NextActionKey::Reply,
        NextActionKey::ThankAndDeliver,
        NextActionKey::SupportFlow,
        NextActionKey::SafetyFlow,
        NextActionKey::ResolveObjection,
        NextActionKey::SendPaymentLink,
        NextActionKey::OfferExtra,
        NextActionKey::BreakIce,
        NextActionKey::BuildRapport,
        NextActionKey::Renewal,
        NextActionKey::PushMonthly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NextActionKey::Reply => "reply",
            NextActionKey::ThankAndDeliver => "thank_and_deliver",
            NextActionKey::SupportFlow => "support_flow",
            NextActionKey::SafetyFlow => "safety_flow",
            NextActionKey::ResolveObjection => "resolve_objection",
            NextActionKey::SendPaymentLink => "send_payment_link",
            NextActionKey::OfferExtra => "offer_extra",
            NextActionKey::BreakIce => "break_ice",
            NextActionKey::BuildRapport => "build_rapport",
            NextActionKey::Renewal => "renewal",
            NextActionKey::PushMonthly => "push_monthly",
        }
    }

    pub fn parse(raw: &str) -> Option<NextActionKey> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        NextActionKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Es,
    En,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Es => "es",
            Language::En => "en",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(default)]
    pub id: Option<String>,
    pub from: Sender,
    #[serde(default)]
    pub text: String,
    #[serde(default, alias = "intentKey")]
    pub intent_key: Option<String>,
    #[serde(default, alias = "intentConfidence")]
    pub intent_confidence: Option<f64>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Purchase {
    /// `EXTRA`, `TIP` or `GIFT`; every kind counts toward spend alike.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
}

/// Flat snapshot of what the product knows about one fan. Every field is
/// optional; absent numbers count as zero and absent flags as false.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct FanAttributes {
    #[serde(alias = "daysLeft")]
    pub days_left: Option<i64>,
    #[serde(alias = "lastSeenAt")]
    pub last_seen_at: Option<String>,
    #[serde(alias = "extrasCount")]
    pub extras_count: Option<u32>,
    #[serde(alias = "extrasSpend")]
    pub extras_spend: Option<f64>,
    #[serde(alias = "lifetimeSpend")]
    pub lifetime_spend: Option<f64>,
    #[serde(alias = "activeGrantTypes")]
    pub active_grant_types: Vec<String>,
    #[serde(alias = "followUpTag")]
    pub follow_up_tag: Option<String>,
    #[serde(alias = "isNew")]
    pub is_new: bool,
    #[serde(alias = "isHighPriority")]
    pub is_high_priority: bool,
    #[serde(alias = "customerTier")]
    pub customer_tier: Option<String>,
    #[serde(alias = "subscriptionStatus")]
    pub subscription_status: Option<String>,
    #[serde(alias = "membershipStatus")]
    pub membership_status: Option<String>,
    #[serde(alias = "lastIntent")]
    pub last_intent: Option<String>,
    #[serde(alias = "nextActionNote")]
    pub next_action_note: Option<String>,
    #[serde(alias = "nextActionDueAt")]
    pub next_action_due_at: Option<String>,
    #[serde(alias = "lastInboundAt")]
    pub last_inbound_at: Option<String>,
    #[serde(alias = "lastPurchaseAt")]
    pub last_purchase_at: Option<String>,
    #[serde(alias = "fanMessageCount")]
    pub fan_message_count: Option<u32>,
    #[serde(alias = "heatScore")]
    pub heat_score: Option<f64>,
    #[serde(alias = "heatLabel")]
    pub heat_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct IdentityHints {
    pub fan_name: Option<String>,
    pub creator_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub signals: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeatResult {
    pub score: u8,
    pub label: HeatLabel,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chip {
    pub key: String,
    pub label: String,
    pub insert_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FanStateResult {
    pub state: FanState,
    pub objective: Objective,
    pub headline: String,
    pub chips: Vec<Chip>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Suggestion {
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_label: Option<String>,
    pub next_action_key: Option<NextActionKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action_text: Option<String>,
    pub chips: Vec<Chip>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NextActionSummary {
    pub needs_action: bool,
    pub action_key: Option<NextActionKey>,
    pub action_label: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteFailure {
    RateLimited,
    Auth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifyRequest {
    pub text: String,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default)]
    pub identity_hints: Option<IdentityHints>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub result: IntentResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_failure: Option<RemoteFailure>,
    pub input_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeatRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub purchases: Vec<Purchase>,
    #[serde(default)]
    pub subscription_status: Option<String>,
    #[serde(default)]
    pub last_seen_at: Option<String>,
    #[serde(default)]
    pub now: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FanStateRequest {
    pub fan: FanAttributes,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub now: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct SuggestRequest {
    pub language: Option<String>,
    pub heat_bucket: Option<String>,
    pub heat_score: Option<f64>,
    pub last_intent: Option<String>,
    pub manual_next_action: Option<String>,
    pub membership_status: Option<String>,
    pub days_left: Option<i64>,
    pub last_purchase_at: Option<String>,
    pub last_inbound_at: Option<String>,
    pub now: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NextActionRequest {
    pub fan: FanAttributes,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub has_unread_inbound: bool,
    #[serde(default)]
    pub now: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluateRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub purchases: Vec<Purchase>,
    #[serde(default)]
    pub fan: FanAttributes,
    #[serde(default)]
    pub has_unread_inbound: bool,
    #[serde(default)]
    pub now: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateResponse {
    pub intent: IntentResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_failure: Option<RemoteFailure>,
    pub heat: HeatResult,
    pub fan_state: FanStateResult,
    pub suggestion: Suggestion,
    pub next_action: NextActionSummary,
    pub evaluated_at: String,
    pub input_sha256: String,
}

/// Generic `{result, input_sha256}` envelope for the single-component routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluated<T> {
    pub result: T,
    pub input_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelSets {
    pub intents: Vec<Intent>,
    pub heat_labels: Vec<HeatLabel>,
    pub fan_states: Vec<FanState>,
    pub objectives: Vec<Objective>,
    pub next_actions: Vec<NextActionKey>,
    pub languages: Vec<Language>,
}

impl LabelSets {
    pub fn v1() -> Self {
        Self {
            intents: Intent::ALL.to_vec(),
            heat_labels: vec![HeatLabel::Cold, HeatLabel::Warm, HeatLabel::Hot],
            fan_states: vec![
                FanState::NewCurious,
                FanState::NewShy,
                FanState::ColdFan,
                FanState::NearExpiry,
                FanState::VipBuyer,
            ],
            objectives: vec![
                Objective::Connect,
                Objective::BreakIce,
                Objective::Reactivate,
                Objective::Renewal,
                Objective::PushMonthly,
                Objective::OfferExtra,
            ],
            next_actions: NextActionKey::ALL.to_vec(),
            languages: vec![Language::Es, Language::En],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractsMetadata {
    pub api_version: String,
    pub openapi_sha256: String,
    pub contracts_set_sha256: String,
    pub generated_at: String,
    pub schemas: BTreeMap<String, String>,
    pub labels: LabelSets,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::path::PathBuf;

    #[test]
    fn schema_files_are_valid_json_schema() {
        let dir = repo_path("contracts/v1");
        let entries = std::fs::read_dir(dir).unwrap();
        let mut seen = 0;
        for entry in entries {
            let path = entry.unwrap().path();
            if !path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(".schema.json"))
                .unwrap_or(false)
            {
                continue;
            }
            let text = std::fs::read_to_string(&path).unwrap();
            let schema: Value = serde_json::from_str(&text).unwrap();
            let _validator = jsonschema::validator_for(&schema)
                .unwrap_or_else(|err| panic!("invalid schema {}: {err}", path.display()));
            seen += 1;
        }
        assert_eq!(seen, CONTRACT_SCHEMAS.len());
    }

    #[test]
    fn openapi_ref_targets_exist() {
        let openapi_path = repo_path("openapi/v1.yaml");
        let openapi_text = std::fs::read_to_string(&openapi_path).unwrap();
        let openapi: serde_yaml::Value = serde_yaml::from_str(&openapi_text).unwrap();
        let schemas = openapi
            .get("components")
            .and_then(|v| v.get("schemas"))
            .and_then(|v| v.as_mapping())
            .unwrap();

        for value in schemas.values() {
            if let Some(reference) = value.get("$ref").and_then(|v| v.as_str()) {
                if reference.starts_with("../") {
                    let ref_path = openapi_path.parent().unwrap().join(reference);
                    assert!(
                        ref_path.exists(),
                        "missing OpenAPI ref target: {}",
                        ref_path.display()
                    );
                }
            }
        }
    }

    #[test]
    fn embedded_schema_hashes_match_files() {
        use sha2::{Digest, Sha256};
        for schema in contracts_manifest_v1().schemas {
            let mut hasher = Sha256::new();
            hasher.update(schema.body.as_bytes());
            let digest: String = hasher
                .finalize()
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect();
            assert_eq!(digest, schema.sha256, "{}", schema.path);
        }
    }

    #[test]
    fn intent_parse_accepts_loose_spellings() {
        assert_eq!(Intent::parse("price-ask"), Some(Intent::PriceAsk));
        assert_eq!(Intent::parse(" buy_now "), Some(Intent::BuyNow));
        assert_eq!(Intent::parse("Unsafe Minor"), Some(Intent::UnsafeMinor));
        assert_eq!(Intent::parse("shopping"), None);
    }

    #[test]
    fn consumed_shapes_accept_camel_case_aliases() {
        let msg: Message = serde_json::from_value(json!({
            "id": "msg-1718000000000",
            "from": "fan",
            "text": "hola",
            "intentKey": "GREETING",
            "createdAt": "2026-10-18T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(msg.intent_key.as_deref(), Some("GREETING"));
        assert_eq!(msg.created_at.as_deref(), Some("2026-10-18T10:00:00Z"));

        let fan: FanAttributes =
            serde_json::from_value(json!({"daysLeft": 2, "isHighPriority": true})).unwrap();
        assert_eq!(fan.days_left, Some(2));
        assert!(fan.is_high_priority);
        assert!(!fan.is_new);
    }

    #[test]
    fn serialized_suggestion_matches_schema() {
        let schema: Value =
            serde_json::from_str(schema_body("suggestion.schema.json").unwrap()).unwrap();
        let validator = jsonschema::validator_for(&schema).unwrap();
        let suggestion = Suggestion {
            language: Language::En,
            intent_label: Some("Price question".to_string()),
            next_action_key: Some(NextActionKey::OfferExtra),
            next_action_label: Some("Offer an extra".to_string()),
            next_action_text: None,
            chips: vec![Chip {
                key: "simple_question".to_string(),
                label: "Quick question".to_string(),
                insert_text: "How is your day going?".to_string(),
            }],
        };
        let instance = serde_json::to_value(&suggestion).unwrap();
        assert!(validator.is_valid(&instance));
    }

    fn repo_path(relative: &str) -> PathBuf {
        let mut base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        base.push("../..");
        base.push(relative);
        base
    }
}

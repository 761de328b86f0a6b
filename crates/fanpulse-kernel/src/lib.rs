//! Fan-engagement decision engine: intent classification, heat scoring,
//! fan-state derivation, suggestion generation and next-action summaries.
//!
//! Everything here is call-scoped. The only I/O is the optional remote
//! completion consulted by [`intent::classify`].

pub mod copy;
pub mod fan_state;
pub mod heat;
pub mod intent;
pub mod next_action;
pub mod suggest;

use chrono::{DateTime, Utc};
use fanpulse_contracts::Message;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub use fan_state::derive_state;
pub use heat::compute_heat;
pub use intent::{classify, classify_by_rules, Classification, CompletionClient, CompletionError};
pub use next_action::summarize;
pub use suggest::suggest;

pub fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|v| v.with_timezone(&Utc))
}

/// Parses an RFC3339 timestamp or a decimal epoch-millisecond string.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    parse_rfc3339(trimmed).or_else(|| parse_epoch_millis(trimmed))
}

pub fn parse_optional_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(parse_timestamp)
}

/// Timestamp of a message: its explicit `created_at`, else the numeric token
/// after the last separator of its id. Neither means the message has no time.
pub fn message_timestamp(message: &Message) -> Option<DateTime<Utc>> {
    if let Some(ts) = parse_optional_timestamp(message.created_at.as_deref()) {
        return Some(ts);
    }
    let id = message.id.as_deref()?;
    let suffix = match id.rfind(['-', '_', ':', '.']) {
        Some(idx) => &id[idx + 1..],
        None => id,
    };
    parse_epoch_millis(suffix)
}

fn parse_epoch_millis(raw: &str) -> Option<DateTime<Utc>> {
    if raw.len() < 10 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let millis: i64 = raw.parse().ok()?;
    DateTime::from_timestamp_millis(millis)
}

/// Non-finite numbers count as zero.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

pub fn jcs_sha256_hex(value: &Value) -> Result<String, String> {
    let canonical = serde_jcs::to_string(value)
        .map_err(|err| format!("failed to canonicalize JSON via JCS: {err}"))?;
    Ok(sha256_hex(canonical.as_bytes()))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Duration, Utc};
    use fanpulse_contracts::{Message, Purchase, Sender};

    pub fn now() -> DateTime<Utc> {
        crate::parse_rfc3339("2026-10-18T12:00:00Z").unwrap()
    }

    pub fn hours_ago(hours: i64) -> String {
        (now() - Duration::hours(hours)).to_rfc3339()
    }

    pub fn fan_msg(text: &str, hours: i64) -> Message {
        Message {
            id: None,
            from: Sender::Fan,
            text: text.to_string(),
            intent_key: None,
            intent_confidence: None,
            created_at: Some(hours_ago(hours)),
        }
    }

    pub fn purchase(amount: f64, hours: i64) -> Purchase {
        Purchase {
            kind: None,
            amount: Some(amount),
            created_at: Some(hours_ago(hours)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanpulse_contracts::Sender;
    use serde_json::json;

    #[test]
    fn jcs_hash_is_order_independent() {
        let a = json!({"b":1,"a":2});
        let b = json!({"a":2,"b":1});
        assert_eq!(jcs_sha256_hex(&a).unwrap(), jcs_sha256_hex(&b).unwrap());
    }

    #[test]
    fn jcs_hash_is_whitespace_independent() {
        let a: Value = serde_json::from_str("{\n  \"a\": 1, \"b\": [2,3]\n}").unwrap();
        let b: Value = serde_json::from_str("{\"a\":1,\"b\":[2,3]}").unwrap();
        assert_eq!(jcs_sha256_hex(&a).unwrap(), jcs_sha256_hex(&b).unwrap());
    }

    fn msg(id: Option<&str>, created_at: Option<&str>) -> Message {
        Message {
            id: id.map(str::to_string),
            from: Sender::Fan,
            text: String::new(),
            intent_key: None,
            intent_confidence: None,
            created_at: created_at.map(str::to_string),
        }
    }

    #[test]
    fn explicit_timestamp_wins_over_id_suffix() {
        let m = msg(Some("msg-1700000000000"), Some("2026-10-18T10:00:00Z"));
        assert_eq!(
            message_timestamp(&m),
            parse_rfc3339("2026-10-18T10:00:00Z")
        );
    }

    #[test]
    fn timestamp_recovered_from_id_suffix() {
        let m = msg(Some("fan42-msg_1760788800000"), None);
        assert_eq!(
            message_timestamp(&m).map(|t| t.timestamp_millis()),
            Some(1_760_788_800_000)
        );
    }

    #[test]
    fn short_or_non_numeric_suffix_has_no_timestamp() {
        assert_eq!(message_timestamp(&msg(Some("msg-12345"), None)), None);
        assert_eq!(message_timestamp(&msg(Some("msg-17607888000x0"), None)), None);
        assert_eq!(message_timestamp(&msg(None, None)), None);
    }

    #[test]
    fn epoch_millis_strings_parse_as_timestamps() {
        assert_eq!(
            parse_timestamp("1760788800000").map(|t| t.timestamp_millis()),
            Some(1_760_788_800_000)
        );
        assert_eq!(parse_timestamp("not a date"), None);
    }
}

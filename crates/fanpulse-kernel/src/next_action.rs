use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use fanpulse_contracts::{FanAttributes, Language, NextActionKey, NextActionSummary};
use regex::Regex;

use crate::copy::{follow_up_without_note, reply_label};
use crate::parse_optional_timestamp;
use crate::suggest::{suggest, SuggestInput};

const GENERIC_NOTES: &[&str] = &[
    "follow up",
    "follow-up",
    "followup",
    "seguimiento",
    "hacer seguimiento",
];

fn scheduled_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s*\((?:scheduled\s+for|programado\s+para)\b[^)]*\)\s*$")
            .expect("scheduled-suffix pattern")
    })
}

/// Drops the legacy "(scheduled for DATE)" tail and surrounding whitespace.
pub fn normalize_note(note: &str) -> String {
    scheduled_suffix().replace(note.trim(), "").trim().to_string()
}

pub fn is_generic_note(normalized: &str) -> bool {
    let lowered = normalized
        .trim_end_matches(['.', '!', '…'])
        .trim()
        .to_lowercase();
    lowered.is_empty() || GENERIC_NOTES.contains(&lowered.as_str())
}

fn summary(key: Option<NextActionKey>, label: impl Into<String>) -> NextActionSummary {
    NextActionSummary {
        needs_action: true,
        action_key: key,
        action_label: Some(label.into()),
    }
}

/// Single recommended action for the operator. Unread inbound always wins,
/// then a manual note, then the suggestion cascade.
pub fn summarize(
    fan: &FanAttributes,
    lang: Language,
    has_unread_inbound: bool,
    now: DateTime<Utc>,
) -> NextActionSummary {
    if has_unread_inbound {
        return summary(Some(NextActionKey::Reply), reply_label(lang));
    }

    let mut manual_key = None;
    if let Some(raw) = fan.next_action_note.as_deref() {
        let note = normalize_note(raw);
        if let Some(key) = NextActionKey::parse(&note) {
            manual_key = Some(key);
        } else if !is_generic_note(&note) {
            return summary(None, note);
        } else if parse_optional_timestamp(fan.next_action_due_at.as_deref()).is_some() {
            return summary(None, follow_up_without_note(lang));
        }
    }

    let suggestion = suggest(
        &SuggestInput {
            language: Some(lang.as_str()),
            heat_bucket: fan.heat_label.as_deref(),
            heat_score: fan.heat_score,
            last_intent: fan.last_intent.as_deref(),
            manual_next_action: manual_key.map(NextActionKey::as_str),
            membership_status: fan.membership_status.as_deref(),
            days_left: fan.days_left,
            last_purchase_at: fan.last_purchase_at.as_deref(),
            last_inbound_at: fan.last_inbound_at.as_deref(),
        },
        now,
    );
    NextActionSummary {
        needs_action: suggestion.next_action_key.is_some(),
        action_key: suggestion.next_action_key,
        action_label: suggestion.next_action_label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{hours_ago, now};

    fn fan_with_note(note: &str, due: Option<String>) -> FanAttributes {
        FanAttributes {
            next_action_note: Some(note.to_string()),
            next_action_due_at: due,
            heat_label: Some("HOT".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn unread_inbound_always_replies() {
        let fan = FanAttributes {
            next_action_note: Some("Send the custom video".to_string()),
            last_purchase_at: Some(hours_ago(1)),
            days_left: Some(0),
            ..Default::default()
        };
        let es = summarize(&fan, Language::Es, true, now());
        assert_eq!(es.action_key, Some(NextActionKey::Reply));
        assert_eq!(es.action_label.as_deref(), Some("Responder"));
        assert!(es.needs_action);

        let en = summarize(&FanAttributes::default(), Language::En, true, now());
        assert_eq!(en.action_label.as_deref(), Some("Reply"));
    }

    #[test]
    fn free_text_note_is_returned_verbatim_without_suffix() {
        let fan = fan_with_note("Mandar el vídeo personalizado (programado para 20/10)", None);
        let s = summarize(&fan, Language::Es, false, now());
        assert_eq!(s.action_key, None);
        assert_eq!(s.action_label.as_deref(), Some("Mandar el vídeo personalizado"));
        assert!(s.needs_action);
    }

    #[test]
    fn generic_note_with_due_date_gets_placeholder_label() {
        let fan = fan_with_note("Seguimiento", Some(hours_ago(-24)));
        let s = summarize(&fan, Language::Es, false, now());
        assert_eq!(s.action_label.as_deref(), Some("Seguimiento (sin nota)"));
        assert_eq!(s.action_key, None);

        let scheduled = fan_with_note("Follow up (scheduled for 2026-10-20)", Some(hours_ago(-2)));
        let s = summarize(&scheduled, Language::En, false, now());
        assert_eq!(s.action_label.as_deref(), Some("Follow up (no note)"));
    }

    #[test]
    fn generic_note_without_due_date_delegates() {
        let fan = fan_with_note("follow-up", None);
        let s = summarize(&fan, Language::En, false, now());
        assert_eq!(s.action_key, Some(NextActionKey::OfferExtra));
        assert_eq!(s.action_label.as_deref(), Some("Offer an extra"));
    }

    #[test]
    fn known_key_note_becomes_manual_override() {
        let fan = fan_with_note("renewal", None);
        let s = summarize(&fan, Language::En, false, now());
        assert_eq!(s.action_key, Some(NextActionKey::Renewal));
        assert_eq!(s.action_label.as_deref(), Some("Renewal reminder"));
    }

    #[test]
    fn nothing_resolved_means_no_action() {
        let s = summarize(&FanAttributes::default(), Language::Es, false, now());
        assert!(!s.needs_action);
        assert_eq!(s.action_key, None);
        assert_eq!(s.action_label, None);
    }

    #[test]
    fn recent_purchase_delegates_to_thank_and_deliver() {
        let fan = FanAttributes {
            last_purchase_at: Some(hours_ago(3)),
            ..Default::default()
        };
        let s = summarize(&fan, Language::Es, false, now());
        assert_eq!(s.action_key, Some(NextActionKey::ThankAndDeliver));
        assert_eq!(s.action_label.as_deref(), Some("Agradecer y entregar"));
    }

    #[test]
    fn note_normalization() {
        assert_eq!(normalize_note("  Call back (Scheduled for tomorrow) "), "Call back");
        assert!(is_generic_note("Hacer seguimiento."));
        assert!(!is_generic_note("seguimiento del pedido"));
    }
}

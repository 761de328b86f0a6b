use chrono::{DateTime, Duration, Utc};
use fanpulse_contracts::{HeatLabel, Intent, Language, NextActionKey, Suggestion};

use crate::copy::{action_copy, build_chips, intent_label, resolve_language, ChipKey};
use crate::heat::label_for_score;
use crate::{finite_or_zero, parse_optional_timestamp};

const RECENT_PURCHASE_HOURS: i64 = 24;
const STALE_INBOUND_DAYS: i64 = 3;
const LAPSED_MEMBERSHIP: &[&str] = &["expired", "cancelled", "canceled", "inactive", "lapsed"];

/// Everything is optional; absent facts simply skip their branch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuggestInput<'a> {
    pub language: Option<&'a str>,
    pub heat_bucket: Option<&'a str>,
    pub heat_score: Option<f64>,
    pub last_intent: Option<&'a str>,
    pub manual_next_action: Option<&'a str>,
    pub membership_status: Option<&'a str>,
    pub days_left: Option<i64>,
    pub last_purchase_at: Option<&'a str>,
    pub last_inbound_at: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Facts {
    bucket: Option<HeatLabel>,
    intent: Option<Intent>,
    recent_purchase: bool,
    stale_inbound: bool,
}

/// An explicit valid bucket wins; otherwise the score is bucketed with the
/// heat thresholds.
pub fn resolve_bucket(bucket: Option<&str>, score: Option<f64>) -> Option<HeatLabel> {
    bucket
        .and_then(HeatLabel::parse)
        .or_else(|| score.map(|s| label_for_score(finite_or_zero(s))))
}

fn facts(input: &SuggestInput<'_>, now: DateTime<Utc>) -> Facts {
    Facts {
        bucket: resolve_bucket(input.heat_bucket, input.heat_score),
        intent: input.last_intent.and_then(Intent::parse),
        recent_purchase: parse_optional_timestamp(input.last_purchase_at)
            .map(|t| now - t <= Duration::hours(RECENT_PURCHASE_HOURS))
            .unwrap_or(false),
        stale_inbound: parse_optional_timestamp(input.last_inbound_at)
            .map(|t| now - t >= Duration::days(STALE_INBOUND_DAYS))
            .unwrap_or(false),
    }
}

fn next_action_key(manual: Option<&str>, facts: &Facts) -> Option<NextActionKey> {
    if let Some(key) = manual.and_then(NextActionKey::parse) {
        return Some(key);
    }
    if facts.recent_purchase {
        return Some(NextActionKey::ThankAndDeliver);
    }
    let by_intent = match facts.intent {
        Some(Intent::Support) => Some(NextActionKey::SupportFlow),
        Some(Intent::UnsafeMinor) => Some(NextActionKey::SafetyFlow),
        Some(Intent::Objection) => Some(NextActionKey::ResolveObjection),
        Some(Intent::BuyNow) => Some(NextActionKey::SendPaymentLink),
        Some(Intent::PriceAsk) => Some(NextActionKey::OfferExtra),
        Some(Intent::Greeting) if facts.bucket == Some(HeatLabel::Cold) => {
            Some(NextActionKey::BreakIce)
        }
        _ => None,
    };
    by_intent.or(match facts.bucket {
        Some(HeatLabel::Hot) => Some(NextActionKey::OfferExtra),
        Some(HeatLabel::Warm) => Some(NextActionKey::BuildRapport),
        Some(HeatLabel::Cold) => Some(NextActionKey::BreakIce),
        None => None,
    })
}

fn chip_keys(facts: &Facts) -> &'static [ChipKey] {
    use ChipKey::*;

    if facts.recent_purchase {
        return &[Thanks, Deliver, AnythingElse];
    }
    match facts.intent {
        Some(Intent::UnsafeMinor) => return &[SafetyCheck, SafetyPolicy, SoftClose],
        Some(Intent::Support) => return &[AskDetail, SupportSteps, Confirm],
        Some(Intent::Objection) => return &[Clarify, Validate, Options, Limits],
        _ => {}
    }
    let hot = facts.bucket == Some(HeatLabel::Hot);
    if hot || matches!(facts.intent, Some(Intent::BuyNow | Intent::PriceAsk)) {
        return &[PassOptions, SendLink, SoftClose, ResolveQuestion];
    }
    let cold = facts.bucket == Some(HeatLabel::Cold);
    if cold && facts.intent == Some(Intent::Greeting) {
        return &[SimpleQuestion, ReactivateShort, LightOffer];
    }
    match facts.bucket {
        Some(HeatLabel::Cold) if facts.stale_inbound => {
            &[ReactivateShort, SimpleQuestion, LightOffer, AskPreference]
        }
        Some(HeatLabel::Cold) => &[SimpleQuestion, LightOffer, AskPreference],
        Some(HeatLabel::Warm) => &[AskPreference, SimpleQuestion, LightOffer],
        _ => &[SimpleQuestion, AskPreference, LightOffer],
    }
}

fn renewal_text(lang: Language, input: &SuggestInput<'_>) -> Option<String> {
    let lapsed = input
        .membership_status
        .map(|s| LAPSED_MEMBERSHIP.contains(&s.trim().to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if lapsed {
        return Some(match lang {
            Language::Es => "Tu acceso ha terminado. ¿Lo reactivamos para que vuelvas a verlo todo?".to_string(),
            Language::En => "Your access has ended. Shall we reactivate it so you can see everything again?".to_string(),
        });
    }
    let days = input.days_left?;
    Some(match (lang, days) {
        (Language::Es, d) if d <= 0 => "Tu acceso termina hoy. ¿Renovamos para que no te pierdas nada?".to_string(),
        (Language::En, d) if d <= 0 => "Your access ends today. Shall we renew so you don't miss anything?".to_string(),
        (Language::Es, 1) => "Tu acceso termina mañana. ¿Renovamos para que no te pierdas nada?".to_string(),
        (Language::En, 1) => "Your access ends tomorrow. Shall we renew so you don't miss anything?".to_string(),
        (Language::Es, d) => format!("Tu acceso termina en {d} días. ¿Renovamos para que no te pierdas nada?"),
        (Language::En, d) => format!("Your access ends in {d} days. Shall we renew so you don't miss anything?"),
    })
}

pub fn suggest(input: &SuggestInput<'_>, now: DateTime<Utc>) -> Suggestion {
    let lang = resolve_language(input.language);
    let facts = facts(input, now);
    let key = next_action_key(input.manual_next_action, &facts);

    let (label, text) = match key {
        Some(key) => match action_copy(lang, key) {
            Some(copy) => {
                let text = if key == NextActionKey::Renewal {
                    renewal_text(lang, input).or(copy.text.map(str::to_string))
                } else {
                    copy.text.map(str::to_string)
                };
                (Some(copy.label.to_string()), text)
            }
            None => (Some(key.as_str().to_string()), None),
        },
        None => (None, None),
    };

    Suggestion {
        language: lang,
        intent_label: facts.intent.map(|i| intent_label(lang, i).to_string()),
        next_action_key: key,
        next_action_label: label,
        next_action_text: text,
        chips: build_chips(lang, chip_keys(&facts)),
    }
}

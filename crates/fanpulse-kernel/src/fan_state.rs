use chrono::{DateTime, Utc};
use fanpulse_contracts::{FanAttributes, FanState, FanStateResult, Language, Objective};

use crate::copy::{build_chips, ChipKey};
use crate::{finite_or_zero, parse_optional_timestamp};

const NEAR_EXPIRY_DAYS: i64 = 3;
const COLD_INACTIVITY_DAYS: i64 = 10;
const VIP_EXTRAS_COUNT: u32 = 2;
const VIP_EXTRAS_SPEND: f64 = 60.0;
const VIP_LIFETIME_SPEND: f64 = 120.0;
const PUSH_MONTHLY_EXTRAS_COUNT: u32 = 3;
const PUSH_MONTHLY_SPEND: f64 = 120.0;

const EXPIRY_TAGS: &[&str] = &["expiry_soon", "expires_soon", "expiring", "renewal_due", "today", "tomorrow"];

/// Booleans the state decision is made from, computed once per snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanSignals {
    pub near_expiry: bool,
    pub cold: bool,
    pub vip: bool,
    pub is_new: bool,
    pub inactivity_days: Option<i64>,
    pub fan_messages: u32,
}

fn has_grant(fan: &FanAttributes, kinds: &[&str]) -> bool {
    fan.active_grant_types
        .iter()
        .any(|g| kinds.contains(&g.trim().to_ascii_lowercase().as_str()))
}

fn tier_is(fan: &FanAttributes, tier: &str) -> bool {
    fan.customer_tier
        .as_deref()
        .map(|t| t.trim().eq_ignore_ascii_case(tier))
        .unwrap_or(false)
}

fn extras_count(fan: &FanAttributes) -> u32 {
    fan.extras_count.unwrap_or(0)
}

fn extras_spend(fan: &FanAttributes) -> f64 {
    finite_or_zero(fan.extras_spend.unwrap_or(0.0))
}

fn lifetime_spend(fan: &FanAttributes) -> f64 {
    finite_or_zero(fan.lifetime_spend.unwrap_or(0.0))
}

/// Whole days since `last_seen_at`, floored; future timestamps count as 0.
pub fn inactivity_days(fan: &FanAttributes, now: DateTime<Utc>) -> Option<i64> {
    parse_optional_timestamp(fan.last_seen_at.as_deref())
        .map(|seen| (now - seen).num_days().max(0))
}

pub fn fan_signals(fan: &FanAttributes, now: DateTime<Utc>) -> FanSignals {
    let expiry_tagged = fan
        .follow_up_tag
        .as_deref()
        .map(|t| EXPIRY_TAGS.contains(&t.trim().to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    let inactivity_days = inactivity_days(fan, now);

    FanSignals {
        near_expiry: fan.days_left.map(|d| d <= NEAR_EXPIRY_DAYS).unwrap_or(false)
            || expiry_tagged,
        cold: inactivity_days
            .map(|d| d >= COLD_INACTIVITY_DAYS)
            .unwrap_or(false),
        vip: fan.is_high_priority
            || tier_is(fan, "vip")
            || extras_count(fan) >= VIP_EXTRAS_COUNT
            || extras_spend(fan) >= VIP_EXTRAS_SPEND
            || lifetime_spend(fan) >= VIP_LIFETIME_SPEND,
        is_new: fan.is_new || tier_is(fan, "new"),
        inactivity_days,
        fan_messages: fan.fan_message_count.unwrap_or(0),
    }
}

/// Fixed-priority decision; the first guard that holds decides.
pub fn state_for(signals: &FanSignals) -> FanState {
    if signals.near_expiry {
        FanState::NearExpiry
    } else if !signals.is_new && signals.cold {
        FanState::ColdFan
    } else if signals.vip {
        FanState::VipBuyer
    } else if signals.is_new {
        if signals.fan_messages >= 1 {
            FanState::NewCurious
        } else {
            FanState::NewShy
        }
    } else if signals.cold {
        FanState::ColdFan
    } else if signals.fan_messages == 0 {
        FanState::NewShy
    } else {
        FanState::NewCurious
    }
}

pub fn default_objective(state: FanState) -> Objective {
    match state {
        FanState::NewCurious => Objective::Connect,
        FanState::NewShy => Objective::BreakIce,
        FanState::ColdFan => Objective::Reactivate,
        FanState::NearExpiry => Objective::Renewal,
        FanState::VipBuyer => Objective::OfferExtra,
    }
}

pub fn objective_for(state: FanState, fan: &FanAttributes) -> Objective {
    match state {
        FanState::NearExpiry
            if !has_grant(fan, &["monthly", "special"])
                && extras_count(fan) >= VIP_EXTRAS_COUNT =>
        {
            Objective::PushMonthly
        }
        FanState::VipBuyer
            if !has_grant(fan, &["monthly"])
                && (extras_count(fan) >= PUSH_MONTHLY_EXTRAS_COUNT
                    || extras_spend(fan) >= PUSH_MONTHLY_SPEND
                    || lifetime_spend(fan) >= PUSH_MONTHLY_SPEND) =>
        {
            Objective::PushMonthly
        }
        other => default_objective(other),
    }
}

fn headline(
    lang: Language,
    state: FanState,
    fan: &FanAttributes,
    signals: &FanSignals,
) -> String {
    match state {
        FanState::NearExpiry => match (lang, fan.days_left) {
            (Language::Es, Some(d)) if d <= 0 => "Caduca hoy".to_string(),
            (Language::En, Some(d)) if d <= 0 => "Expires today".to_string(),
            (Language::Es, Some(1)) => "Caduca mañana".to_string(),
            (Language::En, Some(1)) => "Expires tomorrow".to_string(),
            (Language::Es, Some(d)) if d <= NEAR_EXPIRY_DAYS => format!("Caduca en {d} días"),
            (Language::En, Some(d)) if d <= NEAR_EXPIRY_DAYS => format!("Expires in {d} days"),
            (Language::Es, _) => "Riesgo de caducidad: prepara la renovación".to_string(),
            (Language::En, _) => "Expiry risk: line up the renewal".to_string(),
        },
        FanState::ColdFan => match (lang, signals.inactivity_days) {
            (Language::Es, Some(d)) => format!("Sin actividad desde hace {d} días"),
            (Language::En, Some(d)) => format!("Inactive for {d} days"),
            (Language::Es, None) => "Fan frío: toca reactivar".to_string(),
            (Language::En, None) => "Cold fan: time to win them back".to_string(),
        },
        FanState::VipBuyer => {
            let extras = extras_count(fan);
            let spend = if extras_spend(fan) > 0.0 {
                extras_spend(fan)
            } else {
                lifetime_spend(fan)
            };
            match lang {
                Language::Es => format!("VIP · {extras} extras · {spend:.0} gastados"),
                Language::En => format!("VIP · {extras} extras · {spend:.0} spent"),
            }
        }
        FanState::NewCurious => match lang {
            Language::Es => "Nuevo y con curiosidad: responde rápido".to_string(),
            Language::En => "New and curious: reply fast".to_string(),
        },
        FanState::NewShy => match lang {
            Language::Es => "Nuevo y callado: rompe el hielo".to_string(),
            Language::En => "New and quiet: break the ice".to_string(),
        },
    }
}

fn chip_keys(state: FanState, objective: Objective) -> &'static [ChipKey] {
    match (state, objective) {
        (FanState::NearExpiry, Objective::PushMonthly) => &[
            ChipKey::MonthlyOffer,
            ChipKey::RenewReminder,
            ChipKey::SoftClose,
        ],
        (FanState::NearExpiry, _) => &[
            ChipKey::RenewReminder,
            ChipKey::AskPreference,
            ChipKey::SoftClose,
        ],
        (FanState::ColdFan, _) => &[
            ChipKey::ReactivateShort,
            ChipKey::SimpleQuestion,
            ChipKey::LightOffer,
        ],
        (FanState::VipBuyer, Objective::PushMonthly) => &[
            ChipKey::ThankLoyalty,
            ChipKey::MonthlyOffer,
            ChipKey::LightOffer,
        ],
        (FanState::VipBuyer, _) => &[
            ChipKey::ThankLoyalty,
            ChipKey::LightOffer,
            ChipKey::AskPreference,
        ],
        (FanState::NewCurious, _) => &[
            ChipKey::Welcome,
            ChipKey::AskPreference,
            ChipKey::LightOffer,
        ],
        (FanState::NewShy, _) => &[ChipKey::Welcome, ChipKey::SimpleQuestion],
    }
}

pub fn derive_state(fan: &FanAttributes, lang: Language, now: DateTime<Utc>) -> FanStateResult {
    let signals = fan_signals(fan, now);
    let state = state_for(&signals);
    let objective = objective_for(state, fan);
    FanStateResult {
        state,
        objective,
        headline: headline(lang, state, fan, &signals),
        chips: build_chips(lang, chip_keys(state, objective)),
    }
}

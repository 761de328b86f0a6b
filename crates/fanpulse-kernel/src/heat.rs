use chrono::{DateTime, Duration, Utc};
use fanpulse_contracts::{HeatLabel, HeatResult, Intent, Message, Purchase, Sender};

use crate::{finite_or_zero, message_timestamp, parse_optional_timestamp};

pub const BASELINE: f64 = 10.0;
pub const HOT_THRESHOLD: f64 = 70.0;
pub const WARM_THRESHOLD: f64 = 35.0;
const MAX_REASONS: usize = 3;

const FREQUENCY_POINTS_PER_MESSAGE: f64 = 3.0;
const FREQUENCY_CAP: f64 = 18.0;
const SPEND_UNITS_PER_POINT: f64 = 5.0;
const SPEND_CAP: f64 = 15.0;
const SUBSCRIPTION_BONUS: f64 = 8.0;
const SUBSCRIPTION_MARKERS: &[&str] = &["active", "monthly", "sub"];

pub fn label_for_score(score: f64) -> HeatLabel {
    if score >= HOT_THRESHOLD {
        HeatLabel::Hot
    } else if score >= WARM_THRESHOLD {
        HeatLabel::Warm
    } else {
        HeatLabel::Cold
    }
}

/// Per-intent adjustment for the fan's most recent classified message.
pub fn intent_delta(intent: Intent) -> i32 {
    match intent {
        Intent::BuyNow => 20,
        Intent::PriceAsk => 12,
        Intent::Subscribe => 10,
        Intent::CustomRequest => 10,
        Intent::ContentRequest => 8,
        Intent::Flirt => 6,
        Intent::Greeting => 2,
        Intent::Support | Intent::Other => 0,
        Intent::Objection => -6,
        Intent::OffPlatform => -10,
        Intent::Cancel => -15,
        Intent::RudeOrHarass => -25,
        Intent::UnsafeMinor => -50,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeatInput<'a> {
    pub messages: &'a [Message],
    pub purchases: &'a [Purchase],
    pub subscription_status: Option<&'a str>,
    pub last_seen_at: Option<&'a str>,
}

struct Tally {
    score: f64,
    reasons: Vec<String>,
}

impl Tally {
    fn add(&mut self, points: f64, reason: String) {
        self.score += points;
        self.reasons.push(reason);
    }
}

fn signed(points: i64) -> String {
    if points >= 0 {
        format!("+{points}")
    } else {
        points.to_string()
    }
}

/// Scores engagement from the fan-authored messages and the purchase list.
/// Rules are applied in a fixed order and reasons keep that order.
pub fn compute_heat(input: &HeatInput<'_>, now: DateTime<Utc>) -> HeatResult {
    let fan_messages: Vec<&Message> = input
        .messages
        .iter()
        .filter(|m| m.from == Sender::Fan)
        .collect();
    let fan_times: Vec<DateTime<Utc>> = fan_messages
        .iter()
        .filter_map(|m| message_timestamp(m))
        .collect();

    let mut tally = Tally {
        score: BASELINE,
        reasons: Vec::new(),
    };

    let last_fan_at = fan_times.iter().max().copied().or_else(|| {
        if fan_messages.is_empty() {
            None
        } else {
            parse_optional_timestamp(input.last_seen_at)
        }
    });
    if let Some(last) = last_fan_at {
        let age = now - last;
        let (points, window) = if age <= Duration::hours(24) {
            (18, "<24h")
        } else if age <= Duration::hours(72) {
            (10, "<72h")
        } else if age <= Duration::days(7) {
            (4, "<7d")
        } else {
            (-8, ">7d")
        };
        tally.add(points as f64, format!("Msg {window} {}", signed(points)));
    }

    let week_ago = now - Duration::days(7);
    let recent_count = fan_times.iter().filter(|t| **t >= week_ago).count();
    let frequency = (recent_count as f64 * FREQUENCY_POINTS_PER_MESSAGE).min(FREQUENCY_CAP);
    if frequency > 0.0 {
        tally.add(
            frequency,
            format!("{recent_count} msgs 7d {}", signed(frequency as i64)),
        );
    }

    let purchase_times: Vec<(DateTime<Utc>, f64)> = input
        .purchases
        .iter()
        .filter_map(|p| {
            parse_optional_timestamp(p.created_at.as_deref())
                .map(|t| (t, finite_or_zero(p.amount.unwrap_or(0.0)).max(0.0)))
        })
        .collect();

    if let Some(last) = purchase_times.iter().map(|(t, _)| *t).max() {
        let age = now - last;
        let bonus = if age <= Duration::hours(24) {
            Some((20, "<24h"))
        } else if age <= Duration::days(7) {
            Some((12, "<7d"))
        } else if age <= Duration::days(30) {
            Some((6, "<30d"))
        } else {
            None
        };
        if let Some((points, window)) = bonus {
            tally.add(points as f64, format!("Purchase {window} {}", signed(points)));
        }
    }

    let month_ago = now - Duration::days(30);
    let spent: f64 = purchase_times
        .iter()
        .filter(|(t, _)| *t >= month_ago)
        .map(|(_, amount)| *amount)
        .sum();
    let spend_points = (finite_or_zero(spent) / SPEND_UNITS_PER_POINT)
        .floor()
        .min(SPEND_CAP);
    if spend_points > 0.0 {
        tally.add(
            spend_points,
            format!("Spend 30d {}", signed(spend_points as i64)),
        );
    }

    if let Some(status) = input.subscription_status {
        let status = status.to_lowercase();
        if SUBSCRIPTION_MARKERS.iter().any(|m| status.contains(m)) {
            tally.add(SUBSCRIPTION_BONUS, "Subscription +8".to_string());
        }
    }

    if let Some(intent) = last_fan_intent(&fan_messages) {
        let delta = intent_delta(intent);
        if delta != 0 {
            tally.score += delta as f64;
            tally
                .reasons
                .push(format!("Intent {} {}", intent.as_str(), signed(delta as i64)));
        }
    }

    let score = finite_or_zero(tally.score).clamp(0.0, 100.0).round();
    tally.reasons.truncate(MAX_REASONS);
    HeatResult {
        score: score as u8,
        label: label_for_score(score),
        reasons: tally.reasons,
    }
}

/// Most recent fan message carrying a recognizable intent. Timestamped
/// messages win over untimed ones; among equals the later one in the list.
fn last_fan_intent(fan_messages: &[&Message]) -> Option<Intent> {
    fan_messages
        .iter()
        .enumerate()
        .filter_map(|(idx, m)| {
            let intent = m.intent_key.as_deref().and_then(Intent::parse)?;
            Some(((message_timestamp(m), idx), intent))
        })
        .max_by_key(|(order, _)| *order)
        .map(|(_, intent)| intent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fan_msg, now, purchase};

    fn heat(messages: &[Message], purchases: &[Purchase], status: Option<&str>) -> HeatResult {
        compute_heat(
            &HeatInput {
                messages,
                purchases,
                subscription_status: status,
                last_seen_at: None,
            },
            now(),
        )
    }

    #[test]
    fn empty_history_is_baseline_cold() {
        let r = heat(&[], &[], None);
        assert_eq!(r.score, 10);
        assert_eq!(r.label, HeatLabel::Cold);
        assert!(r.reasons.is_empty());
    }

    #[test]
    fn recent_single_message_scores_recency_and_frequency() {
        let r = heat(&[fan_msg("hola", 2)], &[], None);
        assert_eq!(r.score, 10 + 18 + 3);
        assert_eq!(r.label, HeatLabel::Cold);
        assert_eq!(r.reasons[0], "Msg <24h +18");
    }

    #[test]
    fn frequency_bonus_caps_at_eighteen() {
        let messages: Vec<Message> = (1..=10).map(|h| fan_msg("hey", h)).collect();
        let r = heat(&messages, &[], None);
        assert_eq!(r.score, 10 + 18 + 18);
        assert_eq!(r.label, HeatLabel::Warm);
    }

    #[test]
    fn stale_fan_message_subtracts() {
        let r = heat(&[fan_msg("hola", 24 * 10)], &[], None);
        assert_eq!(r.score, 2);
        assert_eq!(r.reasons, vec!["Msg >7d -8".to_string()]);
    }

    #[test]
    fn creator_messages_are_ignored() {
        let mut m = fan_msg("hola", 1);
        m.from = Sender::Creator;
        assert_eq!(heat(&[m], &[], None).score, 10);
    }

    #[test]
    fn purchases_add_recency_and_capped_spend() {
        let r = heat(&[], &[purchase(40.0, 3), purchase(200.0, 24 * 20)], None);
        assert_eq!(r.score, 10 + 20 + 15);
        assert_eq!(
            r.reasons,
            vec!["Purchase <24h +20".to_string(), "Spend 30d +15".to_string()]
        );
    }

    #[test]
    fn nan_amounts_count_as_zero() {
        let r = heat(&[], &[purchase(f64::NAN, 24 * 3)], None);
        assert_eq!(r.score, 10 + 12);
    }

    #[test]
    fn subscription_marker_is_case_insensitive() {
        assert_eq!(heat(&[], &[], Some("MONTHLY")).score, 18);
        assert_eq!(heat(&[], &[], Some("expired")).score, 10);
    }

    #[test]
    fn hot_fan_keeps_first_three_reasons_in_rule_order() {
        let mut messages: Vec<Message> = (1..=6).map(|h| fan_msg("quiero", h)).collect();
        messages[0].intent_key = Some("BUY_NOW".to_string());
        let r = heat(&messages, &[purchase(50.0, 1)], Some("active"));
        assert_eq!(r.score, 100);
        assert_eq!(r.label, HeatLabel::Hot);
        assert_eq!(
            r.reasons,
            vec![
                "Msg <24h +18".to_string(),
                "6 msgs 7d +18".to_string(),
                "Purchase <24h +20".to_string(),
            ]
        );
    }

    #[test]
    fn latest_intent_wins_and_minor_clamps_to_zero() {
        let mut older = fan_msg("lo quiero", 5);
        older.intent_key = Some("BUY_NOW".to_string());
        let mut newer = fan_msg("tengo 15", 1);
        newer.intent_key = Some("UNSAFE_MINOR".to_string());
        let r = heat(&[newer, older], &[], None);
        assert_eq!(r.score, 0);
        assert_eq!(r.label, HeatLabel::Cold);
        assert!(r.reasons.contains(&"Intent UNSAFE_MINOR -50".to_string()));
    }

    #[test]
    fn untimed_messages_fall_back_to_last_seen() {
        let mut m = fan_msg("hola", 0);
        m.created_at = None;
        let last_seen = crate::test_support::hours_ago(48);
        let r = compute_heat(
            &HeatInput {
                messages: &[m],
                purchases: &[],
                subscription_status: None,
                last_seen_at: Some(&last_seen),
            },
            now(),
        );
        assert_eq!(r.score, 20);
        assert_eq!(r.reasons, vec!["Msg <72h +10".to_string()]);
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        let messages = vec![fan_msg("hola", 3), fan_msg("precio?", 30)];
        let purchases = vec![purchase(12.5, 100)];
        assert_eq!(
            heat(&messages, &purchases, Some("sub")),
            heat(&messages, &purchases, Some("sub"))
        );
    }

    #[test]
    fn labels_follow_thresholds() {
        assert_eq!(label_for_score(70.0), HeatLabel::Hot);
        assert_eq!(label_for_score(69.0), HeatLabel::Warm);
        assert_eq!(label_for_score(35.0), HeatLabel::Warm);
        assert_eq!(label_for_score(34.0), HeatLabel::Cold);
    }
}

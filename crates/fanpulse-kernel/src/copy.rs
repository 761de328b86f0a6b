//! Localized operator-facing copy. All tables are immutable and keyed by the
//! closed label sets; Spanish is the house language.

use fanpulse_contracts::{Chip, Intent, Language, NextActionKey};

/// Reduces a locale-like hint (`en-US`, `es_MX`, `EN`) to a supported
/// language. Anything that is not English resolves to Spanish.
pub fn resolve_language(hint: Option<&str>) -> Language {
    let base = hint
        .map(|v| v.trim().to_ascii_lowercase())
        .and_then(|v| v.split(['-', '_']).next().map(str::to_string));
    match base.as_deref() {
        Some("en") => Language::En,
        _ => Language::Es,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionCopy {
    pub label: &'static str,
    pub text: Option<&'static str>,
}

/// `None` for keys whose copy lives with their owner (`reply`).
pub fn action_copy(lang: Language, key: NextActionKey) -> Option<ActionCopy> {
    let (label, text) = match (lang, key) {
        (_, NextActionKey::Reply) => return None,
        (Language::Es, NextActionKey::ThankAndDeliver) => (
            "Agradecer y entregar",
            "¡Gracias por tu compra! Aquí tienes lo tuyo, espero que te encante.",
        ),
        (Language::En, NextActionKey::ThankAndDeliver) => (
            "Thank & deliver",
            "Thank you for your purchase! Here it is, I hope you love it.",
        ),
        (Language::Es, NextActionKey::SupportFlow) => (
            "Resolver soporte",
            "Cuéntame qué ha pasado y lo reviso ahora mismo.",
        ),
        (Language::En, NextActionKey::SupportFlow) => (
            "Handle support",
            "Tell me what happened and I'll look into it right away.",
        ),
        (Language::Es, NextActionKey::SafetyFlow) => (
            "Protocolo de seguridad",
            "Este espacio es solo para mayores de 18 años. No puedo continuar esta conversación.",
        ),
        (Language::En, NextActionKey::SafetyFlow) => (
            "Safety protocol",
            "This space is for adults 18+ only. I can't continue this conversation.",
        ),
        (Language::Es, NextActionKey::ResolveObjection) => (
            "Resolver objeción",
            "Entiendo tu duda. ¿Qué es lo que más te frena?",
        ),
        (Language::En, NextActionKey::ResolveObjection) => (
            "Resolve objection",
            "I get it. What's holding you back the most?",
        ),
        (Language::Es, NextActionKey::SendPaymentLink) => (
            "Enviar enlace de pago",
            "¡Perfecto! Te paso el enlace para que lo tengas ya.",
        ),
        (Language::En, NextActionKey::SendPaymentLink) => (
            "Send payment link",
            "Perfect! Here's the link so you can get it right now.",
        ),
        (Language::Es, NextActionKey::OfferExtra) => (
            "Ofrecer extra",
            "Tengo algo especial que creo que te va a gustar. ¿Te lo enseño?",
        ),
        (Language::En, NextActionKey::OfferExtra) => (
            "Offer an extra",
            "I have something special I think you'll like. Want to see it?",
        ),
        (Language::Es, NextActionKey::BreakIce) => (
            "Romper el hielo",
            "¡Hola! ¿Qué tal va tu día?",
        ),
        (Language::En, NextActionKey::BreakIce) => (
            "Break the ice",
            "Hi! How's your day going?",
        ),
        (Language::Es, NextActionKey::BuildRapport) => (
            "Crear conexión",
            "Me encanta hablar contigo. Cuéntame algo de ti.",
        ),
        (Language::En, NextActionKey::BuildRapport) => (
            "Build rapport",
            "I love chatting with you. Tell me something about yourself.",
        ),
        (Language::Es, NextActionKey::Renewal) => (
            "Recordar renovación",
            "Tu acceso termina pronto. ¿Renovamos para que no te pierdas nada?",
        ),
        (Language::En, NextActionKey::Renewal) => (
            "Renewal reminder",
            "Your access ends soon. Shall we renew so you don't miss anything?",
        ),
        (Language::Es, NextActionKey::PushMonthly) => (
            "Proponer mensual",
            "Con la suscripción mensual te sale mejor que ir comprando extras sueltos.",
        ),
        (Language::En, NextActionKey::PushMonthly) => (
            "Pitch monthly",
            "The monthly subscription works out better than buying extras one by one.",
        ),
    };
    Some(ActionCopy {
        label,
        text: Some(text),
    })
}

pub fn reply_label(lang: Language) -> &'static str {
    match lang {
        Language::Es => "Responder",
        Language::En => "Reply",
    }
}

/// Placeholder label for a generic manual follow-up that carries a due date.
pub fn follow_up_without_note(lang: Language) -> &'static str {
    match lang {
        Language::Es => "Seguimiento (sin nota)",
        Language::En => "Follow up (no note)",
    }
}

pub fn intent_label(lang: Language, intent: Intent) -> &'static str {
    match (lang, intent) {
        (Language::Es, Intent::Greeting) => "Saludo",
        (Language::En, Intent::Greeting) => "Greeting",
        (Language::Es, Intent::Flirt) => "Coqueteo",
        (Language::En, Intent::Flirt) => "Flirting",
        (Language::Es, Intent::ContentRequest) => "Pide contenido",
        (Language::En, Intent::ContentRequest) => "Content request",
        (Language::Es, Intent::CustomRequest) => "Pide personalizado",
        (Language::En, Intent::CustomRequest) => "Custom request",
        (Language::Es, Intent::PriceAsk) => "Pregunta precio",
        (Language::En, Intent::PriceAsk) => "Price question",
        (Language::Es, Intent::BuyNow) => "Quiere comprar",
        (Language::En, Intent::BuyNow) => "Ready to buy",
        (Language::Es, Intent::Subscribe) => "Quiere suscribirse",
        (Language::En, Intent::Subscribe) => "Wants to subscribe",
        (Language::Es, Intent::Cancel) => "Quiere cancelar",
        (Language::En, Intent::Cancel) => "Wants to cancel",
        (Language::Es, Intent::OffPlatform) => "Fuera de plataforma",
        (Language::En, Intent::OffPlatform) => "Off-platform",
        (Language::Es, Intent::Support) => "Soporte",
        (Language::En, Intent::Support) => "Support",
        (Language::Es, Intent::Objection) => "Objeción",
        (Language::En, Intent::Objection) => "Objection",
        (Language::Es, Intent::RudeOrHarass) => "Grosero / acoso",
        (Language::En, Intent::RudeOrHarass) => "Rude / harassment",
        (Language::Es, Intent::UnsafeMinor) => "Posible menor",
        (Language::En, Intent::UnsafeMinor) => "Possible minor",
        (Language::Es, Intent::Other) => "Otro",
        (Language::En, Intent::Other) => "Other",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipKey {
    Thanks,
    Deliver,
    AnythingElse,
    SafetyCheck,
    SafetyPolicy,
    SoftClose,
    AskDetail,
    SupportSteps,
    Confirm,
    Clarify,
    Validate,
    Options,
    Limits,
    PassOptions,
    SendLink,
    ResolveQuestion,
    SimpleQuestion,
    ReactivateShort,
    LightOffer,
    AskPreference,
    Welcome,
    RenewReminder,
    MonthlyOffer,
    ThankLoyalty,
}

/// The trio used to backfill short chip lists.
pub const DEFAULT_CHIPS: [ChipKey; 3] = [
    ChipKey::SimpleQuestion,
    ChipKey::AskPreference,
    ChipKey::LightOffer,
];

pub const MAX_CHIPS: usize = 5;
pub const MIN_CHIPS: usize = 3;

impl ChipKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ChipKey::Thanks => "thanks",
            ChipKey::Deliver => "deliver",
            ChipKey::AnythingElse => "anything_else",
            ChipKey::SafetyCheck => "safety_check",
            ChipKey::SafetyPolicy => "safety_policy",
            ChipKey::SoftClose => "soft_close",
            ChipKey::AskDetail => "ask_detail",
            ChipKey::SupportSteps => "support_steps",
            ChipKey::Confirm => "confirm",
            ChipKey::Clarify => "clarify",
            ChipKey::Validate => "validate",
            ChipKey::Options => "options",
            ChipKey::Limits => "limits",
            ChipKey::PassOptions => "pass_options",
            ChipKey::SendLink => "send_link",
            ChipKey::ResolveQuestion => "resolve_question",
            ChipKey::SimpleQuestion => "simple_question",
            ChipKey::ReactivateShort => "reactivate_short",
            ChipKey::LightOffer => "light_offer",
            ChipKey::AskPreference => "ask_preference",
            ChipKey::Welcome => "welcome",
            ChipKey::RenewReminder => "renew_reminder",
            ChipKey::MonthlyOffer => "monthly_offer",
            ChipKey::ThankLoyalty => "thank_loyalty",
        }
    }
}

fn chip_copy(lang: Language, key: ChipKey) -> (&'static str, &'static str) {
    match lang {
        Language::Es => match key {
            ChipKey::Thanks => ("Agradecer", "¡Mil gracias por tu apoyo! 💛"),
            ChipKey::Deliver => ("Entregar", "Aquí tienes lo que pediste, disfrútalo."),
            ChipKey::AnythingElse => ("¿Algo más?", "¿Hay algo más que te apetezca?"),
            ChipKey::SafetyCheck => (
                "Verificar edad",
                "Antes de seguir necesito confirmar que eres mayor de 18 años.",
            ),
            ChipKey::SafetyPolicy => (
                "Política +18",
                "Este perfil es exclusivamente para mayores de edad.",
            ),
            ChipKey::SoftClose => ("Cierre suave", "Cuando quieras lo retomamos, sin prisa."),
            ChipKey::AskDetail => ("Pedir detalle", "¿Me das un poco más de detalle de lo que pasó?"),
            ChipKey::SupportSteps => (
                "Pasos de soporte",
                "Prueba a recargar la página y vuelve a abrir el chat. Si sigue igual, avísame.",
            ),
            ChipKey::Confirm => ("Confirmar", "¿Ya te funciona todo bien?"),
            ChipKey::Clarify => ("Aclarar", "¿Qué parte te genera más dudas?"),
            ChipKey::Validate => ("Validar", "Tiene sentido lo que dices, lo entiendo."),
            ChipKey::Options => ("Opciones", "Tengo varias opciones, te cuento cuál encaja mejor contigo."),
            ChipKey::Limits => ("Límites", "Esto es lo que sí puedo ofrecerte."),
            ChipKey::PassOptions => ("Pasar opciones", "Te paso las opciones que tengo ahora mismo."),
            ChipKey::SendLink => ("Enviar enlace", "Aquí tienes el enlace para desbloquearlo."),
            ChipKey::ResolveQuestion => ("Resolver duda", "¿Te queda alguna duda antes de decidirte?"),
            ChipKey::SimpleQuestion => ("Pregunta simple", "¿Qué tal tu día?"),
            ChipKey::ReactivateShort => ("Reactivar", "¡Hace mucho que no sé de ti! ¿Todo bien?"),
            ChipKey::LightOffer => ("Oferta ligera", "Hoy tengo algo nuevo, por si te apetece verlo."),
            ChipKey::AskPreference => ("Preguntar gustos", "¿Qué tipo de contenido te gusta más?"),
            ChipKey::Welcome => ("Bienvenida", "¡Bienvenido! Me alegra mucho tenerte por aquí."),
            ChipKey::RenewReminder => (
                "Recordar renovación",
                "Tu acceso está a punto de terminar, ¿lo renovamos?",
            ),
            ChipKey::MonthlyOffer => (
                "Ofrecer mensual",
                "Con la mensual tienes todo incluido y te sale mejor.",
            ),
            ChipKey::ThankLoyalty => ("Agradecer fidelidad", "Gracias por estar siempre ahí, eres de los mejores."),
        },
        Language::En => match key {
            ChipKey::Thanks => ("Thank", "Thank you so much for your support! 💛"),
            ChipKey::Deliver => ("Deliver", "Here's what you asked for, enjoy it."),
            ChipKey::AnythingElse => ("Anything else?", "Is there anything else you'd like?"),
            ChipKey::SafetyCheck => (
                "Verify age",
                "Before we continue I need to confirm you're over 18.",
            ),
            ChipKey::SafetyPolicy => ("18+ policy", "This profile is strictly for adults."),
            ChipKey::SoftClose => ("Soft close", "We can pick this up whenever you like, no rush."),
            ChipKey::AskDetail => ("Ask for detail", "Can you give me a bit more detail on what happened?"),
            ChipKey::SupportSteps => (
                "Support steps",
                "Try reloading the page and reopening the chat. If it's still the same, let me know.",
            ),
            ChipKey::Confirm => ("Confirm", "Is everything working for you now?"),
            ChipKey::Clarify => ("Clarify", "Which part are you unsure about?"),
            ChipKey::Validate => ("Validate", "That makes sense, I understand."),
            ChipKey::Options => ("Options", "I have a few options, let me tell you which fits you best."),
            ChipKey::Limits => ("Limits", "Here's what I can offer you."),
            ChipKey::PassOptions => ("Share options", "Here are the options I have right now."),
            ChipKey::SendLink => ("Send link", "Here's the link to unlock it."),
            ChipKey::ResolveQuestion => ("Answer question", "Any questions before you decide?"),
            ChipKey::SimpleQuestion => ("Simple question", "How's your day going?"),
            ChipKey::ReactivateShort => ("Reactivate", "It's been a while! Everything ok?"),
            ChipKey::LightOffer => ("Light offer", "I have something new today, in case you want to see it."),
            ChipKey::AskPreference => ("Ask preferences", "What kind of content do you like most?"),
            ChipKey::Welcome => ("Welcome", "Welcome! I'm really glad you're here."),
            ChipKey::RenewReminder => (
                "Renewal reminder",
                "Your access is about to end, shall we renew it?",
            ),
            ChipKey::MonthlyOffer => (
                "Offer monthly",
                "With the monthly plan everything is included and it works out cheaper.",
            ),
            ChipKey::ThankLoyalty => ("Thank loyalty", "Thanks for always being here, you're one of the best."),
        },
    }
}

pub fn chip(lang: Language, key: ChipKey) -> Chip {
    let (label, insert_text) = chip_copy(lang, key);
    Chip {
        key: key.as_str().to_string(),
        label: label.to_string(),
        insert_text: insert_text.to_string(),
    }
}

/// Dedupes by key in first-seen order, backfills with [`DEFAULT_CHIPS`] up
/// to three entries, and never returns more than five.
pub fn build_chips(lang: Language, keys: &[ChipKey]) -> Vec<Chip> {
    let mut ordered: Vec<ChipKey> = Vec::with_capacity(MAX_CHIPS);
    for key in keys {
        if ordered.len() == MAX_CHIPS {
            break;
        }
        if !ordered.contains(key) {
            ordered.push(*key);
        }
    }
    for key in DEFAULT_CHIPS {
        if ordered.len() >= MIN_CHIPS {
            break;
        }
        if !ordered.contains(&key) {
            ordered.push(key);
        }
    }
    ordered.into_iter().map(|key| chip(lang, key)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_resolves_base_subtag() {
        assert_eq!(resolve_language(Some("en-US")), Language::En);
        assert_eq!(resolve_language(Some("EN_gb")), Language::En);
        assert_eq!(resolve_language(Some("es-MX")), Language::Es);
        assert_eq!(resolve_language(Some("fr")), Language::Es);
        assert_eq!(resolve_language(None), Language::Es);
    }

    #[test]
    fn reply_has_no_table_entry() {
        assert_eq!(action_copy(Language::En, NextActionKey::Reply), None);
        assert!(action_copy(Language::Es, NextActionKey::OfferExtra).is_some());
    }

    #[test]
    fn chips_dedupe_and_cap_at_five() {
        let chips = build_chips(
            Language::En,
            &[
                ChipKey::Thanks,
                ChipKey::Thanks,
                ChipKey::Deliver,
                ChipKey::Clarify,
                ChipKey::Validate,
                ChipKey::Options,
                ChipKey::Limits,
            ],
        );
        let keys: Vec<&str> = chips.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["thanks", "deliver", "clarify", "validate", "options"]
        );
    }

    #[test]
    fn short_lists_backfill_with_default_trio() {
        let chips = build_chips(Language::Es, &[ChipKey::LightOffer]);
        let keys: Vec<&str> = chips.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["light_offer", "simple_question", "ask_preference"]);

        let empty = build_chips(Language::Es, &[]);
        assert_eq!(empty.len(), 3);
    }
}

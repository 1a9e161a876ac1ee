//! Predicates for route entries.

use std::sync::Arc;

use regex::Regex;

use crate::platform::{EntityKind, Update, UpdateKind};

pub type Predicate = Arc<dyn Fn(&Update) -> bool + Send + Sync>;

pub const ARCHIVE_LINK_PATTERN: &str = r"archive\.org/details/";
pub const GENERIC_LINK_PATTERN: &str = r"^http";

pub fn pre_checkout() -> Predicate {
    Arc::new(|update: &Update| matches!(update.kind, UpdateKind::PreCheckoutQuery(_)))
}

pub fn successful_payment() -> Predicate {
    Arc::new(|update: &Update| matches!(update.kind, UpdateKind::SuccessfulPayment(_)))
}

pub fn callback_query() -> Predicate {
    Arc::new(|update: &Update| matches!(update.kind, UpdateKind::CallbackQuery(_)))
}

/// Non-command text.
pub fn plain_text() -> Predicate {
    Arc::new(|update: &Update| update.text().is_some() && !update.is_command())
}

/// Non-command text replying to one of the bot's messages.
pub fn reply_to_bot() -> Predicate {
    Arc::new(|update: &Update| match &update.kind {
        UpdateKind::Text(message) => {
            !update.is_command() && message.reply_to.as_ref().is_some_and(|r| r.from_bot)
        }
        _ => false,
    })
}

pub fn command(name: &'static str) -> Predicate {
    Arc::new(move |update: &Update| update.command() == Some(name))
}

/// Videos and documents that are videos.
pub fn video() -> Predicate {
    Arc::new(|update: &Update| match &update.kind {
        UpdateKind::Media(media) => media.media.is_video(),
        _ => false,
    })
}

/// Text matching `regex` anywhere.
pub fn text_matches(regex: Regex) -> Predicate {
    Arc::new(move |update: &Update| update.text().is_some_and(|text| regex.is_match(text)))
}

/// Text carrying a URL entity, or matching `regex`.
pub fn url_entity_or(regex: Regex) -> Predicate {
    Arc::new(move |update: &Update| match &update.kind {
        UpdateKind::Text(message) => {
            message
                .entities
                .iter()
                .any(|entity| matches!(entity, EntityKind::Url))
                || regex.is_match(&message.text)
        }
        _ => false,
    })
}

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::info;

use crate::platform::{EntityKind, Outbound, Update, UpdateKind};
use crate::router::Handler;

/// The application handlers the route table binds.
#[derive(Clone)]
pub struct HandlerSet {
    pub start: Arc<dyn Handler>,
    pub search: Arc<dyn Handler>,
    pub search_callback: Arc<dyn Handler>,
    pub video_entry: Arc<dyn Handler>,
    pub manual_correction: Arc<dyn Handler>,
    pub archive_link: Arc<dyn Handler>,
    pub external_link: Arc<dyn Handler>,
}

impl HandlerSet {
    pub fn builtin() -> Result<Self> {
        Ok(Self {
            start: Arc::new(Start),
            search: Arc::new(Search),
            search_callback: Arc::new(SearchCallback),
            video_entry: Arc::new(VideoEntry),
            manual_correction: Arc::new(ManualCorrection),
            archive_link: Arc::new(ArchiveLink {
                identifier: Regex::new(r"archive\.org/details/([^/?#\s]+)")?,
            }),
            external_link: Arc::new(ExternalLink {
                url: Regex::new(r"https?://\S+")?,
            }),
        })
    }
}

const WELCOME: &str = "🎬 Welcome to Cinegram!\n\n\
    Send me a video, an archive.org link or any movie link.\n\n\
    Commands:\n\
    /search <title> - Find a movie\n\
    Reply to one of my messages to correct a title.";

struct Start;

#[async_trait]
impl Handler for Start {
    async fn handle(&self, update: &Update, out: &dyn Outbound) -> Result<()> {
        out.send_text(update.chat, WELCOME).await
    }
}

struct Search;

#[async_trait]
impl Handler for Search {
    async fn handle(&self, update: &Update, out: &dyn Outbound) -> Result<()> {
        let query = update.command_args().unwrap_or("");
        if query.is_empty() {
            return out
                .send_text(update.chat, "Usage: /search <movie title>")
                .await;
        }
        info!("Search from sender {}: {}", update.sender, query);
        out.send_text(update.chat, &format!("🔎 Searching for \"{}\"...", query))
            .await
    }
}

struct SearchCallback;

#[async_trait]
impl Handler for SearchCallback {
    async fn handle(&self, update: &Update, out: &dyn Outbound) -> Result<()> {
        let UpdateKind::CallbackQuery(query) = &update.kind else {
            return Ok(());
        };
        let text = match query.data.as_deref() {
            Some(data) if !data.is_empty() => format!("Selected: {}", data),
            _ => "Nothing selected".to_string(),
        };
        out.answer_callback(&query.id, Some(&text)).await
    }
}

struct VideoEntry;

#[async_trait]
impl Handler for VideoEntry {
    async fn handle(&self, update: &Update, out: &dyn Outbound) -> Result<()> {
        let UpdateKind::Media(media) = &update.kind else {
            return Ok(());
        };
        info!(
            "Video from sender {}: file {}",
            update.sender, media.file_id
        );
        let reply = match media.caption.as_deref().map(str::trim) {
            Some(caption) if !caption.is_empty() => format!(
                "📥 Video received: \"{}\". Reply to this message to correct the title.",
                caption
            ),
            _ => "📥 Video received. I'll let you know what I find. \
                  Reply to this message to correct the title."
                .to_string(),
        };
        out.send_text(update.chat, &reply).await
    }
}

struct ManualCorrection;

#[async_trait]
impl Handler for ManualCorrection {
    async fn handle(&self, update: &Update, out: &dyn Outbound) -> Result<()> {
        let UpdateKind::Text(message) = &update.kind else {
            return Ok(());
        };
        let title = message.text.trim();
        if title.is_empty() {
            return Ok(());
        }
        let original = message
            .reply_to
            .as_ref()
            .and_then(|target| target.text.as_deref())
            .unwrap_or("");
        info!(
            "Manual correction from sender {}: {:?} -> {:?}",
            update.sender, original, title
        );
        out.send_text(update.chat, &format!("✏️ Got it, using \"{}\".", title))
            .await
    }
}

struct ArchiveLink {
    identifier: Regex,
}

#[async_trait]
impl Handler for ArchiveLink {
    async fn handle(&self, update: &Update, out: &dyn Outbound) -> Result<()> {
        let identifier = update
            .text()
            .and_then(|text| self.identifier.captures(text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str());

        let reply = match identifier {
            Some(id) => format!("📚 Archive item: {}", id),
            None => "That archive.org link has no item identifier.".to_string(),
        };
        out.send_text(update.chat, &reply).await
    }
}

struct ExternalLink {
    url: Regex,
}

impl ExternalLink {
    fn first_link<'a>(&self, update: &'a Update) -> Option<&'a str> {
        let UpdateKind::Text(message) = &update.kind else {
            return None;
        };
        let text_link = message.entities.iter().find_map(|entity| match entity {
            EntityKind::TextLink(url) => Some(url.as_str()),
            _ => None,
        });
        text_link.or_else(|| self.url.find(&message.text).map(|m| m.as_str()))
    }
}

#[async_trait]
impl Handler for ExternalLink {
    async fn handle(&self, update: &Update, out: &dyn Outbound) -> Result<()> {
        let reply = match self.first_link(update) {
            Some(link) => format!("🔗 Looking into {}", link),
            None => "I couldn't find a link in that message.".to_string(),
        };
        out.send_text(update.chat, &reply).await
    }
}

pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// Identity of whoever sent an update. Session state is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderId(pub u64);

/// Destination for outbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl std::fmt::Display for SenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SenderId> for ChatId {
    /// Private chat with the sender.
    fn from(sender: SenderId) -> Self {
        ChatId(sender.0 as i64)
    }
}

/// One inbound event from the messaging backend, transport-neutral.
#[derive(Debug, Clone)]
pub struct Update {
    pub sender: SenderId,
    pub chat: ChatId,
    pub kind: UpdateKind,
}

#[derive(Debug, Clone)]
pub enum UpdateKind {
    Text(TextMessage),
    Media(MediaMessage),
    CallbackQuery(CallbackQuery),
    PreCheckoutQuery(PreCheckoutQuery),
    SuccessfulPayment(SuccessfulPayment),
}

#[derive(Debug, Clone)]
pub struct TextMessage {
    pub text: String,
    pub reply_to: Option<ReplyTarget>,
    pub entities: Vec<EntityKind>,
}

/// The message a text message replies to.
#[derive(Debug, Clone)]
pub struct ReplyTarget {
    pub from_bot: bool,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Url,
    TextLink(String),
    BotCommand,
    Other,
}

#[derive(Debug, Clone)]
pub struct MediaMessage {
    pub media: MediaKind,
    pub file_id: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Document { mime_type: Option<String> },
}

impl MediaKind {
    /// Videos, plus documents whose MIME type says they are video.
    pub fn is_video(&self) -> bool {
        match self {
            MediaKind::Video => true,
            MediaKind::Document { mime_type } => mime_type
                .as_deref()
                .is_some_and(|mime| mime.starts_with("video/")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallbackQuery {
    pub id: String,
    pub data: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PreCheckoutQuery {
    pub id: String,
    pub currency: String,
    pub total_amount: u32,
    pub invoice_payload: String,
}

#[derive(Debug, Clone)]
pub struct SuccessfulPayment {
    pub currency: String,
    pub total_amount: u32,
    pub invoice_payload: String,
    pub charge_id: String,
}

impl Update {
    /// Text body of a text message; other kinds carry none.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            UpdateKind::Text(message) => Some(&message.text),
            _ => None,
        }
    }

    pub fn is_command(&self) -> bool {
        self.text().is_some_and(|text| text.starts_with('/'))
    }

    /// Command name without the leading slash or `@botname` suffix.
    pub fn command(&self) -> Option<&str> {
        let text = self.text()?.strip_prefix('/')?;
        let word = text.split_whitespace().next()?;
        let name = word.split('@').next().unwrap_or(word);
        (!name.is_empty()).then_some(name)
    }

    /// Everything after the command word, trimmed.
    pub fn command_args(&self) -> Option<&str> {
        self.command()?;
        let text = self.text()?.trim_start();
        let args = text
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest.trim())
            .unwrap_or("");
        Some(args)
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            UpdateKind::Text(_) => "text",
            UpdateKind::Media(_) => "media",
            UpdateKind::CallbackQuery(_) => "callback_query",
            UpdateKind::PreCheckoutQuery(_) => "pre_checkout_query",
            UpdateKind::SuccessfulPayment(_) => "successful_payment",
        }
    }
}

/// Invoice as handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRequest {
    pub title: String,
    pub description: String,
    pub payload: String,
    pub currency: String,
    pub label: String,
    pub amount: u32,
    pub provider_token: Option<String>,
}

/// Answer to a pre-checkout query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutVerdict {
    Approve,
    Reject(String),
}

/// Send capability of the messaging backend.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<()>;

    async fn send_invoice(&self, chat: ChatId, invoice: &InvoiceRequest) -> Result<()>;

    async fn answer_pre_checkout(&self, query_id: &str, verdict: &CheckoutVerdict) -> Result<()>;

    async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<()>;
}

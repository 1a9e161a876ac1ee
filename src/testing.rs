//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::platform::{
    CallbackQuery, ChatId, CheckoutVerdict, EntityKind, InvoiceRequest, MediaKind, MediaMessage,
    Outbound, PreCheckoutQuery, ReplyTarget, SenderId, SuccessfulPayment, TextMessage, Update,
    UpdateKind,
};
use crate::router::Handler;

/// Everything the code under test tried to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text(ChatId, String),
    Invoice(ChatId, InvoiceRequest),
    Checkout(String, CheckoutVerdict),
    Callback(String, Option<String>),
}

#[derive(Default)]
pub struct RecordingOutbound {
    pub sent: Mutex<Vec<Sent>>,
    pub fail: bool,
}

impl RecordingOutbound {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock().await)
    }

    async fn record(&self, sent: Sent) -> Result<()> {
        self.sent.lock().await.push(sent);
        if self.fail {
            anyhow::bail!("transport down");
        }
        Ok(())
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<()> {
        self.record(Sent::Text(chat, text.to_string())).await
    }

    async fn send_invoice(&self, chat: ChatId, invoice: &InvoiceRequest) -> Result<()> {
        self.record(Sent::Invoice(chat, invoice.clone())).await
    }

    async fn answer_pre_checkout(&self, query_id: &str, verdict: &CheckoutVerdict) -> Result<()> {
        self.record(Sent::Checkout(query_id.to_string(), verdict.clone()))
            .await
    }

    async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<()> {
        self.record(Sent::Callback(
            query_id.to_string(),
            text.map(str::to_string),
        ))
        .await
    }
}

/// Handler that counts its invocations and optionally fails or panics.
#[derive(Default)]
pub struct CountingHandler {
    pub calls: AtomicUsize,
    pub fail: bool,
    pub panic: bool,
}

impl CountingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            panic: true,
            ..Self::default()
        })
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for CountingHandler {
    async fn handle(&self, _update: &Update, _out: &dyn Outbound) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic {
            panic!("handler blew up");
        }
        if self.fail {
            anyhow::bail!("handler failed");
        }
        Ok(())
    }
}

fn update(sender: u64, kind: UpdateKind) -> Update {
    Update {
        sender: SenderId(sender),
        chat: ChatId(sender as i64),
        kind,
    }
}

pub fn text_update(sender: u64, text: &str) -> Update {
    let entities = if text.starts_with('/') {
        vec![EntityKind::BotCommand]
    } else {
        Vec::new()
    };
    update(
        sender,
        UpdateKind::Text(TextMessage {
            text: text.to_string(),
            reply_to: None,
            entities,
        }),
    )
}

pub fn url_update(sender: u64, text: &str) -> Update {
    let mut update = text_update(sender, text);
    if let UpdateKind::Text(message) = &mut update.kind {
        message.entities.push(EntityKind::Url);
    }
    update
}

/// Text replying to one of the bot's own messages.
pub fn reply_update(sender: u64, text: &str) -> Update {
    let mut update = text_update(sender, text);
    if let UpdateKind::Text(message) = &mut update.kind {
        message.reply_to = Some(ReplyTarget {
            from_bot: true,
            text: Some("Which movie is this?".to_string()),
        });
    }
    update
}

pub fn video_update(sender: u64) -> Update {
    update(
        sender,
        UpdateKind::Media(MediaMessage {
            media: MediaKind::Video,
            file_id: "file-1".to_string(),
            caption: None,
        }),
    )
}

pub fn document_update(sender: u64, mime_type: &str) -> Update {
    update(
        sender,
        UpdateKind::Media(MediaMessage {
            media: MediaKind::Document {
                mime_type: Some(mime_type.to_string()),
            },
            file_id: "file-2".to_string(),
            caption: None,
        }),
    )
}

pub fn callback_update(sender: u64, data: &str) -> Update {
    update(
        sender,
        UpdateKind::CallbackQuery(CallbackQuery {
            id: "cb-1".to_string(),
            data: Some(data.to_string()),
        }),
    )
}

pub fn precheckout_update(sender: u64, payload: &str, currency: &str, amount: u32) -> Update {
    update(
        sender,
        UpdateKind::PreCheckoutQuery(PreCheckoutQuery {
            id: "pcq-1".to_string(),
            currency: currency.to_string(),
            total_amount: amount,
            invoice_payload: payload.to_string(),
        }),
    )
}

pub fn payment_update(sender: u64, payload: &str) -> Update {
    update(
        sender,
        UpdateKind::SuccessfulPayment(SuccessfulPayment {
            currency: "XTR".to_string(),
            total_amount: 50,
            invoice_payload: payload.to_string(),
            charge_id: "charge-1".to_string(),
        }),
    )
}

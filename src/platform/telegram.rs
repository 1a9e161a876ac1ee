use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, LabeledPrice, MessageEntityKind, PreCheckoutQueryId,
    UpdateKind as TgUpdateKind,
};
use tracing::{debug, info};

use crate::platform::{self as domain, CheckoutVerdict, InvoiceRequest, Outbound, SenderId};
use crate::router::RoutingTable;

/// Outbound capability backed by the Bot API.
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Outbound for TelegramOutbound {
    async fn send_text(&self, chat: domain::ChatId, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat.0), text)
            .await
            .context("sendMessage failed")?;
        Ok(())
    }

    async fn send_invoice(&self, chat: domain::ChatId, invoice: &InvoiceRequest) -> Result<()> {
        let prices = vec![LabeledPrice {
            label: invoice.label.clone(),
            amount: invoice.amount,
        }];

        let mut req = self.bot.send_invoice(
            ChatId(chat.0),
            invoice.title.clone(),
            invoice.description.clone(),
            invoice.payload.clone(),
            invoice.currency.clone(),
            prices,
        );
        if let Some(token) = &invoice.provider_token {
            req = req.provider_token(token.clone());
        }

        req.await.context("sendInvoice failed")?;
        Ok(())
    }

    async fn answer_pre_checkout(&self, query_id: &str, verdict: &CheckoutVerdict) -> Result<()> {
        let id = PreCheckoutQueryId(query_id.to_owned());
        let req = match verdict {
            CheckoutVerdict::Approve => self.bot.answer_pre_checkout_query(id, true),
            CheckoutVerdict::Reject(reason) => self
                .bot
                .answer_pre_checkout_query(id, false)
                .error_message(reason.clone()),
        };
        req.await.context("answerPreCheckoutQuery failed")?;
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<()> {
        let mut req = self
            .bot
            .answer_callback_query(CallbackQueryId(query_id.to_owned()));
        if let Some(text) = text {
            req = req.text(text.to_owned());
        }
        req.await.context("answerCallbackQuery failed")?;
        Ok(())
    }
}

/// Convert a Telegram update. Kinds the router has no use for yield `None`.
pub fn to_domain(update: &Update) -> Option<domain::Update> {
    match &update.kind {
        TgUpdateKind::Message(msg) => from_message(msg),
        TgUpdateKind::CallbackQuery(query) => {
            let sender = SenderId(query.from.id.0);
            Some(domain::Update {
                sender,
                chat: sender.into(),
                kind: domain::UpdateKind::CallbackQuery(domain::CallbackQuery {
                    id: query.id.0.clone(),
                    data: query.data.clone(),
                }),
            })
        }
        TgUpdateKind::PreCheckoutQuery(query) => {
            let sender = SenderId(query.from.id.0);
            Some(domain::Update {
                sender,
                chat: sender.into(),
                kind: domain::UpdateKind::PreCheckoutQuery(domain::PreCheckoutQuery {
                    id: query.id.0.clone(),
                    currency: query.currency.clone(),
                    total_amount: query.total_amount,
                    invoice_payload: query.invoice_payload.clone(),
                }),
            })
        }
        _ => None,
    }
}

fn from_message(msg: &Message) -> Option<domain::Update> {
    let user = msg.from.as_ref()?;
    let sender = SenderId(user.id.0);
    let chat = domain::ChatId(msg.chat.id.0);

    let kind = if let Some(payment) = msg.successful_payment() {
        domain::UpdateKind::SuccessfulPayment(domain::SuccessfulPayment {
            currency: payment.currency.clone(),
            total_amount: payment.total_amount,
            invoice_payload: payment.invoice_payload.clone(),
            charge_id: payment.telegram_payment_charge_id.0.clone(),
        })
    } else if let Some(video) = msg.video() {
        domain::UpdateKind::Media(domain::MediaMessage {
            media: domain::MediaKind::Video,
            file_id: video.file.id.0.clone(),
            caption: msg.caption().map(str::to_string),
        })
    } else if let Some(document) = msg.document() {
        domain::UpdateKind::Media(domain::MediaMessage {
            media: domain::MediaKind::Document {
                mime_type: document.mime_type.as_ref().map(|mime| mime.to_string()),
            },
            file_id: document.file.id.0.clone(),
            caption: msg.caption().map(str::to_string),
        })
    } else if let Some(text) = msg.text() {
        let entities = msg
            .entities()
            .unwrap_or_default()
            .iter()
            .map(|entity| match &entity.kind {
                MessageEntityKind::Url => domain::EntityKind::Url,
                MessageEntityKind::TextLink { url } => domain::EntityKind::TextLink(url.to_string()),
                MessageEntityKind::BotCommand => domain::EntityKind::BotCommand,
                _ => domain::EntityKind::Other,
            })
            .collect();

        let reply_to = msg.reply_to_message().map(|reply| domain::ReplyTarget {
            from_bot: reply.from.as_ref().is_some_and(|u| u.is_bot),
            text: reply.text().map(str::to_string),
        });

        domain::UpdateKind::Text(domain::TextMessage {
            text: text.to_string(),
            reply_to,
            entities,
        })
    } else {
        return None;
    };

    Some(domain::Update { sender, chat, kind })
}

/// Run the Telegram long-polling dispatcher until Ctrl-C.
///
/// Updates are distributed by sender: one sender's updates are handled in
/// arrival order, different senders concurrently.
pub async fn run(bot: Bot, router: Arc<RoutingTable>) -> Result<()> {
    info!("Starting Telegram platform...");

    let outbound: Arc<dyn Outbound> = Arc::new(TelegramOutbound::new(bot.clone()));

    let handler = dptree::entry()
        .filter_map(|update: Update| to_domain(&update))
        .endpoint(route_update);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router, outbound])
        .distribution_function(|update: &Update| update.from().map(|user| user.id))
        .default_handler(|upd| async move {
            debug!("Ignoring update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn route_update(
    update: domain::Update,
    router: Arc<RoutingTable>,
    outbound: Arc<dyn Outbound>,
) -> ResponseResult<()> {
    router.dispatch(&update, outbound.as_ref()).await;
    Ok(())
}

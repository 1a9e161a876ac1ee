use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PaymentConfig;
use crate::error::PaymentRejection;
use crate::memory::invoices::{Invoice, InvoiceStatus};
use crate::memory::{AuthStatus, SessionGuard, SessionStore};
use crate::platform::{
    ChatId, CheckoutVerdict, InvoiceRequest, Outbound, PreCheckoutQuery, SenderId,
    SuccessfulPayment,
};

pub const PAYMENT_CONFIRMED: &str = "✅ Payment received. Access unlocked, enjoy!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Authenticated,
    AlreadyAuthenticated,
}

/// Paid unlock path. Converges on the same Authenticated state as the password.
pub struct PaymentFlow {
    config: PaymentConfig,
    sessions: SessionStore,
}

impl PaymentFlow {
    pub fn new(config: PaymentConfig, sessions: SessionStore) -> Self {
        Self { config, sessions }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Record a fresh invoice for the locked session and build the request
    /// to send.
    ///
    /// The session moves to PendingPayment before anything is sent, so a
    /// transport failure afterwards leaves an unused outstanding invoice and
    /// nothing worse. An error here means nothing was recorded for sending.
    pub async fn prepare_invoice(&self, session: &mut SessionGuard) -> Result<InvoiceRequest> {
        let invoice = Invoice {
            payload: Uuid::new_v4().to_string(),
            sender: session.sender,
            amount: self.config.amount,
            currency: self.config.currency.clone(),
            status: InvoiceStatus::Outstanding,
            created_at: Utc::now(),
        };
        self.sessions
            .record_invoice(&invoice)
            .await
            .context("Failed to record invoice")?;
        session.set_status(AuthStatus::PendingPayment).await?;

        debug!("Prepared invoice {} for sender {}", invoice.payload, invoice.sender);
        Ok(InvoiceRequest {
            title: self.config.title.clone(),
            description: self.config.description.clone(),
            payload: invoice.payload,
            currency: invoice.currency,
            label: self.config.label.clone(),
            amount: invoice.amount,
            provider_token: Some(self.config.provider_token.clone()).filter(|t| !t.is_empty()),
        })
    }

    /// Check a checkout against the invoice it claims to pay.
    pub async fn validate(
        &self,
        sender: SenderId,
        query: &PreCheckoutQuery,
    ) -> Result<(), PaymentRejection> {
        match self.sessions.lock(sender).await {
            Ok(session) if session.is_authenticated() => {
                return Err(PaymentRejection::AlreadyAuthenticated)
            }
            Ok(_) => {}
            Err(e) => {
                error!("Session lookup failed for sender {}: {:#}", sender, e);
                return Err(PaymentRejection::Unavailable);
            }
        }

        let invoice = match self.sessions.find_invoice(&query.invoice_payload).await {
            Ok(Some(invoice)) => invoice,
            Ok(None) => return Err(PaymentRejection::UnknownInvoice),
            Err(e) => {
                error!("Invoice lookup failed for sender {}: {:#}", sender, e);
                return Err(PaymentRejection::Unavailable);
            }
        };

        if invoice.sender != sender {
            return Err(PaymentRejection::WrongSender);
        }
        if invoice.status == InvoiceStatus::Paid {
            return Err(PaymentRejection::AlreadyPaid);
        }
        if query.currency != invoice.currency {
            return Err(PaymentRejection::CurrencyMismatch {
                expected: invoice.currency,
                got: query.currency.clone(),
            });
        }
        if query.total_amount != invoice.amount {
            return Err(PaymentRejection::AmountMismatch {
                expected: invoice.amount,
                got: query.total_amount,
            });
        }
        Ok(())
    }

    /// Approve or reject a pre-checkout query. Never touches session state.
    pub async fn precheckout(
        &self,
        sender: SenderId,
        query: &PreCheckoutQuery,
        out: &dyn Outbound,
    ) -> CheckoutVerdict {
        let verdict = match self.validate(sender, query).await {
            Ok(()) => {
                info!(
                    "Pre-checkout approved for sender {}: {}",
                    sender, query.invoice_payload
                );
                CheckoutVerdict::Approve
            }
            Err(rejection) => {
                warn!(
                    "Pre-checkout rejected for sender {} ({}): {:?}",
                    sender, query.invoice_payload, rejection
                );
                CheckoutVerdict::Reject(rejection.to_string())
            }
        };

        if let Err(e) = out.answer_pre_checkout(&query.id, &verdict).await {
            error!("Failed to answer pre-checkout query {}: {:#}", query.id, e);
        }
        verdict
    }

    /// Settle a captured payment. Redelivered confirmations are no-ops.
    pub async fn finalize(
        &self,
        sender: SenderId,
        chat: ChatId,
        payment: &SuccessfulPayment,
        out: &dyn Outbound,
    ) -> Result<FinalizeOutcome> {
        let mut session = self.sessions.lock(sender).await?;

        let newly_paid = self
            .sessions
            .mark_invoice_paid(&payment.invoice_payload, &payment.charge_id)
            .await?;

        if session.is_authenticated() {
            debug!(
                "Duplicate payment confirmation for sender {} ({})",
                sender, payment.invoice_payload
            );
            return Ok(FinalizeOutcome::AlreadyAuthenticated);
        }

        if !newly_paid {
            warn!(
                "Payment {} from sender {} matched no outstanding invoice; unlocking anyway",
                payment.invoice_payload, sender
            );
        }

        session.set_status(AuthStatus::Authenticated).await?;
        info!(
            "Sender {} authenticated by payment ({} {})",
            sender, payment.total_amount, payment.currency
        );

        if let Err(e) = out.send_text(chat, PAYMENT_CONFIRMED).await {
            error!("Failed to confirm payment to sender {}: {:#}", sender, e);
        }
        Ok(FinalizeOutcome::Authenticated)
    }
}

pub mod payment;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::memory::{AuthStatus, SessionState, SessionStore};
use crate::platform::{Outbound, SenderId, Update};
use crate::router::Handler;

use self::payment::PaymentFlow;

pub const PASSWORD_PROMPT: &str = "🔒 This bot is private. Send the access password to continue.";
pub const PASSWORD_ACCEPTED: &str = "✅ Access granted. Send /start to begin.";
pub const PASSWORD_REJECTED: &str = "❌ Incorrect password. Try again.";
pub const GATE_UNAVAILABLE: &str = "⚠️ Something went wrong, please try again in a moment.";

/// Outcome of checking a sender against a protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    Deny(String),
    RequirePayment,
}

/// What a protected call ended in.
#[derive(Debug)]
pub enum Gated {
    /// The inner handler ran; its result is passed through.
    Ran(Result<()>),
    /// The gate intercepted and prompted the sender instead.
    Blocked(AuthDecision),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordOutcome {
    Accepted,
    AlreadyAuthenticated,
    Rejected,
    Ignored,
}

/// Gates protected handlers and owns the session lifecycle.
pub struct AuthGate {
    sessions: SessionStore,
    payments: Arc<PaymentFlow>,
    secret: Option<String>,
}

impl AuthGate {
    pub fn new(sessions: SessionStore, payments: Arc<PaymentFlow>, secret: Option<String>) -> Self {
        if secret.is_none() && !payments.enabled() {
            warn!("Neither a password nor payments are configured; protected routes are unreachable");
        }
        Self {
            sessions,
            payments,
            secret,
        }
    }

    pub fn decide(&self, state: &SessionState) -> AuthDecision {
        if state.is_authenticated() {
            AuthDecision::Allow
        } else if self.payments.enabled() {
            AuthDecision::RequirePayment
        } else {
            AuthDecision::Deny("password required".to_string())
        }
    }

    /// Whether the sender is currently authenticated. Store errors read as no.
    pub async fn is_authenticated(&self, sender: SenderId) -> bool {
        match self.sessions.lock(sender).await {
            Ok(session) => session.is_authenticated(),
            Err(e) => {
                warn!("Session lookup failed for sender {}: {:#}", sender, e);
                false
            }
        }
    }

    /// Run `inner` if the sender is authenticated, otherwise prompt them.
    ///
    /// `authenticated_on_arrival` is the sender's status before any route
    /// saw this update. An update that itself unlocked the sender is not
    /// forwarded to `inner`, and gets no further prompt.
    ///
    /// The sender's session stays locked from the check until `inner`
    /// returns. Never fails: gate-side errors are logged and end in a
    /// blocked decision.
    pub async fn run_protected(
        &self,
        update: &Update,
        out: &dyn Outbound,
        inner: &dyn Handler,
        authenticated_on_arrival: bool,
    ) -> Gated {
        let sender = update.sender;
        let mut session = match self.sessions.lock(sender).await {
            Ok(session) => session,
            Err(e) => {
                error!("Session lookup failed for sender {}: {:#}", sender, e);
                self.notify(update, GATE_UNAVAILABLE, out).await;
                return Gated::Blocked(AuthDecision::Deny("session unavailable".to_string()));
            }
        };

        let decision = self.decide(&session);
        match decision {
            AuthDecision::Allow if !authenticated_on_arrival => {
                debug!(
                    "Sender {} was unlocked by this update; not forwarding it",
                    sender
                );
                Gated::Blocked(AuthDecision::Deny("unlocked by this update".to_string()))
            }
            AuthDecision::Allow => {
                if let Err(e) = session.touch().await {
                    warn!("Failed to record activity for sender {}: {:#}", sender, e);
                }
                Gated::Ran(inner.handle(update, out).await)
            }
            AuthDecision::RequirePayment => {
                debug!("Sender {} not authenticated, sending invoice", sender);
                match self.payments.prepare_invoice(&mut session).await {
                    Ok(invoice) => {
                        if let Err(e) = out.send_invoice(update.chat, &invoice).await {
                            error!("Failed to send invoice to sender {}: {:#}", sender, e);
                        }
                    }
                    Err(e) => {
                        error!("Failed to issue invoice to sender {}: {:#}", sender, e);
                        self.notify(update, GATE_UNAVAILABLE, out).await;
                    }
                }
                Gated::Blocked(decision)
            }
            AuthDecision::Deny(_) => {
                debug!("Sender {} not authenticated, asking for password", sender);
                if let Err(e) = session.set_status(AuthStatus::PendingPassword).await {
                    warn!("Failed to save session for sender {}: {:#}", sender, e);
                }
                self.notify(update, PASSWORD_PROMPT, out).await;
                Gated::Blocked(decision)
            }
        }
    }

    /// Treat free text as a possible password.
    pub async fn handle_password_attempt(
        &self,
        update: &Update,
        out: &dyn Outbound,
    ) -> Result<PasswordOutcome> {
        let Some(text) = update.text() else {
            return Ok(PasswordOutcome::Ignored);
        };

        let mut session = self.sessions.lock(update.sender).await?;
        if session.is_authenticated() {
            session.touch().await?;
            return Ok(PasswordOutcome::AlreadyAuthenticated);
        }

        if self.secret.as_deref() == Some(text) {
            session.set_status(AuthStatus::Authenticated).await?;
            info!("Sender {} authenticated by password", update.sender);
            self.notify(update, PASSWORD_ACCEPTED, out).await;
            return Ok(PasswordOutcome::Accepted);
        }

        // Every free-text message lands here; only answer senders we prompted.
        match session.auth_status {
            AuthStatus::PendingPassword | AuthStatus::PendingPayment => {
                debug!("Wrong password from sender {}", update.sender);
                self.notify(update, PASSWORD_REJECTED, out).await;
                Ok(PasswordOutcome::Rejected)
            }
            _ => Ok(PasswordOutcome::Ignored),
        }
    }

    async fn notify(&self, update: &Update, text: &str, out: &dyn Outbound) {
        if let Err(e) = out.send_text(update.chat, text).await {
            error!("Failed to message sender {}: {:#}", update.sender, e);
        }
    }
}

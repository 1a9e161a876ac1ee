pub mod filters;

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::FutureExt;
use regex::Regex;
use tracing::{debug, error, warn};

use crate::auth::payment::PaymentFlow;
use crate::auth::{AuthDecision, AuthGate, Gated};
use crate::handlers::HandlerSet;
use crate::platform::{Outbound, Update, UpdateKind};

use self::filters::Predicate;

/// Payment, auth and correction routes; all unprotected.
pub const GROUP_INTERCEPT: i32 = 0;
/// Application routes.
pub const GROUP_APP: i32 = 1;

/// Something that can act on an update. The router ignores what it does.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, update: &Update, out: &dyn Outbound) -> Result<()>;
}

pub struct RouteEntry {
    pub group: i32,
    pub name: &'static str,
    pub predicate: Predicate,
    pub handler: Arc<dyn Handler>,
    pub protected: bool,
}

#[derive(Debug)]
pub enum Outcome {
    Completed,
    Failed(String),
    Gated(AuthDecision),
}

/// A route that fired for an update.
#[derive(Debug)]
pub struct Fired {
    pub route: &'static str,
    pub outcome: Outcome,
}

/// Ordered dispatch table.
///
/// Groups run in ascending order and are independent of one another: every
/// group gets its own pass over the update and commits to its first match,
/// so one update can fire at most one route per group. Protected routes are
/// judged on the sender's status as it was when the update arrived.
pub struct RoutingTable {
    groups: BTreeMap<i32, Vec<RouteEntry>>,
    gate: Arc<AuthGate>,
}

impl RoutingTable {
    pub fn new(gate: Arc<AuthGate>) -> Self {
        Self {
            groups: BTreeMap::new(),
            gate,
        }
    }

    /// The bot's route table, highest priority first within each group.
    pub fn standard(
        gate: Arc<AuthGate>,
        payments: Arc<PaymentFlow>,
        handlers: HandlerSet,
    ) -> Result<Self> {
        let archive = Regex::new(filters::ARCHIVE_LINK_PATTERN).context("archive link pattern")?;
        let link = Regex::new(filters::GENERIC_LINK_PATTERN).context("generic link pattern")?;

        let mut table = Self::new(Arc::clone(&gate));

        table.register(
            GROUP_INTERCEPT,
            "precheckout",
            filters::pre_checkout(),
            Arc::new(PrecheckoutRoute(Arc::clone(&payments))),
            false,
        );
        table.register(
            GROUP_INTERCEPT,
            "successful_payment",
            filters::successful_payment(),
            Arc::new(FinalizeRoute(payments)),
            false,
        );
        // Reachable mid-auth so users can always fix a wrong guess.
        table.register(
            GROUP_INTERCEPT,
            "manual_correction",
            filters::reply_to_bot(),
            handlers.manual_correction,
            false,
        );
        table.register(
            GROUP_INTERCEPT,
            "password",
            filters::plain_text(),
            Arc::new(PasswordRoute(gate)),
            false,
        );

        table.register(
            GROUP_APP,
            "start",
            filters::command("start"),
            handlers.start,
            true,
        );
        table.register(
            GROUP_APP,
            "search",
            filters::command("search"),
            handlers.search,
            true,
        );
        // Not gated: a callback has no good place to show an invoice.
        table.register(
            GROUP_APP,
            "search_callback",
            filters::callback_query(),
            handlers.search_callback,
            false,
        );
        table.register(
            GROUP_APP,
            "video_entry",
            filters::video(),
            handlers.video_entry,
            true,
        );
        table.register(
            GROUP_APP,
            "archive_link",
            filters::text_matches(archive),
            handlers.archive_link,
            true,
        );
        table.register(
            GROUP_APP,
            "external_link",
            filters::url_entity_or(link),
            handlers.external_link,
            true,
        );

        Ok(table)
    }

    pub fn register(
        &mut self,
        group: i32,
        name: &'static str,
        predicate: Predicate,
        handler: Arc<dyn Handler>,
        protected: bool,
    ) {
        self.groups.entry(group).or_default().push(RouteEntry {
            group,
            name,
            predicate,
            handler,
            protected,
        });
    }

    pub fn entries(&self) -> impl Iterator<Item = &RouteEntry> {
        self.groups.values().flatten()
    }

    /// Route one update. Handler errors and panics are logged and reported,
    /// never propagated.
    pub async fn dispatch(&self, update: &Update, out: &dyn Outbound) -> Vec<Fired> {
        let matched: Vec<&RouteEntry> = self
            .groups
            .values()
            .filter_map(|entries| entries.iter().find(|entry| (entry.predicate)(update)))
            .collect();

        if matched.is_empty() {
            debug!(
                "No route for {} update from sender {}",
                update.kind_name(),
                update.sender
            );
            return Vec::new();
        }

        let authenticated_on_arrival = if matched.iter().any(|entry| entry.protected) {
            self.gate.is_authenticated(update.sender).await
        } else {
            false
        };

        let mut fired = Vec::with_capacity(matched.len());
        for entry in matched {
            debug!(
                "Update {} from sender {} matched route '{}' (group {})",
                update.kind_name(),
                update.sender,
                entry.name,
                entry.group
            );

            let outcome = self
                .invoke(entry, update, out, authenticated_on_arrival)
                .await;
            match &outcome {
                Outcome::Failed(reason) => error!(
                    "Route '{}' failed for sender {} ({}): {}",
                    entry.name,
                    update.sender,
                    update.kind_name(),
                    reason
                ),
                Outcome::Gated(decision) => debug!(
                    "Route '{}' gated for sender {}: {:?}",
                    entry.name, update.sender, decision
                ),
                Outcome::Completed => {}
            }

            fired.push(Fired {
                route: entry.name,
                outcome,
            });
        }
        fired
    }

    async fn invoke(
        &self,
        entry: &RouteEntry,
        update: &Update,
        out: &dyn Outbound,
        authenticated_on_arrival: bool,
    ) -> Outcome {
        let call = async {
            if entry.protected {
                match self
                    .gate
                    .run_protected(update, out, entry.handler.as_ref(), authenticated_on_arrival)
                    .await
                {
                    Gated::Ran(result) => result.map(|()| None),
                    Gated::Blocked(decision) => Ok(Some(decision)),
                }
            } else {
                entry.handler.handle(update, out).await.map(|()| None)
            }
        };

        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(None)) => Outcome::Completed,
            Ok(Ok(Some(decision))) => Outcome::Gated(decision),
            Ok(Err(e)) => Outcome::Failed(format!("{:#}", e)),
            Err(panic) => Outcome::Failed(panic_message(panic.as_ref())),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}

struct PrecheckoutRoute(Arc<PaymentFlow>);

#[async_trait]
impl Handler for PrecheckoutRoute {
    async fn handle(&self, update: &Update, out: &dyn Outbound) -> Result<()> {
        if let UpdateKind::PreCheckoutQuery(query) = &update.kind {
            self.0.precheckout(update.sender, query, out).await;
        }
        Ok(())
    }
}

struct FinalizeRoute(Arc<PaymentFlow>);

#[async_trait]
impl Handler for FinalizeRoute {
    async fn handle(&self, update: &Update, out: &dyn Outbound) -> Result<()> {
        if let UpdateKind::SuccessfulPayment(payment) = &update.kind {
            self.0
                .finalize(update.sender, update.chat, payment, out)
                .await?;
        }
        Ok(())
    }
}

struct PasswordRoute(Arc<AuthGate>);

#[async_trait]
impl Handler for PasswordRoute {
    async fn handle(&self, update: &Update, out: &dyn Outbound) -> Result<()> {
        let outcome = self.0.handle_password_attempt(update, out).await?;
        if outcome == crate::auth::PasswordOutcome::Rejected {
            warn!("Rejected password attempt from sender {}", update.sender);
        }
        Ok(())
    }
}

use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

use crate::config::SessionConfig;
use crate::memory::SessionStore;

const HEARTBEAT_CRON: &str = "0 0 * * * *";

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Background upkeep: hourly heartbeat and periodic session GC.
pub struct Scheduler {
    inner: JobScheduler,
    sessions: SessionStore,
    idle_ttl: chrono::Duration,
    invoice_ttl: chrono::Duration,
    gc_cron: String,
}

impl Scheduler {
    pub async fn new(sessions: SessionStore, config: &SessionConfig) -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self {
            inner,
            sessions,
            idle_ttl: chrono::Duration::seconds(config.idle_ttl_secs as i64),
            invoice_ttl: chrono::Duration::seconds(config.invoice_ttl_secs as i64),
            gc_cron: config.gc_cron.clone(),
        })
    }

    /// Register the heartbeat and GC jobs and start running them.
    pub async fn start(&self) -> Result<()> {
        self.schedule(HEARTBEAT_CRON, "heartbeat", || {
            Box::pin(async {
                info!("Heartbeat: bot is alive");
            })
        })
        .await?;

        let sessions = self.sessions.clone();
        let (idle_ttl, invoice_ttl) = (self.idle_ttl, self.invoice_ttl);
        self.schedule(&self.gc_cron, "session_gc", move || {
            let sessions = sessions.clone();
            Box::pin(async move {
                collect_garbage(&sessions, idle_ttl, invoice_ttl).await;
            })
        })
        .await?;

        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .context("Failed to shutdown scheduler")?;
        info!("Scheduler stopped");
        Ok(())
    }

    async fn schedule<F>(&self, cron_expr: &str, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> JobFuture + Send + Sync + 'static,
    {
        let job_name = name.to_string();
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let name = job_name.clone();
            let fut = task();
            Box::pin(async move {
                debug!("Running scheduled task: {}", name);
                fut.await;
            })
        })
        .with_context(|| format!("Invalid cron expression for '{}': {}", name, cron_expr))?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job: {}", name))?;

        info!("Scheduled task '{}' with cron: {}", name, cron_expr);
        Ok(())
    }
}

/// One GC pass. Failures are logged; the next run tries again.
pub async fn collect_garbage(
    sessions: &SessionStore,
    idle_ttl: chrono::Duration,
    invoice_ttl: chrono::Duration,
) {
    if let Err(e) = sessions.evict_idle(idle_ttl).await {
        error!("Session GC failed: {:#}", e);
    }
    match sessions.expire_invoices(invoice_ttl).await {
        Ok(0) => {}
        Ok(expired) => info!("Expired {} outstanding invoice(s)", expired),
        Err(e) => error!("Invoice GC failed: {:#}", e),
    }
}

pub mod invoices;

use std::collections::HashMap;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};
use tracing::{debug, info};

use crate::platform::SenderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Unauthenticated,
    PendingPassword,
    Authenticated,
    PendingPayment,
}

impl AuthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthStatus::Unauthenticated => "unauthenticated",
            AuthStatus::PendingPassword => "pending_password",
            AuthStatus::Authenticated => "authenticated",
            AuthStatus::PendingPayment => "pending_payment",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "pending_password" => AuthStatus::PendingPassword,
            "authenticated" => AuthStatus::Authenticated,
            "pending_payment" => AuthStatus::PendingPayment,
            _ => AuthStatus::Unauthenticated,
        }
    }
}

/// Per-sender authentication record
#[derive(Debug, Clone)]
pub struct SessionState {
    pub sender: SenderId,
    pub auth_status: AuthStatus,
    pub last_activity: DateTime<Utc>,
}

impl SessionState {
    fn new(sender: SenderId) -> Self {
        Self {
            sender,
            auth_status: AuthStatus::Unauthenticated,
            last_activity: Utc::now(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_status == AuthStatus::Authenticated
    }
}

/// Timestamps are stored as fixed-width UTC RFC 3339 so they compare as text.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Empty until the sender's row has been read.
type Slot = Arc<Mutex<Option<SessionState>>>;

/// Session state store with access serialized per sender.
///
/// Each sender gets its own slot lock, so a password attempt and a protected
/// handler check for the same sender never interleave, while other senders
/// proceed independently. Rows are written through to SQLite so
/// authenticated senders survive restarts.
#[derive(Clone)]
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
    slots: Arc<Mutex<HashMap<SenderId, Slot>>>,
}

/// Exclusive access to one sender's session for the lifetime of the guard.
pub struct SessionGuard {
    state: OwnedMappedMutexGuard<Option<SessionState>, SessionState>,
    conn: Arc<Mutex<Connection>>,
}

impl SessionStore {
    /// Open or create the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::run_migrations(&conn)?;

        info!("Session store initialized at: {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                sender_id INTEGER PRIMARY KEY,
                auth_status TEXT NOT NULL,
                last_activity TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_activity
                ON sessions(auth_status, last_activity);

            CREATE TABLE IF NOT EXISTS invoices (
                payload TEXT PRIMARY KEY,
                sender_id INTEGER NOT NULL,
                amount INTEGER NOT NULL,
                currency TEXT NOT NULL,
                status TEXT NOT NULL,
                charge_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_invoices_status
                ON invoices(status, created_at);
            ",
        )
        .context("Failed to run session store migrations")?;
        Ok(())
    }

    pub(crate) fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Lock the sender's session, creating it on first contact.
    ///
    /// The slot map is held only long enough to find or insert the slot; the
    /// row is read under the sender's own lock.
    pub async fn lock(&self, sender: SenderId) -> Result<SessionGuard> {
        let slot = Arc::clone(self.slots.lock().await.entry(sender).or_default());

        let mut slot = slot.lock_owned().await;
        if slot.is_none() {
            *slot = Some(self.load(sender).await?);
        }
        let state = OwnedMutexGuard::try_map(slot, Option::as_mut)
            .map_err(|_| anyhow!("session slot for sender {} is empty", sender))?;

        Ok(SessionGuard {
            state,
            conn: self.connection(),
        })
    }

    /// Snapshot of the sender's current status.
    #[cfg(test)]
    pub async fn status(&self, sender: SenderId) -> Result<AuthStatus> {
        Ok(self.lock(sender).await?.auth_status)
    }

    async fn load(&self, sender: SenderId) -> Result<SessionState> {
        let conn = self.conn.lock().await;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT auth_status, last_activity FROM sessions WHERE sender_id = ?1",
                rusqlite::params![sender.0 as i64],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to load session")?;

        Ok(match row {
            Some((status, last_activity)) => SessionState {
                sender,
                auth_status: AuthStatus::parse(&status),
                last_activity: parse_timestamp(&last_activity),
            },
            None => {
                debug!("New session for sender {}", sender);
                SessionState::new(sender)
            }
        })
    }

    /// Drop idle, unlocked slots from the cache and purge stale rows.
    ///
    /// Authenticated rows are kept; everything else idle for longer than
    /// `max_idle` starts over as Unauthenticated on next contact.
    pub async fn evict_idle(&self, max_idle: chrono::Duration) -> Result<usize> {
        let cutoff = Utc::now() - max_idle;

        let evicted = {
            let mut slots = self.slots.lock().await;
            let before = slots.len();
            // A slot cloned out of the map may be about to be locked; keep it.
            slots.retain(|_, slot| {
                if Arc::strong_count(slot) > 1 {
                    return true;
                }
                match slot.try_lock() {
                    Ok(state) => state
                        .as_ref()
                        .is_some_and(|state| state.last_activity >= cutoff),
                    Err(_) => true,
                }
            });
            before - slots.len()
        };

        let conn = self.conn.lock().await;
        let purged = conn
            .execute(
                "DELETE FROM sessions WHERE auth_status != ?1 AND last_activity < ?2",
                rusqlite::params![AuthStatus::Authenticated.as_str(), timestamp(cutoff)],
            )
            .context("Failed to purge idle sessions")?;

        if evicted > 0 || purged > 0 {
            info!(
                "Session GC: evicted {} cached slot(s), purged {} row(s)",
                evicted, purged
            );
        }
        Ok(evicted)
    }

    #[cfg(test)]
    pub async fn cached_len(&self) -> usize {
        self.slots.lock().await.len()
    }
}

impl SessionGuard {
    /// Set the status, refresh activity and write through.
    pub async fn set_status(&mut self, status: AuthStatus) -> Result<()> {
        self.state.auth_status = status;
        self.touch().await
    }

    /// Refresh `last_activity` and write through.
    pub async fn touch(&mut self) -> Result<()> {
        self.state.last_activity = Utc::now();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sessions (sender_id, auth_status, last_activity)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(sender_id) DO UPDATE SET
                auth_status = excluded.auth_status,
                last_activity = excluded.last_activity",
            rusqlite::params![
                self.state.sender.0 as i64,
                self.state.auth_status.as_str(),
                timestamp(self.state.last_activity),
            ],
        )
        .context("Failed to save session")?;
        Ok(())
    }
}

impl Deref for SessionGuard {
    type Target = SessionState;

    fn deref(&self) -> &SessionState {
        &self.state
    }
}

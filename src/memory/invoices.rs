use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use super::{parse_timestamp, timestamp, SessionStore};
use crate::platform::SenderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Outstanding,
    Paid,
}

impl InvoiceStatus {
    fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Outstanding => "outstanding",
            InvoiceStatus::Paid => "paid",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "paid" => InvoiceStatus::Paid,
            _ => InvoiceStatus::Outstanding,
        }
    }
}

/// An invoice the bot has sent and may see a checkout for.
#[derive(Debug, Clone)]
pub struct Invoice {
    pub payload: String,
    pub sender: SenderId,
    pub amount: u32,
    pub currency: String,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
}

impl SessionStore {
    pub async fn record_invoice(&self, invoice: &Invoice) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO invoices (payload, sender_id, amount, currency, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                invoice.payload,
                invoice.sender.0 as i64,
                invoice.amount,
                invoice.currency,
                invoice.status.as_str(),
                timestamp(invoice.created_at),
            ],
        )
        .context("Failed to insert invoice")?;
        Ok(())
    }

    pub async fn find_invoice(&self, payload: &str) -> Result<Option<Invoice>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT payload, sender_id, amount, currency, status, created_at
             FROM invoices WHERE payload = ?1",
            rusqlite::params![payload],
            |row| {
                let sender: i64 = row.get(1)?;
                let status: String = row.get(4)?;
                let created_at: String = row.get(5)?;
                Ok(Invoice {
                    payload: row.get(0)?,
                    sender: SenderId(sender as u64),
                    amount: row.get(2)?,
                    currency: row.get(3)?,
                    status: InvoiceStatus::parse(&status),
                    created_at: parse_timestamp(&created_at),
                })
            },
        )
        .optional()
        .context("Failed to load invoice")
    }

    /// Returns false if the invoice was unknown or already paid.
    pub async fn mark_invoice_paid(&self, payload: &str, charge_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                "UPDATE invoices SET status = ?1, charge_id = ?2
                 WHERE payload = ?3 AND status = ?4",
                rusqlite::params![
                    InvoiceStatus::Paid.as_str(),
                    charge_id,
                    payload,
                    InvoiceStatus::Outstanding.as_str(),
                ],
            )
            .context("Failed to update invoice status")?;
        Ok(updated > 0)
    }

    /// Delete outstanding invoices older than `max_age`.
    pub async fn expire_invoices(&self, max_age: chrono::Duration) -> Result<usize> {
        let cutoff = Utc::now() - max_age;
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM invoices WHERE status = ?1 AND created_at < ?2",
            rusqlite::params![InvoiceStatus::Outstanding.as_str(), timestamp(cutoff)],
        )
        .context("Failed to expire invoices")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_invoice(payload: &str, sender: u64) -> Invoice {
        Invoice {
            payload: payload.to_string(),
            sender: SenderId(sender),
            amount: 50,
            currency: "XTR".to_string(),
            status: InvoiceStatus::Outstanding,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_and_find() {
        let store = SessionStore::open_in_memory().unwrap();
        store.record_invoice(&make_invoice("tok-1", 42)).await.unwrap();

        let invoice = store.find_invoice("tok-1").await.unwrap().unwrap();
        assert_eq!(invoice.sender, SenderId(42));
        assert_eq!(invoice.amount, 50);
        assert_eq!(invoice.status, InvoiceStatus::Outstanding);
        assert!(store.find_invoice("tok-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_paid_only_once() {
        let store = SessionStore::open_in_memory().unwrap();
        store.record_invoice(&make_invoice("tok-1", 42)).await.unwrap();

        assert!(store.mark_invoice_paid("tok-1", "charge-a").await.unwrap());
        assert!(!store.mark_invoice_paid("tok-1", "charge-a").await.unwrap());
        assert!(!store.mark_invoice_paid("missing", "charge-b").await.unwrap());

        let invoice = store.find_invoice("tok-1").await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn test_expire_keeps_paid_invoices() {
        let store = SessionStore::open_in_memory().unwrap();
        let mut old = make_invoice("old", 1);
        old.created_at = Utc::now() - chrono::Duration::hours(2);
        let mut old_paid = make_invoice("old-paid", 1);
        old_paid.created_at = Utc::now() - chrono::Duration::hours(2);
        store.record_invoice(&old).await.unwrap();
        store.record_invoice(&old_paid).await.unwrap();
        store.record_invoice(&make_invoice("fresh", 1)).await.unwrap();
        store.mark_invoice_paid("old-paid", "c").await.unwrap();

        let expired = store.expire_invoices(chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(expired, 1);
        assert!(store.find_invoice("old").await.unwrap().is_none());
        assert!(store.find_invoice("old-paid").await.unwrap().is_some());
        assert!(store.find_invoice("fresh").await.unwrap().is_some());
    }
}

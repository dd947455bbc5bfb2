//! Notification store backends.
//!
//! The memory backend serves tests and single-process deployments; the
//! PostgreSQL backend makes the insert-if-absent atomic across processes via
//! the primary-key constraint on Reference.

use crate::error::GatewayError;
use crate::ledger::{screen_notice, NotificationLedger, NotificationRecord, RecordOutcome};
use crate::operation::PaymentNotice;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

/// Notification persistence configuration.
#[derive(Debug, Clone)]
pub enum NotificationStorageConfig {
    /// Keep records in process memory only.
    Memory,
    /// Persist records in PostgreSQL with a unique-reference constraint.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl NotificationStorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

impl Default for NotificationStorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

enum StorageBackend {
    Memory(NotificationLedger),
    Postgres(PostgresNotificationStore),
}

/// Notification ledger over a configurable backend.
pub struct PersistentNotificationLedger {
    backend: StorageBackend,
}

impl PersistentNotificationLedger {
    pub async fn bootstrap(config: NotificationStorageConfig) -> Result<Self, GatewayError> {
        let backend = match config {
            NotificationStorageConfig::Memory => StorageBackend::Memory(NotificationLedger::new()),
            NotificationStorageConfig::Postgres {
                database_url,
                max_connections,
            } => {
                let store = PostgresNotificationStore::connect(&database_url, max_connections).await?;
                store.ensure_schema().await?;
                StorageBackend::Postgres(store)
            }
        };
        Ok(Self { backend })
    }

    pub fn backend_label(&self) -> &'static str {
        match self.backend {
            StorageBackend::Memory(_) => "memory",
            StorageBackend::Postgres(_) => "postgres",
        }
    }

    /// Record a notification idempotently. See `NotificationLedger::record`
    /// for the single-process semantics; the Postgres backend extends them
    /// across processes through the unique-key constraint.
    pub async fn record(&self, notice: &PaymentNotice) -> Result<RecordOutcome, GatewayError> {
        match &self.backend {
            StorageBackend::Memory(ledger) => ledger.record(notice),
            StorageBackend::Postgres(store) => {
                if let Some(rejected) = screen_notice(notice)? {
                    return Ok(rejected);
                }
                let record = NotificationRecord::from_notice(notice, Utc::now());
                store.insert_if_absent(&record).await
            }
        }
    }

    pub async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<NotificationRecord>, GatewayError> {
        match &self.backend {
            StorageBackend::Memory(ledger) => Ok(ledger.find_by_reference(reference)),
            StorageBackend::Postgres(store) => store.find_by_reference(reference).await,
        }
    }
}

struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    async fn connect(database_url: &str, max_connections: u32) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| GatewayError::Ledger(format!("postgres connect failed: {e}")))?;
        Ok(Self { pool })
    }

    async fn ensure_schema(&self) -> Result<(), GatewayError> {
        // Reference is the primary key; the constraint is what makes
        // concurrent insert-if-absent atomic.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conecta_notifications (
                reference TEXT PRIMARY KEY,
                commerce_id TEXT NOT NULL,
                commerce_phone TEXT NOT NULL,
                issuer_phone TEXT NOT NULL,
                concept TEXT NOT NULL,
                issuer_bank TEXT NOT NULL,
                amount TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                response_code TEXT NOT NULL,
                received_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::Ledger(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conecta_notifications_commerce \
             ON conecta_notifications (commerce_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::Ledger(format!("postgres index create failed: {e}")))?;

        Ok(())
    }

    async fn insert_if_absent(
        &self,
        record: &NotificationRecord,
    ) -> Result<RecordOutcome, GatewayError> {
        let result = sqlx::query(
            r#"
            INSERT INTO conecta_notifications (
                reference,
                commerce_id,
                commerce_phone,
                issuer_phone,
                concept,
                issuer_bank,
                amount,
                occurred_at,
                response_code,
                received_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (reference) DO NOTHING
            "#,
        )
        .bind(&record.reference)
        .bind(&record.commerce_id)
        .bind(&record.commerce_phone)
        .bind(&record.issuer_phone)
        .bind(&record.concept)
        .bind(&record.issuer_bank)
        .bind(&record.amount)
        .bind(&record.occurred_at)
        .bind(&record.response_code)
        .bind(record.received_at)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::Ledger(format!("postgres insert failed: {e}")))?;

        if result.rows_affected() == 1 {
            Ok(RecordOutcome::Stored)
        } else {
            Ok(RecordOutcome::AlreadyExists)
        }
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<NotificationRecord>, GatewayError> {
        let row = sqlx::query(
            r#"
            SELECT
                reference,
                commerce_id,
                commerce_phone,
                issuer_phone,
                concept,
                issuer_bank,
                amount,
                occurred_at,
                response_code,
                received_at
            FROM conecta_notifications
            WHERE reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GatewayError::Ledger(format!("postgres lookup failed: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let record = NotificationRecord {
            reference: decode(&row, "reference")?,
            commerce_id: decode(&row, "commerce_id")?,
            commerce_phone: decode(&row, "commerce_phone")?,
            issuer_phone: decode(&row, "issuer_phone")?,
            concept: decode(&row, "concept")?,
            issuer_bank: decode(&row, "issuer_bank")?,
            amount: decode(&row, "amount")?,
            occurred_at: decode(&row, "occurred_at")?,
            response_code: decode(&row, "response_code")?,
            received_at: row
                .try_get("received_at")
                .map_err(|e| GatewayError::Ledger(format!("postgres decode received_at failed: {e}")))?,
        };
        Ok(Some(record))
    }
}

fn decode(row: &sqlx::postgres::PgRow, column: &str) -> Result<String, GatewayError> {
    row.try_get(column)
        .map_err(|e| GatewayError::Ledger(format!("postgres decode {column} failed: {e}")))
}

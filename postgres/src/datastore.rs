//! `PostgreSQL` implementation of the receipt desk [`Datastore`].

use chrono::{DateTime, Utc};
use receipt_desk_core::audit::AuditStatus;
use receipt_desk_core::datastore::{
    Datastore, DatastoreError, DatastoreFuture, PatchOutcome, TicketPatch,
};
use receipt_desk_core::types::{
    Agent, AgentId, Customer, CustomerHistoryEntry, CustomerId, DeliveryStatus, Money,
    PaymentMode, StaffRole, Ticket, TicketId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use uuid::Uuid;

/// Name of the unique constraint on `(agent_id, ticket_number)`.
const TICKET_NUMBER_CONSTRAINT: &str = "tickets_agent_number_key";

/// `PostgreSQL` unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

const TICKET_COLUMNS: &str = r"
    id, customer_id, customer_name, customer_phone, agent_id, agent_name,
    payment_amount_cents, payment_mode, bank_receipt_number, ticket_number, date,
    reason_for_payment, delivery_status, audit_status, audited_by, audited_at,
    audit_note, receipt_html
";

const AGENT_COLUMNS: &str =
    "id, name, role, range_start, range_end, current_number, is_active";

/// Connection pool settings.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Maximum pool size
    pub max_connections: u32,
    /// Minimum idle connections
    pub min_connections: u32,
    /// Timeout for acquiring a connection
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// PostgreSQL-backed datastore.
///
/// Uses runtime-checked queries against the schema created by
/// [`PostgresDatastore::migrate`]:
///
/// - `agents`: staff accounts and their ticket-number ranges
/// - `customers`: registered customers, unique by phone number
/// - `tickets`: issued receipts, unique by `(agent_id, ticket_number)`
/// - `customer_history`: append-only issuance ledger
///
/// # Example
///
/// ```ignore
/// use receipt_desk_postgres::{PoolConfig, PostgresDatastore};
///
/// let store = PostgresDatastore::connect("postgres://localhost/receipts", &PoolConfig::default()).await?;
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresDatastore {
    pool: PgPool,
}

impl PostgresDatastore {
    /// Create a datastore from an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError::Connection`] if the database is unreachable.
    pub async fn connect(database_url: &str, config: &PoolConfig) -> Result<Self, DatastoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| DatastoreError::Connection(format!("Failed to connect: {e}")))?;

        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connected to PostgreSQL"
        );

        Ok(Self::from_pool(pool))
    }

    /// Create the schema if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError::Data`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), DatastoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatastoreError::Data(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or update a staff account.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError`] if the write fails.
    pub async fn upsert_agent(&self, agent: &Agent) -> Result<(), DatastoreError> {
        sqlx::query(
            r"
            INSERT INTO agents (id, name, role, range_start, range_end, current_number, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                role = EXCLUDED.role,
                range_start = EXCLUDED.range_start,
                range_end = EXCLUDED.range_end,
                current_number = EXCLUDED.current_number,
                is_active = EXCLUDED.is_active
            ",
        )
        .bind(agent.id.as_uuid())
        .bind(&agent.name)
        .bind(agent.role.as_str())
        .bind(agent.range_start)
        .bind(agent.range_end)
        .bind(agent.current_number)
        .bind(agent.is_active)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    /// Insert or update a customer.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError`] if the write fails.
    pub async fn upsert_customer(&self, customer: &Customer) -> Result<(), DatastoreError> {
        sqlx::query(
            r"
            INSERT INTO customers (id, name, phone_number, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                phone_number = EXCLUDED.phone_number,
                is_active = EXCLUDED.is_active
            ",
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.name)
        .bind(&customer.phone_number)
        .bind(customer.is_active)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    /// Customer-history entries for one customer, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError`] if the query fails.
    pub async fn customer_history(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<CustomerHistoryEntry>, DatastoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, customer_id, ticket_id, ticket_number, amount_cents, date, agent_name
            FROM customer_history
            WHERE customer_id = $1
            ORDER BY date ASC
            ",
        )
        .bind(customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.iter().map(row_to_history).collect()
    }

    async fn patch_ticket(
        &self,
        ticket_id: TicketId,
        expected_status: Option<AuditStatus>,
        patch: &TicketPatch,
    ) -> Result<PatchOutcome, DatastoreError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&query)
            .bind(ticket_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?;

        let Some(row) = row else {
            return Ok(PatchOutcome::NotFound);
        };
        let mut ticket = row_to_ticket(&row)?;

        if let Some(expected) = expected_status {
            if ticket.audit_status != expected {
                return Ok(PatchOutcome::StatusChanged {
                    actual: ticket.audit_status,
                });
            }
        }

        patch.apply_to(&mut ticket);

        sqlx::query(
            r"
            UPDATE tickets
            SET delivery_status = $2,
                audit_status = $3,
                audited_by = $4,
                audited_at = $5,
                audit_note = $6
            WHERE id = $1
            ",
        )
        .bind(ticket_id.as_uuid())
        .bind(ticket.delivery_status.as_str())
        .bind(ticket.audit_status.as_str())
        .bind(&ticket.audited_by)
        .bind(ticket.audited_at)
        .bind(&ticket.audit_note)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;

        Ok(PatchOutcome::Applied(Box::new(ticket)))
    }
}

impl Datastore for PostgresDatastore {
    fn find_customer_by_phone<'a>(
        &'a self,
        phone_number: &'a str,
    ) -> DatastoreFuture<'a, Option<Customer>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, name, phone_number, is_active FROM customers WHERE phone_number = $1",
            )
            .bind(phone_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

            row.as_ref().map(row_to_customer).transpose()
        })
    }

    fn find_agent_by_name<'a>(&'a self, name: &'a str) -> DatastoreFuture<'a, Option<Agent>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {AGENT_COLUMNS} FROM agents WHERE name = $1 AND role = $2 LIMIT 1"
            );
            let row = sqlx::query(&query)
                .bind(name)
                .bind(StaffRole::IssuingAgent.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(classify)?;

            row.as_ref().map(row_to_agent).transpose()
        })
    }

    fn find_agent_by_id(&self, agent_id: AgentId) -> DatastoreFuture<'_, Option<Agent>> {
        Box::pin(async move {
            let query = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1");
            let row = sqlx::query(&query)
                .bind(agent_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(classify)?;

            row.as_ref().map(row_to_agent).transpose()
        })
    }

    fn update_agent_current_number(
        &self,
        agent_id: AgentId,
        expected: Option<i64>,
        next: i64,
    ) -> DatastoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE agents
                SET current_number = $3
                WHERE id = $1 AND current_number IS NOT DISTINCT FROM $2
                ",
            )
            .bind(agent_id.as_uuid())
            .bind(expected)
            .bind(next)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn create_ticket<'a>(&'a self, ticket: &'a Ticket) -> DatastoreFuture<'a, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                INSERT INTO tickets (
                    id, customer_id, customer_name, customer_phone, agent_id, agent_name,
                    payment_amount_cents, payment_mode, bank_receipt_number, ticket_number, date,
                    reason_for_payment, delivery_status, audit_status, audited_by, audited_at,
                    audit_note, receipt_html
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
                ON CONFLICT (id) DO NOTHING
                ",
            )
            .bind(ticket.id.as_uuid())
            .bind(ticket.customer_id.as_uuid())
            .bind(&ticket.customer_name)
            .bind(&ticket.customer_phone)
            .bind(ticket.agent_id.as_uuid())
            .bind(&ticket.agent_name)
            .bind(ticket.payment_amount.cents())
            .bind(ticket.payment_mode.label())
            .bind(ticket.payment_mode.bank_receipt_number())
            .bind(&ticket.ticket_number)
            .bind(ticket.date)
            .bind(&ticket.reason_for_payment)
            .bind(ticket.delivery_status.as_str())
            .bind(ticket.audit_status.as_str())
            .bind(&ticket.audited_by)
            .bind(ticket.audited_at)
            .bind(&ticket.audit_note)
            .bind(&ticket.receipt_html)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(sqlx::Error::Database(db))
                    if db.code().as_deref() == Some(UNIQUE_VIOLATION)
                        && db.constraint() == Some(TICKET_NUMBER_CONSTRAINT) =>
                {
                    Err(DatastoreError::DuplicateTicketNumber {
                        agent_id: ticket.agent_id,
                        ticket_number: ticket.ticket_number.clone(),
                    })
                }
                Err(e) => Err(classify(e)),
            }
        })
    }

    fn update_ticket_fields<'a>(
        &'a self,
        ticket_id: TicketId,
        expected_status: Option<AuditStatus>,
        patch: &'a TicketPatch,
    ) -> DatastoreFuture<'a, PatchOutcome> {
        Box::pin(self.patch_ticket(ticket_id, expected_status, patch))
    }

    fn find_ticket_by_id(&self, ticket_id: TicketId) -> DatastoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1");
            let row = sqlx::query(&query)
                .bind(ticket_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(classify)?;

            row.as_ref().map(row_to_ticket).transpose()
        })
    }

    fn create_customer_history<'a>(
        &'a self,
        entry: &'a CustomerHistoryEntry,
    ) -> DatastoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO customer_history (id, customer_id, ticket_id, ticket_number, amount_cents, date, agent_name)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                ",
            )
            .bind(entry.id.as_uuid())
            .bind(entry.customer_id.as_uuid())
            .bind(entry.ticket_id.as_uuid())
            .bind(&entry.ticket_number)
            .bind(entry.amount.cents())
            .bind(entry.date)
            .bind(&entry.agent_name)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
            Ok(())
        })
    }
}

/// Split sqlx failures into retryable connection errors and data errors.
fn classify(err: sqlx::Error) -> DatastoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Tls(_) => {
            tracing::warn!(error = %err, "Database connection error");
            metrics::counter!("receipt_desk_datastore_errors_total", "kind" => "connection")
                .increment(1);
            DatastoreError::Connection(err.to_string())
        }
        other => {
            metrics::counter!("receipt_desk_datastore_errors_total", "kind" => "data").increment(1);
            DatastoreError::Data(other.to_string())
        }
    }
}

fn decode<T>(row: &PgRow, column: &str) -> Result<T, DatastoreError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| DatastoreError::Data(format!("Failed to decode {column}: {e}")))
}

fn row_to_agent(row: &PgRow) -> Result<Agent, DatastoreError> {
    let role: String = decode(row, "role")?;
    Ok(Agent {
        id: AgentId::from_uuid(decode::<Uuid>(row, "id")?),
        name: decode(row, "name")?,
        role: StaffRole::parse(&role)
            .ok_or_else(|| DatastoreError::Data(format!("Invalid staff role: {role}")))?,
        range_start: decode(row, "range_start")?,
        range_end: decode(row, "range_end")?,
        // An undecodable counter is treated as uninitialized
        current_number: row.try_get::<Option<i64>, _>("current_number").ok().flatten(),
        is_active: decode(row, "is_active")?,
    })
}

fn row_to_customer(row: &PgRow) -> Result<Customer, DatastoreError> {
    Ok(Customer {
        id: CustomerId::from_uuid(decode::<Uuid>(row, "id")?),
        name: decode(row, "name")?,
        phone_number: decode(row, "phone_number")?,
        is_active: decode(row, "is_active")?,
    })
}

fn row_to_ticket(row: &PgRow) -> Result<Ticket, DatastoreError> {
    let mode: String = decode(row, "payment_mode")?;
    let payment_mode = match mode.as_str() {
        "cash" => PaymentMode::Cash,
        "bank" => PaymentMode::Bank {
            receipt_number: decode::<Option<String>>(row, "bank_receipt_number")?
                .unwrap_or_default(),
        },
        other => return Err(DatastoreError::Data(format!("Invalid payment mode: {other}"))),
    };

    let delivery: String = decode(row, "delivery_status")?;
    let audit: String = decode(row, "audit_status")?;

    Ok(Ticket {
        id: TicketId::from_uuid(decode::<Uuid>(row, "id")?),
        customer_id: CustomerId::from_uuid(decode::<Uuid>(row, "customer_id")?),
        customer_name: decode(row, "customer_name")?,
        customer_phone: decode(row, "customer_phone")?,
        agent_id: AgentId::from_uuid(decode::<Uuid>(row, "agent_id")?),
        agent_name: decode(row, "agent_name")?,
        payment_amount: Money::from_cents(decode(row, "payment_amount_cents")?),
        payment_mode,
        ticket_number: decode(row, "ticket_number")?,
        date: decode::<DateTime<Utc>>(row, "date")?,
        reason_for_payment: decode(row, "reason_for_payment")?,
        delivery_status: DeliveryStatus::parse(&delivery)
            .ok_or_else(|| DatastoreError::Data(format!("Invalid delivery status: {delivery}")))?,
        audit_status: AuditStatus::parse(&audit)
            .ok_or_else(|| DatastoreError::Data(format!("Invalid audit status: {audit}")))?,
        audited_by: decode(row, "audited_by")?,
        audited_at: decode(row, "audited_at")?,
        audit_note: decode(row, "audit_note")?,
        receipt_html: decode(row, "receipt_html")?,
    })
}

fn row_to_history(row: &PgRow) -> Result<CustomerHistoryEntry, DatastoreError> {
    Ok(CustomerHistoryEntry {
        id: receipt_desk_core::types::HistoryId::from_uuid(decode::<Uuid>(row, "id")?),
        customer_id: CustomerId::from_uuid(decode::<Uuid>(row, "customer_id")?),
        ticket_id: TicketId::from_uuid(decode::<Uuid>(row, "ticket_id")?),
        ticket_number: decode(row, "ticket_number")?,
        amount: Money::from_cents(decode(row, "amount_cents")?),
        date: decode(row, "date")?,
        agent_name: decode(row, "agent_name")?,
    })
}

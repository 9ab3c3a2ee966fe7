//! PostgreSQL Ledger
//!
//! Each balance mutation is a single statement built from data-modifying
//! CTEs: the conditional `UPDATE` and the log `INSERT` run in one statement,
//! and the `INSERT` derives its status from the `UPDATE`'s returned rows.
//! Nothing is read before it is written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool, Row};
use tracing::{debug, error, info, warn};

use super::types::{Account, LedgerOutcome, LedgerTransaction, TxnStatus, TxnType};
use super::{LedgerStore, ledger_record};
use crate::error::{WalletError, WalletResult};

/// Credit leg: unconditional on balance, conditional on the account existing
const DEPOSIT_SQL: &str = r#"
    WITH upd AS (
        UPDATE accounts SET balance = balance + $2::numeric
        WHERE id = $1::text
        RETURNING id
    ), ins AS (
        INSERT INTO transactions
            (transaction_id, account_id, amount, txn_type, sender_id, receiver_id, status)
        SELECT $3::text, $1::text, $2::numeric, $4::text, $5::text, $6::text,
               CASE WHEN EXISTS (SELECT 1 FROM upd) THEN 'completed' ELSE 'failed' END
        RETURNING status, created_at
    )
    SELECT (SELECT COUNT(*) FROM upd) AS rows_affected, ins.status, ins.created_at
    FROM ins
"#;

/// Debit leg: the `balance >= amount` guard enforces the non-negative invariant
const WITHDRAW_SQL: &str = r#"
    WITH upd AS (
        UPDATE accounts SET balance = balance - $2::numeric
        WHERE id = $1::text AND balance >= $2::numeric
        RETURNING id
    ), ins AS (
        INSERT INTO transactions
            (transaction_id, account_id, amount, txn_type, sender_id, receiver_id, status)
        SELECT $3::text, $1::text, $2::numeric, $4::text, $5::text, $6::text,
               CASE WHEN EXISTS (SELECT 1 FROM upd) THEN 'completed' ELSE 'failed' END
        RETURNING status, created_at
    )
    SELECT (SELECT COUNT(*) FROM upd) AS rows_affected, ins.status, ins.created_at
    FROM ins
"#;

/// Plain append, used only for the failed legs of a rolled-back transfer
const INSERT_RECORD_SQL: &str = r#"
    INSERT INTO transactions
        (transaction_id, account_id, amount, txn_type, sender_id, receiver_id, status)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    RETURNING created_at
"#;

const SELECT_RECORD_COLUMNS: &str = "transaction_id, account_id, amount, txn_type, sender_id, \
     receiver_id, status, created_at";

/// Balance mutation kind for [`run_leg`]
#[derive(Debug, Clone, Copy)]
enum LegKind {
    Credit,
    Debit,
}

impl LegKind {
    fn sql(&self) -> &'static str {
        match self {
            LegKind::Credit => DEPOSIT_SQL,
            LegKind::Debit => WITHDRAW_SQL,
        }
    }
}

/// PostgreSQL-backed ledger
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Run one conditional balance update + log append as one statement
///
/// Returns the written record; its status reflects the rows-affected count.
async fn run_leg<'e, E>(
    executor: E,
    kind: LegKind,
    mut record: LedgerTransaction,
) -> WalletResult<LedgerTransaction>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(kind.sql())
        .bind(&record.account_id)
        .bind(record.amount)
        .bind(&record.transaction_id)
        .bind(record.txn_type.as_str())
        .bind(&record.sender_id)
        .bind(&record.receiver_id)
        .fetch_one(executor)
        .await?;

    let rows_affected: i64 = row.try_get("rows_affected")?;
    let status: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    let status: TxnStatus = status.parse().map_err(WalletError::Storage)?;
    if status != TxnStatus::from_rows_affected(rows_affected as u64) {
        // CASE and COUNT read the same CTE; disagreement means schema drift
        error!(
            transaction_id = %record.transaction_id,
            rows_affected = rows_affected,
            status = %status,
            "Ledger statement returned inconsistent status"
        );
        return Err(WalletError::Storage(
            "inconsistent ledger statement result".to_string(),
        ));
    }

    record.status = status;
    record.timestamp = created_at;
    Ok(record)
}

async fn insert_record<'e, E>(executor: E, mut record: LedgerTransaction) -> WalletResult<LedgerTransaction>
where
    E: PgExecutor<'e>,
{
    let created_at: DateTime<Utc> = sqlx::query_scalar(INSERT_RECORD_SQL)
        .bind(&record.transaction_id)
        .bind(&record.account_id)
        .bind(record.amount)
        .bind(record.txn_type.as_str())
        .bind(&record.sender_id)
        .bind(&record.receiver_id)
        .bind(record.status.as_str())
        .fetch_one(executor)
        .await?;

    record.timestamp = created_at;
    Ok(record)
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> WalletResult<LedgerTransaction> {
    let txn_type: String = row.try_get("txn_type")?;
    let status: String = row.try_get("status")?;

    Ok(LedgerTransaction {
        transaction_id: row.try_get("transaction_id")?,
        account_id: row.try_get("account_id")?,
        amount: crate::money::normalize_amount(row.try_get::<Decimal, _>("amount")?),
        txn_type: txn_type.parse().map_err(WalletError::Storage)?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        status: status.parse().map_err(WalletError::Storage)?,
        timestamp: row.try_get("created_at")?,
    })
}

#[async_trait]
impl LedgerStore for PgLedger {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn deposit(
        &self,
        account_id: &str,
        amount: Decimal,
        txn_id: &str,
    ) -> WalletResult<LedgerOutcome> {
        let record = ledger_record(
            txn_id,
            account_id,
            amount,
            TxnType::Deposit,
            "",
            TxnStatus::Failed,
        );
        let record = run_leg(&self.pool, LegKind::Credit, record).await?;

        debug!(
            transaction_id = %txn_id,
            account_id = %account_id,
            status = %record.status,
            "Deposit statement executed"
        );
        Ok(LedgerOutcome::new(record.status, vec![record]))
    }

    async fn withdraw(
        &self,
        account_id: &str,
        amount: Decimal,
        txn_id: &str,
    ) -> WalletResult<LedgerOutcome> {
        let record = ledger_record(
            txn_id,
            account_id,
            amount,
            TxnType::Withdraw,
            "",
            TxnStatus::Failed,
        );
        let record = run_leg(&self.pool, LegKind::Debit, record).await?;

        debug!(
            transaction_id = %txn_id,
            account_id = %account_id,
            status = %record.status,
            "Withdraw statement executed"
        );
        Ok(LedgerOutcome::new(record.status, vec![record]))
    }

    async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        txn_id: &str,
    ) -> WalletResult<LedgerOutcome> {
        let mut tx = self.pool.begin().await?;

        // 1. Debit leg
        let sender = ledger_record(txn_id, from, amount, TxnType::Sender, to, TxnStatus::Failed);
        let sender = run_leg(&mut *tx, LegKind::Debit, sender).await?;

        if sender.status == TxnStatus::Failed {
            // Insufficient funds / unknown source: keep the failed sender leg
            tx.commit().await?;
            info!(
                transaction_id = %txn_id,
                from = %from,
                "Transfer failed at debit leg"
            );
            return Ok(LedgerOutcome::new(TxnStatus::Failed, vec![sender]));
        }

        // 2. Credit leg, same storage transaction
        let receiver = ledger_record(txn_id, to, amount, TxnType::Receiver, from, TxnStatus::Failed);
        let receiver = run_leg(&mut *tx, LegKind::Credit, receiver).await?;

        if receiver.status == TxnStatus::Failed {
            // Destination missing: undo the debit, then record both legs failed
            tx.rollback().await?;
            warn!(
                transaction_id = %txn_id,
                from = %from,
                to = %to,
                "Transfer credit leg hit no account - debit rolled back"
            );

            let mut tx = self.pool.begin().await?;
            let sender = insert_record(
                &mut *tx,
                ledger_record(txn_id, from, amount, TxnType::Sender, to, TxnStatus::Failed),
            )
            .await?;
            let receiver = insert_record(
                &mut *tx,
                ledger_record(txn_id, to, amount, TxnType::Receiver, from, TxnStatus::Failed),
            )
            .await?;
            tx.commit().await?;

            return Ok(LedgerOutcome::new(TxnStatus::Failed, vec![sender, receiver]));
        }

        tx.commit().await?;
        debug!(transaction_id = %txn_id, from = %from, to = %to, "Transfer committed");
        Ok(LedgerOutcome::new(
            TxnStatus::Completed,
            vec![sender, receiver],
        ))
    }

    async fn find_by_transaction_id(&self, txn_id: &str) -> WalletResult<Vec<LedgerTransaction>> {
        // Both legs share created_at (NOW() is per transaction); 'sender' sorts after 'receiver'
        let sql = format!(
            "SELECT {} FROM transactions WHERE transaction_id = $1 \
             ORDER BY created_at ASC, txn_type DESC",
            SELECT_RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(txn_id).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn create_account(&self) -> WalletResult<Account> {
        let id = uuid::Uuid::new_v4().to_string();
        let row = sqlx::query("INSERT INTO accounts (id, balance) VALUES ($1, 0) RETURNING id, balance")
            .bind(&id)
            .fetch_one(&self.pool)
            .await?;

        info!(account_id = %id, "Account created");
        Ok(Account {
            id: row.try_get("id")?,
            balance: crate::money::normalize_amount(row.try_get("balance")?),
        })
    }

    async fn get_account(&self, account_id: &str) -> WalletResult<Option<Account>> {
        let row = sqlx::query("SELECT id, balance FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Account {
                id: row.try_get("id")?,
                balance: crate::money::normalize_amount(row.try_get("balance")?),
            })),
            None => Ok(None),
        }
    }

    async fn list_transactions(&self, account_id: &str) -> WalletResult<Vec<LedgerTransaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE account_id = $1 \
             ORDER BY created_at ASC, txn_type DESC",
            SELECT_RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn health_check(&self) -> WalletResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::db::{date_from_sql, date_to_sql, decimal_from_sql};
use crate::error::{Result, SoduError};
use crate::models::{Checkpoint, Direction, LedgerTransaction};
use crate::reconciler::{get_checkpoint, list_checkpoints};

/// One calendar day inside the investigated period.
#[derive(Debug, Clone)]
pub struct DayActivity {
    pub date: NaiveDate,
    pub credits: Decimal,
    /// Magnitude of money out; always non-negative.
    pub debits: Decimal,
    pub delta: Decimal,
    /// Calculated balance rolled forward through the end of this day.
    pub running_balance: Decimal,
    pub transactions: Vec<LedgerTransaction>,
}

/// Where a checkpoint's adjustment comes from, date by date. Read-only; the
/// stored checkpoint fields are never touched.
#[derive(Debug, Clone)]
pub struct DiscrepancyReport {
    pub checkpoint: Checkpoint,
    /// Previous checkpoint's date; the period starts just after it.
    pub period_start: Option<NaiveDate>,
    pub period_start_balance: Decimal,
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    pub expected_change: Decimal,
    pub actual_change: Decimal,
    /// `actual_change - expected_change`; equals the checkpoint's adjustment.
    pub difference: Decimal,
    pub days: Vec<DayActivity>,
}

fn transaction_from_row(row: &rusqlite::Row) -> rusqlite::Result<LedgerTransaction> {
    Ok(LedgerTransaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        date: date_from_sql(&row.get::<_, String>(2)?).unwrap_or_default(),
        description: row.get(3)?,
        amount: decimal_from_sql(&row.get::<_, String>(4)?),
        direction: Direction::parse(&row.get::<_, String>(5)?).unwrap_or(Direction::Credit),
        is_adjustment: row.get::<_, i64>(6)? != 0,
        reference: row.get(7)?,
        branch: row.get(8)?,
        import_id: row.get(9)?,
    })
}

/// Break a checkpoint's period down per date to explain its adjustment.
pub fn investigate(
    conn: &Connection,
    account_id: i64,
    checkpoint_id: i64,
) -> Result<DiscrepancyReport> {
    let checkpoint = get_checkpoint(conn, checkpoint_id)?;
    if checkpoint.account_id != account_id {
        return Err(SoduError::CheckpointNotFound(checkpoint_id));
    }

    let chain = list_checkpoints(conn, account_id)?;
    let position = chain
        .iter()
        .position(|c| c.id == checkpoint_id)
        .ok_or(SoduError::CheckpointNotFound(checkpoint_id))?;
    let previous = position.checked_sub(1).map(|i| &chain[i]);
    let period_start = previous.map(|p| p.date);
    let period_start_balance = previous
        .map(|p| p.declared_balance)
        .unwrap_or(Decimal::ZERO);

    let mut stmt = conn.prepare_cached(
        "SELECT id, account_id, date, description, amount, direction, is_adjustment, \
                reference, branch, import_id \
         FROM transactions \
         WHERE account_id = ?1 AND date <= ?2 AND (?3 IS NULL OR date > ?3) \
         ORDER BY date, id",
    )?;
    let transactions = stmt
        .query_map(
            rusqlite::params![
                account_id,
                date_to_sql(checkpoint.date),
                period_start.map(date_to_sql)
            ],
            transaction_from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut by_date: BTreeMap<NaiveDate, Vec<LedgerTransaction>> = BTreeMap::new();
    for t in transactions {
        by_date.entry(t.date).or_default().push(t);
    }

    let mut days = Vec::with_capacity(by_date.len());
    let mut running = period_start_balance;
    let mut total_credits = Decimal::ZERO;
    let mut total_debits = Decimal::ZERO;
    for (date, transactions) in by_date {
        let credits: Decimal = transactions
            .iter()
            .filter(|t| t.amount.is_sign_positive())
            .map(|t| t.amount)
            .sum();
        let debits: Decimal = -transactions
            .iter()
            .filter(|t| t.amount.is_sign_negative())
            .map(|t| t.amount)
            .sum::<Decimal>();
        let delta = credits - debits;
        running += delta;
        total_credits += credits;
        total_debits += debits;
        days.push(DayActivity {
            date,
            credits,
            debits,
            delta,
            running_balance: running,
            transactions,
        });
    }

    let expected_change = total_credits - total_debits;
    let actual_change = checkpoint.declared_balance - period_start_balance;
    let difference = actual_change - expected_change;

    Ok(DiscrepancyReport {
        checkpoint,
        period_start,
        period_start_balance,
        total_credits,
        total_debits,
        expected_change,
        actual_change,
        difference,
        days,
    })
}

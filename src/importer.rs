use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::db::{date_from_sql, date_to_sql};
use crate::error::{Result, SoduError};
use crate::models::{BatchStatus, CandidateTransaction, ImportBatch};
use crate::reconciler::{self, NewTransaction};

pub fn compute_checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Checkpoint the commit creates alongside the batch, usually pre-filled
/// from the statement's detected end date and ending balance.
#[derive(Debug, Clone)]
pub struct CheckpointDraft {
    pub date: NaiveDate,
    pub declared_balance: Decimal,
    pub note: Option<String>,
}

pub struct ImportOutcome {
    pub batch_id: i64,
    pub imported: usize,
    pub skipped_duplicates: usize,
    pub quarantined: usize,
    pub duplicate_file: bool,
    pub checkpoint_id: Option<i64>,
}

fn is_duplicate_row(
    conn: &Connection,
    account_id: i64,
    date: NaiveDate,
    amount: Decimal,
    description: &str,
) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM transactions \
         WHERE account_id = ?1 AND date = ?2 AND amount = ?3 AND description = ?4",
    )?;
    Ok(stmt.exists(rusqlite::params![
        account_id,
        date_to_sql(date),
        amount.to_string(),
        description
    ])?)
}

/// Persist a parsed statement as one import batch: its transactions, the
/// optional owned checkpoint, and the recalculated chain, all in one unit.
///
/// Flagged candidates are quarantined (counted, not inserted) and rows
/// identical to an existing transaction are skipped. A file whose checksum
/// was already committed for this account short-circuits untouched.
pub fn commit_import(
    conn: &Connection,
    account_id: i64,
    file_name: &str,
    checksum: Option<&str>,
    candidates: &[CandidateTransaction],
    checkpoint: Option<&CheckpointDraft>,
) -> Result<ImportOutcome> {
    if let Some(checksum) = checksum {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM imports \
                 WHERE account_id = ?1 AND checksum = ?2 AND status = 'completed'",
                rusqlite::params![account_id, checksum],
                |row| row.get(0),
            )
            .ok();
        if let Some(batch_id) = existing {
            warn!(batch_id, file_name, "duplicate import file");
            return Ok(ImportOutcome {
                batch_id,
                imported: 0,
                skipped_duplicates: 0,
                quarantined: 0,
                duplicate_file: true,
                checkpoint_id: None,
            });
        }
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO imports (account_id, filename, checksum) VALUES (?1, ?2, ?3)",
        rusqlite::params![account_id, file_name, checksum],
    )?;
    let batch_id = tx.last_insert_rowid();

    let mut imported = 0usize;
    let mut skipped = 0usize;
    let mut quarantined = 0usize;
    let mut date_range: Option<(NaiveDate, NaiveDate)> = None;

    for candidate in candidates {
        if candidate.problem().is_some() {
            quarantined += 1;
            continue;
        }
        // problem() guarantees a date and exactly one side.
        let Some(date) = candidate.date else {
            quarantined += 1;
            continue;
        };
        let Some((amount, _direction)) = candidate.signed_amount() else {
            quarantined += 1;
            continue;
        };
        let description = candidate.description.as_deref().unwrap_or("");

        if is_duplicate_row(&tx, account_id, date, amount, description)? {
            skipped += 1;
            continue;
        }

        reconciler::insert_transaction_within(
            &tx,
            account_id,
            &NewTransaction {
                date,
                description,
                amount,
                is_adjustment: false,
                reference: candidate.reference.as_deref(),
                branch: candidate.branch.as_deref(),
                import_id: Some(batch_id),
            },
        )?;
        imported += 1;
        date_range = Some(match date_range {
            None => (date, date),
            Some((lo, hi)) => (lo.min(date), hi.max(date)),
        });
    }

    tx.execute(
        "UPDATE imports SET record_count = ?1, date_range_start = ?2, date_range_end = ?3 \
         WHERE id = ?4",
        rusqlite::params![
            imported as i64,
            date_range.map(|(lo, _)| date_to_sql(lo)),
            date_range.map(|(_, hi)| date_to_sql(hi)),
            batch_id
        ],
    )?;

    let checkpoint_id = match checkpoint {
        Some(draft) => Some(reconciler::insert_checkpoint_within(
            &tx,
            account_id,
            draft.date,
            draft.declared_balance,
            draft.note.as_deref(),
            Some(batch_id),
        )?),
        None => None,
    };

    reconciler::recalculate_within(&tx, account_id)?;
    tx.commit()?;

    debug!(batch_id, imported, skipped, quarantined, "import committed");
    Ok(ImportOutcome {
        batch_id,
        imported,
        skipped_duplicates: skipped,
        quarantined,
        duplicate_file: false,
        checkpoint_id,
    })
}

pub struct RollbackOutcome {
    pub deleted_transactions: usize,
    pub message: String,
}

pub fn get_batch(conn: &Connection, batch_id: i64) -> Result<ImportBatch> {
    conn.query_row(
        "SELECT id, account_id, filename, record_count, date_range_start, date_range_end, \
                checksum, status \
         FROM imports WHERE id = ?1",
        [batch_id],
        |row| {
            Ok(ImportBatch {
                id: row.get(0)?,
                account_id: row.get(1)?,
                file_name: row.get(2)?,
                record_count: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                date_range_start: row
                    .get::<_, Option<String>>(4)?
                    .as_deref()
                    .and_then(date_from_sql),
                date_range_end: row
                    .get::<_, Option<String>>(5)?
                    .as_deref()
                    .and_then(date_from_sql),
                checksum: row.get(6)?,
                status: match row.get::<_, String>(7)?.as_str() {
                    "rolled_back" => BatchStatus::RolledBack,
                    _ => BatchStatus::Completed,
                },
            })
        },
    )
    .map_err(|_| SoduError::BatchNotFound(batch_id))
}

/// Undo an import batch: delete its transactions and owned checkpoint, mark
/// it rolled back, recalculate, atomically. A failure anywhere leaves the
/// ledger exactly as it was; there is no partial rollback.
pub fn rollback_import(conn: &Connection, batch_id: i64) -> Result<RollbackOutcome> {
    let batch = get_batch(conn, batch_id)?;
    if batch.status == BatchStatus::RolledBack {
        return Err(SoduError::AlreadyRolledBack(batch_id));
    }

    let tx = conn.unchecked_transaction()?;
    let deleted = tx.execute("DELETE FROM transactions WHERE import_id = ?1", [batch_id])?;
    tx.execute("DELETE FROM checkpoints WHERE import_id = ?1", [batch_id])?;
    tx.execute(
        "UPDATE imports SET status = ?1 WHERE id = ?2",
        rusqlite::params![BatchStatus::RolledBack.as_str(), batch_id],
    )?;
    reconciler::recalculate_within(&tx, batch.account_id)?;
    tx.commit()?;

    debug!(batch_id, deleted, "import rolled back");
    Ok(RollbackOutcome {
        deleted_transactions: deleted,
        message: format!("Rolled back {}", batch.file_name),
    })
}

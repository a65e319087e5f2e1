use std::path::PathBuf;

use chrono::NaiveDate;

use crate::amount::parse_amount;
use crate::db::{account_id_by_name, get_connection};
use crate::error::{Result, SoduError};
use crate::fmt::money;
use crate::importer::{commit_import, compute_checksum, CheckpointDraft};
use crate::reconciler::get_checkpoint;
use crate::settings::{db_path, load_settings};
use crate::statement::{parse_statement, ParseOptions, Severity, SourceKind, Statement};

#[allow(clippy::too_many_arguments)]
pub fn run(
    file: &str,
    account: &str,
    sheet: Option<&str>,
    commit: bool,
    checkpoint_balance: Option<&str>,
    checkpoint_date: Option<&str>,
    mdy: bool,
) -> Result<()> {
    let path = PathBuf::from(file);
    let kind = SourceKind::from_path(&path)
        .ok_or_else(|| SoduError::Other(format!("unsupported file type: {file}")))?;
    let bytes = std::fs::read(&path)?;

    let mut opts = ParseOptions::new(kind);
    opts.sheet = sheet.map(str::to_string);
    opts.prefer_month_first = mdy || load_settings().prefer_month_first();

    let statement = parse_statement(&bytes, &opts)?;
    print_preview(&statement);

    if !commit {
        println!();
        println!("Preview only. Re-run with --commit to import.");
        return Ok(());
    }

    let conn = get_connection(&db_path())?;
    let account_id = account_id_by_name(&conn, account)?;

    let draft = checkpoint_draft(&statement, checkpoint_balance, checkpoint_date)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file)
        .to_string();
    let checksum = compute_checksum(&bytes);

    let outcome = commit_import(
        &conn,
        account_id,
        &file_name,
        Some(&checksum),
        &statement.candidates,
        draft.as_ref(),
    )?;

    if outcome.duplicate_file {
        println!("This file was already imported (batch {}).", outcome.batch_id);
        return Ok(());
    }

    println!();
    println!(
        "Batch {}: {} imported, {} skipped (duplicates), {} quarantined",
        outcome.batch_id, outcome.imported, outcome.skipped_duplicates, outcome.quarantined
    );
    if let Some(cp_id) = outcome.checkpoint_id {
        let cp = get_checkpoint(&conn, cp_id)?;
        if cp.is_reconciled {
            println!(
                "Checkpoint {} at {}: reconciled at {}",
                cp.id,
                cp.date,
                money(cp.declared_balance)
            );
        } else {
            println!(
                "Checkpoint {} at {}: declared {} vs calculated {} (adjustment {})",
                cp.id,
                cp.date,
                money(cp.declared_balance),
                money(cp.calculated_balance),
                money(cp.adjustment)
            );
            println!("Run `sodu investigate {account} {}` to break it down.", cp.id);
        }
    }
    Ok(())
}

fn print_preview(statement: &Statement) {
    println!(
        "Header row {} | {} column(s) | {} candidate row(s)",
        statement.table.header_row_index + 1,
        statement.table.headers.len(),
        statement.candidates.len()
    );
    if let Some(format) = statement.date_format {
        println!("Date format: {format}");
    }

    println!();
    for col in &statement.columns {
        println!(
            "  {:<24} {:<12} {:>4.0}%  {}",
            col.name,
            col.role.as_str(),
            col.confidence * 100.0,
            col.justification
        );
    }

    if statement.summary.start_date.is_some() || statement.summary.ending_balance.is_some() {
        println!();
        if let (Some(start), Some(end)) =
            (statement.summary.start_date, statement.summary.end_date)
        {
            println!("Period:          {start} to {end}");
        }
        if let Some(balance) = statement.summary.ending_balance {
            println!("Ending balance:  {}", money(balance));
        }
    }

    let warnings: Vec<_> = statement
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .collect();
    if !warnings.is_empty() {
        println!();
        for d in warnings {
            println!("  warning [{:?}]: {}", d.stage, d.message);
        }
    }
}

/// A checkpoint needs a declared balance and a date; both default from the
/// statement and can be overridden, but nothing is guessed silently: no
/// balance, no checkpoint.
fn checkpoint_draft(
    statement: &Statement,
    balance: Option<&str>,
    date: Option<&str>,
) -> Result<Option<CheckpointDraft>> {
    let declared = match balance {
        Some(raw) => Some(parse_amount(raw).ok_or_else(|| {
            SoduError::Other(format!("invalid checkpoint balance: {raw}"))
        })?),
        None => statement.summary.ending_balance,
    };
    let Some(declared) = declared else {
        return Ok(None);
    };

    let date = match date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| SoduError::Other(format!("invalid checkpoint date: {raw}")))?,
        None => match statement.summary.end_date {
            Some(d) => d,
            None => {
                return Err(SoduError::Other(
                    "no statement end date detected; pass --checkpoint-date".into(),
                ))
            }
        },
    };

    Ok(Some(CheckpointDraft {
        date,
        declared_balance: declared,
        note: None,
    }))
}

use chrono::NaiveDate;

use crate::amount::parse_amount;
use crate::db::{account_id_by_name, get_connection};
use crate::error::{Result, SoduError};
use crate::fmt::money;
use crate::reconciler;
use crate::settings::db_path;

pub fn add(account: &str, date: &str, balance: &str, note: Option<&str>) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let account_id = account_id_by_name(&conn, account)?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| SoduError::Other(format!("invalid date (want YYYY-MM-DD): {date}")))?;
    let declared = parse_amount(balance)
        .ok_or_else(|| SoduError::Other(format!("invalid balance: {balance}")))?;

    let cp = reconciler::create_checkpoint(&conn, account_id, date, declared, note, None)?;
    if cp.is_reconciled {
        println!("Checkpoint {} at {}: reconciled at {}", cp.id, cp.date, money(cp.declared_balance));
    } else {
        println!(
            "Checkpoint {} at {}: declared {} vs calculated {} (adjustment {})",
            cp.id,
            cp.date,
            money(cp.declared_balance),
            money(cp.calculated_balance),
            money(cp.adjustment)
        );
    }
    Ok(())
}

pub fn list(account: &str) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let account_id = account_id_by_name(&conn, account)?;
    let checkpoints = reconciler::list_checkpoints(&conn, account_id)?;

    if checkpoints.is_empty() {
        println!("No checkpoints for {account}.");
        return Ok(());
    }
    for cp in checkpoints {
        let state = if cp.is_reconciled { "ok" } else { "DISCREPANT" };
        let owner = if cp.import_id.is_some() { " [import]" } else { "" };
        println!(
            "{:>4}  {}  declared {:>16}  calculated {:>16}  adj {:>12}  {state}{owner}",
            cp.id,
            cp.date,
            money(cp.declared_balance),
            money(cp.calculated_balance),
            money(cp.adjustment)
        );
        if let Some(note) = cp.note {
            println!("      note: {note}");
        }
    }
    Ok(())
}

pub fn update(id: i64, balance: Option<&str>, note: Option<&str>) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let declared = match balance {
        Some(raw) => Some(
            parse_amount(raw).ok_or_else(|| SoduError::Other(format!("invalid balance: {raw}")))?,
        ),
        None => None,
    };
    let cp = reconciler::update_checkpoint(&conn, id, declared, note)?;
    if cp.is_reconciled {
        println!("Checkpoint {} at {}: reconciled at {}", cp.id, cp.date, money(cp.declared_balance));
    } else {
        println!(
            "Checkpoint {} at {}: declared {} vs calculated {} (adjustment {})",
            cp.id,
            cp.date,
            money(cp.declared_balance),
            money(cp.calculated_balance),
            money(cp.adjustment)
        );
    }
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let conn = get_connection(&db_path())?;
    reconciler::delete_checkpoint(&conn, id)?;
    println!("Deleted checkpoint {id}.");
    Ok(())
}

pub fn write_off(id: i64, note: Option<&str>) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let cp = reconciler::write_off_discrepancy(&conn, id, note)?;
    println!(
        "Checkpoint {} at {}: reconciled at {} (adjustment entry recorded)",
        cp.id,
        cp.date,
        money(cp.declared_balance)
    );
    Ok(())
}

pub fn recalculate(account: &str) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let account_id = account_id_by_name(&conn, account)?;
    let checkpoints = reconciler::recalculate(&conn, account_id)?;
    let discrepant = checkpoints.iter().filter(|c| !c.is_reconciled).count();
    println!(
        "Recalculated {} checkpoint(s); {} discrepant.",
        checkpoints.len(),
        discrepant
    );
    Ok(())
}

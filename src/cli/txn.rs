use chrono::NaiveDate;

use crate::amount::parse_amount;
use crate::db::{account_id_by_name, get_connection};
use crate::error::{Result, SoduError};
use crate::fmt::money;
use crate::models::{Direction, LedgerTransaction};
use crate::reconciler::{add_transaction, delete_transaction, NewTransaction};
use crate::settings::db_path;

pub fn add(
    account: &str,
    date: &str,
    amount: &str,
    description: &str,
    reference: Option<&str>,
) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let account_id = account_id_by_name(&conn, account)?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| SoduError::Other(format!("invalid date (want YYYY-MM-DD): {date}")))?;
    let amount = parse_amount(amount)
        .ok_or_else(|| SoduError::Other(format!("invalid amount: {amount}")))?;

    let id = add_transaction(
        &conn,
        account_id,
        &NewTransaction {
            date,
            description,
            amount,
            is_adjustment: false,
            reference,
            branch: None,
            import_id: None,
        },
    )?;
    println!("Recorded transaction {id}: {} on {date}", money(amount));
    Ok(())
}

pub fn list(account: &str, limit: usize) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let account_id = account_id_by_name(&conn, account)?;

    let mut stmt = conn.prepare(
        "SELECT id, account_id, date, description, amount, direction, is_adjustment, \
                reference, branch, import_id \
         FROM transactions WHERE account_id = ?1 \
         ORDER BY date DESC, id DESC LIMIT ?2",
    )?;
    let rows: Vec<LedgerTransaction> = stmt
        .query_map(rusqlite::params![account_id, limit as i64], |row| {
            Ok(LedgerTransaction {
                id: row.get(0)?,
                account_id: row.get(1)?,
                date: crate::db::date_from_sql(&row.get::<_, String>(2)?).unwrap_or_default(),
                description: row.get(3)?,
                amount: crate::db::decimal_from_sql(&row.get::<_, String>(4)?),
                direction: Direction::parse(&row.get::<_, String>(5)?)
                    .unwrap_or(Direction::Credit),
                is_adjustment: row.get::<_, i64>(6)? != 0,
                reference: row.get(7)?,
                branch: row.get(8)?,
                import_id: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if rows.is_empty() {
        println!("No transactions for {account}.");
        return Ok(());
    }
    for t in rows {
        let mut tags = String::new();
        if t.is_adjustment {
            tags.push_str(" [adjustment]");
        }
        if let Some(batch) = t.import_id {
            tags.push_str(&format!(" [batch {batch}]"));
        }
        let reference = t.reference.unwrap_or_default();
        println!(
            "{:>5}  {}  {:>6}  {:>16}  {:<32} {reference}{tags}",
            t.id,
            t.date,
            t.direction.as_str(),
            money(t.amount),
            t.description
        );
    }
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let conn = get_connection(&db_path())?;
    delete_transaction(&conn, id)?;
    println!("Deleted transaction {id}.");
    Ok(())
}

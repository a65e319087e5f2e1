use crate::db::{account_id_by_name, get_connection};
use crate::error::Result;
use crate::fmt::money;
use crate::investigator::investigate;
use crate::settings::db_path;

pub fn run(account: &str, checkpoint_id: i64) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let account_id = account_id_by_name(&conn, account)?;
    let report = investigate(&conn, account_id, checkpoint_id)?;

    match report.period_start {
        Some(start) => println!(
            "Period after {start} through {} (opening {})",
            report.checkpoint.date,
            money(report.period_start_balance)
        ),
        None => println!(
            "Period through {} (opening {})",
            report.checkpoint.date,
            money(report.period_start_balance)
        ),
    }
    println!();

    for day in &report.days {
        println!(
            "{}  +{:>14}  -{:>14}  net {:>14}  balance {:>16}",
            day.date,
            money(day.credits),
            money(day.debits),
            money(day.delta),
            money(day.running_balance)
        );
        for t in &day.transactions {
            let marker = if t.is_adjustment { " [adjustment]" } else { "" };
            println!("      {:>16}  {}{marker}", money(t.amount), t.description);
        }
    }

    println!();
    println!("Total credits:    {}", money(report.total_credits));
    println!("Total debits:     {}", money(report.total_debits));
    println!("Expected change:  {}", money(report.expected_change));
    println!("Actual change:    {}", money(report.actual_change));
    if report.difference.is_zero() {
        println!("Difference:       0 (reconciled)");
    } else {
        println!("Difference:       {}  <- unexplained", money(report.difference));
    }
    Ok(())
}

use crate::db::get_connection;
use crate::error::Result;
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = std::path::PathBuf::from(&settings.data_dir);
    let db_path = data_dir.join("sodu.db");

    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());
    println!("Date hint:  {}", settings.date_order_hint);

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `sodu init` to set up.");
        return Ok(());
    }

    let conn = get_connection(&db_path)?;
    let accounts: i64 = conn.query_row("SELECT count(*) FROM accounts", [], |r| r.get(0))?;
    let transactions: i64 =
        conn.query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))?;
    let checkpoints: i64 =
        conn.query_row("SELECT count(*) FROM checkpoints", [], |r| r.get(0))?;
    let discrepant: i64 = conn.query_row(
        "SELECT count(*) FROM checkpoints WHERE is_reconciled = 0",
        [],
        |r| r.get(0),
    )?;
    let batches: i64 = conn.query_row(
        "SELECT count(*) FROM imports WHERE status = 'completed'",
        [],
        |r| r.get(0),
    )?;

    println!();
    println!("Accounts:      {accounts}");
    println!("Transactions:  {transactions}");
    println!("Checkpoints:   {checkpoints} ({discrepant} discrepant)");
    println!("Imports:       {batches}");
    Ok(())
}

use crate::db::get_connection;
use crate::error::Result;
use crate::models::Account;
use crate::settings::db_path;

pub fn add(name: &str, bank: Option<&str>, number: Option<&str>) -> Result<()> {
    let conn = get_connection(&db_path())?;
    conn.execute(
        "INSERT INTO accounts (name, bank, number) VALUES (?1, ?2, ?3)",
        rusqlite::params![name, bank, number],
    )?;
    println!("Added account: {name}");
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = get_connection(&db_path())?;
    let mut stmt =
        conn.prepare("SELECT id, name, bank, number FROM accounts ORDER BY name")?;
    let rows: Vec<Account> = stmt
        .query_map([], |row| {
            Ok(Account {
                id: row.get(0)?,
                name: row.get(1)?,
                bank: row.get(2)?,
                number: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if rows.is_empty() {
        println!("No accounts. Add one with `sodu accounts add <name>`.");
        return Ok(());
    }
    for account in rows {
        let bank = account.bank.unwrap_or_default();
        let number = account.number.unwrap_or_default();
        println!("{:>4}  {:<24} {bank:<16} {number}", account.id, account.name);
    }
    Ok(())
}

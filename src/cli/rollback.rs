use crate::db::get_connection;
use crate::error::Result;
use crate::importer::rollback_import;
use crate::settings::db_path;

pub fn run(batch_id: i64) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let outcome = rollback_import(&conn, batch_id)?;
    println!(
        "{}: {} transaction(s) removed",
        outcome.message, outcome.deleted_transactions
    );
    Ok(())
}

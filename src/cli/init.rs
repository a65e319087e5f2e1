use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }

    let dir = std::path::PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&dir)?;
    save_settings(&settings)?;

    let db_path = dir.join("sodu.db");
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;

    println!("Initialized {}", db_path.display());
    println!("Next: `sodu accounts add <name>` then `sodu import <file> --account <name>`");
    Ok(())
}

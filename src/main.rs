mod amount;
mod classify;
mod cli;
mod dates;
mod db;
mod error;
mod fmt;
mod header;
mod importer;
mod investigator;
mod models;
mod reconciler;
mod settings;
mod sheet;
mod statement;
mod table;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{AccountsCommands, CheckpointCommands, Cli, Commands, TxnCommands};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Accounts { command } => match command {
            AccountsCommands::Add { name, bank, number } => {
                cli::accounts::add(&name, bank.as_deref(), number.as_deref())
            }
            AccountsCommands::List => cli::accounts::list(),
        },
        Commands::Import {
            file,
            account,
            sheet,
            commit,
            checkpoint_balance,
            checkpoint_date,
            mdy,
        } => cli::import::run(
            &file,
            &account,
            sheet.as_deref(),
            commit,
            checkpoint_balance.as_deref(),
            checkpoint_date.as_deref(),
            mdy,
        ),
        Commands::Checkpoint { command } => match command {
            CheckpointCommands::Add {
                account,
                date,
                balance,
                note,
            } => cli::checkpoint::add(&account, &date, &balance, note.as_deref()),
            CheckpointCommands::List { account } => cli::checkpoint::list(&account),
            CheckpointCommands::Update { id, balance, note } => {
                cli::checkpoint::update(id, balance.as_deref(), note.as_deref())
            }
            CheckpointCommands::Delete { id } => cli::checkpoint::delete(id),
            CheckpointCommands::WriteOff { id, note } => {
                cli::checkpoint::write_off(id, note.as_deref())
            }
        },
        Commands::Txn { command } => match command {
            TxnCommands::Add {
                account,
                date,
                amount,
                description,
                reference,
            } => cli::txn::add(&account, &date, &amount, &description, reference.as_deref()),
            TxnCommands::List { account, limit } => cli::txn::list(&account, limit),
            TxnCommands::Delete { id } => cli::txn::delete(id),
        },
        Commands::Recalculate { account } => cli::checkpoint::recalculate(&account),
        Commands::Investigate {
            account,
            checkpoint,
        } => cli::investigate::run(&account, checkpoint),
        Commands::Rollback { batch } => cli::rollback::run(batch),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

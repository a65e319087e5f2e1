pub mod accounts;
pub mod checkpoint;
pub mod import;
pub mod init;
pub mod investigate;
pub mod rollback;
pub mod status;
pub mod txn;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sodu",
    about = "Statement import and balance reconciliation for messy bank exports."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up sodu: choose a data directory and initialize the database.
    Init {
        /// Path for sodu data (default: ~/Documents/sodu)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Parse a CSV/XLSX statement; preview by default, --commit to import.
    Import {
        /// Path to CSV or XLSX file
        file: String,
        /// Account name to import into
        #[arg(long)]
        account: String,
        /// Worksheet name (XLSX; default: first sheet)
        #[arg(long)]
        sheet: Option<String>,
        /// Persist the batch instead of previewing
        #[arg(long)]
        commit: bool,
        /// Declared ending balance for the batch checkpoint
        #[arg(long = "checkpoint-balance")]
        checkpoint_balance: Option<String>,
        /// Checkpoint date, YYYY-MM-DD (default: detected statement end)
        #[arg(long = "checkpoint-date")]
        checkpoint_date: Option<String>,
        /// Read ambiguous dates month-first (overrides settings hint)
        #[arg(long)]
        mdy: bool,
    },
    /// Manage balance checkpoints.
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
    /// Add, list, or delete individual ledger transactions.
    Txn {
        #[command(subcommand)]
        command: TxnCommands,
    },
    /// Recompute calculated balances and adjustments for an account.
    Recalculate {
        /// Account name
        account: String,
    },
    /// Explain a checkpoint's adjustment date by date.
    Investigate {
        /// Account name
        account: String,
        /// Checkpoint ID (shown in `sodu checkpoint list`)
        checkpoint: i64,
    },
    /// Undo an import batch and its checkpoint atomically.
    Rollback {
        /// Import batch ID
        batch: i64,
    },
    /// Show current database and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Add a new account.
    Add {
        /// Account name, e.g. 'VCB Checking'
        name: String,
        /// Bank name
        #[arg(long)]
        bank: Option<String>,
        /// Account number
        #[arg(long)]
        number: Option<String>,
    },
    /// List all accounts.
    List,
}

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// Declare a balance at a date.
    Add {
        /// Account name
        account: String,
        /// Checkpoint date, YYYY-MM-DD
        #[arg(long)]
        date: String,
        /// Declared balance
        #[arg(long)]
        balance: String,
        /// Optional note
        #[arg(long)]
        note: Option<String>,
    },
    /// List checkpoints for an account.
    List {
        /// Account name
        account: String,
    },
    /// Change a manual checkpoint's declared balance or note.
    Update {
        /// Checkpoint ID
        id: i64,
        /// New declared balance
        #[arg(long)]
        balance: Option<String>,
        /// New note
        #[arg(long)]
        note: Option<String>,
    },
    /// Delete a manual checkpoint by ID.
    Delete {
        /// Checkpoint ID
        id: i64,
    },
    /// Turn a checkpoint's discrepancy into a balance-adjustment entry.
    WriteOff {
        /// Checkpoint ID
        id: i64,
        /// Description for the adjustment entry
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TxnCommands {
    /// Record a transaction by hand.
    Add {
        /// Account name
        account: String,
        /// Transaction date, YYYY-MM-DD
        #[arg(long)]
        date: String,
        /// Signed amount: positive credit, negative debit
        #[arg(long)]
        amount: String,
        /// Description
        #[arg(long)]
        description: String,
        /// Bank reference code
        #[arg(long)]
        reference: Option<String>,
    },
    /// List transactions for an account.
    List {
        /// Account name
        account: String,
        /// Show at most this many recent transactions
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Delete a transaction by ID.
    Delete {
        /// Transaction ID
        id: i64,
    },
}

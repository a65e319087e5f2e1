use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoduError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XLSX error: {0}")]
    Xlsx(String),

    #[error("File contains no data rows")]
    EmptyInput,

    #[error("File is not valid UTF-8 text")]
    InvalidEncoding,

    #[error("Worksheet not found: {0}")]
    MissingSheet(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Import batch not found: {0}")]
    BatchNotFound(i64),

    #[error("Import batch {0} was already rolled back")]
    AlreadyRolledBack(i64),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(i64),

    #[error("Checkpoint {0} belongs to an import; roll back the import instead")]
    ImportOwnedCheckpoint(i64),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SoduError>;

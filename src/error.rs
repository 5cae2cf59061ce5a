use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid date '{0}'. Expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Failed to spawn flush worker: {0}")]
    WorkerSpawn(std::io::Error),

    #[error("Flush worker panicked")]
    WorkerPanicked,

    #[error("Flush worker is not running")]
    WorkerStopped,

    #[error("Final flush failed, {lost_hits} hits were not recorded: {source}")]
    FlushFailed {
        lost_hits: u64,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_ARGUMENTS: i32 = 2;
    pub const DATABASE_ERROR: i32 = 6;
    pub const DATA_LOSS: i32 = 7;
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Database(_) => exit_code::DATABASE_ERROR,
            Error::InvalidConfig(_) | Error::InvalidDate(_) => exit_code::INVALID_ARGUMENTS,
            Error::FlushFailed { .. } => exit_code::DATA_LOSS,
            _ => exit_code::GENERAL_ERROR,
        }
    }
}

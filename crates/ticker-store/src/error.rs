use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record for {symbol}: {reason}")]
    Corrupt { symbol: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

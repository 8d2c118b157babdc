use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("No accounts configured (set ACCOUNTS_JSON)")]
    NoAccountsConfigured,

    #[error("Could not log into any of the {attempted} configured account(s)")]
    NoUsableAccounts { attempted: usize },
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Seen-id ledger I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Post id {0:?} contains a line break")]
    InvalidId(String),
}

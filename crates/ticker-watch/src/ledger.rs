//! Append-only file of post ids that have already been processed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::LedgerError;

pub struct SeenIdLedger {
    path: PathBuf,
}

impl SeenIdLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every recorded id. A missing file is an empty ledger.
    pub async fn load(&self) -> Result<HashSet<String>, LedgerError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Record one id on its own line. Earlier lines are never rewritten.
    pub async fn append(&self, id: &str) -> Result<(), LedgerError> {
        if id.contains(['\n', '\r']) {
            return Err(LedgerError::InvalidId(id.to_string()));
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        file.write_all(format!("{}\n", id).as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

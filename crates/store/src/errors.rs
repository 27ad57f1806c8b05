// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Duckdb(#[from] duckdb::Error),
    #[error("batch insert failed: {failed} of {total} rows rejected, batch rolled back")]
    BatchFailed { total: usize, failed: usize },
    #[error("query returned no rows")]
    NotFound,
    #[error("query rejected: only SELECT statements are permitted here: {0}")]
    NotASelect(String),
    #[error("alert rule not found: {0}")]
    UnknownAlertRule(String),
    #[error("active alert not found: {0}")]
    UnknownActiveAlert(String),
    #[error("invalid alert status: {0}")]
    InvalidAlertStatus(String),
    #[error("store worker task panicked: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }

    pub fn is_batch_failure(&self) -> bool {
        matches!(self, StoreError::BatchFailed { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

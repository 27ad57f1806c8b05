// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error(transparent)]
    Store(#[from] store::StoreError),
}

impl PersistenceError {
    /// Connection-class errors pause the worker until the next tick rather
    /// than being logged as a data problem (§7).
    pub fn is_connection_error(&self) -> bool {
        match self {
            PersistenceError::Store(e) => !e.is_batch_failure() && !e.is_not_found(),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error("invalid topic_pattern '{0}': {1}")]
    BadPattern(String, regex::Error),
}

impl AlertError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AlertError::Store(e) if e.is_not_found())
    }
}

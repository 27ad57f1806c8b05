// SPDX-License-Identifier: Apache-2.0

//! Wires `store::Store` up as the `db` global both D and E expose, so the
//! adapter is written once rather than once per engine crate.

use async_trait::async_trait;

use crate::errors::SandboxError;
use crate::SandboxDb;

#[async_trait]
impl SandboxDb for store::Store {
    async fn all(&self, sql: &str) -> Result<Vec<serde_json::Value>, SandboxError> {
        self.query_all(sql)
            .await
            .map_err(|e| SandboxError::Store(e.to_string()))
    }

    async fn get(&self, sql: &str) -> Result<Option<serde_json::Value>, SandboxError> {
        self.query_one(sql)
            .await
            .map_err(|e| SandboxError::Store(e.to_string()))
    }
}

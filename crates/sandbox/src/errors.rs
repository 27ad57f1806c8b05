// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("script execution exceeded its {0:?} timeout")]
    Timeout(std::time::Duration),
    #[error("script threw: {0}")]
    Thrown(String),
    #[error("query rejected: only SELECT statements may run inside a sandboxed script, got: {0}")]
    NotASelect(String),
    #[error("store access failed: {0}")]
    Store(String),
    #[error("script engine error: {0}")]
    Engine(String),
}

impl SandboxError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout(_))
    }
}

/// The sandbox isolation property from §8.5: a query must be rejected
/// before it ever reaches the store, based on its first non-whitespace
/// token, case-insensitively.
pub fn guard_select(sql: &str) -> Result<(), SandboxError> {
    let first_token = sql.trim_start().split_whitespace().next().unwrap_or("");
    if first_token.eq_ignore_ascii_case("select") {
        Ok(())
    } else {
        Err(SandboxError::NotASelect(sql.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_is_allowed() {
        assert!(guard_select("  SELECT * FROM mqtt_events").is_ok());
        assert!(guard_select("select 1").is_ok());
    }

    #[test]
    fn mutating_statements_are_rejected() {
        assert!(guard_select("DELETE FROM mqtt_events").is_err());
        assert!(guard_select("UPDATE mqtt_events SET topic = 'x'").is_err());
        assert!(guard_select("").is_err());
    }
}

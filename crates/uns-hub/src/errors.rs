// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
    #[error(transparent)]
    Config(#[from] uns_config::ConfigError),
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error(transparent)]
    Supervisor(#[from] broker_supervisor::BrokerSupervisorError),
    #[error(transparent)]
    Alert(#[from] alert_engine::AlertError),
    #[error("failed to read transform rules file '{path}': {source}")]
    RulesFileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse transform rules file '{path}': {source}")]
    RulesFileParse {
        path: String,
        source: serde_json::Error,
    },
}

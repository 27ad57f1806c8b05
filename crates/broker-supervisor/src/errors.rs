// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerSupervisorError {
    #[error("broker '{0}' is already configured")]
    AlreadyAdded(String),
    #[error("unknown broker: {0}")]
    UnknownBroker(String),
    #[error(transparent)]
    Client(#[from] broker_client::BrokerClientError),
    #[error("failed to read TLS material for broker '{broker_id}': {source}")]
    TlsMaterial {
        broker_id: String,
        #[source]
        source: std::io::Error,
    },
}

// SPDX-License-Identifier: Apache-2.0

// src/client/mod.rs

mod core;
mod options;

pub use core::{BrokerClient, ConnectionEvent, RawMessage};
pub use options::{ClientCredentials, ClientOptions, ClientTlsConfig, ClientTlsIdentity, PublishOptions};

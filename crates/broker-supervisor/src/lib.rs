// SPDX-License-Identifier: Apache-2.0

//! Component A, the Broker Supervisor (§4.1): owns one client per
//! configured broker, drives its connection-status state machine, routes
//! inbound frames to the message handler, and gates every outbound publish
//! through the ACL matcher (H, §4.8).

mod errors;
mod supervisor;

pub use errors::BrokerSupervisorError;
pub use supervisor::{BrokerSupervisor, InboundMessage, PublishOutcome};

// SPDX-License-Identifier: Apache-2.0

//! Shared wire and in-memory types for the UNS ingestion hub.
//!
//! This crate has no I/O of its own; it exists so that `broker-supervisor`,
//! `persistence`, `transform-engine`, `alert-engine` and `broadcast-bus` can
//! all agree on the shape of an [`Event`], a [`BrokerConfig`], a rule set, and
//! so on without depending on each other.

pub mod alert;
pub mod broker;
pub mod canon;
pub mod envelope;
pub mod event;
pub mod rules;

pub use alert::{ActiveAlert, AlertRule, AlertSeverity, AlertStatus, NotificationTargets};
pub use broker::{BrokerConfig, BrokerStatus, BrokerStatusKind, TlsMode};
pub use envelope::BroadcastEnvelope;
pub use event::Event;
pub use rules::{Rule, Target, TransformMetricsEntry, Version, VersionedRuleSet};

// SPDX-License-Identifier: Apache-2.0

//! Component I, the Config & Secrets Loader (§4.8... §6): broker list, TLS
//! material paths, and the sizing knobs §6 names, layered with `figment`
//! (defaults -> JSON file -> `UNS_*` environment variables), the same
//! layering style the teacher's broader dependency set (`figment`) is
//! meant for.

mod errors;

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};
use uns_model::BrokerConfig;

pub use errors::ConfigError;

/// Namespace throttle threshold (§4.2 step 1), fixed in core.
pub const MAX_MSGS_PER_SEC_PER_NAMESPACE: u32 = 50;
/// Oversize-payload guard (§4.2 step 2), fixed in core.
pub const MAX_PAYLOAD_BYTES: usize = 2 * 1024 * 1024;

fn default_sparkplug_enabled() -> bool {
    true
}
fn default_batch_size() -> usize {
    5_000
}
fn default_batch_interval_ms() -> u64 {
    2_000
}
fn default_checkpoint_interval_ms() -> u64 {
    15_000
}
fn default_max_store_size_mb() -> u64 {
    2_048
}
fn default_prune_chunk_size() -> u64 {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_store_path() -> String {
    "uns-hub.duckdb".to_string()
}

/// The hub's full startup configuration (§6, SPEC_FULL §2.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub brokers: Vec<BrokerConfig>,
    #[serde(default = "default_sparkplug_enabled")]
    pub sparkplug_enabled: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
    #[serde(default = "default_checkpoint_interval_ms")]
    pub checkpoint_interval_ms: u64,
    #[serde(default = "default_max_store_size_mb")]
    pub max_store_size_mb: u64,
    #[serde(default = "default_prune_chunk_size")]
    pub prune_chunk_size: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_store_path")]
    pub store_path: String,
    #[serde(default)]
    pub transform_rules_path: Option<String>,
    #[serde(default)]
    pub llm_api_key: Option<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            sparkplug_enabled: default_sparkplug_enabled(),
            batch_size: default_batch_size(),
            batch_interval_ms: default_batch_interval_ms(),
            checkpoint_interval_ms: default_checkpoint_interval_ms(),
            max_store_size_mb: default_max_store_size_mb(),
            prune_chunk_size: default_prune_chunk_size(),
            log_level: default_log_level(),
            store_path: default_store_path(),
            transform_rules_path: None,
            llm_api_key: None,
        }
    }
}

impl HubConfig {
    /// Layer defaults, an optional JSON file, and `UNS_*` environment
    /// variables (§2.3). Later layers override earlier ones.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(HubConfig::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Json::file(path));
        }
        figment = figment.merge(Env::prefixed("UNS_").split("__"));
        Ok(figment.extract()?)
    }

    pub fn broker(&self, id: &str) -> Result<&BrokerConfig, ConfigError> {
        self.brokers
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| ConfigError::UnknownBroker(id.to_string()))
    }
}

//! Engine configuration.

use crate::{error::Error, ids::TenantId};

use serde::Deserialize;

use std::time::Duration;

/// Configuration for the routing, supervision and queueing core.
///
/// Every field has a default; deserializing `{}` yields a working config.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of messages per queue pack. Must be positive.
    pub pack_size: usize,
    /// Fallback polling tick for the per-bucket queue loops.
    pub poll_interval_ms: u64,
    /// Tenants that get their own queue bucket and polling loop. All other
    /// tenants collapse into one collective bucket.
    pub special_tenants: Vec<TenantId>,
    /// Execution lane for system-scope rule entities.
    pub system_rule_lane: String,
    /// Execution lane for tenant-scope rule entities.
    pub tenant_rule_lane: String,
    /// Execution lane for system-scope rule chain entities.
    pub system_chain_lane: String,
    /// Execution lane for tenant-scope rule chain entities.
    pub tenant_chain_lane: String,
    /// Restart budget per rule actor.
    pub max_restarts: usize,
    /// Sliding window the restart budget applies within, in seconds.
    pub restart_window_secs: u64,
    /// Page size used when the managers page through the fetch collaborator.
    pub fetch_page_size: usize,
    /// Bound on the reprocessing task wait, in seconds.
    pub reprocessing_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            pack_size: 1000,
            poll_interval_ms: 25,
            special_tenants: Vec::new(),
            system_rule_lane: "system-rule".to_owned(),
            tenant_rule_lane: "tenant-rule".to_owned(),
            system_chain_lane: "system-chain".to_owned(),
            tenant_chain_lane: "tenant-chain".to_owned(),
            max_restarts: 3,
            restart_window_secs: 60,
            fetch_page_size: 1024,
            reprocessing_timeout_secs: 60,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.pack_size == 0 {
            return Err(Error::Config(
                "pack_size must be positive".to_owned(),
            ));
        }
        if self.fetch_page_size == 0 {
            return Err(Error::Config(
                "fetch_page_size must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }

    pub fn reprocessing_timeout(&self) -> Duration {
        Duration::from_secs(self.reprocessing_timeout_secs)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pack_size, 1000);
        assert_eq!(config.reprocessing_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_empty_json_deserializes() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_pack_size_rejected() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"pack_size": 0}"#).unwrap();
        assert!(config.validate().is_err());
    }
}

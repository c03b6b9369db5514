//! Cache Configuration
//!
//! TTLs, capacities and naming for every tier. Loaded from YAML; any field left
//! out keeps its default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tier configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Process-local TTL for tenant configuration
    pub tenant_config_ttl_secs: u64,
    /// Process-local TTL for the shared template
    pub template_ttl_secs: u64,
    /// Entry bound for each process-local class (cleared on overflow)
    pub local_max_entries: usize,
    /// Edge response freshness
    pub edge_ttl_secs: u64,
    /// How long past freshness an edge entry may still be served
    pub edge_stale_window_secs: u64,
    /// Nominal lifetime of a shard artifact
    pub shard_lifetime_secs: u64,
    /// Tenants are served from `{tenant}.{base_domain}`
    pub base_domain: String,
    /// Backing store name of the shared template
    pub template_name: String,
    /// Reserved query parameter that bypasses the edge tier
    pub bypass_param: String,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            tenant_config_ttl_secs: 60,
            template_ttl_secs: 5 * 60,
            local_max_entries: 200,
            edge_ttl_secs: 60,
            edge_stale_window_secs: 86_400,
            shard_lifetime_secs: 24 * 60 * 60,
            base_domain: "example.com".to_string(),
            template_name: "site".to_string(),
            bypass_param: "nocache".to_string(),
        }
    }
}

impl EdgeConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)
            .map_err(|e| Error::Config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&raw)
    }

    /// Reject settings that would disable a tier by accident
    pub fn validate(&self) -> Result<()> {
        let ttls = [
            ("tenant_config_ttl_secs", self.tenant_config_ttl_secs),
            ("template_ttl_secs", self.template_ttl_secs),
            ("edge_ttl_secs", self.edge_ttl_secs),
            ("shard_lifetime_secs", self.shard_lifetime_secs),
        ];
        for (name, value) in ttls {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }
        if self.local_max_entries == 0 {
            return Err(Error::Config(
                "local_max_entries must be greater than zero".to_string(),
            ));
        }
        if self.base_domain.trim().is_empty() {
            return Err(Error::Config("base_domain must not be empty".to_string()));
        }
        if self.template_name.trim().is_empty() {
            return Err(Error::Config("template_name must not be empty".to_string()));
        }
        if self.bypass_param.trim().is_empty() {
            return Err(Error::Config("bypass_param must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn tenant_config_ttl(&self) -> Duration {
        Duration::from_secs(self.tenant_config_ttl_secs)
    }

    pub fn template_ttl(&self) -> Duration {
        Duration::from_secs(self.template_ttl_secs)
    }

    pub fn edge_ttl(&self) -> Duration {
        Duration::from_secs(self.edge_ttl_secs)
    }

    pub fn edge_stale_window(&self) -> Duration {
        Duration::from_secs(self.edge_stale_window_secs)
    }

    pub fn shard_lifetime(&self) -> Duration {
        Duration::from_secs(self.shard_lifetime_secs)
    }
}

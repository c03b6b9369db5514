//! Seed documents for populating a fresh store.
//!
//! ```yaml
//! templates:
//!   site: "<html><h1>{{name}}</h1></html>"
//! tenants:
//!   grand-royal:
//!     name: Grand Royal
//!     design_profile: bistro
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::domain::TenantRecord;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
    #[serde(default)]
    pub tenants: BTreeMap<String, TenantRecord>,
}

impl SeedData {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| Error::Config(format!("invalid seed: {}", e)))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed() {
        let seed = SeedData::from_yaml_str(
            r#"
templates:
  site: "<h1>{{name}}</h1>"
tenants:
  grand-royal:
    name: Grand Royal
    design_profile: bistro
    experiment:
      id: hero-copy
  aw-bakery: {}
"#,
        )
        .unwrap();

        assert_eq!(seed.templates["site"], "<h1>{{name}}</h1>");
        assert_eq!(seed.tenants.len(), 2);
        let royal = &seed.tenants["grand-royal"];
        assert_eq!(royal.design_profile.as_deref(), Some("bistro"));
        assert_eq!(royal.extra["name"], "Grand Royal");
        assert_eq!(royal.experiment.as_ref().map(|e| e.id.as_str()), Some("hero-copy"));
    }
}

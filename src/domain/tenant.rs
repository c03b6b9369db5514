//! Tenant Records and Response Metadata
//!
//! `TenantRecord` is the read-only projection of a tenant's configuration blob.
//! Only the fields the cache subsystem needs are typed; everything else is
//! carried through untouched in `extra`.

use chrono::{DateTime, Utc};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use super::ports::TenantKey;
use crate::cache::variant::{assign, VariantSpace};
use crate::error::{Error, Result};

/// Design profile used when a record does not name one
pub const DEFAULT_DESIGN_PROFILE: &str = "classic";

pub const HEADER_TENANT_KEY: &str = "x-tenant-key";
pub const HEADER_DESIGN_PROFILE: &str = "x-design-profile";
pub const HEADER_DESIGN_VARIANT: &str = "x-design-variant";
pub const HEADER_EXPERIMENT_ID: &str = "x-experiment-id";
pub const HEADER_EXPERIMENT_VARIANT: &str = "x-experiment-variant";

/// Experiment a tenant is enrolled in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Experiment identifier
    pub id: String,
    /// Explicit variant; absent or `"auto"` means computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// Per-tenant configuration blob
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_profile: Option<String>,
    /// Explicit design variant; absent or `"auto"` means computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment: Option<ExperimentConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Fields owned by other collaborators
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TenantRecord {
    /// Parse a stored blob. `key` is only used to label the error.
    pub fn from_json(key: &str, raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw).map_err(|e| Error::malformed(key, e))
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Machine-readable description of what a rendered page resolved to.
///
/// Travels in response headers so a cached response can reproduce the
/// analytics signal of a fresh render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub tenant_key: String,
    pub design_profile: String,
    pub design_variant: String,
    pub experiment_id: Option<String>,
    pub experiment_variant: Option<String>,
}

impl ResponseMetadata {
    /// Resolve metadata for a tenant from its record.
    pub fn resolve(tenant: &TenantKey, record: &TenantRecord) -> Self {
        let design_profile = record
            .design_profile
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_DESIGN_PROFILE)
            .to_string();

        let design_variant = assign(
            tenant.as_str(),
            record.design_variant.as_deref(),
            VariantSpace::Design,
        );

        let experiment = record.experiment.as_ref().filter(|e| !e.id.is_empty());
        let experiment_id = experiment.map(|e| e.id.clone());
        let experiment_variant = experiment
            .map(|e| assign(tenant.as_str(), e.variant.as_deref(), VariantSpace::Experiment));

        Self {
            tenant_key: tenant.as_str().to_string(),
            design_profile,
            design_variant,
            experiment_id,
            experiment_variant,
        }
    }

    /// Write the metadata fields into a header map. Values are
    /// percent-encoded so any UTF-8 string survives the round trip.
    pub fn write_headers(&self, headers: &mut HeaderMap) -> Result<()> {
        let mut set = |name: &'static str, value: &str| -> Result<()> {
            let value = HeaderValue::from_str(&urlencoding::encode(value))
                .map_err(|e| Error::Internal(format!("header {} not encodable: {}", name, e)))?;
            headers.insert(HeaderName::from_static(name), value);
            Ok(())
        };

        set(HEADER_TENANT_KEY, &self.tenant_key)?;
        set(HEADER_DESIGN_PROFILE, &self.design_profile)?;
        set(HEADER_DESIGN_VARIANT, &self.design_variant)?;
        if let Some(id) = &self.experiment_id {
            set(HEADER_EXPERIMENT_ID, id)?;
        }
        if let Some(variant) = &self.experiment_variant {
            set(HEADER_EXPERIMENT_VARIANT, variant)?;
        }
        Ok(())
    }

    /// Read metadata back from headers; `None` if the required fields are
    /// absent or do not decode.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| urlencoding::decode(v).ok())
                .map(|v| v.into_owned())
        };

        Some(Self {
            tenant_key: get(HEADER_TENANT_KEY)?,
            design_profile: get(HEADER_DESIGN_PROFILE)?,
            design_variant: get(HEADER_DESIGN_VARIANT)?,
            experiment_id: get(HEADER_EXPERIMENT_ID),
            experiment_variant: get(HEADER_EXPERIMENT_VARIANT),
        })
    }
}

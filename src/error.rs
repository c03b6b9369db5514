//! Error types for the edge cache subsystem

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving from, or regenerating, a cache tier
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Not-found
    // =========================================================================
    /// Tenant has no record in the backing store
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// Shared template has no record in the backing store
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    // =========================================================================
    // Data errors
    // =========================================================================
    /// A stored record could not be parsed
    #[error("Malformed record at {key}: {reason}")]
    MalformedData { key: String, reason: String },

    /// Serialization of a derived record failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // =========================================================================
    // Backing store
    // =========================================================================
    /// Backing store could not be reached (no retry is attempted)
    #[error("Backing store unavailable: {0}")]
    StoreUnavailable(String),

    // =========================================================================
    // Request validation
    // =========================================================================
    /// Partition identifier is not two lowercase characters
    #[error("Invalid shard key: {0:?}")]
    InvalidShardKey(String),

    /// Tenant key does not match the identifier format
    #[error("Invalid tenant key: {0:?}")]
    InvalidTenantKey(String),

    /// Request URL cannot be normalized into an edge cache key
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    // =========================================================================
    // Ambient
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a malformed-data error for a store key
    pub fn malformed(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::MalformedData {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the not-found family
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::TenantNotFound(_) | Error::TemplateNotFound(_))
    }

    /// True if the failure is transient and a later attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }

    /// True if the caller sent a request that can never succeed as-is
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Error::InvalidShardKey(_) | Error::InvalidTenantKey(_) | Error::InvalidUrl(_)
        )
    }
}

//! Storage errors

use crate::version::{EnvironmentKey, VersionKey};

/// Errors raised by version, environment and snapshot stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Environment does not exist
    #[error("environment {0} not found")]
    EnvironmentNotFound(EnvironmentKey),

    /// Version does not exist
    #[error("version {0} not found")]
    VersionNotFound(VersionKey),

    /// Environment exists but has no version yet
    #[error("environment {0} has no current version")]
    NoCurrentVersion(EnvironmentKey),

    /// Environment id already taken
    #[error("environment {0} already exists")]
    EnvironmentExists(EnvironmentKey),

    /// Version number already taken
    #[error("version {0} already exists")]
    VersionExists(VersionKey),

    /// Appended version would leave a gap
    #[error("version {key} breaks the sequence: next version is {expected}")]
    NonContiguous { key: VersionKey, expected: u64 },

    /// Current pointer moved since the caller read it
    #[error("environment {environment} is at version {actual:?}, caller expected {expected:?}")]
    StaleVersion {
        environment: EnvironmentKey,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    /// Update touched more than `iac_location`
    #[error("version {0} is immutable apart from its IaC location")]
    Immutable(VersionKey),

    /// Id cannot be used as a single storage path segment
    #[error("invalid id '{id}': {reason}")]
    InvalidId { id: String, reason: &'static str },

    /// Underlying I/O failure
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Missing environment or version
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EnvironmentNotFound(_) | Self::VersionNotFound(_) | Self::NoCurrentVersion(_)
        )
    }

    /// Key collision or broken sequence
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::EnvironmentExists(_) | Self::VersionExists(_) | Self::NonContiguous { .. }
        )
    }

    /// Transient failure the caller may retry
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

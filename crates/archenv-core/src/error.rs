//! Error types for archenv core
//!
//! Every failure surfaced to callers folds into [`CoreError`]. Callers map
//! [`CoreError::kind`] onto their own transport (HTTP status, exit code).

use crate::engine::EngineError;
use crate::gate::Rejection;
use archenv_store::{EnvironmentKey, StoreError, VersionKey};
use archenv_topology::TopologyError;

/// Main archenv error type
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Storage failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Snapshot could not be parsed
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    /// Engine invocation failed
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Environment's current version has no tracking record
    #[error("environment {0} is not tracking any environment")]
    NotTracked(EnvironmentKey),

    /// Environment tracks a different environment than the one asked about
    #[error("environment {environment} tracks {actual}, expected {expected}")]
    TrackingMismatch {
        environment: EnvironmentKey,
        expected: String,
        actual: String,
    },

    /// Gate rejected a run
    #[error("{0}")]
    TopologicalChangesNotAllowed(Box<Rejection>),

    /// Caller's expected version is no longer current
    #[error("environment {environment} is at version {actual}, caller expected {expected}")]
    StaleVersion {
        environment: EnvironmentKey,
        expected: u64,
        actual: u64,
    },

    /// Run started from a non-latest version without overwrite
    #[error(
        "environment {environment} is at version {current} but version {latest} exists; \
         pass overwrite to discard newer versions"
    )]
    VersionConflict {
        environment: EnvironmentKey,
        current: u64,
        latest: u64,
    },

    /// Version record exists but its snapshot does not
    #[error("snapshot for version {0} is missing")]
    SnapshotMissing(VersionKey),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Coarse error classes for transport mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing architecture, environment, version or snapshot
    NotFound,
    /// Duplicate key or diverging history
    Conflict,
    /// Stale version, tracking mismatch, disallowed topological change
    PreconditionFailed,
    /// Everything else
    Internal,
}

impl CoreError {
    /// Transport-neutral classification
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(e) if e.is_not_found() => ErrorKind::NotFound,
            Self::Store(e) if e.is_conflict() => ErrorKind::Conflict,
            Self::Store(
                StoreError::StaleVersion { .. }
                | StoreError::Immutable(_)
                | StoreError::InvalidId { .. },
            )
            | Self::NotTracked(_)
            | Self::TrackingMismatch { .. }
            | Self::TopologicalChangesNotAllowed(_)
            | Self::StaleVersion { .. } => ErrorKind::PreconditionFailed,
            Self::VersionConflict { .. } => ErrorKind::Conflict,
            Self::SnapshotMissing(_) => ErrorKind::NotFound,
            Self::Store(_) | Self::Topology(_) | Self::Engine(_) | Self::Config(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Check if error is retryable
    ///
    /// Only transient I/O qualifies; the core itself never retries.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::Engine(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Gate rejection details, if this is one
    #[inline]
    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::TopologicalChangesNotAllowed(rejection) => Some(&**rejection),
            _ => None,
        }
    }
}

impl From<Rejection> for CoreError {
    fn from(rejection: Rejection) -> Self {
        Self::TopologicalChangesNotAllowed(Box::new(rejection))
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// YAML parse failure
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Field failed validation
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use archenv_store::Constraint;

    fn env() -> EnvironmentKey {
        EnvironmentKey::new("shop", "prod")
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            CoreError::from(StoreError::VersionNotFound(env().version(4))).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CoreError::from(StoreError::VersionExists(env().version(4))).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            CoreError::StaleVersion {
                environment: env(),
                expected: 1,
                actual: 2
            }
            .kind(),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(
            CoreError::TrackingMismatch {
                environment: env(),
                expected: "default".into(),
                actual: "staging".into()
            }
            .kind(),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(
            CoreError::SnapshotMissing(env().version(0)).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn rejection_is_precondition_failure() {
        let rejection = Rejection::from_constraints(
            env(),
            vec![Constraint::edge("must_exist", "a:b:c -> a:b:d")],
        );
        let err = CoreError::from(rejection);
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(err.rejection().map(|r| r.constraints().len()), Some(1));
        assert!(err.to_string().contains("shop/prod"));
    }

    #[test]
    fn only_io_is_retryable() {
        let io = CoreError::from(StoreError::Io(std::io::Error::other("disk full")));
        assert!(io.is_retryable());
        assert_eq!(io.kind(), ErrorKind::Internal);
        assert!(!CoreError::NotTracked(env()).is_retryable());
    }
}

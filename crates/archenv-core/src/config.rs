//! Manager configuration

use crate::error::ConfigError;
use archenv_store::{FsSnapshotStore, InMemorySnapshotStore, SnapshotStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Environment manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Environment id other environments are promoted from
    pub default_environment: String,
    /// Record property-level changes in a tracked version's diff
    pub include_properties_in_tracked_diff: bool,
    /// Directory for the filesystem snapshot store; in-memory when unset
    pub snapshot_root: Option<PathBuf>,
    /// `tracing` filter directive
    pub log_filter: String,
}

impl ManagerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With default environment id
    #[inline]
    #[must_use]
    pub fn with_default_environment(mut self, id: impl Into<String>) -> Self {
        self.default_environment = id.into();
        self
    }

    /// With property diffing for tracked versions
    #[inline]
    #[must_use]
    pub fn with_tracked_property_diff(mut self, enabled: bool) -> Self {
        self.include_properties_in_tracked_diff = enabled;
        self
    }

    /// With filesystem snapshot root
    #[inline]
    #[must_use]
    pub fn with_snapshot_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.snapshot_root = Some(root.into());
        self
    }

    /// With log filter
    #[inline]
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Parse from TOML
    ///
    /// # Errors
    /// `ConfigError::Toml` on syntax errors, `ConfigError::Invalid` on bad values
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from YAML
    ///
    /// # Errors
    /// `ConfigError::Yaml` on syntax errors, `ConfigError::Invalid` on bad values
    pub fn from_yaml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_environment.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "default_environment",
                reason: "must not be empty".into(),
            });
        }
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.log_filter) {
            return Err(ConfigError::Invalid {
                field: "log_filter",
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Install the global subscriber using `log_filter`
    ///
    /// See [`crate::telemetry::init_tracing`]; `RUST_LOG` still wins when set.
    pub fn init_tracing(&self) -> bool {
        crate::telemetry::init_tracing(&self.log_filter)
    }

    /// Snapshot store selected by `snapshot_root`
    #[must_use]
    pub fn snapshot_store(&self) -> Arc<dyn SnapshotStore> {
        match &self.snapshot_root {
            Some(root) => Arc::new(FsSnapshotStore::new(root.clone())),
            None => Arc::new(InMemorySnapshotStore::new()),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_environment: "default".into(),
            include_properties_in_tracked_diff: true,
            snapshot_root: None,
            log_filter: "info".into(),
        }
    }
}

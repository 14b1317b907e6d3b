//! Engine port
//!
//! The engine turns an input snapshot plus constraints into a new snapshot.
//! It runs outside this crate; [`EnvironmentManager`](crate::EnvironmentManager)
//! only sees this trait.

use archenv_store::{ConfigIssue, Constraint};
use async_trait::async_trait;

/// One engine invocation
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    /// Architecture id
    pub architecture: String,
    /// Environment id
    pub environment: String,
    /// Snapshot the run starts from
    pub input_snapshot: Vec<u8>,
    /// Constraints to apply
    pub constraints: Vec<Constraint>,
}

/// Result of a successful engine run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    /// Generated snapshot
    pub snapshot: Vec<u8>,
    /// Configuration problems the engine reported without failing
    pub config_errors: Vec<ConfigIssue>,
}

impl EngineOutput {
    /// Output carrying only a snapshot
    #[inline]
    #[must_use]
    pub fn new(snapshot: impl Into<Vec<u8>>) -> Self {
        Self {
            snapshot: snapshot.into(),
            config_errors: Vec::new(),
        }
    }

    /// Attach reported configuration problems
    #[inline]
    #[must_use]
    pub fn with_config_errors(mut self, config_errors: Vec<ConfigIssue>) -> Self {
        self.config_errors = config_errors;
        self
    }
}

/// Engine failures
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Constraints could not be satisfied
    #[error("engine failed: {0}")]
    Failed(String),

    /// Engine could not be reached or its output could not be read
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Snapshot-generating engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run the engine once
    async fn run(&self, request: EngineRequest) -> Result<EngineOutput, EngineError>;
}

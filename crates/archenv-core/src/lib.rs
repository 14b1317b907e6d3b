//! # archenv Core
//!
//! Versioned environments for infrastructure architectures.
//!
//! ## Core Concepts
//!
//! - **EnvironmentManager**: creates, clones, runs, promotes and rolls back environments
//! - **EnvironmentTracker**: detects drift between an environment and the one it tracks
//! - **Gate**: keeps restricted environments to property-only changes
//! - **Engine**: port to the external snapshot generator
//!
//! ## Example
//!
//! ```rust,no_run
//! use archenv_core::{Engine, EngineError, EngineOutput, EngineRequest, EnvironmentManager, ManagerConfig, RunRequest};
//! use archenv_store::{EnvironmentTags, InMemoryStore};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl Engine for Echo {
//!     async fn run(&self, request: EngineRequest) -> Result<EngineOutput, EngineError> {
//!         Ok(EngineOutput::new(request.input_snapshot))
//!     }
//! }
//!
//! # async fn example() -> Result<(), archenv_core::CoreError> {
//! let config = ManagerConfig::new().with_log_filter("archenv_core=debug");
//! config.init_tracing();
//! let manager = EnvironmentManager::new(
//!     Arc::new(InMemoryStore::new()),
//!     config.snapshot_store(),
//!     Arc::new(Echo),
//!     config,
//! );
//!
//! manager
//!     .create_environment("shop", "default", EnvironmentTags::default_environment(), "me", None)
//!     .await?;
//! manager
//!     .clone_environment("shop", "default", "prod", EnvironmentTags::restricted(), "me")
//!     .await?;
//!
//! let v1 = manager.run(RunRequest::new("shop", "default", 0, "me")).await?;
//! manager.promote("shop", "default", "prod", "me").await?;
//! assert!(manager.sync_status("shop", "prod").await?.in_sync);
//! # let _ = v1;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod config;
mod engine;
mod error;
pub mod gate;
mod manager;
pub mod telemetry;
mod tracker;

pub use config::ManagerConfig;
pub use engine::{Engine, EngineError, EngineOutput, EngineRequest};
pub use error::{ConfigError, CoreError, ErrorKind};
pub use gate::Rejection;
pub use manager::{EnvironmentManager, RunRequest};
pub use tracker::{EnvironmentTracker, SyncStatus};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

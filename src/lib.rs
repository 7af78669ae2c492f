//! pocrunner - Rate-limited PoC scan dispatcher
//!
//! Runs every proof-of-concept check against every target at a bounded rate,
//! while a background sweeper keeps a per-target liveness registry current.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`targets`] - Shared target list with a single writer
//! - [`liveness`] - Liveness registry, prober and background sweeper
//! - [`engine`] - Check execution and result collection
//! - [`dispatch`] - Rate-limited task fan-out over a bounded worker pool
//! - [`catalog`] - Target list and PoC file loading
//! - [`runner`] - Scan orchestration
//! - [`utils`] - Target string helpers
//!
//! # Example
//!
//! ```no_run
//! use pocrunner::catalog;
//! use pocrunner::config::Config;
//! use pocrunner::engine::ResultCollector;
//! use pocrunner::runner::{Runner, ScanInputs};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let results = ResultCollector::new();
//!     let runner = Runner::from_config(config, results.clone())?;
//!
//!     let inputs = ScanInputs {
//!         targets: catalog::load_targets(&["example.com".to_string()], None)?,
//!         pocs: catalog::load_pocs(std::path::Path::new("pocs"))?,
//!     };
//!     runner.run(inputs, CancellationToken::new()).await?;
//!     println!("{} findings", results.len());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod liveness;
pub mod models;
pub mod runner;
pub mod targets;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::dispatch::{DispatchConfig, DispatchReport, Dispatcher};
    pub use crate::engine::{CheckContext, CheckExecutor, HttpCheckExecutor, ResultCollector};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::liveness::{LivenessProber, LivenessRegistry, LivenessSweeper};
    pub use crate::models::{CheckResult, LivenessState, Poc, ProbeOutcome, ProbeStatus, Task};
    pub use crate::runner::{Runner, ScanInputs, ScanSummary};
}

// Direct re-exports for convenience
pub use models::{CheckResult, LivenessState, Poc, Task};

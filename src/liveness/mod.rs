//! Target liveness tracking
//!
//! - [`registry`] - per-target liveness state and failure bookkeeping
//! - [`prober`] - network reachability probe
//! - [`sweeper`] - perpetual background re-classification of the target set

pub mod prober;
pub mod registry;
pub mod sweeper;

pub use prober::{HttpProber, LivenessProber};
pub use registry::{HostRecord, LivenessCounts, LivenessRegistry};
pub use sweeper::{LivenessSweeper, SweepReport, SweeperConfig};

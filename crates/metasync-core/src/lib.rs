pub mod config;
pub mod fingerprint;
pub mod target;
pub mod telemetry;

pub use config::{ClusterConfig, ConcurrencyLimits, ControlPlaneConfig, ResourceConfig};
pub use fingerprint::{Fingerprint, avoid_overflow};
pub use target::ScrapeTarget;

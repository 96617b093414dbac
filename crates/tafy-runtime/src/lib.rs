//! `tafy-runtime` – the node's composition root and control loop.
//!
//! - [`node`] – [`RobotNode`]: owns the drive controller, range pipeline,
//!   protocol router and transport bridge, and runs one cooperative loop pass
//!   per [`step`][RobotNode::step].
//! - [`scheduler`] – [`Scheduler`]: next-due tracking for sensor acquisition,
//!   telemetry and heartbeat.
//! - [`clock`] – [`Clock`] with a monotonic and a manual implementation.
//! - [`config`] – [`NodeConfig`] and its safety/timing sections.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing] for logs and
//!   optional OTLP span export.

pub mod clock;
pub mod config;
pub mod node;
pub mod scheduler;
pub mod telemetry;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{NodeConfig, SafetyConfig, TimingConfig};
pub use node::RobotNode;
pub use scheduler::{NodeTask, Scheduler};

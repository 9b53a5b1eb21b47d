//! Failure detection for the current leader.
//!
//! The [`HeartbeatMonitor`] probes whoever the election engine currently
//! believes is leader and asks the engine for a new election once the leader
//! misses enough consecutive heartbeats. It only reads election state through
//! snapshots; the election itself is the engine's business.
//!
//! # Modes
//!
//! - [`MonitorMode::Watching`]: a remote leader is known and this process
//!   is idle, so the leader is probed every interval
//! - [`MonitorMode::Suppressed`]: this process leads, has no leader yet, or
//!   has an election in flight; nothing is probed

pub mod heartbeat;

pub use heartbeat::{HeartbeatMonitor, MonitorMode, ProbeOutcome};

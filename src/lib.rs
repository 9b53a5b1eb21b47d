//! Bully-algorithm leader election among a fixed roster of TCP peers.
//!
//! The highest-id reachable process leads. Followers probe the leader with
//! heartbeats and run a new election when it stops answering.

pub mod config;
pub mod election;
pub mod error;
pub mod monitor;
pub mod node;
pub mod roster;
pub mod shutdown;
pub mod transport;

//! Bully election core.
//!
//! - [`state`]: the pure per-process state machine; every transition returns
//!   the [`Effect`]s it wants carried out
//! - [`engine`]: the single task that owns the state, feeds it events from
//!   one queue and performs the effects
//! - [`message`]: protocol messages and their JSON encoding
//! - [`timer`]: timer jitter

pub mod engine;
pub mod message;
pub mod state;
pub mod timer;

pub use engine::{ElectionEngine, ElectionEvent, EngineHandle};
pub use message::Message;
pub use state::{Effect, ElectionSnapshot, ElectionState, Phase};

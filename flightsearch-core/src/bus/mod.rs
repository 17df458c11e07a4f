//! In-process messaging between dispatch and collection.
//!
//! - [`Topic`]: multicast bus, every live subscriber gets its own unbounded
//!   delivery queue.
//! - [`Queue`]: single fan-in stream with work-queue semantics, each message
//!   is handed to exactly one consumer.
//!
//! Neither primitive applies backpressure; both are unbounded.

pub mod queue;
pub mod topic;

pub use queue::Queue;
pub use topic::{Subscription, Topic};

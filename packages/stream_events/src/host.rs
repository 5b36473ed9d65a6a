//! Host-thread reference engine for the [`Queue`][crate::Queue] contract.
//!
//! Each [`HostQueue`] owns a worker thread that executes its commands strictly in enqueue
//! order. Commands are closures or markers; profiling queues stamp them with nanoseconds
//! measured from a process-wide epoch, so timestamps of different queues are comparable.

mod clock;
mod command;
mod queue;

pub(crate) use clock::*;
pub(crate) use command::Work;
pub use command::{CommandKind, HostCommand};
pub use queue::{HostQueue, HostQueueBuilder};
pub(crate) use queue::WeakHostQueue;

//! Host-side events that observe, time and order work submitted to independent execution queues.
//!
//! An [`Event`] is bound to a position in a [`Queue`] by recording it. Once bound, it can be
//! used to:
//!
//! - check whether all work up to that position has completed ([`Event::query()`]),
//! - block until it has ([`Event::synchronize()`]),
//! - measure the time between two positions ([`Event::elapsed_time()`]),
//! - make another queue wait for that position before running later work
//!   ([`Event::stream_wait()`]).
//!
//! The crate is generic over the execution engine via the [`Queue`] and [`CompletionHandle`]
//! traits. [`HostQueue`] is a ready-made engine that runs closures on a dedicated worker thread
//! per queue.
//!
//! Callers that refer to events through opaque handles use an [`EventTable`], which validates
//! every handle and reports [`Error::InvalidHandle`] for destroyed or unknown events.
//!
//! # Example
//!
//! ```rust
//! use std::thread;
//! use std::time::Duration;
//!
//! use stream_events::{Event, EventFlags, HostQueue};
//!
//! let queue = HostQueue::new();
//!
//! let start = Event::new(EventFlags::DEFAULT).unwrap();
//! let stop = Event::new(EventFlags::DEFAULT).unwrap();
//!
//! start.record(&queue).unwrap();
//! queue
//!     .enqueue_work(|| thread::sleep(Duration::from_millis(5)))
//!     .unwrap();
//! stop.record(&queue).unwrap();
//!
//! stop.synchronize();
//!
//! let millis = start.elapsed_time(&stop).unwrap();
//! assert!(millis >= 5.0);
//! ```
//!
//! # Logging
//!
//! The crate emits [`tracing`] events. Event creation and destruction, fresh markers enqueued
//! for elapsed-time measurement and host queue lifecycle changes are logged at `debug` level.
//! Binding changes, cross-queue waits and individual operations are logged at `trace` level.
//! Panics of queued work are logged at `error` level. No subscriber is installed by the crate
//! itself.

mod engine;
mod error;
mod event;
mod event_table;
mod flags;
mod host;

pub use engine::{
    CommandStatus, CompletionHandle, MarkerRequest, MarkerTiming, Queue, QueueId, Timestamps,
};
pub use error::{Error, Result};
pub use event::{Event, EventStatus};
pub use event_table::{EventHandle, EventTable, EventTableBuilder};
pub use flags::EventFlags;
pub use host::{CommandKind, HostCommand, HostQueue, HostQueueBuilder};

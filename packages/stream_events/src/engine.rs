//! The contract an execution engine fulfils so events can observe and order its work.
//!
//! Events never execute anything themselves. They hold on to [`CompletionHandle`]s produced by
//! a [`Queue`] and enqueue lightweight marker commands when they need a synchronization point
//! that does not exist yet. How the queue schedules work and captures timestamps is entirely up
//! to the engine.

use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use crate::Result;

/// Identifies a queue. Two queue handles with the same identifier refer to the same ordered
/// command sequence.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct QueueId(u64);

impl QueueId {
    /// Creates an identifier from an engine-assigned number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The engine-assigned number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue#{}", self.0)
    }
}

/// Execution status of a command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandStatus {
    /// The command has been enqueued but has not finished executing.
    Pending,

    /// The command has finished executing.
    Complete,
}

/// Device timestamps captured for a command, in nanoseconds on the engine's clock.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timestamps {
    start: u64,
    end: u64,
}

impl Timestamps {
    /// Creates a timestamp pair. `end` is expected not to precede `start`.
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// When the command started executing.
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// When the command finished executing.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.end
    }
}

/// Whether a marker command captures timestamps.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MarkerTiming {
    /// The marker captures start and end timestamps.
    Timed,

    /// The marker never populates timestamps.
    Untimed,
}

impl MarkerTiming {
    /// The marker kind a queue can honor: timed exactly when the queue profiles its commands.
    #[must_use]
    pub fn for_queue<Q: Queue>(queue: &Q) -> Self {
        if queue.profiling_enabled() {
            Self::Timed
        } else {
            Self::Untimed
        }
    }
}

/// A request to enqueue a marker: a command that does no work of its own and exists only to
/// represent a point in the queue's command sequence.
///
/// If the wait-list is not empty, no command enqueued after the marker on the same queue may
/// start before every handle in the wait-list has completed.
pub struct MarkerRequest<H> {
    timing: MarkerTiming,
    wait_list: Vec<Arc<H>>,
}

impl<H> MarkerRequest<H> {
    /// A marker without dependencies.
    #[must_use]
    pub fn new(timing: MarkerTiming) -> Self {
        Self {
            timing,
            wait_list: Vec::new(),
        }
    }

    /// Makes the marker depend on the given handles.
    #[must_use]
    pub fn with_wait_list(mut self, wait_list: Vec<Arc<H>>) -> Self {
        self.wait_list = wait_list;
        self
    }

    /// Whether the marker captures timestamps.
    #[must_use]
    pub fn timing(&self) -> MarkerTiming {
        self.timing
    }

    /// The handles the marker depends on.
    #[must_use]
    pub fn wait_list(&self) -> &[Arc<H>] {
        &self.wait_list
    }

    /// Decomposes the request, handing ownership of the wait-list to the engine.
    #[must_use]
    pub fn into_parts(self) -> (MarkerTiming, Vec<Arc<H>>) {
        (self.timing, self.wait_list)
    }
}

impl<H> Debug for MarkerRequest<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerRequest")
            .field("timing", &self.timing)
            .field("wait_list_len", &self.wait_list.len())
            .finish()
    }
}

/// An asynchronous unit of work owned by a queue.
///
/// Handles are shared through [`Arc`]: the queue, any number of events and other commands'
/// wait-lists may hold one at the same time. The handle lives until the last owner lets go.
pub trait CompletionHandle: Debug + Send + Sync + 'static {
    /// The queue type that produces this kind of handle.
    type Queue: Queue<Handle = Self>;

    /// Current execution status. May be stale until the engine has made progress.
    fn status(&self) -> CommandStatus;

    /// Gives the owning queue an opportunity to make progress and refresh the status.
    ///
    /// Never blocks. Returns `false` if the owning queue can no longer be driven forward.
    fn try_advance(&self) -> bool;

    /// Blocks the calling thread until the command has completed.
    fn await_completion(&self);

    /// Start and end timestamps, if the command captured them and has completed.
    fn timestamps(&self) -> Option<Timestamps>;

    /// Whether the command is visible to users (does work or represents a user-requested
    /// point), as opposed to a purely internal synchronization command.
    fn is_user_visible(&self) -> bool;

    /// Identifies the queue that owns the command.
    fn queue_id(&self) -> QueueId;

    /// The queue that owns the command, unless that queue no longer exists.
    ///
    /// Commands may outlive their queue, e.g. when an event is still bound to one.
    fn queue(&self) -> Option<Self::Queue>;
}

/// An ordered sequence of asynchronous commands.
///
/// Values of this type are cheap handles: clones refer to the same underlying queue.
pub trait Queue: Clone + Debug + Send + Sync + 'static {
    /// The completion handle type of commands enqueued on this queue.
    type Handle: CompletionHandle<Queue = Self>;

    /// Identifies the underlying command sequence.
    fn id(&self) -> QueueId;

    /// Whether the queue was created with timing (profiling) enabled.
    fn profiling_enabled(&self) -> bool;

    /// The most recently enqueued command, whether or not it has completed. `None` only if
    /// nothing has been enqueued yet.
    fn last_enqueued(&self) -> Option<Arc<Self::Handle>>;

    /// Enqueues a user-visible marker command and returns its completion handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot accept the command.
    fn enqueue_marker(&self, request: MarkerRequest<Self::Handle>) -> Result<Arc<Self::Handle>>;
}

/// Whether the handle has completed, nudging its queue first if it has not.
pub(crate) fn is_ready<H: CompletionHandle>(handle: &H) -> bool {
    if handle.status() == CommandStatus::Complete {
        return true;
    }

    // A queue that cannot be advanced simply stays pending; the status check below reports it.
    let _advanced = handle.try_advance();

    handle.status() == CommandStatus::Complete
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_id_display() {
        assert_eq!(QueueId::new(7).to_string(), "queue#7");
        assert_eq!(QueueId::new(7).get(), 7);
    }

    #[test]
    fn timestamps_accessors() {
        let timestamps = Timestamps::new(10, 25);

        assert_eq!(timestamps.start(), 10);
        assert_eq!(timestamps.end(), 25);
    }

    #[test]
    fn marker_request_carries_wait_list() {
        let dependency = Arc::new(5_u32);
        let request = MarkerRequest::new(MarkerTiming::Timed)
            .with_wait_list(vec![Arc::clone(&dependency)]);

        assert_eq!(request.timing(), MarkerTiming::Timed);
        assert_eq!(request.wait_list().len(), 1);

        let (timing, wait_list) = request.into_parts();
        assert_eq!(timing, MarkerTiming::Timed);
        assert!(Arc::ptr_eq(&wait_list[0], &dependency));
    }
}

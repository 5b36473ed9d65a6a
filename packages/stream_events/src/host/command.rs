use std::any::Any;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::error;

use crate::host::{ClockFacade, TimestampSource, WeakHostQueue};
use crate::{CommandStatus, CompletionHandle, HostQueue, QueueId, Timestamps};

pub(crate) type Work = Box<dyn FnOnce() + Send + 'static>;

/// What a [`HostCommand`] represents in its queue.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandKind {
    /// Runs a closure supplied by the user.
    Work,

    /// A user-visible synchronization point without work of its own.
    Marker,

    /// An internal synchronization point, e.g. the one [`HostQueue::finish`] waits for.
    Barrier,
}

/// A command enqueued on a [`HostQueue`], doubling as its own completion handle.
pub struct HostCommand {
    // The queue owns its most recent command, so the command must not own the queue.
    queue: WeakHostQueue,
    kind: CommandKind,
    timed: bool,

    // Taken by the worker when the command starts executing.
    payload: Mutex<Payload>,

    completion: Mutex<Completion>,
    completed: Condvar,
}

#[derive(Default)]
struct Payload {
    work: Option<Work>,
    wait_list: Vec<Arc<HostCommand>>,
}

struct Completion {
    status: CommandStatus,
    timestamps: Option<Timestamps>,
}

impl HostCommand {
    pub(crate) fn new(
        queue: WeakHostQueue,
        kind: CommandKind,
        timed: bool,
        work: Option<Work>,
        wait_list: Vec<Arc<Self>>,
    ) -> Self {
        Self {
            queue,
            kind,
            timed,
            payload: Mutex::new(Payload { work, wait_list }),
            completion: Mutex::new(Completion {
                status: CommandStatus::Pending,
                timestamps: None,
            }),
            completed: Condvar::new(),
        }
    }

    /// What the command represents in its queue.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Whether the command captures timestamps when it executes.
    #[must_use]
    pub fn is_timed(&self) -> bool {
        self.timed
    }

    /// Runs the command on the calling (worker) thread and signals completion.
    pub(crate) fn execute(&self, clock: &ClockFacade) {
        let Payload { work, wait_list } = mem::take(&mut *self.payload.lock());

        for dependency in &wait_list {
            dependency.await_completion();
        }

        // Dependencies are released as soon as they are satisfied.
        drop(wait_list);

        let start = self.timed.then(|| clock.now_nanos());

        if let Some(work) = work {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
                error!(
                    queue = %self.queue.id(),
                    panic_message = %format_panic_payload(payload.as_ref()),
                    "work panicked; the command completes without its effects"
                );
            }
        }

        let timestamps = start.map(|start| Timestamps::new(start, clock.now_nanos()));

        let mut completion = self.completion.lock();
        completion.status = CommandStatus::Complete;
        completion.timestamps = timestamps;
        self.completed.notify_all();
    }
}

impl CompletionHandle for HostCommand {
    type Queue = HostQueue;

    fn status(&self) -> CommandStatus {
        self.completion.lock().status
    }

    fn try_advance(&self) -> bool {
        // The worker thread drives execution by itself; all we can check is that the queue
        // still exists and accepts commands.
        self.queue
            .upgrade()
            .is_some_and(|queue| queue.is_accepting())
    }

    fn await_completion(&self) {
        let mut completion = self.completion.lock();

        while completion.status == CommandStatus::Pending {
            self.completed.wait(&mut completion);
        }
    }

    fn timestamps(&self) -> Option<Timestamps> {
        self.completion.lock().timestamps
    }

    fn is_user_visible(&self) -> bool {
        self.kind != CommandKind::Barrier
    }

    fn queue_id(&self) -> QueueId {
        self.queue.id()
    }

    fn queue(&self) -> Option<HostQueue> {
        self.queue.upgrade()
    }
}

impl fmt::Debug for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCommand")
            .field("queue", &self.queue.id())
            .field("kind", &self.kind)
            .field("timed", &self.timed)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn format_panic_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

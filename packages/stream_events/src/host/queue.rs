use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::host::{ClockFacade, CommandKind, HostCommand, Work};
use crate::{CompletionHandle, Error, MarkerRequest, MarkerTiming, Queue, QueueId, Result};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// A queue whose commands execute in order on a dedicated host thread.
///
/// This is a reference engine for the [`Queue`] contract: it runs closures instead of device
/// kernels but honors the same ordering, wait-list and timing rules a device queue would.
///
/// Cloning the value creates another handle to the same queue. Commands only refer back to
/// their queue weakly, so the worker thread exits once every handle is gone, after executing
/// whatever was already enqueued.
///
/// # Example
///
/// ```rust
/// use stream_events::{CommandStatus, CompletionHandle, HostQueue};
///
/// let queue = HostQueue::builder().name("copy").build();
///
/// let command = queue.enqueue_work(|| println!("copying")).unwrap();
/// command.await_completion();
///
/// assert_eq!(command.status(), CommandStatus::Complete);
/// ```
#[derive(Clone)]
pub struct HostQueue {
    shared: Arc<QueueShared>,
}

struct QueueShared {
    id: QueueId,
    name: String,
    profiling: bool,
    submission: Mutex<Submission>,
    gate: Arc<Gate>,
}

struct Submission {
    // None once the queue has been shut down.
    sender: Option<Sender<Arc<HostCommand>>>,

    // Kept alive even after execution so that a completed command can still be reused as the
    // current position of the queue.
    last: Option<Arc<HostCommand>>,
}

/// A handle to a [`HostQueue`] that does not keep the queue alive.
#[derive(Clone, Debug)]
pub(crate) struct WeakHostQueue {
    id: QueueId,
    shared: Weak<QueueShared>,
}

impl WeakHostQueue {
    pub(crate) fn id(&self) -> QueueId {
        self.id
    }

    pub(crate) fn upgrade(&self) -> Option<HostQueue> {
        self.shared.upgrade().map(|shared| HostQueue { shared })
    }
}

impl HostQueue {
    /// Creates a profiling-enabled queue with a generated name.
    ///
    /// Use [`HostQueue::builder()`] for custom configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring a queue.
    #[must_use]
    pub fn builder() -> HostQueueBuilder {
        HostQueueBuilder::new()
    }

    /// The name given to the queue (also used for its worker thread).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Enqueues a closure to run after everything enqueued before it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] if the queue has been shut down.
    pub fn enqueue_work<F>(&self, work: F) -> Result<Arc<HostCommand>>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(
            CommandKind::Work,
            self.shared.profiling,
            Some(Box::new(work)),
            Vec::new(),
        )
    }

    /// Blocks until everything enqueued so far has executed.
    ///
    /// This enqueues an internal barrier command, which does not count as a user-visible
    /// position: an event recorded right after `finish()` gets a fresh marker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] if the queue has been shut down.
    pub fn finish(&self) -> Result<()> {
        let barrier = self.submit(CommandKind::Barrier, self.shared.profiling, None, Vec::new())?;
        barrier.await_completion();
        Ok(())
    }

    /// Holds back execution: the worker does not start another command until [`resume()`]
    /// is called. A command already executing runs to completion.
    ///
    /// A paused queue must be resumed before its handles are dropped, otherwise its worker
    /// never gets to exit.
    ///
    /// [`resume()`]: Self::resume
    pub fn pause(&self) {
        self.shared.gate.set_paused(true);
    }

    /// Lets the worker continue executing commands after [`pause()`][Self::pause].
    pub fn resume(&self) {
        self.shared.gate.set_paused(false);
    }

    /// Stops accepting new commands. Commands already enqueued still execute.
    ///
    /// Afterwards, enqueueing fails with [`Error::ResourceExhausted`] and completion handles of
    /// this queue report that the queue cannot be advanced.
    pub fn shutdown(&self) {
        let sender = self.shared.submission.lock().sender.take();

        if sender.is_some() {
            debug!(queue = %self.shared.id, "host queue shut down");
        }
    }

    pub(crate) fn downgrade(&self) -> WeakHostQueue {
        WeakHostQueue {
            id: self.shared.id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.shared.submission.lock().sender.is_some()
    }

    fn submit(
        &self,
        kind: CommandKind,
        timed: bool,
        work: Option<Work>,
        wait_list: Vec<Arc<HostCommand>>,
    ) -> Result<Arc<HostCommand>> {
        let command = Arc::new(HostCommand::new(self.downgrade(), kind, timed, work, wait_list));

        // Sending and updating `last` under one lock keeps "last enqueued" consistent with the
        // order the worker sees.
        let mut submission = self.shared.submission.lock();

        let sender = submission
            .sender
            .as_ref()
            .ok_or(Error::ResourceExhausted {
                problem: "the queue has been shut down",
            })?;

        sender
            .send(Arc::clone(&command))
            .map_err(|_disconnected| Error::ResourceExhausted {
                problem: "the queue worker is no longer running",
            })?;

        submission.last = Some(Arc::clone(&command));

        trace!(queue = %self.shared.id, ?kind, timed, "command enqueued");

        Ok(command)
    }
}

impl Default for HostQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Queue for HostQueue {
    type Handle = HostCommand;

    fn id(&self) -> QueueId {
        self.shared.id
    }

    fn profiling_enabled(&self) -> bool {
        self.shared.profiling
    }

    fn last_enqueued(&self) -> Option<Arc<HostCommand>> {
        self.shared.submission.lock().last.clone()
    }

    fn enqueue_marker(&self, request: MarkerRequest<HostCommand>) -> Result<Arc<HostCommand>> {
        let (timing, wait_list) = request.into_parts();
        let timed = self.shared.profiling && timing == MarkerTiming::Timed;

        self.submit(CommandKind::Marker, timed, None, wait_list)
    }
}

impl fmt::Debug for HostQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostQueue")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("profiling", &self.shared.profiling)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`HostQueue`].
#[derive(Debug)]
pub struct HostQueueBuilder {
    name: Option<String>,
    profiling: bool,
    clock: ClockFacade,
}

impl HostQueueBuilder {
    fn new() -> Self {
        Self {
            name: None,
            profiling: true,
            clock: ClockFacade::monotonic(),
        }
    }

    /// Sets the queue name. Default is `queue-<id>`.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets whether commands capture start and end timestamps.
    ///
    /// Default is `true`.
    #[must_use]
    pub fn profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn clock(mut self, clock: ClockFacade) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the queue and starts its worker thread.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to start the worker thread.
    #[must_use]
    pub fn build(self) -> HostQueue {
        let id = QueueId::new(NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed));
        let name = self.name.unwrap_or_else(|| format!("queue-{}", id.get()));

        let (sender, receiver) = channel::unbounded();
        let gate = Arc::new(Gate::new());

        let worker = Worker {
            queue_id: id,
            receiver,
            gate: Arc::clone(&gate),
            clock: self.clock,
        };

        thread::Builder::new()
            .name(format!("host-queue-{name}"))
            .spawn(move || worker.run())
            .expect("failed to spawn queue worker thread: thread spawning failure is not supported");

        HostQueue {
            shared: Arc::new(QueueShared {
                id,
                name,
                profiling: self.profiling,
                submission: Mutex::new(Submission {
                    sender: Some(sender),
                    last: None,
                }),
                gate,
            }),
        }
    }
}

// The worker must not hold a queue handle, otherwise the channel would never disconnect.
struct Worker {
    queue_id: QueueId,
    receiver: Receiver<Arc<HostCommand>>,
    gate: Arc<Gate>,
    clock: ClockFacade,
}

impl Worker {
    fn run(self) {
        debug!(queue = %self.queue_id, "host queue worker started");

        while let Ok(command) = self.receiver.recv() {
            self.gate.wait_until_open();

            command.execute(&self.clock);

            trace!(queue = %self.queue_id, kind = ?command.kind(), "command complete");
        }

        debug!(queue = %self.queue_id, "host queue worker exiting");
    }
}

#[derive(Debug)]
struct Gate {
    paused: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    #[allow(clippy::mutex_atomic, reason = "the flag is paired with a condition variable")]
    fn new() -> Self {
        Self {
            paused: Mutex::new(false),
            changed: Condvar::new(),
        }
    }

    fn set_paused(&self, paused: bool) {
        *self.paused.lock() = paused;
        self.changed.notify_all();
    }

    fn wait_until_open(&self) {
        let mut paused = self.paused.lock();

        while *paused {
            self.changed.wait(&mut paused);
        }
    }
}
